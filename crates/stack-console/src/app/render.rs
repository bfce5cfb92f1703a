use std::collections::HashMap;

use serde::Serialize;
use stack_model::{SshHostConfig, Stack, StackRuntimeInfo};

use crate::events::DiscoveryFailure;

/// Left-aligned columns separated by two spaces.
fn table(header: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(|cell| cell.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }
    let mut out = String::new();
    let header: Vec<String> = header.iter().map(|cell| cell.to_string()).collect();
    for row in std::iter::once(&header).chain(rows) {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect();
        out.push_str(cells.join("  ").trim_end());
        out.push('\n');
    }
    out
}

pub(crate) fn status_label(info: Option<&StackRuntimeInfo>) -> String {
    match info {
        Some(info) if info.containers.is_empty() => info.overall.as_str().to_string(),
        Some(info) => format!(
            "{} ({}/{})",
            info.overall.as_str(),
            info.running_count(),
            info.containers.len()
        ),
        None => "unknown".to_string(),
    }
}

pub(crate) fn stack_table(stacks: &[Stack], statuses: &HashMap<String, StackRuntimeInfo>) -> String {
    let mut sorted: Vec<&Stack> = stacks.iter().collect();
    sorted.sort_by(|a, b| {
        (a.host().server_name(), a.path()).cmp(&(b.host().server_name(), b.path()))
    });
    let rows: Vec<Vec<String>> = sorted
        .into_iter()
        .map(|stack| {
            vec![
                stack.host().server_name().to_string(),
                stack.name().to_string(),
                status_label(statuses.get(&stack.identifier())),
                stack.path().to_string(),
            ]
        })
        .collect();
    table(&["HOST", "STACK", "STATUS", "PATH"], &rows)
}

pub(crate) fn stack_detail(stack: &Stack, info: &StackRuntimeInfo) -> String {
    let mut out = format!(
        "{} on {}: {}\n",
        stack.name(),
        stack.host().server_name(),
        status_label(Some(info))
    );
    if let Some(error) = info.error.as_deref() {
        out.push_str(&format!("  error: {error}\n"));
    }
    if !info.containers.is_empty() {
        let rows: Vec<Vec<String>> = info
            .containers
            .iter()
            .map(|container| {
                vec![
                    container.service.clone(),
                    container.name.clone(),
                    container.state.clone(),
                    container.status.clone(),
                ]
            })
            .collect();
        out.push_str(&table(&["SERVICE", "CONTAINER", "STATE", "STATUS"], &rows));
    }
    out
}

pub(crate) fn host_table(hosts: &[SshHostConfig]) -> String {
    let rows: Vec<Vec<String>> = hosts
        .iter()
        .map(|host| {
            vec![
                host.name.clone(),
                host.destination(),
                host.effective_port().to_string(),
                host.auth.label().to_string(),
                host.remote_root.clone(),
                if host.disabled { "disabled" } else { "enabled" }.to_string(),
            ]
        })
        .collect();
    table(&["NAME", "DESTINATION", "PORT", "AUTH", "ROOT", "STATE"], &rows)
}

#[derive(Serialize)]
struct StackView<'a> {
    identifier: String,
    name: &'a str,
    host: &'a str,
    path: &'a str,
    status: Option<&'a StackRuntimeInfo>,
}

#[derive(Serialize)]
struct DiscoverView<'a> {
    stacks: Vec<StackView<'a>>,
    errors: &'a [DiscoveryFailure],
}

pub(crate) fn discover_json(
    stacks: &[Stack],
    statuses: &HashMap<String, StackRuntimeInfo>,
    errors: &[DiscoveryFailure],
) -> anyhow::Result<String> {
    let view = DiscoverView {
        stacks: stacks
            .iter()
            .map(|stack| {
                let identifier = stack.identifier();
                let status = statuses.get(&identifier);
                StackView {
                    identifier,
                    name: stack.name(),
                    host: stack.host().server_name(),
                    path: stack.path(),
                    status,
                }
            })
            .collect(),
        errors,
    };
    Ok(serde_json::to_string_pretty(&view)?)
}

/// Hosts without secrets.
#[derive(Serialize)]
struct HostView<'a> {
    name: &'a str,
    hostname: &'a str,
    user: &'a str,
    port: u16,
    remote_root: &'a str,
    disabled: bool,
    auth: &'static str,
}

pub(crate) fn hosts_json(hosts: &[SshHostConfig]) -> anyhow::Result<String> {
    let view: Vec<HostView<'_>> = hosts
        .iter()
        .map(|host| HostView {
            name: &host.name,
            hostname: &host.hostname,
            user: &host.user,
            port: host.effective_port(),
            remote_root: &host.remote_root,
            disabled: host.disabled,
            auth: host.auth.label(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&view)?)
}
