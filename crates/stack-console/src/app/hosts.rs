use std::collections::HashSet;

use anyhow::{bail, Context};
use stack_model::{parse_port, SshAuth, SshHostConfig};

use super::render::{host_table, hosts_json};
use super::session::Session;
use crate::cli::{AuthArgs, HostEdits, HostFields, HostsCommand};
use crate::config::Settings;
use crate::events::{Action, ConsoleEvent};

pub(crate) async fn run(
    session: &mut Session<'_>,
    settings: &Settings,
    command: HostsCommand,
) -> anyhow::Result<bool> {
    let hosts = session.load_hosts().await?;
    match command {
        HostsCommand::List { json } => {
            if json {
                println!("{}", hosts_json(&hosts)?);
            } else {
                print!("{}", host_table(&hosts));
            }
        }
        HostsCommand::Add(fields) => {
            let config = host_from_fields(fields)?;
            let name = config.name.clone();
            session.send(Action::AddHost(config))?;
            session.wait_hosts_changed().await?;
            eprintln!("added host {name}");
        }
        HostsCommand::Edit { name, fields } => {
            let current = find_host(&hosts, &name)?;
            let edited = apply_edits(current.clone(), fields)?;
            let renamed = edited.name.clone();
            session.send(Action::EditHost {
                original: name.clone(),
                edited,
            })?;
            session.wait_hosts_changed().await?;
            if renamed == name {
                eprintln!("updated host {name}");
            } else {
                eprintln!("updated host {name} (now {renamed})");
            }
        }
        HostsCommand::Remove { name } => {
            session.send(Action::RemoveHost(name.clone()))?;
            session.wait_hosts_changed().await?;
            eprintln!("removed host {name}");
        }
        HostsCommand::Enable { name } => set_disabled(session, &hosts, &name, false).await?,
        HostsCommand::Disable { name } => set_disabled(session, &hosts, &name, true).await?,
        HostsCommand::Import {
            from,
            remote_root,
            only,
        } => {
            let path = from.unwrap_or_else(|| settings.ssh_config_path.clone());
            import(session, path, &remote_root, &only).await?;
        }
    }
    Ok(true)
}

fn find_host<'a>(hosts: &'a [SshHostConfig], name: &str) -> anyhow::Result<&'a SshHostConfig> {
    hosts
        .iter()
        .find(|host| host.name == name)
        .with_context(|| format!("host {name} not found"))
}

fn auth_from(args: AuthArgs) -> Option<SshAuth> {
    if let Some(path) = args.key {
        return Some(SshAuth::KeyFile { path });
    }
    if let Some(password) = args.password {
        return Some(SshAuth::Password { password });
    }
    if args.agent {
        return Some(SshAuth::Agent);
    }
    None
}

fn host_from_fields(fields: HostFields) -> anyhow::Result<SshHostConfig> {
    let port = parse_port(&fields.port)?;
    let config = SshHostConfig {
        name: fields.name,
        hostname: fields.hostname,
        user: fields.user,
        port,
        remote_root: fields.remote_root,
        disabled: fields.disabled,
        auth: auth_from(fields.auth).unwrap_or_default(),
    };
    config.validate()?;
    Ok(config)
}

fn apply_edits(mut config: SshHostConfig, edits: HostEdits) -> anyhow::Result<SshHostConfig> {
    if let Some(name) = edits.rename {
        config.name = name;
    }
    if let Some(hostname) = edits.hostname {
        config.hostname = hostname;
    }
    if let Some(user) = edits.user {
        config.user = user;
    }
    if let Some(port) = edits.port {
        config.port = parse_port(&port)?;
    }
    if let Some(remote_root) = edits.remote_root {
        config.remote_root = remote_root;
    }
    if let Some(auth) = auth_from(edits.auth) {
        config.auth = auth;
    }
    config.validate()?;
    Ok(config)
}

async fn set_disabled(
    session: &mut Session<'_>,
    hosts: &[SshHostConfig],
    name: &str,
    disabled: bool,
) -> anyhow::Result<()> {
    let current = find_host(hosts, name)?;
    let state = if disabled { "disabled" } else { "enabled" };
    if current.disabled == disabled {
        eprintln!("host {name} is already {state}");
        return Ok(());
    }
    let mut edited = current.clone();
    edited.disabled = disabled;
    session.send(Action::EditHost {
        original: name.to_string(),
        edited,
    })?;
    session.wait_hosts_changed().await?;
    eprintln!("host {name} {state}");
    Ok(())
}

async fn import(
    session: &mut Session<'_>,
    path: std::path::PathBuf,
    remote_root: &str,
    only: &[String],
) -> anyhow::Result<()> {
    session.send(Action::ParseImport(path))?;
    let candidates = loop {
        match session.next().await? {
            ConsoleEvent::ImportReady { candidates } => break candidates,
            ConsoleEvent::Rejected { message, .. } | ConsoleEvent::Error { message } => {
                bail!(message)
            }
            _ => {}
        }
    };
    let wanted: HashSet<&str> = only.iter().map(String::as_str).collect();
    let available: HashSet<&str> = candidates
        .iter()
        .map(|candidate| candidate.alias.as_str())
        .collect();
    for alias in wanted.difference(&available) {
        eprintln!("warning: {alias} is not an importable alias");
    }
    let selected: Vec<SshHostConfig> = candidates
        .iter()
        .filter(|candidate| wanted.is_empty() || wanted.contains(candidate.alias.as_str()))
        .cloned()
        .map(|candidate| candidate.into_host_config(remote_root))
        .collect();
    session.send(Action::ImportHosts(selected))?;
    loop {
        match session.next().await? {
            ConsoleEvent::ImportFinished { imported, skipped } => {
                eprintln!("imported {imported} host(s), skipped {skipped}");
                return Ok(());
            }
            ConsoleEvent::Rejected { message, .. } | ConsoleEvent::Error { message } => {
                bail!(message)
            }
            _ => {}
        }
    }
}
