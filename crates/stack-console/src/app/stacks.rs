use std::time::{Duration, Instant};

use anyhow::Context;
use stack_model::{HostTarget, SequenceKind, SequenceTarget, Stack, StackStatus, LOCAL_HOST_NAME};

use super::render::{discover_json, stack_detail, stack_table, status_label};
use super::session::Session;
use crate::config::Settings;
use crate::events::SequenceOutcome;

/// Resolves a stack by identifier (`host:path`) or by a name that only one
/// stack carries.
pub(crate) fn select_stack<'a>(stacks: &'a [Stack], selector: &str) -> anyhow::Result<&'a Stack> {
    if let Some(stack) = stacks.iter().find(|stack| stack.identifier() == selector) {
        return Ok(stack);
    }
    let named: Vec<&Stack> = stacks
        .iter()
        .filter(|stack| stack.name() == selector)
        .collect();
    match named.as_slice() {
        [stack] => Ok(*stack),
        [] => anyhow::bail!("no stack matches {selector:?}"),
        many => {
            let choices: Vec<String> = many.iter().map(|stack| stack.identifier()).collect();
            anyhow::bail!(
                "stack name {selector:?} is ambiguous; use one of: {}",
                choices.join(", ")
            )
        }
    }
}

pub(crate) async fn discover(
    session: &mut Session<'_>,
    json: bool,
    watch: Option<Duration>,
) -> anyhow::Result<bool> {
    let report = session.discover(!json).await?;
    if json {
        println!(
            "{}",
            discover_json(&report.stacks, &report.statuses, &report.errors)?
        );
    } else {
        print!("{}", stack_table(&report.stacks, &report.statuses));
        for failure in &report.errors {
            eprintln!("error: {}: {}", failure.host, failure.error);
        }
    }
    let Some(interval) = watch else {
        return Ok(report.errors.is_empty());
    };
    loop {
        tokio::time::sleep(interval).await;
        let statuses = session.refresh_all(&report.stacks).await?;
        if json {
            println!("{}", discover_json(&report.stacks, &statuses, &[])?);
        } else {
            println!();
            print!("{}", stack_table(&report.stacks, &statuses));
        }
    }
}

pub(crate) async fn status(
    session: &mut Session<'_>,
    selector: &str,
    watch: Option<Duration>,
) -> anyhow::Result<bool> {
    let report = session.discover(false).await?;
    let stack = select_stack(&report.stacks, selector)?;
    let identifier = stack.identifier();
    let mut info = report
        .statuses
        .get(&identifier)
        .cloned()
        .with_context(|| format!("no status reported for {identifier}"))?;
    print!("{}", stack_detail(stack, &info));
    let Some(interval) = watch else {
        return Ok(info.overall != StackStatus::Error);
    };
    loop {
        tokio::time::sleep(interval).await;
        info = session.refresh(&identifier).await?;
        println!();
        print!("{}", stack_detail(stack, &info));
    }
}

pub(crate) async fn run_stack_sequence(
    session: &mut Session<'_>,
    settings: &Settings,
    kind: SequenceKind,
    selector: &str,
) -> anyhow::Result<bool> {
    let report = session.discover(false).await?;
    let stack = select_stack(&report.stacks, selector)?.clone();
    let identifier = stack.identifier();
    let target = SequenceTarget::Stack { stack };
    let succeeded = run_sequence(session, settings, kind, target).await?;
    if succeeded {
        let info = session.wait_status(&identifier).await?;
        eprintln!("{identifier}: {}", status_label(Some(&info)));
    }
    Ok(succeeded)
}

pub(crate) async fn prune(
    session: &mut Session<'_>,
    settings: &Settings,
    host: &str,
) -> anyhow::Result<bool> {
    let hosts = session.load_hosts().await?;
    let target = if host == LOCAL_HOST_NAME {
        HostTarget::local()
    } else {
        let config = hosts
            .iter()
            .find(|config| config.name == host)
            .with_context(|| format!("host {host} is not registered"))?;
        HostTarget::remote(config.clone())
    };
    run_sequence(session, settings, SequenceKind::Prune, SequenceTarget::Host { host: target }).await
}

async fn run_sequence(
    session: &mut Session<'_>,
    settings: &Settings,
    kind: SequenceKind,
    target: SequenceTarget,
) -> anyhow::Result<bool> {
    let steps = kind
        .steps_for(&target, &settings.compose)
        .with_context(|| format!("{} does not apply to {}", kind.label(), target.label()))?;
    let started = Instant::now();
    let report = session.run_sequence(target, steps).await?;
    let elapsed = humantime::format_duration(Duration::from_secs(started.elapsed().as_secs()));
    match &report.outcome {
        SequenceOutcome::Completed => {
            eprintln!("{} {} finished in {elapsed}", kind.label(), report.target);
        }
        SequenceOutcome::Failed { step, error } => {
            eprintln!(
                "{} {} failed at {step} after {elapsed}: {error}",
                kind.label(),
                report.target
            );
        }
    }
    Ok(report.succeeded())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::remote_host;

    fn stacks() -> Vec<Stack> {
        vec![
            Stack::new(HostTarget::local(), "/srv/web"),
            Stack::new(HostTarget::local(), "/srv/db"),
            Stack::new(HostTarget::remote(remote_host("nas")), "/srv/stacks/web"),
        ]
    }

    #[test]
    fn selects_unique_name() {
        let stacks = stacks();
        let stack = select_stack(&stacks, "db").expect("db");
        assert_eq!(stack.identifier(), "local:/srv/db");
    }

    #[test]
    fn identifier_resolves_ambiguous_names() {
        let stacks = stacks();
        let err = select_stack(&stacks, "web").expect_err("ambiguous");
        assert!(err.to_string().contains("nas:/srv/stacks/web"));
        let stack = select_stack(&stacks, "nas:/srv/stacks/web").expect("by id");
        assert_eq!(stack.host().server_name(), "nas");
    }

    #[test]
    fn unknown_selector_fails() {
        let stacks = stacks();
        assert!(select_stack(&stacks, "cache").is_err());
    }
}
