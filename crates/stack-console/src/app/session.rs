use std::collections::HashMap;

use anyhow::bail;
use stack_model::{CommandStep, SequenceTarget, SshHostConfig, Stack, StackRuntimeInfo};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tracing::warn;

use crate::events::{Action, ConsoleEvent, DiscoveryFailure, SequenceReport};
use crate::runtime::ConsoleHandle;

pub(crate) struct DiscoveryReport {
    pub(crate) stacks: Vec<Stack>,
    pub(crate) statuses: HashMap<String, StackRuntimeInfo>,
    pub(crate) errors: Vec<DiscoveryFailure>,
}

/// One CLI invocation's view of the console: it submits actions and waits
/// for the events that answer them.
pub(crate) struct Session<'a> {
    handle: &'a ConsoleHandle,
    events: Receiver<ConsoleEvent>,
}

impl<'a> Session<'a> {
    pub(crate) fn new(handle: &'a ConsoleHandle) -> Self {
        Self {
            handle,
            events: handle.subscribe(),
        }
    }

    pub(crate) fn send(&self, action: Action) -> anyhow::Result<()> {
        self.handle.send(action)
    }

    pub(crate) async fn next(&mut self) -> anyhow::Result<ConsoleEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Ok(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "console events dropped by a slow reader");
                }
                Err(RecvError::Closed) => bail!("console runtime stopped"),
            }
        }
    }

    pub(crate) async fn load_hosts(&mut self) -> anyhow::Result<Vec<SshHostConfig>> {
        self.send(Action::LoadHosts)?;
        self.wait_hosts_changed().await
    }

    /// Waits for the registry to change, failing on the first rejection or
    /// error reported instead.
    pub(crate) async fn wait_hosts_changed(&mut self) -> anyhow::Result<Vec<SshHostConfig>> {
        loop {
            match self.next().await? {
                ConsoleEvent::HostsChanged { hosts } => return Ok(hosts),
                ConsoleEvent::Rejected { message, .. } | ConsoleEvent::Error { message } => {
                    bail!(message)
                }
                _ => {}
            }
        }
    }

    /// Runs one discovery and waits for the status of every stack found.
    pub(crate) async fn discover(&mut self, progress: bool) -> anyhow::Result<DiscoveryReport> {
        self.send(Action::StartDiscovery)?;
        let mut stacks = Vec::new();
        let mut statuses = HashMap::new();
        let mut errors = None;
        loop {
            match self.next().await? {
                ConsoleEvent::StackDiscovered { stack } => {
                    if progress {
                        eprintln!("found {} on {}", stack.name(), stack.host().server_name());
                    }
                    stacks.push(stack);
                }
                ConsoleEvent::DiscoveryFailed { host, error } => {
                    if progress {
                        eprintln!("discovery failed on {host}: {error}");
                    }
                }
                ConsoleEvent::StatusUpdated { identifier, info } => {
                    statuses.insert(identifier, info);
                }
                ConsoleEvent::Error { message } => {
                    eprintln!("warning: {message}");
                    self.send(Action::DismissError)?;
                }
                ConsoleEvent::DiscoveryFinished {
                    errors: failures, ..
                } => errors = Some(failures),
                _ => {}
            }
            let settled = stacks
                .iter()
                .all(|stack: &Stack| statuses.contains_key(&stack.identifier()));
            if errors.is_some() && settled {
                break;
            }
        }
        Ok(DiscoveryReport {
            stacks,
            statuses,
            errors: errors.unwrap_or_default(),
        })
    }

    /// Runs a sequence, streaming its output to stdout/stderr, and returns
    /// the final report.
    pub(crate) async fn run_sequence(
        &mut self,
        target: SequenceTarget,
        steps: Vec<CommandStep>,
    ) -> anyhow::Result<SequenceReport> {
        let key = target.key();
        self.send(Action::RunSequence { target, steps })?;
        let mut current = None;
        let mut total = 0;
        loop {
            match self.next().await? {
                ConsoleEvent::Rejected { message, .. } if current.is_none() => bail!(message),
                ConsoleEvent::SequenceStarted {
                    sequence,
                    key: started,
                    target,
                    steps,
                } if started == key && current.is_none() => {
                    current = Some(sequence);
                    total = steps;
                    eprintln!("==> {target}");
                }
                ConsoleEvent::StepStarted {
                    sequence,
                    index,
                    name,
                    command,
                } if current == Some(sequence) => {
                    eprintln!("--> [{}/{total}] {name}: {command}", index + 1);
                }
                ConsoleEvent::Output { sequence, line } if current == Some(sequence) => {
                    if line.is_error {
                        eprintln!("{}", line.text);
                    } else {
                        println!("{}", line.text);
                    }
                }
                ConsoleEvent::StepFinished {
                    sequence,
                    name,
                    error: Some(error),
                    ..
                } if current == Some(sequence) => {
                    eprintln!("!! {name} failed: {error}");
                }
                ConsoleEvent::SequenceFinished { report } if current == Some(report.sequence) => {
                    return Ok(report);
                }
                _ => {}
            }
        }
    }

    /// Re-polls one stack and returns its fresh status.
    pub(crate) async fn refresh(&mut self, identifier: &str) -> anyhow::Result<StackRuntimeInfo> {
        self.send(Action::PollStatus(identifier.to_string()))?;
        loop {
            match self.next().await? {
                ConsoleEvent::StatusUpdated {
                    identifier: updated,
                    info,
                } if updated == identifier => return Ok(info),
                ConsoleEvent::Rejected { message, .. } => {
                    self.send(Action::DismissError)?;
                    bail!(message)
                }
                _ => {}
            }
        }
    }

    /// Re-polls every listed stack and waits until each has reported.
    pub(crate) async fn refresh_all(
        &mut self,
        stacks: &[Stack],
    ) -> anyhow::Result<HashMap<String, StackRuntimeInfo>> {
        self.send(Action::PollAll)?;
        let mut statuses = HashMap::new();
        while stacks
            .iter()
            .any(|stack| !statuses.contains_key(&stack.identifier()))
        {
            if let ConsoleEvent::StatusUpdated { identifier, info } = self.next().await? {
                statuses.insert(identifier, info);
            }
        }
        Ok(statuses)
    }

    pub(crate) async fn wait_status(&mut self, identifier: &str) -> anyhow::Result<StackRuntimeInfo> {
        loop {
            if let ConsoleEvent::StatusUpdated {
                identifier: updated,
                info,
            } = self.next().await?
            {
                if updated == identifier {
                    return Ok(info);
                }
            }
        }
    }
}
