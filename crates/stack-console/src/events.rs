use std::path::PathBuf;

use serde::Serialize;
use stack_model::{
    CommandStep, PotentialHost, SequenceTarget, SshHostConfig, Stack, StackRuntimeInfo,
};
use tokio::sync::mpsc;

/// One line of process output, in production order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct OutputLine {
    pub(crate) text: String,
    pub(crate) is_error: bool,
}

#[cfg(test)]
impl OutputLine {
    pub(crate) fn stdout(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub(crate) fn stderr(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

/// Results pushed by workers. Errors travel as strings.
#[derive(Debug)]
pub(crate) enum Event {
    StackDiscovered {
        run: u64,
        stack: Stack,
    },
    DiscoveryError {
        run: u64,
        host: String,
        error: String,
    },
    DiscoveryFinished {
        run: u64,
    },
    StatusLoaded {
        identifier: String,
        generation: u64,
        info: StackRuntimeInfo,
    },
    OutputLine {
        sequence: u64,
        line: OutputLine,
    },
    StepFinished {
        sequence: u64,
        result: Result<(), String>,
    },
    HostsLoaded(Result<Vec<SshHostConfig>, String>),
    HostMutated(Result<(), String>),
    ImportParsed(Result<Vec<PotentialHost>, String>),
    ImportSaved {
        imported: usize,
        skipped: usize,
        result: Result<(), String>,
    },
}

/// Requests issued by the presentation layer.
#[derive(Debug)]
pub(crate) enum Action {
    StartDiscovery,
    PollStatus(String),
    PollAll,
    RunSequence {
        target: SequenceTarget,
        steps: Vec<CommandStep>,
    },
    LoadHosts,
    AddHost(SshHostConfig),
    EditHost {
        original: String,
        edited: SshHostConfig,
    },
    RemoveHost(String),
    ParseImport(PathBuf),
    ImportHosts(Vec<SshHostConfig>),
    DismissError,
    Shutdown,
}

/// Everything the controller drains from its single inbound queue.
#[derive(Debug)]
pub(crate) enum Message {
    Action(Action),
    Event(Event),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SavePurpose {
    Mutation,
    Import { imported: usize, skipped: usize },
}

/// Outbound work produced by a controller transition.
#[derive(Debug, PartialEq)]
pub(crate) enum Effect {
    Discover {
        run: u64,
        hosts: Vec<SshHostConfig>,
    },
    /// `generation` increases with every poll issued for the stack.
    Poll {
        stack: Stack,
        generation: u64,
    },
    RunStep {
        sequence: u64,
        step: CommandStep,
    },
    LoadHosts,
    SaveHosts {
        hosts: Vec<SshHostConfig>,
        purpose: SavePurpose,
    },
    ParseImport {
        path: PathBuf,
        known: Vec<SshHostConfig>,
    },
    Publish(ConsoleEvent),
    Stop,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct DiscoveryFailure {
    pub(crate) host: String,
    pub(crate) error: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub(crate) enum SequenceOutcome {
    Completed,
    Failed { step: String, error: String },
}

/// Output and outcome of the last sequence run against one target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct SequenceReport {
    pub(crate) sequence: u64,
    pub(crate) key: String,
    pub(crate) target: String,
    pub(crate) steps_run: usize,
    pub(crate) outcome: SequenceOutcome,
    pub(crate) output: Vec<OutputLine>,
}

impl SequenceReport {
    pub(crate) fn succeeded(&self) -> bool {
        matches!(self.outcome, SequenceOutcome::Completed)
    }
}

/// Typed notifications for the presentation layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ConsoleEvent {
    DiscoveryStarted {
        run: u64,
        probes: usize,
    },
    StackDiscovered {
        stack: Stack,
    },
    DiscoveryFailed {
        host: String,
        error: String,
    },
    DiscoveryFinished {
        stacks: usize,
        errors: Vec<DiscoveryFailure>,
    },
    StatusUpdated {
        identifier: String,
        info: StackRuntimeInfo,
    },
    SequenceStarted {
        sequence: u64,
        key: String,
        target: String,
        steps: usize,
    },
    StepStarted {
        sequence: u64,
        index: usize,
        name: String,
        command: String,
    },
    Output {
        sequence: u64,
        line: OutputLine,
    },
    StepFinished {
        sequence: u64,
        index: usize,
        name: String,
        error: Option<String>,
    },
    SequenceFinished {
        report: SequenceReport,
    },
    HostsChanged {
        hosts: Vec<SshHostConfig>,
    },
    ImportReady {
        candidates: Vec<PotentialHost>,
    },
    ImportFinished {
        imported: usize,
        skipped: usize,
    },
    Rejected {
        request: &'static str,
        message: String,
    },
    Error {
        message: String,
    },
    ErrorCleared,
}

/// Handle given to every component at construction. Sending after the
/// controller has stopped is a no-op.
#[derive(Clone, Debug)]
pub(crate) struct EventSink {
    tx: mpsc::UnboundedSender<Message>,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { tx }
    }

    pub(crate) fn send(&self, event: Event) {
        let _ = self.tx.send(Message::Event(event));
    }

    #[cfg(test)]
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}
