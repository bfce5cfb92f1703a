use std::collections::VecDeque;
use std::sync::Arc;

use stack_model::CommandStep;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::events::{Event, EventSink};
use crate::exec::{describe_ssh_failure, Executor, Invocation, SSH_TRANSPORT_EXIT};

const FAILURE_TAIL_LINES: usize = 20;

/// Runs single steps on behalf of the controller, which decides whether the
/// next step of a sequence starts.
#[derive(Clone)]
pub(crate) struct CommandSequencer {
    executor: Arc<dyn Executor>,
    sink: EventSink,
}

impl CommandSequencer {
    pub(crate) fn new(executor: Arc<dyn Executor>, sink: EventSink) -> Self {
        Self { executor, sink }
    }

    /// Spawns the step. Output lines are relayed as `OutputLine` events and
    /// exactly one `StepFinished` follows the last of them.
    pub(crate) fn run(&self, sequence: u64, step: CommandStep) {
        let sequencer = self.clone();
        tokio::spawn(async move {
            let result = sequencer.run_step(sequence, &step).await;
            match &result {
                Ok(()) => info!(
                    event = "sequence.step_ok",
                    sequence,
                    step = %step.name,
                    host = %step.target.server_name(),
                    "step finished"
                ),
                Err(error) => warn!(
                    event = "sequence.step_failed",
                    sequence,
                    step = %step.name,
                    host = %step.target.server_name(),
                    error = %error,
                    "step failed"
                ),
            }
            sequencer.sink.send(Event::StepFinished { sequence, result });
        });
    }

    async fn run_step(&self, sequence: u64, step: &CommandStep) -> Result<(), String> {
        info!(
            event = "sequence.step_start",
            sequence,
            step = %step.name,
            host = %step.target.server_name(),
            command = %step.command_line(),
            "step started"
        );
        let invocation = Invocation::from(step);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let process = self.executor.stream(&step.target, &invocation, tx);
        let relay = async {
            let mut stderr_tail = VecDeque::with_capacity(FAILURE_TAIL_LINES);
            while let Some(line) = rx.recv().await {
                if line.is_error {
                    if stderr_tail.len() == FAILURE_TAIL_LINES {
                        stderr_tail.pop_front();
                    }
                    stderr_tail.push_back(line.text.clone());
                }
                self.sink.send(Event::OutputLine { sequence, line });
            }
            stderr_tail.into_iter().collect::<Vec<_>>().join("\n")
        };
        let (result, stderr_tail) = tokio::join!(process, relay);
        match result {
            Ok(Some(0)) => Ok(()),
            Ok(Some(SSH_TRANSPORT_EXIT)) if step.target.is_remote() => {
                match step.target.connection() {
                    Some(config) => Err(describe_ssh_failure(config, &stderr_tail)),
                    None => Err(exit_message(step, Some(SSH_TRANSPORT_EXIT))),
                }
            }
            Ok(code) => Err(exit_message(step, code)),
            Err(err) => Err(format!("step '{}' could not start: {err:#}", step.name)),
        }
    }
}

fn exit_message(step: &CommandStep, code: Option<i32>) -> String {
    match code {
        Some(code) => format!("step '{}' exited with status {code}", step.name),
        None => format!("step '{}' was terminated by a signal", step.name),
    }
}
