use std::sync::Arc;

use stack_model::{parse_compose_ps, ComposeCommand, Stack, StackRuntimeInfo};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::gate::AdmissionGate;
use crate::events::{Event, EventSink};
use crate::exec::{describe_ssh_failure, Executor, Invocation, SSH_TRANSPORT_EXIT};

/// Fire-and-forget status queries. Every poll, local or remote, first takes
/// a slot from the process-wide gate.
#[derive(Clone)]
pub(crate) struct StatusPoller {
    executor: Arc<dyn Executor>,
    gate: AdmissionGate,
    compose: ComposeCommand,
    shutdown: CancellationToken,
    sink: EventSink,
}

impl StatusPoller {
    pub(crate) fn new(
        executor: Arc<dyn Executor>,
        gate: AdmissionGate,
        compose: ComposeCommand,
        shutdown: CancellationToken,
        sink: EventSink,
    ) -> Self {
        Self {
            executor,
            gate,
            compose,
            shutdown,
            sink,
        }
    }

    pub(crate) fn poll(&self, stack: Stack, generation: u64) {
        let poller = self.clone();
        tokio::spawn(async move {
            let identifier = stack.identifier();
            let info = poll_stack(
                poller.executor.as_ref(),
                &poller.gate,
                &poller.compose,
                &poller.shutdown,
                &stack,
            )
            .await;
            debug!(
                event = "status.loaded",
                stack = %identifier,
                generation,
                status = info.overall.as_str(),
                "status poll finished"
            );
            poller.sink.send(Event::StatusLoaded {
                identifier,
                generation,
                info,
            });
        });
    }
}

pub(crate) async fn poll_stack(
    executor: &dyn Executor,
    gate: &AdmissionGate,
    compose: &ComposeCommand,
    shutdown: &CancellationToken,
    stack: &Stack,
) -> StackRuntimeInfo {
    let _permit = match gate.acquire(shutdown).await {
        Ok(permit) => permit,
        Err(err) => return StackRuntimeInfo::error(err.to_string()),
    };
    debug!(stack = %stack.identifier(), in_flight = gate.in_flight(), "status poll admitted");
    let invocation = Invocation {
        dir: Some(stack.path().to_string()),
        program: compose.program.clone(),
        args: compose.args(&["ps", "--all", "--format", "json"]),
    };
    let output = match executor.capture(stack.host(), &invocation).await {
        Ok(output) => output,
        Err(err) => {
            warn!(stack = %stack.identifier(), error = %err, "status command failed to run");
            return StackRuntimeInfo::error(format!("{err:#}"));
        }
    };
    if !output.success() {
        let detail = output.detail();
        let message = match (stack.host().connection(), output.code) {
            (Some(config), Some(SSH_TRANSPORT_EXIT)) => describe_ssh_failure(config, &detail),
            (_, code) => {
                let code = code.map_or_else(|| "signal".to_string(), |code| code.to_string());
                if detail.is_empty() {
                    format!("compose ps exited with status {code}")
                } else {
                    format!("compose ps exited with status {code}: {detail}")
                }
            }
        };
        return StackRuntimeInfo::error(message);
    }
    match parse_compose_ps(&output.stdout) {
        Ok(containers) => StackRuntimeInfo::from_containers(containers),
        Err(err) => StackRuntimeInfo::error(err.to_string()),
    }
}
