use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use stack_model::{HostTarget, SshAuth, SshHostConfig};
use tokio::sync::mpsc;

use crate::events::OutputLine;
use crate::exec::{CommandOutput, Executor, Invocation};

pub(crate) fn temp_dir(prefix: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    dir.push(format!("{prefix}-{nanos}"));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub(crate) fn remote_host(name: &str) -> SshHostConfig {
    SshHostConfig {
        name: name.to_string(),
        hostname: format!("{name}.lan"),
        user: "deploy".to_string(),
        port: 0,
        remote_root: "/srv/stacks".to_string(),
        disabled: false,
        auth: SshAuth::Agent,
    }
}

/// Scripted result for one fake invocation.
#[derive(Clone, Debug)]
pub(crate) struct FakeRun {
    pub(crate) lines: Vec<OutputLine>,
    pub(crate) exit: Result<Option<i32>, String>,
    pub(crate) delay: Duration,
}

impl FakeRun {
    pub(crate) fn ok(stdout: &[&str]) -> Self {
        Self {
            lines: stdout.iter().map(|line| OutputLine::stdout(*line)).collect(),
            exit: Ok(Some(0)),
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn exit(code: i32, stderr: &[&str]) -> Self {
        Self {
            lines: stderr.iter().map(|line| OutputLine::stderr(*line)).collect(),
            exit: Ok(Some(code)),
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn spawn_error(message: &str) -> Self {
        Self {
            lines: Vec::new(),
            exit: Err(message.to_string()),
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone, Debug)]
pub(crate) struct RecordedCall {
    pub(crate) host: String,
    pub(crate) invocation: Invocation,
}

type Handler = dyn Fn(&HostTarget, &Invocation) -> FakeRun + Send + Sync;

/// Executor that answers from a closure and records every call along with
/// the peak number of overlapping calls.
pub(crate) struct FakeExecutor {
    handler: Box<Handler>,
    calls: Mutex<Vec<RecordedCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeExecutor {
    pub(crate) fn new(
        handler: impl Fn(&HostTarget, &Invocation) -> FakeRun + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn play(&self, host: &HostTarget, invocation: &Invocation) -> FakeRun {
        self.calls.lock().expect("calls lock").push(RecordedCall {
            host: host.server_name().to_string(),
            invocation: invocation.clone(),
        });
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let run = (self.handler)(host, invocation);
        if run.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(run.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        run
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn capture(
        &self,
        host: &HostTarget,
        invocation: &Invocation,
    ) -> anyhow::Result<CommandOutput> {
        let run = self.play(host, invocation).await;
        let code = run.exit.map_err(anyhow::Error::msg)?;
        let mut output = CommandOutput {
            code,
            ..CommandOutput::default()
        };
        for line in run.lines {
            let buf = if line.is_error {
                &mut output.stderr
            } else {
                &mut output.stdout
            };
            buf.push_str(&line.text);
            buf.push('\n');
        }
        Ok(output)
    }

    async fn stream(
        &self,
        host: &HostTarget,
        invocation: &Invocation,
        lines: mpsc::UnboundedSender<OutputLine>,
    ) -> anyhow::Result<Option<i32>> {
        let run = self.play(host, invocation).await;
        for line in run.lines {
            let _ = lines.send(line);
        }
        run.exit.map_err(anyhow::Error::msg)
    }
}
