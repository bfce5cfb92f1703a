mod ssh;
mod stream;

use async_trait::async_trait;
use stack_model::{CommandStep, HostTarget};
use system_utils::path::expand_tilde;
use system_utils::process::{run_command_output, spawn_piped};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::SshOptions;
use crate::events::OutputLine;

pub(crate) use ssh::describe_ssh_failure;
use ssh::remote_command_line;
use stream::forward_lines;

/// Exit status `ssh` reports when the connection itself failed.
pub(crate) const SSH_TRANSPORT_EXIT: i32 = 255;

/// A program to run, optionally inside `dir` on the target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Invocation {
    pub(crate) dir: Option<String>,
    pub(crate) program: String,
    pub(crate) args: Vec<String>,
}

impl From<&CommandStep> for Invocation {
    fn from(step: &CommandStep) -> Self {
        Self {
            dir: step.dir.clone(),
            program: step.program.clone(),
            args: step.args.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct CommandOutput {
    pub(crate) code: Option<i32>,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

impl CommandOutput {
    pub(crate) fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub(crate) fn detail(&self) -> String {
        format!("{}{}", self.stdout, self.stderr).trim().to_string()
    }
}

/// Runs commands on a host target. Remote targets go through one ssh
/// session per call.
#[async_trait]
pub(crate) trait Executor: Send + Sync {
    /// Runs to completion and captures both pipes.
    async fn capture(
        &self,
        host: &HostTarget,
        invocation: &Invocation,
    ) -> anyhow::Result<CommandOutput>;

    /// Relays output lines through `lines` as they are produced and returns
    /// the exit code (`None` when killed by a signal). All lines are sent
    /// before this returns.
    async fn stream(
        &self,
        host: &HostTarget,
        invocation: &Invocation,
        lines: mpsc::UnboundedSender<OutputLine>,
    ) -> anyhow::Result<Option<i32>>;
}

pub(crate) struct ProcessExecutor {
    ssh: SshOptions,
}

impl ProcessExecutor {
    pub(crate) fn new(ssh: SshOptions) -> Self {
        Self { ssh }
    }

    fn build_command(&self, host: &HostTarget, invocation: &Invocation) -> anyhow::Result<Command> {
        match host.connection() {
            Some(config) => {
                let remote_cmd = remote_command_line(invocation);
                debug!(host = %config.name, command = %remote_cmd, "ssh command");
                ssh::build_ssh_command(config, &self.ssh, &remote_cmd)
            }
            None => {
                let mut cmd = Command::new(&invocation.program);
                cmd.args(&invocation.args);
                if let Some(dir) = invocation.dir.as_deref() {
                    cmd.current_dir(expand_tilde(dir));
                }
                Ok(cmd)
            }
        }
    }
}

fn command_label(host: &HostTarget, invocation: &Invocation) -> String {
    if host.is_remote() {
        format!("ssh to {}", host.server_name())
    } else {
        invocation.program.clone()
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn capture(
        &self,
        host: &HostTarget,
        invocation: &Invocation,
    ) -> anyhow::Result<CommandOutput> {
        let mut cmd = self.build_command(host, invocation)?;
        let output = run_command_output(&mut cmd, &command_label(host, invocation)).await?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn stream(
        &self,
        host: &HostTarget,
        invocation: &Invocation,
        lines: mpsc::UnboundedSender<OutputLine>,
    ) -> anyhow::Result<Option<i32>> {
        let mut cmd = self.build_command(host, invocation)?;
        let label = command_label(host, invocation);
        let mut child = spawn_piped(&mut cmd, &label)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("{label}: stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("{label}: stderr not captured"))?;
        tokio::join!(
            forward_lines(stdout, false, lines.clone()),
            forward_lines(stderr, true, lines),
        );
        let status = child
            .wait()
            .await
            .map_err(|err| anyhow::anyhow!("failed to wait for {label}: {err}"))?;
        Ok(status.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::temp_dir;

    fn sh(script: &str) -> Invocation {
        Invocation {
            dir: None,
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    #[tokio::test]
    async fn local_capture_reports_exit_code() {
        let executor = ProcessExecutor::new(SshOptions::default());
        let output = executor
            .capture(&HostTarget::local(), &sh("echo ready; exit 4"))
            .await
            .expect("capture");
        assert_eq!(output.code, Some(4));
        assert!(!output.success());
        assert_eq!(output.stdout.trim(), "ready");
    }

    #[tokio::test]
    async fn local_capture_runs_in_dir() {
        let dir = temp_dir("stackyard-exec");
        let executor = ProcessExecutor::new(SshOptions::default());
        let mut invocation = sh("pwd");
        invocation.dir = Some(dir.to_string_lossy().to_string());
        let output = executor
            .capture(&HostTarget::local(), &invocation)
            .await
            .expect("capture");
        let reported = std::fs::canonicalize(output.stdout.trim()).expect("canonical pwd");
        assert_eq!(reported, std::fs::canonicalize(&dir).expect("canonical dir"));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn local_stream_relays_lines_in_order() {
        let executor = ProcessExecutor::new(SshOptions::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let code = executor
            .stream(
                &HostTarget::local(),
                &sh("echo one; echo two; echo bad >&2; exit 2"),
                tx,
            )
            .await
            .expect("stream");
        assert_eq!(code, Some(2));
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        while let Some(line) = rx.recv().await {
            if line.is_error {
                stderr.push(line.text);
            } else {
                stdout.push(line.text);
            }
        }
        assert_eq!(stdout, vec!["one", "two"]);
        assert_eq!(stderr, vec!["bad"]);
    }
}
