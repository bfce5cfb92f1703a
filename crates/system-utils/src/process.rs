use std::process::{Output, Stdio};

use anyhow::Context;
use tokio::process::{Child, Command};

/// Runs `cmd` to completion and captures both pipes. Stdin is closed.
pub async fn run_command_output(cmd: &mut Command, label: &str) -> anyhow::Result<Output> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd.output()
        .await
        .with_context(|| format!("failed to run {label}"))
}

/// Spawns `cmd` with piped stdout/stderr for line streaming.
pub fn spawn_piped(cmd: &mut Command, label: &str) -> anyhow::Result<Child> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd.spawn().with_context(|| format!("failed to spawn {label}"))
}
