use stack_model::{SshAuth, SshHostConfig};
use system_utils::ssh::apply_askpass_env;
use tokio::process::Command;
use tracing::info;

use super::Invocation;
use crate::config::SshOptions;

pub(super) fn build_ssh_command(
    config: &SshHostConfig,
    options: &SshOptions,
    remote_cmd: &str,
) -> anyhow::Result<Command> {
    let mut cmd = Command::new("ssh");
    let has_password = matches!(config.auth, SshAuth::Password { .. });
    if let SshAuth::Password { password } = &config.auth {
        info!(
            event = "ssh.auth.askpass",
            host = %config.name,
            "using SSH_ASKPASS for password auth"
        );
        apply_askpass_env(&mut cmd, password)?;
    }
    cmd.arg("-T");
    cmd.arg("-p").arg(config.effective_port().to_string());
    apply_ssh_options(&mut cmd, options, has_password);
    if let SshAuth::KeyFile { path } = &config.auth {
        cmd.arg("-i").arg(path);
        cmd.arg("-o").arg("IdentitiesOnly=yes");
    }
    cmd.args(&options.extra_args);
    cmd.arg(config.destination());
    cmd.arg(remote_cmd);
    Ok(cmd)
}

fn apply_ssh_options(cmd: &mut Command, options: &SshOptions, has_password: bool) {
    cmd.arg("-o").arg("StrictHostKeyChecking=accept-new");
    cmd.arg("-o")
        .arg(format!("ConnectTimeout={}", options.connect_timeout_secs));
    if !has_password {
        cmd.arg("-o").arg("BatchMode=yes");
    }
}

/// Shell line run by the remote login shell: `cd <dir> && <argv>`.
pub(super) fn remote_command_line(invocation: &Invocation) -> String {
    let mut argv = Vec::with_capacity(invocation.args.len() + 1);
    argv.push(invocation.program.as_str());
    argv.extend(invocation.args.iter().map(String::as_str));
    let command = shell_words::join(argv);
    match invocation.dir.as_deref() {
        Some(dir) => format!("cd {} && {}", quote_remote_path(dir), command),
        None => command,
    }
}

/// Quotes a remote path while leaving a leading `~` for the remote shell
/// to expand.
fn quote_remote_path(path: &str) -> String {
    if path == "~" {
        return "~".to_string();
    }
    match path.strip_prefix("~/") {
        Some(rest) => format!("~/{}", shell_words::quote(rest)),
        None => shell_words::quote(path).to_string(),
    }
}

/// Message for a failed ssh session, with an auth hint when the output
/// looks like an authentication problem.
pub(crate) fn describe_ssh_failure(config: &SshHostConfig, detail: &str) -> String {
    let detail = detail.trim();
    let mut message = if detail.is_empty() {
        format!("ssh to {} failed", config.name)
    } else {
        format!("ssh to {} failed: {detail}", config.name)
    };
    let has_password = matches!(config.auth, SshAuth::Password { .. });
    if let Some(hint) = ssh_auth_hint(detail, has_password) {
        message.push('\n');
        message.push_str(hint);
    }
    message
}

fn ssh_auth_hint(detail: &str, has_password: bool) -> Option<&'static str> {
    let detail = detail.to_lowercase();
    if detail.contains("keyboard-interactive")
        || detail.contains("verification code")
        || detail.contains("two-factor")
    {
        return Some(
            "ssh requires keyboard-interactive/2FA; SSH_ASKPASS cannot answer it. Use key or agent auth for this host.",
        );
    }
    if detail.contains("permission denied")
        || detail.contains("authentication failed")
        || detail.contains("no supported authentication methods available")
        || detail.contains("too many authentication failures")
    {
        if has_password {
            return Some("ssh password auth failed. Check the password stored for this host.");
        }
        return Some(
            "ssh authentication failed. Load the key into ssh-agent or set a key file for this host.",
        );
    }
    None
}
