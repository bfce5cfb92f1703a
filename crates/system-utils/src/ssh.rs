use anyhow::Context;
use std::path::{Path, PathBuf};
use tokio::process::Command;

const PASSWORD_ENV: &str = "STACKYARD_SSH_PASS";
const ASKPASS_FILE: &str = "ssh-askpass.sh";
const ASKPASS_SCRIPT: &str = "#!/bin/sh\nprintf '%s' \"$STACKYARD_SSH_PASS\"\n";

/// Points ssh at the askpass helper so password auth never reads a tty.
/// The helper lives in `~/.stackyard`.
pub fn apply_askpass_env(cmd: &mut Command, password: &str) -> anyhow::Result<()> {
    let home = std::env::var_os("HOME").context("HOME is not set; cannot install ssh askpass helper")?;
    let script = install_askpass_script(&PathBuf::from(home).join(".stackyard"))?;
    cmd.env(PASSWORD_ENV, password)
        .env("SSH_ASKPASS", &script)
        .env("SSH_ASKPASS_REQUIRE", "force")
        .env("DISPLAY", "1");
    Ok(())
}

/// Writes the helper into `dir` unless an identical copy is already there.
pub fn install_askpass_script(dir: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(ASKPASS_FILE);
    let current = std::fs::read(&path).ok();
    if current.as_deref() != Some(ASKPASS_SCRIPT.as_bytes()) {
        std::fs::write(&path, ASKPASS_SCRIPT)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("failed to mark {} executable", path.display()))?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "stackyard-askpass-{label}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn installs_script_and_repairs_tampered_copy() {
        let dir = scratch_dir("install");
        let path = install_askpass_script(&dir).expect("install");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), ASKPASS_SCRIPT);

        std::fs::write(&path, "#!/bin/sh\necho nope\n").expect("tamper");
        install_askpass_script(&dir).expect("reinstall");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), ASKPASS_SCRIPT);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).expect("meta").permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn helper_prints_password_from_env() {
        let dir = scratch_dir("print");
        let path = install_askpass_script(&dir).expect("install");
        let output = Command::new("sh")
            .arg(&path)
            .env(PASSWORD_ENV, "s3cret pass")
            .output()
            .await
            .expect("run helper");
        assert_eq!(output.stdout, b"s3cret pass");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
