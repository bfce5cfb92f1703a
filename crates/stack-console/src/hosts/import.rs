use std::path::Path;

use anyhow::Context;
use stack_model::{filter_known, parse_ssh_config, PotentialHost, SshHostConfig};
use tracing::info;

/// Reads an OpenSSH client config and returns the aliases not yet present in
/// `known`.
pub(crate) async fn read_import_candidates(
    path: &Path,
    known: &[SshHostConfig],
) -> anyhow::Result<Vec<PotentialHost>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read ssh config {}", path.display()))?;
    let default_user = std::env::var("USER").unwrap_or_default();
    let parsed = parse_ssh_config(&raw, &default_user);
    let total = parsed.len();
    let candidates = filter_known(parsed, known);
    info!(
        event = "import.parsed",
        source = %path.display(),
        parsed = total,
        candidates = candidates.len(),
        "ssh config parsed"
    );
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{remote_host, temp_dir};

    #[tokio::test]
    async fn drops_registered_aliases() {
        let dir = temp_dir("stackyard-import");
        let path = dir.join("config");
        std::fs::write(
            &path,
            "Host nas\n  HostName 10.0.0.2\n  User admin\n\nHost edge\n  HostName edge.example.com\n  Port 2200\n",
        )
        .expect("write");
        let candidates = read_import_candidates(&path, &[remote_host("nas")])
            .await
            .expect("read");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].alias, "edge");
        assert_eq!(candidates[0].port, 2200);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let err = read_import_candidates(Path::new("/nonexistent/ssh_config"), &[])
            .await
            .expect_err("missing");
        assert!(err.to_string().contains("failed to read ssh config"));
    }
}
