use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use stack_model::{SshAuth, SshHostConfig};
use tracing::{info, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    hosts: Vec<SshHostConfig>,
}

/// The persisted host registry. Every save replaces the whole file.
#[derive(Clone, Debug)]
pub(crate) struct HostStore {
    path: PathBuf,
}

impl HostStore {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty registry.
    pub(crate) async fn load(&self) -> anyhow::Result<Vec<SshHostConfig>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(registry = %self.path.display(), "host registry not found, starting empty");
                return Ok(Vec::new());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read registry {}", self.path.display()))
            }
        };
        let file: RegistryFile = toml::from_str(&raw)
            .with_context(|| format!("failed to parse registry {}", self.path.display()))?;
        check_registry(&file.hosts)?;
        for host in &file.hosts {
            if matches!(host.auth, SshAuth::Password { .. }) {
                warn!(
                    host = %host.name,
                    "password auth is set; prefer key or agent auth (keyboard-interactive/2FA is not supported)"
                );
            }
        }
        info!(
            event = "registry.loaded",
            registry = %self.path.display(),
            hosts = file.hosts.len(),
            "host registry loaded"
        );
        Ok(file.hosts)
    }

    /// Writes to a sibling temp file first so a failed write never leaves a
    /// truncated registry behind.
    pub(crate) async fn save(&self, hosts: &[SshHostConfig]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let file = RegistryFile {
            hosts: hosts.to_vec(),
        };
        let raw = toml::to_string_pretty(&file).context("failed to encode host registry")?;
        let tmp = self.path.with_extension("toml.tmp");
        tokio::fs::write(&tmp, raw)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace registry {}", self.path.display()))?;
        info!(
            event = "registry.saved",
            registry = %self.path.display(),
            hosts = hosts.len(),
            "host registry saved"
        );
        Ok(())
    }
}

fn check_registry(hosts: &[SshHostConfig]) -> anyhow::Result<()> {
    let mut seen = HashSet::new();
    for host in hosts {
        host.validate()
            .with_context(|| format!("invalid host entry {:?}", host.name))?;
        if !seen.insert(host.name.as_str()) {
            anyhow::bail!("duplicate host name: {}", host.name);
        }
    }
    Ok(())
}
