use anyhow::Context;
use serde::Deserialize;
use stack_model::ComposeCommand;
use std::path::{Path, PathBuf};
use system_utils::path::expand_tilde;

const DEFAULT_CONFIG_PATH: &str = "~/.stackyard/config.toml";
const DEFAULT_REGISTRY_PATH: &str = "~/.stackyard/hosts.toml";
const DEFAULT_SSH_CONFIG_PATH: &str = "~/.ssh/config";
const DEFAULT_LOCAL_ROOT: &str = "~";
const DEFAULT_MAX_DEPTH: usize = 3;
const DEFAULT_MAX_CONCURRENT_POLLS: usize = 32;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ConsoleConfig {
    pub(crate) registry: Option<RegistrySection>,
    pub(crate) discovery: Option<DiscoverySection>,
    pub(crate) status: Option<StatusSection>,
    pub(crate) compose: Option<ComposeSection>,
    pub(crate) ssh: Option<SshSection>,
    pub(crate) import: Option<ImportSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RegistrySection {
    pub(crate) path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DiscoverySection {
    pub(crate) local_roots: Option<Vec<String>>,
    pub(crate) max_depth: Option<usize>,
    pub(crate) max_concurrent_probes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct StatusSection {
    pub(crate) max_concurrent_polls: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ComposeSection {
    pub(crate) command: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SshSection {
    pub(crate) args: Option<Vec<String>>,
    pub(crate) connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ImportSection {
    pub(crate) ssh_config: Option<String>,
}

#[derive(Clone, Debug)]
pub(crate) struct DiscoverySettings {
    pub(crate) local_roots: Vec<String>,
    pub(crate) max_depth: usize,
    pub(crate) max_concurrent_probes: Option<usize>,
}

#[derive(Clone, Debug)]
pub(crate) struct SshOptions {
    pub(crate) extra_args: Vec<String>,
    pub(crate) connect_timeout_secs: u64,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            extra_args: Vec::new(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Settings {
    pub(crate) registry_path: PathBuf,
    pub(crate) ssh_config_path: PathBuf,
    pub(crate) discovery: DiscoverySettings,
    pub(crate) max_concurrent_polls: usize,
    pub(crate) compose: ComposeCommand,
    pub(crate) ssh: SshOptions,
}

/// Loads the config file. An explicitly requested file must exist; the
/// default location is optional.
pub(crate) fn load_console_config(path: Option<&Path>) -> anyhow::Result<ConsoleConfig> {
    let (path, explicit) = match path {
        Some(path) => (expand_tilde(path), true),
        None => (expand_tilde(DEFAULT_CONFIG_PATH), false),
    };
    if !explicit && !path.exists() {
        tracing::info!(config = %path.display(), "no config file, using defaults");
        return Ok(ConsoleConfig::default());
    }
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: ConsoleConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(config)
}

pub(crate) fn resolve_settings(config: ConsoleConfig) -> anyhow::Result<Settings> {
    let registry = config.registry.unwrap_or_default();
    let discovery = config.discovery.unwrap_or_default();
    let status = config.status.unwrap_or_default();
    let compose = config.compose.unwrap_or_default();
    let ssh = config.ssh.unwrap_or_default();
    let import = config.import.unwrap_or_default();

    let max_depth = discovery.max_depth.unwrap_or(DEFAULT_MAX_DEPTH);
    if max_depth == 0 {
        anyhow::bail!("discovery.max_depth must be at least 1");
    }
    if discovery.max_concurrent_probes == Some(0) {
        anyhow::bail!("discovery.max_concurrent_probes must be at least 1");
    }
    let max_concurrent_polls = status
        .max_concurrent_polls
        .unwrap_or(DEFAULT_MAX_CONCURRENT_POLLS);
    if max_concurrent_polls == 0 {
        anyhow::bail!("status.max_concurrent_polls must be at least 1");
    }
    let compose = match compose.command {
        Some(argv) => ComposeCommand::from_argv(&argv)
            .ok_or_else(|| anyhow::anyhow!("compose.command cannot be empty"))?,
        None => ComposeCommand::default(),
    };
    let local_roots = discovery
        .local_roots
        .unwrap_or_else(|| vec![DEFAULT_LOCAL_ROOT.to_string()]);
    if let Some(root) = local_roots
        .iter()
        .find(|root| !expand_tilde(root.as_str()).is_absolute())
    {
        anyhow::bail!(
            "discovery.local_roots entry {root:?} must be an absolute path or start with ~"
        );
    }

    Ok(Settings {
        registry_path: expand_tilde(registry.path.as_deref().unwrap_or(DEFAULT_REGISTRY_PATH)),
        ssh_config_path: expand_tilde(
            import
                .ssh_config
                .as_deref()
                .unwrap_or(DEFAULT_SSH_CONFIG_PATH),
        ),
        discovery: DiscoverySettings {
            local_roots,
            max_depth,
            max_concurrent_probes: discovery.max_concurrent_probes,
        },
        max_concurrent_polls,
        compose,
        ssh: SshOptions {
            extra_args: ssh.args.unwrap_or_default(),
            connect_timeout_secs: ssh
                .connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_sections() {
        let settings = resolve_settings(ConsoleConfig::default()).expect("settings");
        assert_eq!(settings.max_concurrent_polls, 32);
        assert_eq!(settings.discovery.max_depth, 3);
        assert_eq!(settings.discovery.local_roots, vec!["~".to_string()]);
        assert!(settings.discovery.max_concurrent_probes.is_none());
        assert_eq!(settings.compose, ComposeCommand::default());
        assert_eq!(settings.ssh.connect_timeout_secs, 10);
    }

    #[test]
    fn reads_all_sections() {
        let input = r#"
[registry]
path = "/etc/stackyard/hosts.toml"

[discovery]
local_roots = ["/srv/stacks", "/opt"]
max_depth = 2
max_concurrent_probes = 4

[status]
max_concurrent_polls = 8

[compose]
command = ["podman-compose"]

[ssh]
args = ["-o", "ServerAliveInterval=30"]
connect_timeout_secs = 5
"#;
        let config: ConsoleConfig = toml::from_str(input).expect("parse");
        let settings = resolve_settings(config).expect("settings");
        assert_eq!(settings.registry_path, PathBuf::from("/etc/stackyard/hosts.toml"));
        assert_eq!(settings.discovery.local_roots.len(), 2);
        assert_eq!(settings.discovery.max_concurrent_probes, Some(4));
        assert_eq!(settings.max_concurrent_polls, 8);
        assert_eq!(settings.compose.program, "podman-compose");
        assert!(settings.compose.base_args.is_empty());
        assert_eq!(settings.ssh.extra_args.len(), 2);
        assert_eq!(settings.ssh.connect_timeout_secs, 5);
    }

    #[test]
    fn rejects_unknown_keys() {
        let parsed: Result<ConsoleConfig, _> = toml::from_str("[status]\nlimit = 3\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn rejects_zero_limits() {
        let config: ConsoleConfig =
            toml::from_str("[status]\nmax_concurrent_polls = 0\n").expect("parse");
        assert!(resolve_settings(config).is_err());
        let config: ConsoleConfig = toml::from_str("[compose]\ncommand = []\n").expect("parse");
        assert!(resolve_settings(config).is_err());
    }

    #[test]
    fn relative_local_root_is_rejected() {
        let config: ConsoleConfig =
            toml::from_str("[discovery]\nlocal_roots = [\"/srv\", \"stacks\"]\n").expect("parse");
        let err = resolve_settings(config).expect_err("relative root");
        assert!(err.to_string().contains("\"stacks\""));

        let config: ConsoleConfig =
            toml::from_str("[discovery]\nlocal_roots = [\"/srv\", \"/opt\"]\n").expect("parse");
        assert!(resolve_settings(config).is_ok());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = load_console_config(Some(Path::new("/nonexistent/stackyard.toml")))
            .expect_err("missing");
        assert!(err.to_string().contains("failed to read config"));
    }
}
