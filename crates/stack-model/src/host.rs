use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const LOCAL_HOST_NAME: &str = "local";
pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SshAuth {
    KeyFile {
        path: String,
    },
    #[default]
    Agent,
    Password {
        password: String,
    },
}

impl SshAuth {
    pub fn label(&self) -> &'static str {
        match self {
            SshAuth::KeyFile { .. } => "key",
            SshAuth::Agent => "agent",
            SshAuth::Password { .. } => "password",
        }
    }
}

/// A remote host as persisted in the registry. `port == 0` means the ssh default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshHostConfig {
    pub name: String,
    pub hostname: String,
    pub user: String,
    #[serde(default)]
    pub port: u16,
    pub remote_root: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub auth: SshAuth,
}

impl SshHostConfig {
    pub fn effective_port(&self) -> u16 {
        if self.port == 0 {
            DEFAULT_SSH_PORT
        } else {
            self.port
        }
    }

    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.hostname)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyField("name"));
        }
        if self.name == LOCAL_HOST_NAME {
            return Err(ValidationError::ReservedName(self.name.clone()));
        }
        if self.hostname.trim().is_empty() {
            return Err(ValidationError::EmptyField("hostname"));
        }
        if self.user.trim().is_empty() {
            return Err(ValidationError::EmptyField("user"));
        }
        if self.remote_root.trim().is_empty() {
            return Err(ValidationError::EmptyField("remote_root"));
        }
        match &self.auth {
            SshAuth::KeyFile { path } if path.trim().is_empty() => {
                Err(ValidationError::EmptyField("key file path"))
            }
            SshAuth::Password { password } if password.is_empty() => {
                Err(ValidationError::EmptyField("password"))
            }
            _ => Ok(()),
        }
    }
}

/// Parses operator input for a port. Empty input selects the default.
pub fn parse_port(raw: &str) -> Result<u16, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed
        .parse::<u16>()
        .map_err(|_| ValidationError::InvalidPort(raw.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostTarget {
    server_name: String,
    #[serde(skip)]
    connection: Option<SshHostConfig>,
}

impl HostTarget {
    pub fn local() -> Self {
        Self {
            server_name: LOCAL_HOST_NAME.to_string(),
            connection: None,
        }
    }

    pub fn remote(config: SshHostConfig) -> Self {
        Self {
            server_name: config.name.clone(),
            connection: Some(config),
        }
    }

    pub fn is_remote(&self) -> bool {
        self.connection.is_some()
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn connection(&self) -> Option<&SshHostConfig> {
        self.connection.as_ref()
    }
}

/// A host parsed from an external source, keyed by its alias. It lacks a
/// remote root until the operator supplies one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PotentialHost {
    pub alias: String,
    pub hostname: String,
    pub user: String,
    pub port: u16,
    pub auth: SshAuth,
}

impl PotentialHost {
    pub fn into_host_config(self, remote_root: impl Into<String>) -> SshHostConfig {
        SshHostConfig {
            name: self.alias,
            hostname: self.hostname,
            user: self.user,
            port: self.port,
            remote_root: remote_root.into(),
            disabled: false,
            auth: self.auth,
        }
    }
}
