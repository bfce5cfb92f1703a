use serde::Serialize;

use crate::host::HostTarget;

pub const COMPOSE_FILE_NAMES: [&str; 4] = [
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

/// A compose project found on some host. Values are never mutated after
/// discovery; a new discovery run produces new values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stack {
    name: String,
    host: HostTarget,
    path: String,
}

impl Stack {
    pub fn new(host: HostTarget, path: impl Into<String>) -> Self {
        let path = normalize_dir(&path.into());
        let name = path
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or(path.as_str())
            .to_string();
        Self { name, host, path }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &HostTarget {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn identifier(&self) -> String {
        stack_identifier(self.host.server_name(), &self.path)
    }
}

pub fn stack_identifier(host: &str, path: &str) -> String {
    format!("{host}:{path}")
}

pub fn is_compose_file(file_name: &str) -> bool {
    COMPOSE_FILE_NAMES.contains(&file_name)
}

/// Returns the project directory for a reported compose file path, or
/// `None` when the path does not name a compose file.
pub fn compose_dir(file_path: &str) -> Option<&str> {
    let trimmed = file_path.trim_end_matches(['\r', '\n']);
    let (dir, file) = trimmed.rsplit_once('/')?;
    if !is_compose_file(file) {
        return None;
    }
    if dir.is_empty() {
        Some("/")
    } else {
        Some(dir)
    }
}

fn normalize_dir(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}
