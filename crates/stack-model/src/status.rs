use serde::{Deserialize, Serialize};

use crate::error::StatusParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StackStatus {
    Up,
    Down,
    Partial,
    Error,
}

impl StackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StackStatus::Up => "up",
            StackStatus::Down => "down",
            StackStatus::Partial => "partial",
            StackStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerInfo {
    pub service: String,
    pub name: String,
    pub state: String,
    pub status: String,
}

impl ContainerInfo {
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

/// Result of one status poll. Superseded wholesale by the next poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackRuntimeInfo {
    pub overall: StackStatus,
    pub containers: Vec<ContainerInfo>,
    pub error: Option<String>,
}

impl StackRuntimeInfo {
    pub fn from_containers(containers: Vec<ContainerInfo>) -> Self {
        let running = containers.iter().filter(|c| c.is_running()).count();
        let overall = if running == 0 {
            StackStatus::Down
        } else if running == containers.len() {
            StackStatus::Up
        } else {
            StackStatus::Partial
        };
        Self {
            overall,
            containers,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            overall: StackStatus::Error,
            containers: Vec::new(),
            error: Some(message.into()),
        }
    }

    pub fn running_count(&self) -> usize {
        self.containers.iter().filter(|c| c.is_running()).count()
    }
}

#[derive(Deserialize)]
struct PsEntry {
    #[serde(rename = "Service", default)]
    service: String,
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Status", default)]
    status: String,
}

impl From<PsEntry> for ContainerInfo {
    fn from(entry: PsEntry) -> Self {
        ContainerInfo {
            service: entry.service,
            name: entry.name,
            state: entry.state,
            status: entry.status,
        }
    }
}

/// Parses `compose ps --format json`. Older compose releases print one JSON
/// array, newer ones print one object per line.
pub fn parse_compose_ps(output: &str) -> Result<Vec<ContainerInfo>, StatusParseError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        let entries: Vec<PsEntry> = serde_json::from_str(trimmed)?;
        return Ok(entries.into_iter().map(ContainerInfo::from).collect());
    }
    let mut containers = Vec::new();
    for line in trimmed.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry: PsEntry = serde_json::from_str(line)?;
        containers.push(entry.into());
    }
    Ok(containers)
}
