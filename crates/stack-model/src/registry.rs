use std::collections::HashSet;

use crate::error::RegistryError;
use crate::host::{SshHostConfig, LOCAL_HOST_NAME};

/// Returns a new registry with `candidate` appended. Names are compared
/// exactly, case-sensitively.
pub fn add_host(
    hosts: &[SshHostConfig],
    candidate: SshHostConfig,
) -> Result<Vec<SshHostConfig>, RegistryError> {
    candidate.validate()?;
    if hosts.iter().any(|host| host.name == candidate.name) {
        return Err(RegistryError::Duplicate(candidate.name));
    }
    let mut next = hosts.to_vec();
    next.push(candidate);
    Ok(next)
}

/// Replaces the entry currently named `original_name`. Renames are allowed as
/// long as the new name is not used by a different entry.
pub fn edit_host(
    hosts: &[SshHostConfig],
    original_name: &str,
    edited: SshHostConfig,
) -> Result<Vec<SshHostConfig>, RegistryError> {
    edited.validate()?;
    let index = hosts
        .iter()
        .position(|host| host.name == original_name)
        .ok_or_else(|| RegistryError::NotFound(original_name.to_string()))?;
    let conflict = hosts
        .iter()
        .enumerate()
        .any(|(i, host)| i != index && host.name == edited.name);
    if conflict {
        return Err(RegistryError::Duplicate(edited.name));
    }
    let mut next = hosts.to_vec();
    next[index] = edited;
    Ok(next)
}

pub fn remove_host(
    hosts: &[SshHostConfig],
    name: &str,
) -> Result<Vec<SshHostConfig>, RegistryError> {
    if !hosts.iter().any(|host| host.name == name) {
        return Err(RegistryError::NotFound(name.to_string()));
    }
    Ok(hosts
        .iter()
        .filter(|host| host.name != name)
        .cloned()
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub hosts: Vec<SshHostConfig>,
    pub imported: usize,
    pub skipped: usize,
}

/// Merges `candidates` in input order. A candidate whose name is already
/// taken, by the registry or by an earlier candidate, is skipped; the batch
/// itself never fails.
pub fn import_hosts(hosts: &[SshHostConfig], candidates: Vec<SshHostConfig>) -> ImportOutcome {
    let mut taken: HashSet<String> = hosts.iter().map(|host| host.name.clone()).collect();
    taken.insert(LOCAL_HOST_NAME.to_string());
    let mut merged = hosts.to_vec();
    let mut imported = 0;
    let mut skipped = 0;
    for candidate in candidates {
        if taken.contains(&candidate.name) {
            skipped += 1;
            continue;
        }
        taken.insert(candidate.name.clone());
        merged.push(candidate);
        imported += 1;
    }
    ImportOutcome {
        hosts: merged,
        imported,
        skipped,
    }
}
