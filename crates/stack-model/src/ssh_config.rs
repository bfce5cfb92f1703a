use std::collections::HashSet;

use crate::host::{PotentialHost, SshAuth, SshHostConfig, LOCAL_HOST_NAME};

#[derive(Default)]
struct Block {
    patterns: Vec<String>,
    hostname: Option<String>,
    user: Option<String>,
    port: Option<String>,
    identity_file: Option<String>,
}

impl Block {
    /// ssh semantics: some plain pattern matches and no `!pattern` does.
    fn applies_to(&self, alias: &str) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        let mut matched = false;
        for pattern in &self.patterns {
            match pattern.strip_prefix('!') {
                Some(negated) if glob_match(negated, alias) => return false,
                Some(_) => {}
                None => matched |= glob_match(pattern, alias),
            }
        }
        matched
    }

    fn set(&mut self, keyword: &str, value: String) {
        let slot = match keyword {
            "hostname" => &mut self.hostname,
            "user" => &mut self.user,
            "port" => &mut self.port,
            "identityfile" => &mut self.identity_file,
            _ => return,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }
}

/// Extracts concrete host aliases from an OpenSSH client config. Values
/// follow ssh's first-match-wins rule across every block whose patterns
/// match the alias (globs and `!` negation included) and the settings that
/// precede the first `Host` line. `Match` blocks are
/// ignored and patterns with wildcards or negation never become candidates.
pub fn parse_ssh_config(text: &str, default_user: &str) -> Vec<PotentialHost> {
    let mut blocks = vec![Block::default()];
    let mut in_match = false;
    for raw in text.lines() {
        let Some((keyword, value)) = split_line(raw) else {
            continue;
        };
        match keyword.as_str() {
            "host" => {
                in_match = false;
                blocks.push(Block {
                    patterns: value.split_whitespace().map(unquote).collect(),
                    ..Block::default()
                });
            }
            "match" => in_match = true,
            _ if in_match => {}
            _ => {
                if let Some(block) = blocks.last_mut() {
                    block.set(&keyword, unquote(&value));
                }
            }
        }
    }

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for block in &blocks {
        for alias in &block.patterns {
            if alias.contains(['*', '?', '!']) || !seen.insert(alias.clone()) {
                continue;
            }
            candidates.push(resolve_alias(alias, &blocks, default_user));
        }
    }
    candidates
}

/// Drops candidates whose alias is already registered or reserved.
pub fn filter_known(candidates: Vec<PotentialHost>, known: &[SshHostConfig]) -> Vec<PotentialHost> {
    candidates
        .into_iter()
        .filter(|candidate| {
            candidate.alias != LOCAL_HOST_NAME
                && !known.iter().any(|host| host.name == candidate.alias)
        })
        .collect()
}

fn resolve_alias(alias: &str, blocks: &[Block], default_user: &str) -> PotentialHost {
    let mut merged = Block::default();
    for block in blocks.iter().filter(|block| block.applies_to(alias)) {
        for (keyword, value) in [
            ("hostname", &block.hostname),
            ("user", &block.user),
            ("port", &block.port),
            ("identityfile", &block.identity_file),
        ] {
            if let Some(value) = value {
                merged.set(keyword, value.clone());
            }
        }
    }
    let auth = match merged.identity_file {
        Some(path) => SshAuth::KeyFile { path },
        None => SshAuth::Agent,
    };
    PotentialHost {
        alias: alias.to_string(),
        hostname: merged.hostname.unwrap_or_else(|| alias.to_string()),
        user: merged.user.unwrap_or_else(|| default_user.to_string()),
        port: merged
            .port
            .and_then(|port| port.parse::<u16>().ok())
            .unwrap_or(0),
        auth,
    }
}

/// `*` matches any run of characters and `?` exactly one.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, from)) => {
                    p = star + 1;
                    t = from + 1;
                    backtrack = Some((star, from + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

fn split_line(raw: &str) -> Option<(String, String)> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let split_at = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let keyword = line[..split_at].to_ascii_lowercase();
    let rest = line[split_at..].trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest).trim();
    if rest.is_empty() {
        return None;
    }
    Some((keyword, rest.to_string()))
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}
