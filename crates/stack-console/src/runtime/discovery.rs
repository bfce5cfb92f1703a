use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;
use stack_model::{
    compose_dir, is_compose_file, HostTarget, SshHostConfig, Stack, COMPOSE_FILE_NAMES,
    LOCAL_HOST_NAME,
};
use system_utils::path::expand_tilde;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::gate::AdmissionGate;
use crate::config::DiscoverySettings;
use crate::events::{Event, EventSink};
use crate::exec::{describe_ssh_failure, Executor, Invocation, SSH_TRANSPORT_EXIT};

/// Probes the local machine and every enabled registry host concurrently,
/// emitting stacks as they are found. `DiscoveryFinished` follows once every
/// probe has ended.
#[derive(Clone)]
pub(crate) struct DiscoveryEngine {
    executor: Arc<dyn Executor>,
    settings: DiscoverySettings,
    probe_gate: Option<AdmissionGate>,
    shutdown: CancellationToken,
    sink: EventSink,
}

#[derive(Clone, Debug)]
enum Probe {
    Local,
    Remote(SshHostConfig),
}

impl Probe {
    fn host_name(&self) -> &str {
        match self {
            Probe::Local => LOCAL_HOST_NAME,
            Probe::Remote(config) => &config.name,
        }
    }
}

impl DiscoveryEngine {
    pub(crate) fn new(
        executor: Arc<dyn Executor>,
        settings: DiscoverySettings,
        shutdown: CancellationToken,
        sink: EventSink,
    ) -> Self {
        let probe_gate = settings
            .max_concurrent_probes
            .map(|limit| AdmissionGate::new("discovery probe", limit));
        Self {
            executor,
            settings,
            probe_gate,
            shutdown,
            sink,
        }
    }

    /// Starts run `run` and returns the number of probes launched.
    pub(crate) fn discover(&self, run: u64, hosts: &[SshHostConfig]) -> usize {
        let mut probes = vec![Probe::Local];
        probes.extend(
            hosts
                .iter()
                .filter(|host| !host.disabled)
                .cloned()
                .map(Probe::Remote),
        );
        let count = probes.len();
        info!(event = "discovery.start", run, probes = count, "discovery started");

        let handles: Vec<_> = probes
            .into_iter()
            .map(|probe| {
                let engine = self.clone();
                let host = probe.host_name().to_string();
                let handle = tokio::spawn(async move { engine.run_probe(run, probe).await });
                (host, handle)
            })
            .collect();

        let sink = self.sink.clone();
        tokio::spawn(async move {
            let (hosts, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
            let results = join_all(handles).await;
            for (host, result) in hosts.into_iter().zip(results) {
                if let Err(err) = result {
                    warn!(run, host = %host, error = %err, "discovery probe aborted");
                    sink.send(Event::DiscoveryError {
                        run,
                        host,
                        error: format!("probe aborted: {err}"),
                    });
                }
            }
            info!(event = "discovery.finish", run, "discovery finished");
            sink.send(Event::DiscoveryFinished { run });
        });
        count
    }

    async fn run_probe(&self, run: u64, probe: Probe) {
        let _permit = match self.probe_gate.as_ref() {
            Some(gate) => match gate.acquire(&self.shutdown).await {
                Ok(permit) => Some(permit),
                Err(err) => {
                    self.sink.send(Event::DiscoveryError {
                        run,
                        host: probe.host_name().to_string(),
                        error: err.to_string(),
                    });
                    return;
                }
            },
            None => None,
        };
        let result = match &probe {
            Probe::Local => self.probe_local(run).await,
            Probe::Remote(config) => self.probe_remote(run, config).await,
        };
        if let Err(error) = result {
            warn!(
                event = "discovery.probe_failed",
                run,
                host = %probe.host_name(),
                error = %error,
                "discovery probe failed"
            );
            self.sink.send(Event::DiscoveryError {
                run,
                host: probe.host_name().to_string(),
                error,
            });
        }
    }

    async fn probe_local(&self, run: u64) -> Result<(), String> {
        let host = HostTarget::local();
        let mut seen = HashSet::new();
        let mut errors = Vec::new();
        for root in &self.settings.local_roots {
            let root = expand_tilde(root);
            let mut emit = |dir: PathBuf| {
                let Some(path) = dir.to_str().map(str::to_string) else {
                    debug!(run, dir = %dir.display(), "skipping stack with a non-UTF-8 path");
                    return;
                };
                if seen.insert(path.clone()) {
                    self.sink.send(Event::StackDiscovered {
                        run,
                        stack: Stack::new(host.clone(), path),
                    });
                }
            };
            if let Err(err) = walk_local(&root, self.settings.max_depth, &mut emit).await {
                errors.push(format!("{}: {err}", root.display()));
            }
        }
        debug!(run, stacks = seen.len(), "local probe finished");
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }

    async fn probe_remote(&self, run: u64, config: &SshHostConfig) -> Result<(), String> {
        let target = HostTarget::remote(config.clone());
        let invocation = remote_find_invocation(&config.remote_root, self.settings.max_depth);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let find = self.executor.stream(&target, &invocation, tx);
        let collect = async {
            let mut seen = HashSet::new();
            let mut stderr = Vec::new();
            while let Some(line) = rx.recv().await {
                if line.is_error {
                    stderr.push(line.text);
                    continue;
                }
                let Some(dir) = compose_dir(line.text.trim()) else {
                    continue;
                };
                if seen.insert(dir.to_string()) {
                    self.sink.send(Event::StackDiscovered {
                        run,
                        stack: Stack::new(target.clone(), dir),
                    });
                }
            }
            (seen.len(), stderr.join("\n"))
        };
        let (result, (found, detail)) = tokio::join!(find, collect);
        debug!(run, host = %config.name, stacks = found, "remote probe finished");
        match result {
            Ok(Some(0)) => Ok(()),
            Ok(Some(SSH_TRANSPORT_EXIT)) => Err(describe_ssh_failure(config, &detail)),
            Ok(code) if found == 0 => {
                let code = code.map_or_else(|| "signal".to_string(), |code| code.to_string());
                let mut message = format!(
                    "search under {} exited with status {code}",
                    config.remote_root
                );
                if !detail.is_empty() {
                    message.push_str(": ");
                    message.push_str(&detail);
                }
                Err(message)
            }
            Ok(code) => {
                warn!(
                    run,
                    host = %config.name,
                    code = ?code,
                    detail = %detail,
                    "remote search reported errors after finding stacks"
                );
                Ok(())
            }
            Err(err) => Err(format!("{err:#}")),
        }
    }
}

/// `find` run from inside the remote root so `$PWD` yields absolute paths.
/// Hidden directories are pruned; compose files may sit at most `max_depth`
/// directories below the root.
fn remote_find_invocation(remote_root: &str, max_depth: usize) -> Invocation {
    let names = COMPOSE_FILE_NAMES
        .iter()
        .map(|name| format!("-name {}", shell_words::quote(name)))
        .collect::<Vec<_>>()
        .join(" -o ");
    let script = format!(
        "find \"$PWD\" -mindepth 1 -maxdepth {} \\( -type d -name '.*' -prune \\) -o \\( \\( -type f -o -type l \\) \\( {names} \\) -print \\)",
        max_depth + 1
    );
    Invocation {
        dir: Some(remote_root.to_string()),
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script],
    }
}

/// Depth-first walk in sorted order. Hidden and symlinked directories are
/// not entered. Only a failure to read `root` itself is an error.
async fn walk_local(
    root: &Path,
    max_depth: usize,
    emit: &mut impl FnMut(PathBuf),
) -> Result<(), String> {
    let mut pending = vec![(root.to_path_buf(), 0usize)];
    while let Some((dir, depth)) = pending.pop() {
        let entries = match read_dir_sorted(&dir).await {
            Ok(entries) => entries,
            Err(err) if depth == 0 => return Err(err.to_string()),
            Err(err) => {
                debug!(dir = %dir.display(), error = %err, "skipping unreadable directory");
                continue;
            }
        };
        if entries
            .iter()
            .any(|(name, is_dir)| !is_dir && name.to_str().is_some_and(is_compose_file))
        {
            emit(dir.clone());
        }
        if depth >= max_depth {
            continue;
        }
        for (name, is_dir) in entries.iter().rev() {
            if *is_dir && !name.as_encoded_bytes().starts_with(b".") {
                pending.push((dir.join(name), depth + 1));
            }
        }
    }
    Ok(())
}

/// Entries whose type cannot be read are left out rather than failing the
/// whole directory.
async fn read_dir_sorted(dir: &Path) -> std::io::Result<Vec<(OsString, bool)>> {
    let mut reader = tokio::fs::read_dir(dir).await?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        if let Some(is_dir) = entry_is_dir(&entry.path(), entry.file_type().await) {
            entries.push((entry.file_name(), is_dir));
        }
    }
    entries.sort();
    Ok(entries)
}

fn entry_is_dir(path: &Path, file_type: std::io::Result<std::fs::FileType>) -> Option<bool> {
    match file_type {
        Ok(file_type) => Some(file_type.is_dir()),
        Err(err) => {
            debug!(entry = %path.display(), error = %err, "skipping unreadable entry");
            None
        }
    }
}
