use std::collections::{HashMap, HashSet};

use stack_model::{SshHostConfig, Stack, StackRuntimeInfo};
use tracing::{debug, info, warn};

use crate::events::{Action, ConsoleEvent, DiscoveryFailure, Effect, Event, Message, SequenceReport};

use super::sequences::ActiveSequence;

#[derive(Debug, Default)]
struct DiscoveryState {
    next_run: u64,
    active: Option<u64>,
    received_any: bool,
    deferred: bool,
    errors: Vec<DiscoveryFailure>,
}

#[derive(Debug, Default)]
pub(super) struct RegistryState {
    pub(super) hosts: Vec<SshHostConfig>,
    pub(super) loaded: bool,
    pub(super) loading: bool,
    pub(super) pending_save: Option<Vec<SshHostConfig>>,
}

/// Sole owner of orchestration state. Each message is applied in arrival
/// order and turned into outbound effects; nothing here performs I/O.
#[derive(Debug, Default)]
pub(crate) struct Controller {
    pub(super) registry: RegistryState,
    discovery: DiscoveryState,
    pub(super) stacks: Vec<Stack>,
    status: HashMap<String, StackRuntimeInfo>,
    loading: HashSet<String>,
    next_poll: u64,
    latest_poll: HashMap<String, u64>,
    pub(super) next_sequence: u64,
    pub(super) sequences: HashMap<u64, ActiveSequence>,
    pub(super) reports: HashMap<String, SequenceReport>,
    last_error: Option<String>,
}

impl Controller {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn update(&mut self, message: Message) -> Vec<Effect> {
        let mut effects = Vec::new();
        match message {
            Message::Action(action) => self.handle_action(action, &mut effects),
            Message::Event(event) => self.handle_event(event, &mut effects),
        }
        effects
    }

    fn handle_action(&mut self, action: Action, effects: &mut Vec<Effect>) {
        match action {
            Action::StartDiscovery => {
                self.clear_error(effects);
                self.start_discovery(effects);
            }
            Action::PollStatus(identifier) => self.request_poll(&identifier, effects),
            Action::PollAll => {
                let stacks = self.stacks.clone();
                for stack in stacks {
                    self.issue_poll(stack, false, effects);
                }
            }
            Action::RunSequence { target, steps } => {
                self.clear_error(effects);
                self.start_sequence(target, steps, effects);
            }
            Action::LoadHosts => self.load_hosts(effects),
            Action::AddHost(config) => {
                self.clear_error(effects);
                self.add_host(config, effects);
            }
            Action::EditHost { original, edited } => {
                self.clear_error(effects);
                self.edit_host(&original, edited, effects);
            }
            Action::RemoveHost(name) => {
                self.clear_error(effects);
                self.remove_host(&name, effects);
            }
            Action::ParseImport(path) => {
                self.clear_error(effects);
                self.parse_import(path, effects);
            }
            Action::ImportHosts(candidates) => {
                self.clear_error(effects);
                self.import_hosts(candidates, effects);
            }
            Action::DismissError => self.clear_error(effects),
            Action::Shutdown => {
                info!(event = "controller.shutdown", "shutdown requested");
                effects.push(Effect::Stop);
            }
        }
    }

    fn handle_event(&mut self, event: Event, effects: &mut Vec<Effect>) {
        match event {
            Event::StackDiscovered { run, stack } => self.on_stack_discovered(run, stack, effects),
            Event::DiscoveryError { run, host, error } => {
                if !self.is_current_run(run) {
                    debug!(run, host = %host, "ignoring error from superseded discovery run");
                    return;
                }
                let failure = DiscoveryFailure { host, error };
                self.discovery.errors.push(failure.clone());
                effects.push(Effect::Publish(ConsoleEvent::DiscoveryFailed {
                    host: failure.host,
                    error: failure.error,
                }));
            }
            Event::DiscoveryFinished { run } => self.on_discovery_finished(run, effects),
            Event::StatusLoaded {
                identifier,
                generation,
                info,
            } => self.on_status_loaded(identifier, generation, info, effects),
            Event::OutputLine { sequence, line } => self.on_output(sequence, line, effects),
            Event::StepFinished { sequence, result } => {
                self.on_step_finished(sequence, result, effects)
            }
            Event::HostsLoaded(result) => self.on_hosts_loaded(result, effects),
            Event::HostMutated(result) => self.on_host_mutated(result, effects),
            Event::ImportParsed(result) => self.on_import_parsed(result, effects),
            Event::ImportSaved {
                imported,
                skipped,
                result,
            } => self.on_import_saved(imported, skipped, result, effects),
        }
    }

    pub(super) fn reject(&mut self, request: &'static str, message: String, effects: &mut Vec<Effect>) {
        warn!(event = "controller.rejected", request, error = %message, "request rejected");
        self.last_error = Some(message.clone());
        effects.push(Effect::Publish(ConsoleEvent::Rejected { request, message }));
    }

    pub(super) fn fail(&mut self, message: String, effects: &mut Vec<Effect>) {
        warn!(event = "controller.error", error = %message, "operation failed");
        self.last_error = Some(message.clone());
        effects.push(Effect::Publish(ConsoleEvent::Error { message }));
    }

    fn clear_error(&mut self, effects: &mut Vec<Effect>) {
        if self.last_error.take().is_some() {
            effects.push(Effect::Publish(ConsoleEvent::ErrorCleared));
        }
    }

    fn start_discovery(&mut self, effects: &mut Vec<Effect>) {
        if !self.registry.loaded {
            debug!("discovery deferred until the host registry is loaded");
            self.discovery.deferred = true;
            if !self.registry.loading {
                self.registry.loading = true;
                effects.push(Effect::LoadHosts);
            }
            return;
        }
        self.launch_discovery(effects);
    }

    pub(super) fn take_deferred_discovery(&mut self, effects: &mut Vec<Effect>) {
        if std::mem::take(&mut self.discovery.deferred) {
            self.launch_discovery(effects);
        }
    }

    fn launch_discovery(&mut self, effects: &mut Vec<Effect>) {
        self.discovery.next_run += 1;
        let run = self.discovery.next_run;
        self.discovery.active = Some(run);
        self.discovery.received_any = false;
        self.discovery.deferred = false;
        self.discovery.errors.clear();
        let probes = 1 + self
            .registry
            .hosts
            .iter()
            .filter(|host| !host.disabled)
            .count();
        effects.push(Effect::Publish(ConsoleEvent::DiscoveryStarted { run, probes }));
        effects.push(Effect::Discover {
            run,
            hosts: self.registry.hosts.clone(),
        });
    }

    fn is_current_run(&self, run: u64) -> bool {
        self.discovery.active == Some(run)
    }

    fn on_stack_discovered(&mut self, run: u64, stack: Stack, effects: &mut Vec<Effect>) {
        if !self.is_current_run(run) {
            debug!(run, stack = %stack.identifier(), "ignoring stack from superseded discovery run");
            return;
        }
        if !self.discovery.received_any {
            self.discovery.received_any = true;
            self.stacks.clear();
        }
        let identifier = stack.identifier();
        if self.stack(&identifier).is_some() {
            debug!(run, stack = %identifier, "duplicate stack in discovery run");
            return;
        }
        self.stacks.push(stack.clone());
        effects.push(Effect::Publish(ConsoleEvent::StackDiscovered {
            stack: stack.clone(),
        }));
        self.issue_poll(stack, false, effects);
    }

    fn on_discovery_finished(&mut self, run: u64, effects: &mut Vec<Effect>) {
        if !self.is_current_run(run) {
            debug!(run, "ignoring completion of superseded discovery run");
            return;
        }
        self.discovery.active = None;
        if !self.discovery.received_any {
            self.stacks.clear();
        }
        let listed: HashSet<String> = self.stacks.iter().map(Stack::identifier).collect();
        self.status.retain(|identifier, _| listed.contains(identifier));
        info!(
            event = "discovery.complete",
            run,
            stacks = self.stacks.len(),
            errors = self.discovery.errors.len(),
            "discovery run complete"
        );
        effects.push(Effect::Publish(ConsoleEvent::DiscoveryFinished {
            stacks: self.stacks.len(),
            errors: self.discovery.errors.clone(),
        }));
    }

    fn request_poll(&mut self, identifier: &str, effects: &mut Vec<Effect>) {
        match self.stack(identifier).cloned() {
            Some(stack) => self.issue_poll(stack, false, effects),
            None => self.reject("poll status", format!("unknown stack {identifier}"), effects),
        }
    }

    /// Skips stacks already being polled unless `force` is set. A forced
    /// poll supersedes whatever is in flight for the stack.
    pub(super) fn issue_poll(&mut self, stack: Stack, force: bool, effects: &mut Vec<Effect>) {
        let identifier = stack.identifier();
        if !self.loading.insert(identifier.clone()) && !force {
            debug!(stack = %identifier, "status poll already in flight");
            return;
        }
        self.next_poll += 1;
        let generation = self.next_poll;
        self.latest_poll.insert(identifier, generation);
        effects.push(Effect::Poll { stack, generation });
    }

    fn on_status_loaded(
        &mut self,
        identifier: String,
        generation: u64,
        info: StackRuntimeInfo,
        effects: &mut Vec<Effect>,
    ) {
        if self
            .latest_poll
            .get(&identifier)
            .is_some_and(|latest| generation < *latest)
        {
            debug!(stack = %identifier, generation, "dropping superseded status result");
            return;
        }
        self.loading.remove(&identifier);
        if self.stack(&identifier).is_some() {
            self.status.insert(identifier.clone(), info.clone());
        } else {
            debug!(stack = %identifier, "status for a stack no longer listed");
        }
        effects.push(Effect::Publish(ConsoleEvent::StatusUpdated { identifier, info }));
    }

    pub(crate) fn stack(&self, identifier: &str) -> Option<&Stack> {
        self.stacks
            .iter()
            .find(|stack| stack.identifier() == identifier)
    }

    pub(crate) fn stacks(&self) -> &[Stack] {
        &self.stacks
    }
}

#[cfg(test)]
impl Controller {
    pub(crate) fn status(&self, identifier: &str) -> Option<&StackRuntimeInfo> {
        self.status.get(identifier)
    }

    pub(crate) fn is_loading(&self, identifier: &str) -> bool {
        self.loading.contains(identifier)
    }

    pub(crate) fn is_discovering(&self) -> bool {
        self.discovery.active.is_some()
    }

    pub(crate) fn discovery_errors(&self) -> &[DiscoveryFailure] {
        &self.discovery.errors
    }

    pub(crate) fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
