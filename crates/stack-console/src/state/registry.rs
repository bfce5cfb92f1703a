use std::path::PathBuf;

use stack_model::{add_host, edit_host, import_hosts, remove_host, PotentialHost, SshHostConfig};
use tracing::{debug, info};

use super::Controller;
use crate::events::{ConsoleEvent, Effect, SavePurpose};

const REGISTRY_BUSY: &str = "host registry busy: a save is still in progress";
const REGISTRY_NOT_LOADED: &str = "host registry not loaded";

impl Controller {
    pub(super) fn load_hosts(&mut self, effects: &mut Vec<Effect>) {
        if self.registry.pending_save.is_some() {
            self.reject("load hosts", REGISTRY_BUSY.to_string(), effects);
            return;
        }
        if self.registry.loading {
            debug!("host registry load already in flight");
            return;
        }
        self.registry.loading = true;
        effects.push(Effect::LoadHosts);
    }

    pub(super) fn on_hosts_loaded(
        &mut self,
        result: Result<Vec<SshHostConfig>, String>,
        effects: &mut Vec<Effect>,
    ) {
        self.registry.loading = false;
        match result {
            Ok(hosts) => {
                self.registry.loaded = true;
                self.registry.hosts = hosts;
                effects.push(Effect::Publish(ConsoleEvent::HostsChanged {
                    hosts: self.registry.hosts.clone(),
                }));
            }
            Err(error) => self.fail(format!("failed to load host registry: {error}"), effects),
        }
        self.take_deferred_discovery(effects);
    }

    /// Mutations need a loaded registry and no save in flight, so each
    /// read-modify-write completes before the next one starts.
    fn registry_ready(&mut self, request: &'static str, effects: &mut Vec<Effect>) -> bool {
        if !self.registry.loaded {
            self.reject(request, REGISTRY_NOT_LOADED.to_string(), effects);
            return false;
        }
        if self.registry.pending_save.is_some() {
            self.reject(request, REGISTRY_BUSY.to_string(), effects);
            return false;
        }
        true
    }

    fn begin_save(&mut self, hosts: Vec<SshHostConfig>, purpose: SavePurpose, effects: &mut Vec<Effect>) {
        self.registry.pending_save = Some(hosts.clone());
        effects.push(Effect::SaveHosts { hosts, purpose });
    }

    pub(super) fn add_host(&mut self, config: SshHostConfig, effects: &mut Vec<Effect>) {
        if !self.registry_ready("add host", effects) {
            return;
        }
        match add_host(&self.registry.hosts, config) {
            Ok(next) => self.begin_save(next, SavePurpose::Mutation, effects),
            Err(err) => self.reject("add host", err.to_string(), effects),
        }
    }

    pub(super) fn edit_host(&mut self, original: &str, edited: SshHostConfig, effects: &mut Vec<Effect>) {
        if !self.registry_ready("edit host", effects) {
            return;
        }
        match edit_host(&self.registry.hosts, original, edited) {
            Ok(next) => self.begin_save(next, SavePurpose::Mutation, effects),
            Err(err) => self.reject("edit host", err.to_string(), effects),
        }
    }

    pub(super) fn remove_host(&mut self, name: &str, effects: &mut Vec<Effect>) {
        if !self.registry_ready("remove host", effects) {
            return;
        }
        match remove_host(&self.registry.hosts, name) {
            Ok(next) => self.begin_save(next, SavePurpose::Mutation, effects),
            Err(err) => self.reject("remove host", err.to_string(), effects),
        }
    }

    pub(super) fn on_host_mutated(&mut self, result: Result<(), String>, effects: &mut Vec<Effect>) {
        let pending = self.registry.pending_save.take();
        match (result, pending) {
            (Ok(()), Some(hosts)) => {
                self.registry.hosts = hosts;
                effects.push(Effect::Publish(ConsoleEvent::HostsChanged {
                    hosts: self.registry.hosts.clone(),
                }));
            }
            (Ok(()), None) => debug!("registry save finished with nothing pending"),
            (Err(error), _) => self.fail(format!("failed to save host registry: {error}"), effects),
        }
    }

    pub(super) fn parse_import(&mut self, path: PathBuf, effects: &mut Vec<Effect>) {
        if !self.registry.loaded {
            self.reject("parse import", REGISTRY_NOT_LOADED.to_string(), effects);
            return;
        }
        effects.push(Effect::ParseImport {
            path,
            known: self.registry.hosts.clone(),
        });
    }

    pub(super) fn on_import_parsed(
        &mut self,
        result: Result<Vec<PotentialHost>, String>,
        effects: &mut Vec<Effect>,
    ) {
        match result {
            Ok(candidates) => {
                debug!(candidates = candidates.len(), "import source parsed");
                effects.push(Effect::Publish(ConsoleEvent::ImportReady { candidates }));
            }
            Err(error) => self.fail(format!("failed to read import source: {error}"), effects),
        }
    }

    /// Invalid candidates count as skipped. Nothing is written when no
    /// candidate survives.
    pub(super) fn import_hosts(&mut self, candidates: Vec<SshHostConfig>, effects: &mut Vec<Effect>) {
        if !self.registry_ready("import hosts", effects) {
            return;
        }
        let total = candidates.len();
        let (valid, invalid): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|candidate| candidate.validate().is_ok());
        for candidate in &invalid {
            debug!(host = %candidate.name, "skipping incomplete import candidate");
        }
        let outcome = import_hosts(&self.registry.hosts, valid);
        let skipped = outcome.skipped + invalid.len();
        info!(
            event = "import.merge",
            candidates = total,
            imported = outcome.imported,
            skipped,
            "import merged"
        );
        if outcome.imported == 0 {
            effects.push(Effect::Publish(ConsoleEvent::ImportFinished {
                imported: 0,
                skipped,
            }));
            return;
        }
        self.begin_save(
            outcome.hosts,
            SavePurpose::Import {
                imported: outcome.imported,
                skipped,
            },
            effects,
        );
    }

    pub(super) fn on_import_saved(
        &mut self,
        imported: usize,
        skipped: usize,
        result: Result<(), String>,
        effects: &mut Vec<Effect>,
    ) {
        let pending = self.registry.pending_save.take();
        match result {
            Ok(()) => {
                if let Some(hosts) = pending {
                    self.registry.hosts = hosts;
                }
                effects.push(Effect::Publish(ConsoleEvent::HostsChanged {
                    hosts: self.registry.hosts.clone(),
                }));
                effects.push(Effect::Publish(ConsoleEvent::ImportFinished { imported, skipped }));
            }
            Err(error) => self.fail(format!("failed to save imported hosts: {error}"), effects),
        }
    }

}

#[cfg(test)]
impl Controller {
    pub(crate) fn hosts(&self) -> &[SshHostConfig] {
        &self.registry.hosts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Action, Event, Message};
    use crate::test_utils::remote_host;

    fn loaded(hosts: Vec<SshHostConfig>) -> Controller {
        let mut controller = Controller::new();
        controller.update(Message::Event(Event::HostsLoaded(Ok(hosts))));
        controller
    }

    fn saved_hosts(effects: &[Effect]) -> Option<Vec<String>> {
        effects.iter().find_map(|effect| match effect {
            Effect::SaveHosts { hosts, .. } => {
                Some(hosts.iter().map(|host| host.name.clone()).collect())
            }
            _ => None,
        })
    }

    fn names(controller: &Controller) -> Vec<&str> {
        controller.hosts().iter().map(|host| host.name.as_str()).collect()
    }

    #[test]
    fn add_is_applied_after_save_succeeds() {
        let mut controller = loaded(vec![remote_host("nas")]);
        let effects = controller.update(Message::Action(Action::AddHost(remote_host("edge"))));
        assert_eq!(saved_hosts(&effects), Some(vec!["nas".to_string(), "edge".to_string()]));
        assert_eq!(names(&controller), vec!["nas"]);

        let effects = controller.update(Message::Event(Event::HostMutated(Ok(()))));
        assert_eq!(names(&controller), vec!["nas", "edge"]);
        assert!(matches!(
            effects.as_slice(),
            [Effect::Publish(ConsoleEvent::HostsChanged { .. })]
        ));
    }

    #[test]
    fn failed_save_keeps_previous_registry() {
        let mut controller = loaded(vec![remote_host("nas")]);
        controller.update(Message::Action(Action::RemoveHost("nas".to_string())));
        controller.update(Message::Event(Event::HostMutated(Err("disk full".to_string()))));
        assert_eq!(names(&controller), vec!["nas"]);
        assert!(controller.last_error().expect("error").contains("disk full"));
    }

    #[test]
    fn duplicate_add_is_rejected_without_save() {
        let mut controller = loaded(vec![remote_host("nas")]);
        let effects = controller.update(Message::Action(Action::AddHost(remote_host("nas"))));
        assert!(saved_hosts(&effects).is_none());
        assert!(matches!(
            effects.as_slice(),
            [Effect::Publish(ConsoleEvent::Rejected { request: "add host", .. })]
        ));
    }

    #[test]
    fn reserved_name_is_rejected_before_save() {
        let mut controller = loaded(Vec::new());
        let effects = controller.update(Message::Action(Action::AddHost(remote_host("local"))));
        assert!(saved_hosts(&effects).is_none());
        assert!(controller.last_error().expect("error").contains("reserved"));
    }

    #[test]
    fn rename_onto_existing_entry_is_rejected() {
        let mut controller = loaded(vec![remote_host("x"), remote_host("y")]);
        let mut edited = remote_host("y");
        edited.hostname = "other.lan".to_string();
        let effects = controller.update(Message::Action(Action::EditHost {
            original: "x".to_string(),
            edited,
        }));
        assert!(saved_hosts(&effects).is_none());
        assert_eq!(names(&controller), vec!["x", "y"]);

        let effects = controller.update(Message::Action(Action::EditHost {
            original: "x".to_string(),
            edited: remote_host("x"),
        }));
        assert_eq!(saved_hosts(&effects), Some(vec!["x".to_string(), "y".to_string()]));
    }

    #[test]
    fn mutations_are_rejected_while_a_save_is_pending() {
        let mut controller = loaded(Vec::new());
        controller.update(Message::Action(Action::AddHost(remote_host("a"))));
        let effects = controller.update(Message::Action(Action::AddHost(remote_host("b"))));
        assert!(saved_hosts(&effects).is_none());
        assert_eq!(controller.last_error(), Some(REGISTRY_BUSY));
        let effects = controller.update(Message::Action(Action::LoadHosts));
        assert!(!effects.contains(&Effect::LoadHosts));

        controller.update(Message::Event(Event::HostMutated(Ok(()))));
        let effects = controller.update(Message::Action(Action::AddHost(remote_host("b"))));
        assert_eq!(saved_hosts(&effects), Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn mutations_need_a_loaded_registry() {
        let mut controller = Controller::new();
        let effects = controller.update(Message::Action(Action::AddHost(remote_host("a"))));
        assert!(saved_hosts(&effects).is_none());
        assert_eq!(controller.last_error(), Some(REGISTRY_NOT_LOADED));
    }

    #[test]
    fn import_skips_conflicts_within_the_batch() {
        let mut controller = loaded(Vec::new());
        let effects = controller.update(Message::Action(Action::ImportHosts(vec![
            remote_host("a"),
            remote_host("b"),
            remote_host("a"),
        ])));
        let purpose = effects.iter().find_map(|effect| match effect {
            Effect::SaveHosts { purpose, .. } => Some(*purpose),
            _ => None,
        });
        assert_eq!(
            purpose,
            Some(SavePurpose::Import {
                imported: 2,
                skipped: 1
            })
        );
        let effects = controller.update(Message::Event(Event::ImportSaved {
            imported: 2,
            skipped: 1,
            result: Ok(()),
        }));
        assert_eq!(names(&controller), vec!["a", "b"]);
        assert!(effects.contains(&Effect::Publish(ConsoleEvent::ImportFinished {
            imported: 2,
            skipped: 1
        })));
    }

    #[test]
    fn import_counts_incomplete_candidates_as_skipped() {
        let mut controller = loaded(vec![remote_host("nas")]);
        let mut incomplete = remote_host("edge");
        incomplete.remote_root = String::new();
        let effects = controller.update(Message::Action(Action::ImportHosts(vec![
            remote_host("nas"),
            incomplete,
        ])));
        assert!(saved_hosts(&effects).is_none());
        assert_eq!(
            effects,
            vec![Effect::Publish(ConsoleEvent::ImportFinished {
                imported: 0,
                skipped: 2
            })]
        );
    }

    #[test]
    fn parse_import_passes_known_hosts() {
        let mut controller = loaded(vec![remote_host("nas")]);
        let effects = controller.update(Message::Action(Action::ParseImport(PathBuf::from(
            "/home/op/.ssh/config",
        ))));
        match effects.as_slice() {
            [Effect::ParseImport { path, known }] => {
                assert_eq!(path, &PathBuf::from("/home/op/.ssh/config"));
                assert_eq!(known.len(), 1);
            }
            other => panic!("unexpected effects: {other:?}"),
        }
        let candidate = PotentialHost {
            alias: "edge".to_string(),
            hostname: "edge.lan".to_string(),
            user: "op".to_string(),
            port: 0,
            auth: Default::default(),
        };
        let effects =
            controller.update(Message::Event(Event::ImportParsed(Ok(vec![candidate.clone()]))));
        assert_eq!(
            effects,
            vec![Effect::Publish(ConsoleEvent::ImportReady {
                candidates: vec![candidate]
            })]
        );
    }
}
