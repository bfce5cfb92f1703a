use stack_model::{CommandStep, HostTarget, SequenceTarget};
use tracing::{debug, info};

use super::Controller;
use crate::events::{ConsoleEvent, Effect, OutputLine, SequenceOutcome, SequenceReport};

/// A sequence between its first step and its terminal result.
#[derive(Debug)]
pub(crate) struct ActiveSequence {
    id: u64,
    key: String,
    label: String,
    target: SequenceTarget,
    steps: Vec<CommandStep>,
    index: usize,
    output: Vec<OutputLine>,
}

impl Controller {
    pub(super) fn start_sequence(
        &mut self,
        target: SequenceTarget,
        steps: Vec<CommandStep>,
        effects: &mut Vec<Effect>,
    ) {
        let key = target.key();
        let label = target.label();
        if steps.is_empty() {
            self.reject("run sequence", format!("nothing to run for {label}"), effects);
            return;
        }
        if let Some(problem) = self.unusable_host(target.host()) {
            self.reject("run sequence", problem, effects);
            return;
        }
        if self.is_running(&key) {
            self.reject(
                "run sequence",
                format!("{label} already has a sequence running"),
                effects,
            );
            return;
        }
        self.next_sequence += 1;
        let id = self.next_sequence;
        info!(
            event = "sequence.start",
            sequence = id,
            target = %label,
            steps = steps.len(),
            "sequence started"
        );
        effects.push(Effect::Publish(ConsoleEvent::SequenceStarted {
            sequence: id,
            key: key.clone(),
            target: label.clone(),
            steps: steps.len(),
        }));
        let sequence = ActiveSequence {
            id,
            key,
            label,
            target,
            steps,
            index: 0,
            output: Vec::new(),
        };
        start_step(&sequence, effects);
        self.sequences.insert(id, sequence);
    }

    /// Remote hosts must be registered and enabled once the registry is known.
    fn unusable_host(&self, host: &HostTarget) -> Option<String> {
        let config = host.connection()?;
        if !self.registry.loaded {
            return None;
        }
        match self
            .registry
            .hosts
            .iter()
            .find(|entry| entry.name == config.name)
        {
            None => Some(format!("host {} is not registered", config.name)),
            Some(entry) if entry.disabled => Some(format!("host {} is disabled", config.name)),
            Some(_) => None,
        }
    }

    pub(super) fn on_output(&mut self, sequence: u64, line: OutputLine, effects: &mut Vec<Effect>) {
        let Some(active) = self.sequences.get_mut(&sequence) else {
            debug!(sequence, "output for unknown sequence");
            return;
        };
        active.output.push(line.clone());
        effects.push(Effect::Publish(ConsoleEvent::Output { sequence, line }));
    }

    pub(super) fn on_step_finished(
        &mut self,
        sequence: u64,
        result: Result<(), String>,
        effects: &mut Vec<Effect>,
    ) {
        let Some(mut active) = self.sequences.remove(&sequence) else {
            debug!(sequence, "step result for unknown sequence");
            return;
        };
        let step_name = active.steps[active.index].name.clone();
        effects.push(Effect::Publish(ConsoleEvent::StepFinished {
            sequence,
            index: active.index,
            name: step_name.clone(),
            error: result.as_ref().err().cloned(),
        }));
        match result {
            Ok(()) => {
                active.index += 1;
                if active.index < active.steps.len() {
                    start_step(&active, effects);
                    self.sequences.insert(sequence, active);
                    return;
                }
                let target = active.target.clone();
                self.finish_sequence(active, SequenceOutcome::Completed, effects);
                self.poll_after(&target, effects);
            }
            Err(error) => {
                self.fail(format!("{}: {error}", active.label), effects);
                active.index += 1;
                self.finish_sequence(
                    active,
                    SequenceOutcome::Failed {
                        step: step_name,
                        error,
                    },
                    effects,
                );
            }
        }
    }

    fn finish_sequence(
        &mut self,
        active: ActiveSequence,
        outcome: SequenceOutcome,
        effects: &mut Vec<Effect>,
    ) {
        info!(
            event = "sequence.finish",
            sequence = active.id,
            target = %active.label,
            outcome = ?outcome,
            "sequence finished"
        );
        let report = SequenceReport {
            sequence: active.id,
            key: active.key.clone(),
            target: active.label,
            steps_run: active.index,
            outcome,
            output: active.output,
        };
        self.reports.insert(active.key, report.clone());
        effects.push(Effect::Publish(ConsoleEvent::SequenceFinished { report }));
    }

    /// One follow-up poll per affected stack, issued even if a poll is
    /// already in flight.
    fn poll_after(&mut self, target: &SequenceTarget, effects: &mut Vec<Effect>) {
        match target {
            SequenceTarget::Stack { stack } => self.issue_poll(stack.clone(), true, effects),
            SequenceTarget::Host { host } => {
                let affected: Vec<_> = self
                    .stacks
                    .iter()
                    .filter(|stack| stack.host().server_name() == host.server_name())
                    .cloned()
                    .collect();
                for stack in affected {
                    self.issue_poll(stack, true, effects);
                }
            }
        }
    }

    pub(crate) fn is_running(&self, key: &str) -> bool {
        self.sequences.values().any(|active| active.key == key)
    }
}

#[cfg(test)]
impl Controller {
    pub(crate) fn report(&self, key: &str) -> Option<&SequenceReport> {
        self.reports.get(key)
    }
}

fn start_step(sequence: &ActiveSequence, effects: &mut Vec<Effect>) {
    let step = &sequence.steps[sequence.index];
    effects.push(Effect::Publish(ConsoleEvent::StepStarted {
        sequence: sequence.id,
        index: sequence.index,
        name: step.name.clone(),
        command: step.command_line(),
    }));
    effects.push(Effect::RunStep {
        sequence: sequence.id,
        step: step.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Action, Event, Message};
    use crate::test_utils::remote_host;
    use stack_model::{
        ComposeCommand, ContainerInfo, SequenceKind, SshHostConfig, Stack, StackRuntimeInfo,
        StackStatus,
    };

    fn loaded(hosts: Vec<SshHostConfig>) -> Controller {
        let mut controller = Controller::new();
        controller.update(Message::Event(Event::HostsLoaded(Ok(hosts))));
        controller
    }

    fn web() -> Stack {
        Stack::new(HostTarget::local(), "/srv/stacks/web")
    }

    fn run(controller: &mut Controller, kind: SequenceKind, target: SequenceTarget) -> Vec<Effect> {
        let steps = kind
            .steps_for(&target, &ComposeCommand::default())
            .expect("steps");
        controller.update(Message::Action(Action::RunSequence { target, steps }))
    }

    fn started_id(effects: &[Effect]) -> u64 {
        effects
            .iter()
            .find_map(|effect| match effect {
                Effect::Publish(ConsoleEvent::SequenceStarted { sequence, .. }) => Some(*sequence),
                _ => None,
            })
            .expect("sequence started")
    }

    fn run_steps(effects: &[Effect]) -> Vec<String> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::RunStep { step, .. } => Some(step.name.clone()),
                _ => None,
            })
            .collect()
    }

    fn finish(controller: &mut Controller, sequence: u64, result: Result<(), String>) -> Vec<Effect> {
        controller.update(Message::Event(Event::StepFinished { sequence, result }))
    }

    fn step_results(effects: &[Effect]) -> Vec<Option<String>> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Publish(ConsoleEvent::StepFinished { error, .. }) => Some(error.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn refresh_runs_steps_in_order_then_polls_once() {
        let mut controller = loaded(Vec::new());
        let target = SequenceTarget::Stack { stack: web() };
        let effects = run(&mut controller, SequenceKind::Refresh, target);
        let id = started_id(&effects);
        assert_eq!(run_steps(&effects), vec!["pull images"]);

        let effects = finish(&mut controller, id, Ok(()));
        assert_eq!(run_steps(&effects), vec!["compose down"]);
        let effects = finish(&mut controller, id, Ok(()));
        assert_eq!(run_steps(&effects), vec!["compose up"]);
        let effects = finish(&mut controller, id, Ok(()));
        assert!(run_steps(&effects).is_empty());
        let polls: Vec<&Effect> = effects
            .iter()
            .filter(|effect| matches!(effect, Effect::Poll { .. }))
            .collect();
        assert_eq!(polls.len(), 1);

        let report = controller.report("local:/srv/stacks/web").expect("report");
        assert!(report.succeeded());
        assert_eq!(report.steps_run, 3);
        assert!(!controller.is_running("local:/srv/stacks/web"));
    }

    fn poll_generation(effects: &[Effect]) -> u64 {
        effects
            .iter()
            .find_map(|effect| match effect {
                Effect::Poll { generation, .. } => Some(*generation),
                _ => None,
            })
            .expect("poll effect")
    }

    fn status_loaded(generation: u64, info: StackRuntimeInfo) -> Message {
        Message::Event(Event::StatusLoaded {
            identifier: "local:/srv/stacks/web".to_string(),
            generation,
            info,
        })
    }

    #[test]
    fn pre_sequence_status_cannot_overwrite_follow_up() {
        let mut controller = loaded(Vec::new());
        let discover = controller.update(Message::Action(Action::StartDiscovery));
        let run_id = discover
            .iter()
            .find_map(|effect| match effect {
                Effect::Discover { run, .. } => Some(*run),
                _ => None,
            })
            .expect("run");
        let effects = controller.update(Message::Event(Event::StackDiscovered {
            run: run_id,
            stack: web(),
        }));
        let before = poll_generation(&effects);

        let effects = run(&mut controller, SequenceKind::Up, SequenceTarget::Stack { stack: web() });
        let id = started_id(&effects);
        let effects = finish(&mut controller, id, Ok(()));
        let after = poll_generation(&effects);

        let running = StackRuntimeInfo::from_containers(vec![ContainerInfo {
            service: "web".to_string(),
            name: "web-1".to_string(),
            state: "running".to_string(),
            status: "Up 1 second".to_string(),
        }]);
        controller.update(status_loaded(after, running));
        let effects = controller.update(status_loaded(
            before,
            StackRuntimeInfo::from_containers(Vec::new()),
        ));

        assert!(effects.is_empty());
        assert!(!controller.is_loading("local:/srv/stacks/web"));
        assert_eq!(
            controller.status("local:/srv/stacks/web").map(|info| info.overall),
            Some(StackStatus::Up)
        );
    }

    #[test]
    fn failure_at_step_j_stops_the_sequence() {
        let mut controller = loaded(Vec::new());
        let target = SequenceTarget::Stack { stack: web() };
        let effects = run(&mut controller, SequenceKind::Refresh, target);
        let id = started_id(&effects);
        let mut finished = Vec::new();
        let mut started = run_steps(&effects);

        let effects = finish(&mut controller, id, Ok(()));
        finished.extend(step_results(&effects));
        started.extend(run_steps(&effects));
        let effects = finish(&mut controller, id, Err("exit 1".to_string()));
        finished.extend(step_results(&effects));
        started.extend(run_steps(&effects));
        assert!(!effects.iter().any(|effect| matches!(effect, Effect::Poll { .. })));

        assert_eq!(finished, vec![None, Some("exit 1".to_string())]);
        assert_eq!(started, vec!["pull images", "compose down"]);

        let late = finish(&mut controller, id, Ok(()));
        assert!(late.is_empty(), "abandoned sequence accepts no more results");

        let report = controller.report("local:/srv/stacks/web").expect("report");
        assert_eq!(report.steps_run, 2);
        assert_eq!(
            report.outcome,
            SequenceOutcome::Failed {
                step: "compose down".to_string(),
                error: "exit 1".to_string()
            }
        );
        assert!(controller.last_error().expect("error").contains("exit 1"));
    }

    #[test]
    fn output_is_kept_in_the_report() {
        let mut controller = loaded(Vec::new());
        let effects = run(
            &mut controller,
            SequenceKind::Up,
            SequenceTarget::Stack { stack: web() },
        );
        let id = started_id(&effects);
        let effects = controller.update(Message::Event(Event::OutputLine {
            sequence: id,
            line: OutputLine::stderr("Network web_default Created"),
        }));
        assert!(matches!(
            effects.as_slice(),
            [Effect::Publish(ConsoleEvent::Output { .. })]
        ));
        finish(&mut controller, id, Err("exit 1".to_string()));
        let report = controller.report("local:/srv/stacks/web").expect("report");
        assert_eq!(report.output, vec![OutputLine::stderr("Network web_default Created")]);
    }

    #[test]
    fn busy_target_is_rejected_but_other_targets_run() {
        let mut controller = loaded(Vec::new());
        let first = run(
            &mut controller,
            SequenceKind::Up,
            SequenceTarget::Stack { stack: web() },
        );
        started_id(&first);
        let second = run(
            &mut controller,
            SequenceKind::Down,
            SequenceTarget::Stack { stack: web() },
        );
        assert!(matches!(
            second.as_slice(),
            [Effect::Publish(ConsoleEvent::Rejected { request: "run sequence", .. })]
        ));
        let other = run(
            &mut controller,
            SequenceKind::Prune,
            SequenceTarget::Host {
                host: HostTarget::local(),
            },
        );
        started_id(&other);
        assert!(controller.is_running("host:local"));
    }

    #[test]
    fn disabled_or_unknown_hosts_are_rejected() {
        let mut disabled = remote_host("build1");
        disabled.disabled = true;
        let mut controller = loaded(vec![disabled.clone()]);
        let effects = run(
            &mut controller,
            SequenceKind::Prune,
            SequenceTarget::Host {
                host: HostTarget::remote(disabled),
            },
        );
        assert!(controller.last_error().expect("error").contains("disabled"));
        assert!(run_steps(&effects).is_empty());

        let effects = run(
            &mut controller,
            SequenceKind::Prune,
            SequenceTarget::Host {
                host: HostTarget::remote(remote_host("ghost")),
            },
        );
        assert!(run_steps(&effects).is_empty());
        assert!(controller.last_error().expect("error").contains("not registered"));
    }

    #[test]
    fn empty_sequence_is_rejected() {
        let mut controller = loaded(Vec::new());
        let effects = controller.update(Message::Action(Action::RunSequence {
            target: SequenceTarget::Stack { stack: web() },
            steps: Vec::new(),
        }));
        assert!(matches!(
            effects.as_slice(),
            [Effect::Publish(ConsoleEvent::Rejected { .. })]
        ));
    }

    #[test]
    fn host_prune_polls_every_stack_on_that_host() {
        let nas = remote_host("nas");
        let mut controller = loaded(vec![nas.clone()]);
        let discover = controller.update(Message::Action(Action::StartDiscovery));
        let run_id = discover
            .iter()
            .find_map(|effect| match effect {
                Effect::Discover { run, .. } => Some(*run),
                _ => None,
            })
            .expect("run");
        for path in ["/srv/a", "/srv/b"] {
            controller.update(Message::Event(Event::StackDiscovered {
                run: run_id,
                stack: Stack::new(HostTarget::remote(nas.clone()), path),
            }));
        }
        controller.update(Message::Event(Event::StackDiscovered {
            run: run_id,
            stack: Stack::new(HostTarget::local(), "/srv/c"),
        }));
        let effects = run(
            &mut controller,
            SequenceKind::Prune,
            SequenceTarget::Host {
                host: HostTarget::remote(nas),
            },
        );
        let id = started_id(&effects);
        let effects = finish(&mut controller, id, Ok(()));
        let polled: Vec<String> = effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Poll { stack, .. } => Some(stack.identifier()),
                _ => None,
            })
            .collect();
        assert_eq!(polled, vec!["nas:/srv/a", "nas:/srv/b"]);
    }
}
