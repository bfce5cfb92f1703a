mod discovery;
mod gate;
mod poller;
mod sequencer;

use std::path::PathBuf;
use std::sync::Arc;

use stack_model::SshHostConfig;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Settings;
use crate::events::{Action, ConsoleEvent, Effect, Event, EventSink, Message, SavePurpose};
use crate::exec::Executor;
use crate::hosts::{read_import_candidates, HostStore};
use crate::state::Controller;

use discovery::DiscoveryEngine;
use gate::AdmissionGate;
use poller::StatusPoller;
use sequencer::CommandSequencer;

const VIEW_CHANNEL_CAPACITY: usize = 4096;

/// Presentation-side handle: submit actions, subscribe to console events.
#[derive(Clone)]
pub(crate) struct ConsoleHandle {
    tx: mpsc::UnboundedSender<Message>,
    view_tx: broadcast::Sender<ConsoleEvent>,
}

impl ConsoleHandle {
    pub(crate) fn send(&self, action: Action) -> anyhow::Result<()> {
        self.tx
            .send(Message::Action(action))
            .map_err(|_| anyhow::anyhow!("console runtime has stopped"))
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.view_tx.subscribe()
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.tx.send(Message::Action(Action::Shutdown));
    }
}

struct Dispatcher {
    discovery: DiscoveryEngine,
    poller: StatusPoller,
    sequencer: CommandSequencer,
    store: HostStore,
    sink: EventSink,
    view_tx: broadcast::Sender<ConsoleEvent>,
}

impl Dispatcher {
    /// Returns false once the loop should stop.
    fn dispatch(&self, effect: Effect) -> bool {
        match effect {
            Effect::Discover { run, hosts } => {
                self.discovery.discover(run, &hosts);
            }
            Effect::Poll { stack, generation } => self.poller.poll(stack, generation),
            Effect::RunStep { sequence, step } => self.sequencer.run(sequence, step),
            Effect::LoadHosts => {
                let store = self.store.clone();
                let sink = self.sink.clone();
                tokio::spawn(async move {
                    let result = store.load().await.map_err(|err| format!("{err:#}"));
                    sink.send(Event::HostsLoaded(result));
                });
            }
            Effect::SaveHosts { hosts, purpose } => self.save_hosts(hosts, purpose),
            Effect::ParseImport { path, known } => self.parse_import(path, known),
            Effect::Publish(event) => {
                let _ = self.view_tx.send(event);
            }
            Effect::Stop => return false,
        }
        true
    }

    fn save_hosts(&self, hosts: Vec<SshHostConfig>, purpose: SavePurpose) {
        let store = self.store.clone();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let result = store.save(&hosts).await.map_err(|err| format!("{err:#}"));
            let event = match purpose {
                SavePurpose::Mutation => Event::HostMutated(result),
                SavePurpose::Import { imported, skipped } => Event::ImportSaved {
                    imported,
                    skipped,
                    result,
                },
            };
            sink.send(event);
        });
    }

    fn parse_import(&self, path: PathBuf, known: Vec<SshHostConfig>) {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let result = read_import_candidates(&path, &known)
                .await
                .map_err(|err| format!("{err:#}"));
            sink.send(Event::ImportParsed(result));
        });
    }
}

/// Starts the controller loop and returns its handle. The loop ends on
/// `Action::Shutdown` or when `shutdown` is cancelled.
pub(crate) fn spawn_runtime(
    settings: &Settings,
    executor: Arc<dyn Executor>,
    shutdown: CancellationToken,
) -> (ConsoleHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (view_tx, _) = broadcast::channel(VIEW_CHANNEL_CAPACITY);
    let sink = EventSink::new(tx.clone());
    let gate = AdmissionGate::new("status poll", settings.max_concurrent_polls);
    let max_concurrent_polls = gate.limit();
    let dispatcher = Dispatcher {
        discovery: DiscoveryEngine::new(
            Arc::clone(&executor),
            settings.discovery.clone(),
            shutdown.clone(),
            sink.clone(),
        ),
        poller: StatusPoller::new(
            Arc::clone(&executor),
            gate,
            settings.compose.clone(),
            shutdown.clone(),
            sink.clone(),
        ),
        sequencer: CommandSequencer::new(executor, sink.clone()),
        store: HostStore::new(settings.registry_path.clone()),
        sink,
        view_tx: view_tx.clone(),
    };
    let handle = ConsoleHandle { tx, view_tx };

    let task = tokio::spawn(async move {
        info!(
            event = "runtime.start",
            registry = %dispatcher.store.path().display(),
            max_concurrent_polls,
            "console runtime started"
        );
        let mut controller = Controller::new();
        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            let effects = controller.update(message);
            let mut keep_running = true;
            for effect in effects {
                keep_running &= dispatcher.dispatch(effect);
            }
            if !keep_running {
                break;
            }
        }
        debug!(
            stacks = controller.stacks().len(),
            "console runtime stopped"
        );
    });
    (handle, task)
}
