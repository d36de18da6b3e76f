//! `PulseAudio` backend on `libpulse-binding`
//!
//! Each connection gets a dedicated worker thread that owns a threaded
//! mainloop and its context. The event loop talks to the worker through a
//! plain `std::sync::mpsc` channel; the worker answers through the
//! connection's [`EventSink`]. libpulse callbacks only build snapshots and
//! forward them, they never touch engine state.
//!
//! The context state callback cannot inspect the context it belongs to
//! (it may run inside `connect()` while the worker holds it), so it only
//! pokes the worker, which then reads the state under the mainloop lock.
//!
//! This backend never emits `ServerEvent::ServerInfo(None)`. libpulse-binding
//! only invokes the server-info callback with a valid reply (a null reply
//! trips an assertion inside its callback proxy), so a failed query surfaces
//! as a context state change instead. The engine's `None` handling is
//! exercised by other `Connector`s and by the mock in tests.

use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread::{self, JoinHandle};

use color_eyre::eyre::{self, Context as _, Result};
use libpulse_binding as pulse;
use pulse::callbacks::ListResult;
use pulse::context::introspect::{CardInfo, SinkInfo};
use pulse::context::subscribe::{Facility as PulseFacility, InterestMaskSet};
use pulse::context::{Context, FlagSet as ContextFlagSet, State as ContextState};
use pulse::mainloop::threaded::Mainloop;
use pulse::proplist::{Proplist, properties};
use pulse::volume::{ChannelVolumes, Volume};
use tracing::{debug, error, warn};

use super::{
    CardSnapshot, ConnectionStatus, Connector, EventSink, Facility, ProfileSnapshot,
    ServerConnection, ServerEvent, ServerInfo, ServerRequest, SinkSnapshot, SinkTarget,
    SubmitError,
};

/// Messages handled by the worker thread
enum WorkerMsg {
    /// The context state callback fired
    StateChanged,
    Request(ServerRequest),
    Shutdown,
}

/// Opens libpulse connections
#[derive(Debug, Clone)]
pub struct PulseConnector {
    app_name: String,
    server: Option<String>,
}

impl PulseConnector {
    /// `app_name` becomes the client's `application.name` property.
    /// `server` of `None` uses the default server lookup.
    #[must_use]
    pub fn new(app_name: impl Into<String>, server: Option<String>) -> Self {
        Self {
            app_name: app_name.into(),
            server,
        }
    }
}

impl Connector for PulseConnector {
    type Connection = PulseConnection;

    fn connect(&mut self, events: EventSink) -> Result<PulseConnection> {
        let (tx, rx) = mpsc::channel();
        let (started_tx, started_rx) = mpsc::sync_channel(1);

        let app_name = self.app_name.clone();
        let server = self.server.clone();
        let loopback = tx.clone();
        let generation = events.generation();

        let worker = thread::Builder::new()
            .name(format!("pulse-{generation}"))
            .spawn(move || run_worker(&app_name, server.as_deref(), rx, loopback, events, started_tx))
            .wrap_err("Failed to spawn PulseAudio worker thread")?;

        // The worker reports whether the transport agreed to start connecting
        started_rx
            .recv()
            .wrap_err("PulseAudio worker exited before connecting")??;

        Ok(PulseConnection {
            tx,
            worker: Some(worker),
        })
    }
}

/// Live libpulse connection handle
pub struct PulseConnection {
    tx: Sender<WorkerMsg>,
    worker: Option<JoinHandle<()>>,
}

impl ServerConnection for PulseConnection {
    fn submit(&mut self, request: ServerRequest) -> Result<(), SubmitError> {
        self.tx
            .send(WorkerMsg::Request(request))
            .map_err(|_| SubmitError::Closed)
    }
}

impl Drop for PulseConnection {
    fn drop(&mut self) {
        let _ = self.tx.send(WorkerMsg::Shutdown);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            error!("PulseAudio worker thread panicked");
        }
    }
}

fn run_worker(
    app_name: &str,
    server: Option<&str>,
    requests: Receiver<WorkerMsg>,
    loopback: Sender<WorkerMsg>,
    events: EventSink,
    started: SyncSender<Result<()>>,
) {
    let mut session = match Session::open(app_name, server, loopback) {
        Ok(session) => {
            let _ = started.send(Ok(()));
            session
        }
        Err(e) => {
            let _ = started.send(Err(e));
            return;
        }
    };

    while let Ok(msg) = requests.recv() {
        match msg {
            WorkerMsg::StateChanged => session.forward_state(&events),
            WorkerMsg::Request(request) => session.submit(request, &events),
            WorkerMsg::Shutdown => break,
        }
    }

    session.close();
    debug!("PulseAudio worker {} exited", events.generation());
}

/// Context + mainloop owned by one worker thread.
/// Field order matters: the context must drop before its mainloop.
struct Session {
    context: Context,
    mainloop: Mainloop,
    last_status: Option<ConnectionStatus>,
}

impl Session {
    fn open(app_name: &str, server: Option<&str>, loopback: Sender<WorkerMsg>) -> Result<Self> {
        let mut proplist =
            Proplist::new().ok_or_else(|| eyre::eyre!("Failed to allocate PulseAudio proplist"))?;
        proplist
            .set_str(properties::APPLICATION_NAME, app_name)
            .map_err(|()| eyre::eyre!("Failed to set application name on proplist"))?;

        let mut mainloop =
            Mainloop::new().ok_or_else(|| eyre::eyre!("Failed to create PulseAudio mainloop"))?;

        let mut context = Context::new_with_proplist(&mainloop, app_name, &proplist)
            .ok_or_else(|| eyre::eyre!("Failed to create PulseAudio context"))?;

        context.set_state_callback(Some(Box::new(move || {
            let _ = loopback.send(WorkerMsg::StateChanged);
        })));

        mainloop
            .start()
            .map_err(|e| eyre::eyre!("Failed to start PulseAudio mainloop: {e}"))?;

        mainloop.lock();
        let connected = context.connect(server, ContextFlagSet::NOFAIL, None);
        mainloop.unlock();

        if let Err(e) = connected {
            mainloop.stop();
            eyre::bail!("Unable to connect context: {e}");
        }

        Ok(Self {
            context,
            mainloop,
            last_status: None,
        })
    }

    /// Read the context state and forward it if it moved
    fn forward_state(&mut self, events: &EventSink) {
        self.mainloop.lock();
        let state = self.context.get_state();
        self.mainloop.unlock();

        let status = match state {
            ContextState::Ready => ConnectionStatus::Ready,
            ContextState::Failed => ConnectionStatus::Failed,
            ContextState::Terminated => ConnectionStatus::Terminated,
            _ => ConnectionStatus::Connecting,
        };

        if self.last_status != Some(status) {
            self.last_status = Some(status);
            events.send(ServerEvent::Connection(status));
        }
    }

    fn submit(&mut self, request: ServerRequest, events: &EventSink) {
        self.mainloop.lock();

        match request {
            ServerRequest::ServerInfo => {
                let events = events.clone();
                let _op = self.context.introspect().get_server_info(move |info| {
                    events.send(ServerEvent::ServerInfo(Some(ServerInfo {
                        server_name: info.server_name.as_ref().map(ToString::to_string),
                        server_version: info.server_version.as_ref().map(ToString::to_string),
                        default_sink_name: info.default_sink_name.as_ref().map(ToString::to_string),
                    })));
                });
            }
            ServerRequest::SinkInfo { ticket, target } => {
                let events = events.clone();
                let callback = move |result: ListResult<&SinkInfo>| match result {
                    ListResult::Item(info) => {
                        events.send(ServerEvent::SinkInfo {
                            ticket,
                            sink: Some(sink_snapshot(info)),
                        });
                    }
                    ListResult::End => {}
                    ListResult::Error => {
                        events.send(ServerEvent::SinkInfo { ticket, sink: None });
                    }
                };
                let introspect = self.context.introspect();
                let _op = match target {
                    SinkTarget::Name(name) => introspect.get_sink_info_by_name(&name, callback),
                    SinkTarget::Index(index) => introspect.get_sink_info_by_index(index, callback),
                };
            }
            ServerRequest::CardInfo { index } => {
                let events = events.clone();
                let _op = self
                    .context
                    .introspect()
                    .get_card_info_by_index(index, move |result| match result {
                        ListResult::Item(info) => {
                            events.send(ServerEvent::CardInfo(Some(card_snapshot(info))));
                        }
                        ListResult::End => {}
                        ListResult::Error => {
                            events.send(ServerEvent::CardInfo(None));
                        }
                    });
            }
            ServerRequest::Subscribe => {
                let notify = events.clone();
                self.context
                    .set_subscribe_callback(Some(Box::new(move |facility, _operation, index| {
                        let facility = match facility {
                            Some(PulseFacility::Server) => Facility::Server,
                            Some(PulseFacility::Card) => Facility::Card,
                            Some(PulseFacility::Sink) => Facility::Sink,
                            _ => Facility::Other,
                        };
                        notify.send(ServerEvent::Changed { facility, index });
                    })));

                let events = events.clone();
                let mask = InterestMaskSet::SERVER | InterestMaskSet::CARD | InterestMaskSet::SINK;
                let _op = self.context.subscribe(mask, move |success| {
                    events.send(ServerEvent::Subscribed(success));
                });
            }
            ServerRequest::SetSinkVolume {
                index,
                channels,
                volume,
            } => {
                let mut volumes = ChannelVolumes::default();
                volumes.set(channels, Volume(volume));
                let _op = self.context.introspect().set_sink_volume_by_index(
                    index,
                    &volumes,
                    Some(Box::new(move |success| {
                        if !success {
                            warn!("Server rejected volume change for sink {index}");
                        }
                    })),
                );
            }
            ServerRequest::SetSinkMute { index, muted } => {
                let _op = self.context.introspect().set_sink_mute_by_index(
                    index,
                    muted,
                    Some(Box::new(move |success| {
                        if !success {
                            warn!("Server rejected mute change for sink {index}");
                        }
                    })),
                );
            }
            ServerRequest::SetCardProfile { index, profile } => {
                let _op = self.context.introspect().set_card_profile_by_index(
                    index,
                    &profile,
                    Some(Box::new(move |success| {
                        if !success {
                            warn!("Server rejected profile change for card {index}");
                        }
                    })),
                );
            }
        }

        self.mainloop.unlock();
    }

    fn close(mut self) {
        self.mainloop.lock();
        self.context.set_subscribe_callback(None);
        self.context.set_state_callback(None);
        self.context.disconnect();
        self.mainloop.unlock();
        self.mainloop.stop();
    }
}

fn sink_snapshot(info: &SinkInfo) -> SinkSnapshot {
    SinkSnapshot {
        index: info.index,
        name: info
            .name
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        card: info.card,
        channel_volumes: info.volume.get().iter().map(|v| v.0).collect(),
        muted: info.mute,
    }
}

fn card_snapshot(info: &CardInfo) -> CardSnapshot {
    let profiles = info
        .profiles
        .iter()
        .map(|p| ProfileSnapshot {
            name: p.name.as_ref().map(ToString::to_string).unwrap_or_default(),
            description: p
                .description
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            priority: p.priority,
        })
        .collect();

    CardSnapshot {
        index: info.index,
        profiles,
        active_profile: info
            .active_profile
            .as_ref()
            .and_then(|p| p.name.as_ref().map(ToString::to_string)),
    }
}
