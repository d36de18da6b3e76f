//! Synchronization engine
//!
//! Owns the shared [`AudioState`], the connection and the reload ticket, and
//! implements the bootstrap sequence, the change subscriber and the write
//! path. Every method runs on the event loop; handlers never yield halfway
//! through an update, so state mutation and the following repaint are one
//! step from the loop's point of view.
//!
//! Bootstrap order per connection: server info, then the default sink by
//! name, then (when the owning card changed) the card's profiles. Change
//! notifications are enabled after the first successful sink fetch.

pub mod connection;
pub mod reload;


use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::presenter::Presenter;
use crate::server::{
    CardSnapshot, ConnectionStatus, Connector, Facility, ServerEvent, ServerInfo, ServerMessage,
    ServerRequest, SinkSnapshot, SinkTarget, SubmitError,
};
use crate::state::{AudioState, ProfileError, build_profiles};
use crate::volume;

pub use connection::{APPLICATION_NAME, ConnectionManager, ConnectionPhase};
pub use reload::{ReloadCoordinator, ReloadTicket};

/// Error message for syncing a profile when none is active
const BUG_NO_ACTIVE_PROFILE: &str =
    "BUG: sync_active_profile called without an active profile (select one first)";

/// Why the engine wants the application to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The server shut the connection down cleanly
    ServerTerminated,
    /// The server has no default output device; nothing to control
    NoOutputDevice,
    /// The transport refused to even begin connecting
    ConnectRefused,
    /// SIGINT / SIGTERM
    Interrupted,
    /// Shutdown asked for over IPC
    Requested,
}

impl ExitReason {
    /// Whether the process should exit with a failure status
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::NoOutputDevice | Self::ConnectRefused)
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::ServerTerminated => "audio server terminated the connection",
            Self::NoOutputDevice => "audio server has no output device",
            Self::ConnectRefused => "unable to connect to the audio server",
            Self::Interrupted => "interrupted",
            Self::Requested => "shutdown requested",
        };
        f.write_str(text)
    }
}

/// What the loop should do after a handler ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit(ExitReason),
}

/// Outcome of [`Engine::select_profile`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSwitch {
    /// Already active; nothing sent
    Unchanged,
    /// Switch requested on the card
    Sent,
    /// Menu updated but the card was not told (no card tracked, or not connected)
    LocalOnly,
}

/// Timer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Fixed reconnect backoff
    pub retry_interval: Duration,
    /// Reload debounce window
    pub reload_debounce: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(1),
            reload_debounce: Duration::from_secs(1),
        }
    }
}

/// What the engine follows on the current connection
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tracked {
    sink: Option<u32>,
    channels: u8,
    card: Option<u32>,
    /// A sink fetch succeeded since the connection became ready
    fetched: bool,
}

pub struct Engine<C: Connector, P: Presenter> {
    connection: ConnectionManager<C>,
    reload: ReloadCoordinator,
    state: AudioState,
    presenter: P,
    tracked: Tracked,
    /// A sink fetch ever succeeded in this process
    synced_once: bool,
}

impl<C: Connector, P: Presenter> Engine<C, P> {
    /// Build an engine and the receiving end of its server event channel.
    /// The loop drains the receiver into [`Engine::handle_message`].
    pub fn new(
        connector: C,
        presenter: P,
        options: EngineOptions,
    ) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Self {
            connection: ConnectionManager::new(connector, tx, options.retry_interval),
            reload: ReloadCoordinator::new(options.reload_debounce),
            state: AudioState::new(),
            presenter,
            tracked: Tracked::default(),
            synced_once: false,
        };
        (engine, rx)
    }

    #[must_use]
    pub fn state(&self) -> &AudioState {
        &self.state
    }

    #[must_use]
    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    #[must_use]
    pub fn phase(&self) -> ConnectionPhase {
        self.connection.phase()
    }

    #[must_use]
    pub fn reload_ticket(&self) -> ReloadTicket {
        self.reload.ticket()
    }

    /// Whether any default sink snapshot was applied yet
    #[must_use]
    pub fn has_synced(&self) -> bool {
        self.synced_once
    }

    /// Earliest pending timer (reconnect or reload debounce)
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.connection.retry_deadline(), self.reload.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Begin the first connection attempt
    pub fn start(&mut self) -> Flow {
        match self.connection.start() {
            Ok(()) => Flow::Continue,
            Err(e) => {
                error!("{e:#}");
                Flow::Exit(ExitReason::ConnectRefused)
            }
        }
    }

    /// Release the reload ticket and the connection. Idempotent.
    pub fn teardown(&mut self) {
        self.reload.reset();
        self.connection.teardown();
        self.tracked = Tracked::default();
    }

    /// Run whichever timers are due at `now`
    pub fn handle_deadline(&mut self, now: Instant) -> Flow {
        if self.connection.retry_deadline().is_some_and(|at| at <= now) {
            info!("Reconnecting to audio server");
            if let Flow::Exit(reason) = self.start() {
                return Flow::Exit(reason);
            }
        }

        if self.reload.deadline().is_some_and(|at| at <= now)
            && let Some(id) = self.reload.fire(now)
        {
            match self.tracked.sink {
                Some(index) => self.fetch_sink(id, SinkTarget::Index(index)),
                None => {
                    self.reload.complete(id);
                }
            }
        }

        Flow::Continue
    }

    /// Dispatch one message from the server channel
    pub fn handle_message(&mut self, message: ServerMessage, now: Instant) -> Flow {
        if !self.connection.is_current(message.generation) {
            debug!(
                "Ignoring event from stale connection {}: {:?}",
                message.generation, message.event
            );
            return Flow::Continue;
        }

        match message.event {
            ServerEvent::Connection(status) => self.on_connection(status, now),
            ServerEvent::ServerInfo(info) => self.on_server_info(info),
            ServerEvent::SinkInfo { ticket, sink } => {
                self.on_sink_info(ticket, sink);
                Flow::Continue
            }
            ServerEvent::CardInfo(card) => {
                self.on_card_info(card);
                Flow::Continue
            }
            ServerEvent::Subscribed(true) => {
                debug!("Change notifications enabled");
                Flow::Continue
            }
            ServerEvent::Subscribed(false) => {
                warn!("Failed to enable change notifications; live updates are disabled");
                Flow::Continue
            }
            ServerEvent::Changed { facility, index } => {
                self.on_change(facility, index, now);
                Flow::Continue
            }
        }
    }

    fn on_connection(&mut self, status: ConnectionStatus, now: Instant) -> Flow {
        match status {
            ConnectionStatus::Connecting => {
                debug!("Audio server connection in progress");
                Flow::Continue
            }
            ConnectionStatus::Ready => {
                self.connection.mark_ready();
                self.tracked = Tracked::default();
                self.reload.reset();
                self.request_server_info();
                Flow::Continue
            }
            ConnectionStatus::Failed => {
                warn!("Connection to audio server failed, retrying soon");
                self.reload.reset();
                self.tracked = Tracked::default();
                self.connection.fail(now);
                Flow::Continue
            }
            ConnectionStatus::Terminated => {
                info!("Audio server terminated the connection");
                self.reload.reset();
                self.connection.terminate();
                Flow::Exit(ExitReason::ServerTerminated)
            }
        }
    }

    // Bootstrap step 1
    fn request_server_info(&mut self) {
        if let Err(e) = self.connection.submit(ServerRequest::ServerInfo) {
            warn!("Could not request server info: {e}");
        }
    }

    // Bootstrap step 2 and 3
    fn on_server_info(&mut self, info: Option<ServerInfo>) -> Flow {
        let Some(info) = info else {
            warn!("Failed to fetch server info");
            return Flow::Continue;
        };

        debug!(
            "Server: {} {}",
            info.server_name.as_deref().unwrap_or("unknown"),
            info.server_version.as_deref().unwrap_or("")
        );

        let Some(sink_name) = info.default_sink_name.filter(|name| !name.is_empty()) else {
            error!("Audio server reports no default output device");
            return Flow::Exit(ExitReason::NoOutputDevice);
        };

        let id = self.reload.restart();
        self.fetch_sink(id, SinkTarget::Name(sink_name));
        Flow::Continue
    }

    fn fetch_sink(&mut self, id: u64, target: SinkTarget) {
        debug!("Fetching default sink {target:?} (reload {id})");
        if let Err(e) = self
            .connection
            .submit(ServerRequest::SinkInfo { ticket: id, target })
        {
            warn!("Could not request default sink info: {e}");
            self.reload.complete(id);
        }
    }

    fn fetch_card(&mut self, index: u32) {
        if let Err(e) = self.connection.submit(ServerRequest::CardInfo { index }) {
            warn!("Could not request card {index} info: {e}");
        }
    }

    fn on_sink_info(&mut self, ticket: u64, sink: Option<SinkSnapshot>) {
        // Clear the in-flight marker before anything else
        if !self.reload.complete(ticket) {
            debug!("Ignoring superseded sink fetch {ticket}");
            return;
        }

        let Some(sink) = sink else {
            warn!("Failed to fetch default sink info");
            return;
        };

        let first = !self.tracked.fetched;
        let card_changed = first || sink.card != self.tracked.card;

        self.tracked.sink = Some(sink.index);
        self.tracked.channels = sink.channels();
        self.tracked.card = sink.card;
        self.tracked.fetched = true;
        self.synced_once = true;

        let native = volume::average(&sink.channel_volumes);
        self.state.set_volume(volume::to_canonical(native));
        self.state.set_muted(sink.muted);

        debug!(
            "Default sink {} (#{}): volume {:.0}, muted {}",
            sink.name,
            sink.index,
            self.state.volume(),
            self.state.muted()
        );

        self.presenter.refresh_tray_icon(&self.state);
        self.presenter.refresh_volume_control(&self.state);

        if first {
            self.subscribe();
        }

        if card_changed {
            match sink.card {
                Some(card) => self.fetch_card(card),
                None => {
                    self.state.clear_profiles();
                    self.presenter.refresh_profile_menu(&self.state);
                }
            }
        }
    }

    fn subscribe(&mut self) {
        if let Err(e) = self.connection.submit(ServerRequest::Subscribe) {
            warn!("Could not enable change notifications: {e}");
        }
    }

    fn on_card_info(&mut self, card: Option<CardSnapshot>) {
        let Some(card) = card else {
            warn!("Failed to fetch card info");
            return;
        };

        if self.tracked.card != Some(card.index) {
            debug!("Ignoring profiles of untracked card {}", card.index);
            return;
        }

        self.state.replace_profiles(build_profiles(&card));
        debug!(
            "Card {}: {} profiles, active {:?}",
            card.index,
            self.state.profiles().len(),
            self.state.active_profile().map(|p| p.name.as_str())
        );
        self.presenter.refresh_profile_menu(&self.state);
    }

    fn on_change(&mut self, facility: Facility, index: u32, now: Instant) {
        match facility {
            Facility::Server => self.request_server_info(),
            Facility::Card if self.tracked.card == Some(index) => self.fetch_card(index),
            Facility::Sink if self.tracked.sink == Some(index) => self.trigger_reload(now),
            Facility::Card | Facility::Sink => {}
            Facility::Other => debug!("Ignoring change notification for object {index}"),
        }
    }

    /// Ask for a default sink reload. Bursts collapse into one delayed fetch.
    pub fn trigger_reload(&mut self, now: Instant) {
        let Some(index) = self.tracked.sink else {
            return;
        };
        if let Some(id) = self.reload.trigger(now) {
            self.fetch_sink(id, SinkTarget::Index(index));
        }
    }

    /// Push the local volume to the default sink. Returns whether a request went out.
    pub fn sync_volume(&mut self) -> bool {
        let Some(index) = self.tracked.sink else {
            debug!("No default sink yet, volume not synced");
            return false;
        };
        let channels = self.tracked.channels;
        if channels == 0 {
            debug!("Default sink has no channels, volume not synced");
            return false;
        }

        let request = ServerRequest::SetSinkVolume {
            index,
            channels,
            volume: volume::to_native(self.state.volume()),
        };
        self.submit_write(request, "volume")
    }

    /// Push the local mute switch to the default sink. Returns whether a request went out.
    pub fn sync_muted(&mut self) -> bool {
        let Some(index) = self.tracked.sink else {
            debug!("No default sink yet, mute not synced");
            return false;
        };

        let request = ServerRequest::SetSinkMute {
            index,
            muted: self.state.muted(),
        };
        self.submit_write(request, "mute")
    }

    /// Switch the tracked card to the active profile. Returns whether a request went out.
    ///
    /// # Panics
    /// Panics if no profile is active. Callers select one first.
    pub fn sync_active_profile(&mut self) -> bool {
        let profile = self
            .state
            .active_profile()
            .expect(BUG_NO_ACTIVE_PROFILE)
            .name
            .clone();

        let Some(index) = self.tracked.card else {
            debug!("No card tracked, profile not synced");
            return false;
        };

        self.submit_write(ServerRequest::SetCardProfile { index, profile }, "profile")
    }

    fn submit_write(&mut self, request: ServerRequest, what: &str) -> bool {
        match self.connection.submit(request) {
            Ok(()) => true,
            Err(SubmitError::NotConnected) => {
                debug!("Not connected, {what} change not sent");
                false
            }
            Err(e) => {
                warn!("Failed to send {what} change: {e}");
                false
            }
        }
    }

    /// Step the volume up, push it and repaint
    pub fn raise_volume(&mut self) {
        self.state.raise_volume();
        self.after_volume_change();
    }

    /// Step the volume down, push it and repaint
    pub fn lower_volume(&mut self) {
        self.state.lower_volume();
        self.after_volume_change();
    }

    fn after_volume_change(&mut self) {
        let _ = self.sync_volume();
        self.presenter.refresh_tray_icon(&self.state);
        self.presenter.refresh_volume_control(&self.state);
        self.presenter.flash(&self.state);
    }

    /// Flip the mute switch, push it and repaint
    pub fn toggle_mute(&mut self) {
        self.state.toggle_mute();
        let _ = self.sync_muted();
        self.presenter.refresh_tray_icon(&self.state);
        self.presenter.flash(&self.state);
    }

    /// Make `name` the active profile and push it.
    ///
    /// # Errors
    /// Returns `ProfileError::UnknownProfile` if the card has no such profile.
    pub fn select_profile(&mut self, name: &str) -> Result<ProfileSwitch, ProfileError> {
        if !self.state.select_profile(name)? {
            return Ok(ProfileSwitch::Unchanged);
        }
        let sent = self.sync_active_profile();
        self.presenter.refresh_profile_menu(&self.state);
        Ok(if sent {
            ProfileSwitch::Sent
        } else {
            ProfileSwitch::LocalOnly
        })
    }
}
