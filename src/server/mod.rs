//! Audio server boundary
//!
//! Everything the engine knows about the server goes through this module:
//! - [`ServerRequest`]: fire-and-forget requests submitted on a live connection
//! - [`ServerEvent`]: completions, notifications and connection state changes
//! - [`Connector`] / [`ServerConnection`]: the seam a backend implements
//!
//! Backends never call into the engine. They push [`ServerMessage`]s into an
//! unbounded channel that the event loop drains, so every handler runs on the
//! loop and never concurrently with another one. Each message is stamped with
//! the generation of the connection that produced it; the engine drops
//! messages from connections it already tore down.

pub mod libpulse;

use color_eyre::eyre::Result;
use thiserror::Error;
use tokio::sync::mpsc;

/// Requests the engine submits to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerRequest {
    /// Fetch server identity (answered with [`ServerEvent::ServerInfo`])
    ServerInfo,
    /// Fetch a sink snapshot (answered with [`ServerEvent::SinkInfo`] carrying the same ticket)
    SinkInfo { ticket: u64, target: SinkTarget },
    /// Fetch a card snapshot (answered with [`ServerEvent::CardInfo`])
    CardInfo { index: u32 },
    /// Register for server, card and sink notifications
    Subscribe,
    /// Apply a uniform per-channel volume to a sink
    SetSinkVolume { index: u32, channels: u8, volume: u32 },
    /// Set a sink's mute switch
    SetSinkMute { index: u32, muted: bool },
    /// Switch a card to the named profile
    SetCardProfile { index: u32, profile: String },
}

/// How a sink fetch addresses the sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    /// First lookup after bootstrap, by the server's default sink name
    Name(String),
    /// Later reloads, by server-assigned index
    Index(u32),
}

/// Connection lifecycle as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Ready,
    Failed,
    Terminated,
}

/// Notification facilities the engine distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facility {
    Server,
    Card,
    Sink,
    Other,
}

/// Server identity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    pub server_name: Option<String>,
    pub server_version: Option<String>,
    pub default_sink_name: Option<String>,
}

/// Default device snapshot. Consumed immediately, never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSnapshot {
    pub index: u32,
    pub name: String,
    /// Owning card, if the sink belongs to one
    pub card: Option<u32>,
    /// Per-channel native volume
    pub channel_volumes: Vec<u32>,
    pub muted: bool,
}

impl SinkSnapshot {
    /// Number of volume channels
    #[must_use]
    pub fn channels(&self) -> u8 {
        u8::try_from(self.channel_volumes.len()).unwrap_or(u8::MAX)
    }
}

/// One selectable card profile as the server reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSnapshot {
    pub name: String,
    pub description: String,
    pub priority: u32,
}

/// Card snapshot: profiles in server order plus the active one, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardSnapshot {
    pub index: u32,
    pub profiles: Vec<ProfileSnapshot>,
    pub active_profile: Option<String>,
}

/// Everything a backend can tell the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Connection state transition
    Connection(ConnectionStatus),
    /// Server identity; `None` when the request failed
    ServerInfo(Option<ServerInfo>),
    /// Sink fetch completion; `None` when the request failed
    SinkInfo { ticket: u64, sink: Option<SinkSnapshot> },
    /// Card fetch completion; `None` when the request failed
    CardInfo(Option<CardSnapshot>),
    /// Result of enabling notifications
    Subscribed(bool),
    /// Change notification for an object of the given facility
    Changed { facility: Facility, index: u32 },
}

/// A [`ServerEvent`] tagged with the connection generation that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMessage {
    pub generation: u64,
    pub event: ServerEvent,
}

/// Sending half handed to a backend for one connection
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl EventSink {
    #[must_use]
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self { generation, tx }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Push an event into the loop. Returns `false` once the loop is gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx
            .send(ServerMessage {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// A request could not be handed to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("no live connection to the audio server")]
    NotConnected,
    #[error("connection to the audio server is closed")]
    Closed,
}

/// One live handle to the server. Dropping it releases the connection.
pub trait ServerConnection {
    /// Submit a request without waiting for it
    ///
    /// # Errors
    /// Returns an error if the request could not be handed to the server.
    fn submit(&mut self, request: ServerRequest) -> Result<(), SubmitError>;
}

/// Creates connection handles
pub trait Connector {
    type Connection: ServerConnection;

    /// Allocate a new handle and start connecting without failing fast.
    ///
    /// State changes and completions for this handle go to `events`.
    ///
    /// # Errors
    /// Returns an error only if the transport refuses to even begin connecting.
    fn connect(&mut self, events: EventSink) -> Result<Self::Connection>;
}
