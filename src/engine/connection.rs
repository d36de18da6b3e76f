//! Connection manager
//!
//! Owns the single live server handle. Transitions:
//! `Disconnected -> Connecting -> Ready`, `Ready -> Disconnected` on failure
//! (retry scheduled after a fixed interval), `Ready -> Terminated` when the
//! server shuts us down. `Terminated` is final.

use std::time::Duration;

use color_eyre::eyre::{Context as _, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::server::{Connector, EventSink, ServerConnection, ServerMessage, ServerRequest, SubmitError};

/// Name the client registers with on the server
pub const APPLICATION_NAME: &str = "pa-applet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Ready,
    Terminated,
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Terminated => "terminated",
        };
        f.write_str(text)
    }
}

pub struct ConnectionManager<C: Connector> {
    connector: C,
    events: mpsc::UnboundedSender<ServerMessage>,
    connection: Option<C::Connection>,
    phase: ConnectionPhase,
    /// Bumped on every `start`; messages stamped with an older value are stale
    generation: u64,
    retry_at: Option<Instant>,
    retry_interval: Duration,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(
        connector: C,
        events: mpsc::UnboundedSender<ServerMessage>,
        retry_interval: Duration,
    ) -> Self {
        Self {
            connector,
            events,
            connection: None,
            phase: ConnectionPhase::Disconnected,
            generation: 0,
            retry_at: None,
            retry_interval,
        }
    }

    #[must_use]
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a message stamped `generation` belongs to the live handle
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.connection.is_some() && generation == self.generation
    }

    /// Pending reconnect deadline
    #[must_use]
    pub fn retry_deadline(&self) -> Option<Instant> {
        self.retry_at
    }

    /// Allocate a new handle and start connecting.
    ///
    /// # Errors
    /// Returns an error if the transport refuses to begin connecting; the
    /// caller shuts the application down.
    pub fn start(&mut self) -> Result<()> {
        self.connection = None;
        self.retry_at = None;
        self.generation += 1;
        self.phase = ConnectionPhase::Connecting;

        debug!("Connecting to audio server (attempt {})", self.generation);

        let sink = EventSink::new(self.generation, self.events.clone());
        match self.connector.connect(sink) {
            Ok(connection) => {
                self.connection = Some(connection);
                Ok(())
            }
            Err(e) => {
                self.phase = ConnectionPhase::Disconnected;
                Err(e).wrap_err("Unable to start connecting to the audio server")
            }
        }
    }

    pub fn mark_ready(&mut self) {
        info!("Connected to audio server");
        self.phase = ConnectionPhase::Ready;
    }

    /// Drop the handle and schedule a reconnect one interval from `now`
    pub fn fail(&mut self, now: Instant) {
        self.connection = None;
        self.phase = ConnectionPhase::Disconnected;
        self.retry_at = Some(now + self.retry_interval);
    }

    /// Final state; no retry
    pub fn terminate(&mut self) {
        self.connection = None;
        self.retry_at = None;
        self.phase = ConnectionPhase::Terminated;
    }

    /// Submit a request on the live handle. Only a `Ready` connection accepts requests.
    ///
    /// # Errors
    /// `SubmitError::NotConnected` when not ready, or whatever the handle reports.
    pub fn submit(&mut self, request: ServerRequest) -> Result<(), SubmitError> {
        if self.phase != ConnectionPhase::Ready {
            return Err(SubmitError::NotConnected);
        }
        match self.connection.as_mut() {
            Some(connection) => connection.submit(request),
            None => Err(SubmitError::NotConnected),
        }
    }

    /// Cancel the retry timer and release the handle. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        self.retry_at = None;
        if self.connection.take().is_some() {
            debug!("Released audio server connection");
        }
        if self.phase != ConnectionPhase::Terminated {
            self.phase = ConnectionPhase::Disconnected;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockConnector;

    const RETRY: Duration = Duration::from_secs(1);

    fn manager() -> (
        ConnectionManager<MockConnector>,
        MockConnector,
        mpsc::UnboundedReceiver<ServerMessage>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = MockConnector::new();
        (ConnectionManager::new(connector.clone(), tx, RETRY), connector, rx)
    }

    #[test]
    fn test_start_bumps_generation() {
        let (mut manager, connector, _rx) = manager();

        manager.start().unwrap();
        assert_eq!(manager.phase(), ConnectionPhase::Connecting);
        assert_eq!(manager.generation(), 1);
        assert!(manager.is_current(1));

        manager.start().unwrap();
        assert_eq!(manager.generation(), 2);
        assert!(!manager.is_current(1));
        assert_eq!(connector.connect_count(), 2);
    }

    #[test]
    fn test_refused_start_is_an_error() {
        let (mut manager, connector, _rx) = manager();
        connector.refuse_next();

        assert!(manager.start().is_err());
        assert_eq!(manager.phase(), ConnectionPhase::Disconnected);
        assert!(!manager.is_current(manager.generation()));
    }

    #[test]
    fn test_submit_requires_ready() {
        let (mut manager, connector, _rx) = manager();
        assert_eq!(
            manager.submit(ServerRequest::ServerInfo),
            Err(SubmitError::NotConnected)
        );

        manager.start().unwrap();
        assert_eq!(
            manager.submit(ServerRequest::ServerInfo),
            Err(SubmitError::NotConnected)
        );

        manager.mark_ready();
        assert_eq!(manager.submit(ServerRequest::ServerInfo), Ok(()));
        assert_eq!(connector.requests(), vec![ServerRequest::ServerInfo]);
    }

    #[test]
    fn test_fail_schedules_retry() {
        let (mut manager, _connector, _rx) = manager();
        let now = Instant::now();
        manager.start().unwrap();
        manager.mark_ready();

        manager.fail(now);
        assert_eq!(manager.phase(), ConnectionPhase::Disconnected);
        assert_eq!(manager.retry_deadline(), Some(now + RETRY));
        assert!(!manager.is_current(manager.generation()));
    }

    #[test]
    fn test_terminate_is_final() {
        let (mut manager, _connector, _rx) = manager();
        manager.start().unwrap();
        manager.mark_ready();

        manager.terminate();
        manager.teardown();
        assert_eq!(manager.phase(), ConnectionPhase::Terminated);
        assert_eq!(manager.retry_deadline(), None);
    }

    #[test]
    fn test_teardown_idempotent() {
        let (mut manager, _connector, _rx) = manager();
        manager.teardown();
        manager.teardown();
        assert_eq!(manager.phase(), ConnectionPhase::Disconnected);

        manager.start().unwrap();
        manager.fail(Instant::now());
        manager.teardown();
        assert_eq!(manager.retry_deadline(), None);
    }
}
