#![allow(dead_code)]

use std::cell::RefCell;
use std::ffi::OsString;
use std::rc::Rc;

use color_eyre::eyre::{self, Result};

use crate::presenter::Presenter;
use crate::server::{Connector, EventSink, ServerConnection, ServerRequest, SubmitError};
use crate::state::AudioState;

/// RAII helper: point an XDG base directory variable at a tempdir for the lifetime of this guard.
pub(crate) struct XdgTemp {
    var: &'static str,
    prev: Option<OsString>,
    dir: tempfile::TempDir,
}

impl XdgTemp {
    /// Create and activate a temporary `XDG_CONFIG_HOME`.
    ///
    /// # Panics
    ///
    /// Panics if a temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self::for_var("XDG_CONFIG_HOME")
    }

    /// Same as [`XdgTemp::new`] for another variable (e.g. `XDG_RUNTIME_DIR`)
    #[must_use]
    pub fn for_var(var: &'static str) -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir for XDG directory");
        let prev = std::env::var_os(var);
        // SAFETY: tests touching XDG variables do not read them from other threads concurrently
        unsafe { std::env::set_var(var, dir.path()) };
        Self { var, prev, dir }
    }

    /// Path to the temporary directory.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }
}

impl Default for XdgTemp {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for XdgTemp {
    fn drop(&mut self) {
        // SAFETY: see `XdgTemp::for_var`
        unsafe {
            if let Some(ref val) = self.prev {
                std::env::set_var(self.var, val);
            } else {
                std::env::remove_var(self.var);
            }
        }
        // TempDir will be removed when dropped
    }
}

/// RAII helper: set an environment variable for the lifetime of this guard.
pub(crate) struct EnvGuard {
    var: &'static str,
    prev: Option<OsString>,
}

impl EnvGuard {
    #[must_use]
    pub fn set(var: &'static str, value: impl AsRef<std::ffi::OsStr>) -> Self {
        let prev = std::env::var_os(var);
        // SAFETY: each variable is only touched by the one test that guards it
        unsafe { std::env::set_var(var, value) };
        Self { var, prev }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        // SAFETY: see `EnvGuard::set`
        unsafe {
            match self.prev.take() {
                Some(val) => std::env::set_var(self.var, val),
                None => std::env::remove_var(self.var),
            }
        }
    }
}

#[derive(Default)]
struct MockServer {
    requests: Vec<ServerRequest>,
    connects: usize,
    refuse_next: bool,
    closed: bool,
}

/// Connector that records every request instead of talking to a server.
/// Clones share the same recording.
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    server: Rc<RefCell<MockServer>>,
}

impl MockConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `connect` fail as if the transport refused to start
    pub fn refuse_next(&self) {
        self.server.borrow_mut().refuse_next = true;
    }

    /// Make every later `submit` fail with `SubmitError::Closed`
    pub fn close_transport(&self) {
        self.server.borrow_mut().closed = true;
    }

    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.server.borrow().connects
    }

    #[must_use]
    pub fn requests(&self) -> Vec<ServerRequest> {
        self.server.borrow().requests.clone()
    }

    /// Return and forget the recorded requests
    pub fn take_requests(&self) -> Vec<ServerRequest> {
        std::mem::take(&mut self.server.borrow_mut().requests)
    }
}

pub(crate) struct MockConnection {
    server: Rc<RefCell<MockServer>>,
}

impl Connector for MockConnector {
    type Connection = MockConnection;

    fn connect(&mut self, _events: EventSink) -> Result<MockConnection> {
        let mut server = self.server.borrow_mut();
        server.connects += 1;
        if std::mem::take(&mut server.refuse_next) {
            eyre::bail!("connection refused");
        }
        Ok(MockConnection {
            server: Rc::clone(&self.server),
        })
    }
}

impl ServerConnection for MockConnection {
    fn submit(&mut self, request: ServerRequest) -> Result<(), SubmitError> {
        let mut server = self.server.borrow_mut();
        if server.closed {
            return Err(SubmitError::Closed);
        }
        server.requests.push(request);
        Ok(())
    }
}

/// Presenter that counts repaints
#[derive(Debug, Default)]
pub(crate) struct RecordingPresenter {
    pub tray_refreshes: usize,
    pub volume_refreshes: usize,
    pub menu_refreshes: usize,
    pub flashes: usize,
    /// State seen by the most recent call
    pub last_state: Option<AudioState>,
}

impl Presenter for RecordingPresenter {
    fn refresh_tray_icon(&mut self, state: &AudioState) {
        self.tray_refreshes += 1;
        self.last_state = Some(state.clone());
    }

    fn refresh_volume_control(&mut self, state: &AudioState) {
        self.volume_refreshes += 1;
        self.last_state = Some(state.clone());
    }

    fn refresh_profile_menu(&mut self, state: &AudioState) {
        self.menu_refreshes += 1;
        self.last_state = Some(state.clone());
    }

    fn flash(&mut self, state: &AudioState) {
        self.flashes += 1;
        self.last_state = Some(state.clone());
    }
}
