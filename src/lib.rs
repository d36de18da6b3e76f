//! `pa-applet` - PulseAudio volume applet
//!
//! Keeps a tray icon, a volume control and a card profile menu in sync with
//! the default output device of a `PulseAudio` server.
//!
//! # Features
//! - Canonical 0-150 volume scale independent of the server's native units
//! - Debounced reloads with at most one follow-up per burst of change events
//! - Automatic reconnect with a fixed backoff
//! - Desktop volume notifications and a Unix-socket control interface

pub mod cli;
pub mod commands;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod ipc;
pub mod logging;
pub mod notification;
pub mod presenter;
pub mod server;
pub mod state;
pub mod style;
pub mod volume;

#[cfg(test)]
mod test_utils;

/// Build-time information generated by `built`
pub mod built_info {
    #![allow(clippy::needless_raw_string_hashes, clippy::doc_markdown)]
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

// Re-export commonly used types for convenience
pub use cli::Args;
pub use config::Config;
pub use state::AudioState;
