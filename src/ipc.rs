//! IPC infrastructure for applet control
//!
//! Unix-socket control surface for the running applet. Window-manager key
//! bindings and the CLI talk to it with length-prefixed JSON messages
//! (4-byte big-endian length, then the payload).

use color_eyre::eyre::{self, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

use crate::engine::ConnectionPhase;
use crate::state::Profile;

// ============================================================================
// Message Types
// ============================================================================

/// Requests sent from the CLI to the applet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Query applet status
    Status,
    /// Raise the volume one step
    RaiseVolume,
    /// Lower the volume one step
    LowerVolume,
    /// Flip the mute switch
    ToggleMute,
    /// List the default device's card profiles
    ListProfiles,
    /// Switch the card to a profile
    SelectProfile { name: String },
    /// Gracefully stop the applet
    Shutdown,
}

/// Responses sent from the applet to the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// Status information
    Status {
        version: String,
        uptime_secs: u64,
        connection: ConnectionPhase,
        /// Canonical volume, 0-150
        volume: f64,
        muted: bool,
        icon: String,
        tooltip: String,
        active_profile: Option<String>,
    },
    /// Volume and mute switch after a change
    Volume { volume: f64, muted: bool },
    /// Profiles in menu order
    Profiles { profiles: Vec<Profile> },
    /// Generic success response
    Ok { message: String },
    /// Error response
    Error { message: String },
}

// ============================================================================
// Socket Path Management
// ============================================================================

const SOCKET_NAME: &str = "pa-applet.sock";

/// Get the IPC socket path
///
/// Prefers `$XDG_RUNTIME_DIR/pa-applet.sock`, falls back to `/tmp/pa-applet-$UID.sock`.
#[must_use]
pub fn get_socket_path() -> PathBuf {
    match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(runtime_dir) if !runtime_dir.is_empty() => PathBuf::from(runtime_dir).join(SOCKET_NAME),
        _ => PathBuf::from(format!("/tmp/pa-applet-{}.sock", users::get_current_uid())),
    }
}

/// Check whether an applet is listening on the socket
pub async fn is_applet_running() -> bool {
    let socket_path = get_socket_path();
    matches!(
        tokio::time::timeout(Duration::from_millis(100), UnixStream::connect(&socket_path)).await,
        Ok(Ok(_))
    )
}

/// Remove a socket file nobody listens on anymore
async fn cleanup_stale_socket(socket_path: &Path) -> Result<()> {
    if !socket_path.exists() {
        return Ok(());
    }

    match tokio::time::timeout(Duration::from_millis(100), UnixStream::connect(socket_path)).await
    {
        Ok(Ok(_)) => eyre::bail!(
            "Another pa-applet instance is already running (socket: {socket_path:?})"
        ),
        Ok(Err(_)) | Err(_) => {
            debug!("Removing stale socket: {:?}", socket_path);
            std::fs::remove_file(socket_path)
                .with_context(|| format!("Failed to remove stale socket: {socket_path:?}"))?;
            Ok(())
        }
    }
}

// ============================================================================
// Protocol Helpers
// ============================================================================

const MAX_MESSAGE_SIZE: usize = 1024 * 1024; // 1MB max message size
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Read a length-prefixed JSON message from a stream
async fn read_message<T, S>(stream: &mut S) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
    S: AsyncRead + Unpin,
{
    // Read 4-byte big-endian length prefix
    let mut len_buf = [0u8; 4];
    tokio::time::timeout(READ_TIMEOUT, stream.read_exact(&mut len_buf))
        .await
        .context("Timeout reading message length")?
        .context("Failed to read message length")?;

    let msg_len = u32::from_be_bytes(len_buf) as usize;

    if msg_len > MAX_MESSAGE_SIZE {
        eyre::bail!("Message too large: {msg_len} bytes (max: {MAX_MESSAGE_SIZE})");
    }

    let mut msg_buf = vec![0u8; msg_len];
    tokio::time::timeout(READ_TIMEOUT, stream.read_exact(&mut msg_buf))
        .await
        .context("Timeout reading message payload")?
        .context("Failed to read message payload")?;

    serde_json::from_slice(&msg_buf).context("Failed to deserialize message")
}

/// Write a length-prefixed JSON message to a stream
async fn write_message<T, S>(stream: &mut S, message: &T) -> Result<()>
where
    T: Serialize,
    S: AsyncWrite + Unpin,
{
    let json = serde_json::to_vec(message).context("Failed to serialize message")?;

    if json.len() > MAX_MESSAGE_SIZE {
        eyre::bail!(
            "Message too large: {} bytes (max: {MAX_MESSAGE_SIZE})",
            json.len()
        );
    }

    let len = u32::try_from(json.len())
        .context("Message length does not fit the length prefix")?
        .to_be_bytes();
    stream
        .write_all(&len)
        .await
        .context("Failed to write message length")?;

    stream
        .write_all(&json)
        .await
        .context("Failed to write message payload")?;

    stream.flush().await.context("Failed to flush stream")?;

    Ok(())
}

// ============================================================================
// IPC Client (for CLI commands)
// ============================================================================

/// Send a request to the applet and wait for the response
///
/// # Errors
/// Returns an error if the applet is unreachable or the exchange fails.
pub async fn send_request(request: Request) -> Result<Response> {
    let socket_path = get_socket_path();

    let mut stream = tokio::time::timeout(Duration::from_secs(5), UnixStream::connect(&socket_path))
        .await
        .context("Timeout connecting to pa-applet")?
        .with_context(|| {
            format!("Failed to connect to pa-applet. Is it running?\nSocket: {socket_path:?}")
        })?;

    debug!("Connected to applet at {:?}", socket_path);

    write_message(&mut stream, &request).await?;
    read_message(&mut stream).await
}

// ============================================================================
// IPC Server (for the applet)
// ============================================================================

/// Listening control socket. The file is removed on drop.
pub struct IpcServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl IpcServer {
    /// Bind the control socket at the default path
    ///
    /// # Errors
    /// Returns an error if another instance is listening or the socket cannot be bound.
    pub async fn bind() -> Result<Self> {
        Self::bind_at(get_socket_path()).await
    }

    /// Bind the control socket at `socket_path`
    ///
    /// # Errors
    /// Returns an error if another instance is listening or the socket cannot be bound.
    pub async fn bind_at(socket_path: PathBuf) -> Result<Self> {
        cleanup_stale_socket(&socket_path).await?;

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("Failed to bind IPC socket: {socket_path:?}"))?;

        debug!("IPC server listening on {:?}", socket_path);

        Ok(Self {
            listener,
            socket_path,
        })
    }

    /// Accept the next incoming connection
    ///
    /// # Errors
    /// Returns an error if accepting fails; the caller logs it and keeps going.
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .context("Failed to accept IPC connection")?;
        Ok(stream)
    }

    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            warn!("Failed to remove IPC socket on shutdown: {}", e);
        } else {
            debug!("Removed IPC socket: {:?}", self.socket_path);
        }
    }
}

/// Read a request from a client connection
///
/// # Errors
/// Returns an error on timeout, oversize or malformed messages.
pub async fn read_request<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Request> {
    read_message(stream).await
}

/// Write a response to a client connection
///
/// # Errors
/// Returns an error if the response cannot be serialized or written.
pub async fn write_response<S: AsyncWrite + Unpin>(stream: &mut S, response: &Response) -> Result<()> {
    write_message(stream, response).await
}
