//! Logging setup
//!
//! `tracing-subscriber` with an `EnvFilter` (`RUST_LOG` overrides the
//! configured `pa_applet=<level>`). Logs go to stderr, or with `--log-file`
//! to a size-rotated file behind a non-blocking writer.

use color_eyre::eyre::{Context, ContextCompat, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

/// Log file name inside [`log_dir`]
pub const LOG_FILE_NAME: &str = "pa-applet.log";

/// Rotate once the current file reaches this size
pub const MAX_LOG_SIZE: u64 = 1_000_000;

/// Directory for the log file: `$XDG_STATE_HOME/pa-applet`, else the cache dir
///
/// # Errors
/// Returns an error if neither directory can be determined.
pub fn log_dir() -> Result<PathBuf> {
    let base = dirs::state_dir()
        .or_else(dirs::cache_dir)
        .context("Could not determine state or cache directory for logs")?;
    Ok(base.join("pa-applet"))
}

/// Install the global subscriber.
///
/// Returns the writer guard when logging to a file; keep it alive until exit
/// so buffered lines are flushed.
///
/// # Errors
/// Returns an error if the log directory cannot be created.
pub fn init(log_level: &str, to_file: bool) -> Result<Option<WorkerGuard>> {
    // Filter format: "pa_applet=LEVEL" keeps dependencies quiet
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pa_applet={log_level}")));

    if !to_file {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
        return Ok(None);
    }

    let dir = log_dir()?;
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create log dir: {dir:?}"))?;

    let appender = RotatingFileAppender::new(&dir, LOG_FILE_NAME, MAX_LOG_SIZE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .init();

    Ok(Some(guard))
}

/// A file appender that rotates by size.
///
/// Keeps two files: the active one and `<name>.old`, which the active file
/// replaces once it reaches `max_size_bytes`. Files are created with 0600
/// permissions and re-created if deleted underneath us.
pub struct RotatingFileAppender {
    path: PathBuf,
    backup_path: PathBuf,
    max_size_bytes: u64,
    current: Mutex<Option<OpenLog>>,
}

struct OpenLog {
    file: File,
    size: u64,
}

impl RotatingFileAppender {
    pub fn new(dir: impl AsRef<Path>, filename: &str, max_size_bytes: u64) -> Self {
        let dir = dir.as_ref();
        Self {
            path: dir.join(filename),
            backup_path: dir.join(format!("{filename}.old")),
            max_size_bytes,
            current: Mutex::new(None),
        }
    }

    fn open(path: &Path, truncate: bool) -> io::Result<OpenLog> {
        let mut options = fs::OpenOptions::new();
        options.create(true);
        if truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }

        #[cfg(unix)]
        options.mode(0o600);

        let file = options.open(path)?;
        let size = file.metadata()?.len();
        Ok(OpenLog { file, size })
    }

    fn rotate(&self) -> io::Result<OpenLog> {
        if self.path.exists() {
            fs::rename(&self.path, &self.backup_path)?;
        }
        Self::open(&self.path, true)
    }
}

impl Write for RotatingFileAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .current
            .lock()
            .map_err(|e| io::Error::other(format!("Log mutex poisoned: {e}")))?;

        // Deleted externally (logrotate, user): start a fresh file
        if !self.path.exists() {
            *guard = None;
        }

        let needs_rotation = guard
            .as_ref()
            .is_some_and(|log| log.size >= self.max_size_bytes);

        if needs_rotation {
            *guard = None;
            match self.rotate() {
                Ok(log) => *guard = Some(log),
                Err(e) => eprintln!("Failed to rotate log file: {e}"),
            }
        }

        let log = match guard.take() {
            Some(log) => guard.insert(log),
            None => guard.insert(Self::open(&self.path, false)?),
        };

        log.file.write_all(buf)?;
        log.size += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .current
            .lock()
            .map_err(|e| io::Error::other(format!("Log mutex poisoned: {e}")))?;

        if let Some(log) = guard.as_mut() {
            log.file.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_until_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut appender = RotatingFileAppender::new(dir.path(), "test.log", 100);

        appender.write_all(b"first\n").unwrap();
        appender.write_all(b"second\n").unwrap();
        appender.flush().unwrap();

        let contents = fs::read_to_string(dir.path().join("test.log")).unwrap();
        assert_eq!(contents, "first\nsecond\n");
        assert!(!dir.path().join("test.log.old").exists());
    }

    #[test]
    fn test_rotates_at_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut appender = RotatingFileAppender::new(dir.path(), "test.log", 10);

        appender.write_all(b"0123456789").unwrap();
        appender.write_all(b"next").unwrap();
        appender.flush().unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("test.log.old")).unwrap(),
            "0123456789"
        );
        assert_eq!(fs::read_to_string(dir.path().join("test.log")).unwrap(), "next");
    }

    #[test]
    fn test_recreates_deleted_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        let mut appender = RotatingFileAppender::new(dir.path(), "test.log", 1000);

        appender.write_all(b"before").unwrap();
        fs::remove_file(&path).unwrap();
        appender.write_all(b"after").unwrap();
        appender.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "after");
    }

    #[cfg(unix)]
    #[test]
    fn test_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let mut appender = RotatingFileAppender::new(dir.path(), "test.log", 1000);
        appender.write_all(b"x").unwrap();

        let mode = fs::metadata(dir.path().join("test.log"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
