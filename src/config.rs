//! Configuration management
//!
//! Loads, parses and validates the TOML configuration file at
//! `$XDG_CONFIG_HOME/pa-applet/config.toml`. A commented default file is
//! written on first load.

use color_eyre::eyre::{self, Context, ContextCompat, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::engine::EngineOptions;

// ============================================================================
// Public Configuration Types
// ============================================================================

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub settings: Settings,
}

/// Global settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Desktop notification after volume/mute changes made through control commands
    pub notifications: bool,
    pub log_level: String,
    /// Fixed reconnect backoff
    pub retry_interval_ms: u64,
    /// Reload debounce window
    pub reload_debounce_ms: u64,
    /// Explicit server address; `None` lets libpulse find it
    pub server: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let file = SettingsFile::default();
        Self {
            notifications: file.notifications,
            log_level: file.log_level,
            retry_interval_ms: file.retry_interval_ms,
            reload_debounce_ms: file.reload_debounce_ms,
            server: file.server,
        }
    }
}

// ============================================================================
// Config File Deserialization (TOML)
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    settings: SettingsFile,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    #[serde(default = "default_true")]
    notifications: bool,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_interval_ms")]
    retry_interval_ms: u64,
    #[serde(default = "default_interval_ms")]
    reload_debounce_ms: u64,
    #[serde(default)]
    server: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval_ms() -> u64 {
    1000
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            notifications: true,
            log_level: default_log_level(),
            retry_interval_ms: default_interval_ms(),
            reload_debounce_ms: default_interval_ms(),
            server: None,
        }
    }
}

const DEFAULT_CONFIG: &str = r#"# pa-applet configuration
#
# Mirrors and controls the default output device of a PulseAudio
# (or pipewire-pulse) server.

[settings]
notifications = true        # Desktop notification when volume/mute changes via control commands
log_level = "info"          # error, warn, info, debug, trace
retry_interval_ms = 1000    # Delay before reconnecting after the server connection fails
reload_debounce_ms = 1000   # Window that collapses bursts of device change events

# Explicit server address (default: libpulse lookup, e.g. $PULSE_SERVER)
# server = "unix:/run/user/1000/pulse/native"
"#;

// ============================================================================
// Config Implementation
// ============================================================================

impl Config {
    /// Load configuration from the default XDG config path
    ///
    /// # Errors
    /// Returns an error if the config directory cannot be determined/created,
    /// or the file cannot be read, parsed or validated.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            info!("Creating default config at {:?}", config_path);
            Self::create_default_config(&config_path)?;
        }

        Self::load_from_path(&config_path)
    }

    /// Load configuration from an explicit file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {path:?}"))?;

        Self::from_toml(&contents).with_context(|| format!("Invalid config: {path:?}"))
    }

    /// Parse and validate configuration text
    ///
    /// # Errors
    /// Returns an error if the text is not valid TOML for this schema or fails validation.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config_file: ConfigFile =
            toml::from_str(contents).context("Failed to parse config")?;

        let config = Self {
            settings: Settings {
                notifications: config_file.settings.notifications,
                log_level: config_file.settings.log_level,
                retry_interval_ms: config_file.settings.retry_interval_ms,
                reload_debounce_ms: config_file.settings.reload_debounce_ms,
                server: config_file.settings.server,
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        match self.settings.log_level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            level => eyre::bail!(
                "Invalid log_level '{level}'. Must be: error, warn, info, debug, or trace"
            ),
        }

        if self.settings.retry_interval_ms == 0 {
            eyre::bail!("retry_interval_ms must be greater than 0");
        }
        if self.settings.reload_debounce_ms == 0 {
            eyre::bail!("reload_debounce_ms must be greater than 0");
        }

        if self
            .settings
            .server
            .as_deref()
            .is_some_and(|s| s.trim().is_empty())
        {
            eyre::bail!("server must not be empty (remove the line to use the default server)");
        }

        Ok(())
    }

    /// Get the XDG config path
    ///
    /// # Errors
    /// Returns an error if the config directory cannot be determined or created.
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("pa-applet");
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config dir: {config_dir:?}"))?;
        Ok(config_dir.join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<()> {
        fs::write(path, DEFAULT_CONFIG)
            .with_context(|| format!("Failed to write config: {path:?}"))?;

        eprintln!("Created default config at: {path:?}");
        Ok(())
    }

    /// Timer settings for the engine
    #[must_use]
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            retry_interval: Duration::from_millis(self.settings.retry_interval_ms),
            reload_debounce: Duration::from_millis(self.settings.reload_debounce_ms),
        }
    }

    /// Print a human-readable summary of the configuration
    pub fn print_summary(&self) {
        println!("✓ Configuration valid\n");

        println!("Settings:");
        println!("  notifications: {}", self.settings.notifications);
        println!("  log_level: {}", self.settings.log_level);
        println!("  retry_interval_ms: {}", self.settings.retry_interval_ms);
        println!("  reload_debounce_ms: {}", self.settings.reload_debounce_ms);
        println!(
            "  server: {}",
            self.settings.server.as_deref().unwrap_or("(default)")
        );

        if let Ok(path) = Self::get_config_path() {
            println!("\nConfig: {path:?}");
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::XdgTemp;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn test_default_config_text_parses_to_defaults() {
        let config = Config::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert!(config.settings.notifications);
        assert_eq!(config.settings.log_level, "info");
        assert_eq!(config.settings.server, None);
    }

    #[test]
    fn test_engine_options() {
        let config = Config::from_toml(
            "[settings]\nretry_interval_ms = 250\nreload_debounce_ms = 2000\n",
        )
        .unwrap();

        let options = config.engine_options();
        assert_eq!(options.retry_interval, Duration::from_millis(250));
        assert_eq!(options.reload_debounce, Duration::from_secs(2));
    }

    #[test]
    fn test_explicit_server() {
        let config =
            Config::from_toml("[settings]\nserver = \"tcp:localhost:4713\"\n").unwrap();
        assert_eq!(config.settings.server.as_deref(), Some("tcp:localhost:4713"));
    }

    #[test_case("[settings]\nlog_level = \"verbose\"\n", "log_level" ; "unknown log level")]
    #[test_case("[settings]\nretry_interval_ms = 0\n", "retry_interval_ms" ; "zero retry interval")]
    #[test_case("[settings]\nreload_debounce_ms = 0\n", "reload_debounce_ms" ; "zero debounce")]
    #[test_case("[settings]\nserver = \" \"\n", "server" ; "blank server")]
    fn test_validation_rejects(toml: &str, needle: &str) {
        let err = Config::from_toml(toml).unwrap_err();
        assert!(format!("{err:#}").contains(needle), "{err:#}");
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(Config::from_toml("[settings]\nvolume_step = 10\n").is_err());
        assert!(Config::from_toml("[sinks]\n").is_err());
    }

    #[test]
    fn test_load_creates_default_file() {
        let xdg = XdgTemp::new();

        let config = Config::load().unwrap();
        assert_eq!(config, Config::default());

        let path = xdg.path().join("pa-applet").join("config.toml");
        assert_eq!(fs::read_to_string(path).unwrap(), DEFAULT_CONFIG);
    }
}
