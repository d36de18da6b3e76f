//! Command-line interface definitions
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Parser, Subcommand};

/// pa-applet - PulseAudio volume applet
///
/// Keeps a tray icon, volume control and card profile menu in sync with the
/// default output device.
#[derive(Parser)]
#[command(name = "pa-applet")]
#[command(version)]
#[command(about = "PulseAudio volume applet for the system tray")]
#[command(after_help = "\
BEHAVIOR:
  - Follows the server's default output device and its card
  - Volume is shown on a 0-150 scale (100 = nominal full volume)
  - Reconnects every second while the server is unreachable
  - Exits when the server has no output device or shuts the client down

APPLET:
  pa-applet                Run the applet (same as: pa-applet run)
  pa-applet run --log-file Log to a rotating file instead of stderr
  pa-applet status         Query applet status
  pa-applet shutdown       Gracefully stop the applet

CONTROL (for key bindings):
  pa-applet up             Raise the volume one step
  pa-applet down           Lower the volume one step
  pa-applet mute           Toggle mute
  pa-applet profiles       List card profiles
  pa-applet profile NAME   Switch the card profile

LOCAL:
  pa-applet validate       Validate config file (no applet needed)

IPC SOCKET:
  $XDG_RUNTIME_DIR/pa-applet.sock (or /tmp/pa-applet-$UID.sock)")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run the applet (default)
    Run {
        /// Disable desktop volume notifications
        #[arg(long)]
        no_notifications: bool,

        /// Log to a rotating file in the state directory
        #[arg(long)]
        log_file: bool,
    },

    /// Query applet status via IPC
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Raise the volume one step
    Up,

    /// Lower the volume one step
    Down,

    /// Toggle mute
    Mute,

    /// List the default output's card profiles
    Profiles {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Switch the card to a profile
    Profile {
        /// Profile name as listed by `pa-applet profiles`
        name: String,
    },

    /// Gracefully shutdown the applet
    Shutdown,

    /// Validate config file (local, no applet needed)
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_runs_applet() {
        let args = Args::try_parse_from(["pa-applet"]).unwrap();
        assert!(args.command.is_none());
    }

    #[test]
    fn test_run_flags() {
        let args =
            Args::try_parse_from(["pa-applet", "run", "--no-notifications", "--log-file"]).unwrap();
        assert!(matches!(
            args.command,
            Some(Command::Run {
                no_notifications: true,
                log_file: true
            })
        ));
    }

    #[test]
    fn test_profile_requires_name() {
        assert!(Args::try_parse_from(["pa-applet", "profile"]).is_err());

        let args = Args::try_parse_from(["pa-applet", "profile", "off"]).unwrap();
        assert!(matches!(args.command, Some(Command::Profile { name }) if name == "off"));
    }
}
