//! pa-applet binary entry point
//!
//! Runs the applet, or dispatches a control subcommand to a running one.

use clap::Parser;
use color_eyre::eyre::Result;
use pa_applet::{cli::Args, cli::Command, commands, config::Config, daemon};

/// Initialize logging for CLI commands: stderr, `warn` unless `RUST_LOG` says otherwise
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Install color-eyre for panic handling
    color_eyre::install().expect("Failed to install color_eyre");

    let args = Args::parse();

    match args.command {
        // No subcommand - run the applet with config defaults
        None => {
            let config = Config::load()?;
            daemon::run(config, false).await
        }

        Some(Command::Run {
            no_notifications,
            log_file,
        }) => {
            // The applet initializes its own logging from the config
            let mut config = Config::load()?;
            if no_notifications {
                config.settings.notifications = false;
            }
            daemon::run(config, log_file).await
        }

        Some(command) => {
            init_logging();
            match command {
                Command::Status { json } => commands::status(json).await,
                Command::Up => commands::volume_up().await,
                Command::Down => commands::volume_down().await,
                Command::Mute => commands::toggle_mute().await,
                Command::Profiles { json } => commands::list_profiles(json).await,
                Command::Profile { name } => commands::select_profile(&name).await,
                Command::Shutdown => commands::shutdown().await,
                Command::Validate => {
                    let config = Config::load()?;
                    config.print_summary();
                    Ok(())
                }
                Command::Run { .. } => unreachable!("handled above"),
            }
        }
    }
}
