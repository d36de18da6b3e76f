//! Applet event loop
//!
//! One cooperative `select!` loop owns the engine. It drains server events,
//! fires the engine's timers, serves control requests forwarded by IPC client
//! tasks and watches for SIGINT/SIGTERM. Engine handlers only ever run here.

use color_eyre::eyre::{self, Context, Result};
use sd_notify::NotifyState;
use std::time::Duration;
use tokio::net::UnixStream;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::built_info;
use crate::config::Config;
use crate::engine::{APPLICATION_NAME, Engine, ExitReason, Flow, ProfileSwitch};
use crate::ipc::{self, IpcServer, Request, Response};
use crate::logging;
use crate::notification::DesktopPresenter;
use crate::server::Connector;
use crate::server::libpulse::PulseConnector;

/// How long in-flight IPC replies get to finish after the loop stops
const CLIENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// A control request forwarded from an IPC client task into the loop
struct ControlMessage {
    request: Request,
    reply: oneshot::Sender<Response>,
}

/// Run the applet until the server goes away, a signal arrives or shutdown is requested
///
/// # Errors
/// Returns an error if startup fails (logging, socket), or the applet stops
/// because the server has no output device or refused the connection.
pub async fn run(config: Config, log_to_file: bool) -> Result<()> {
    let _log_guard = logging::init(&config.settings.log_level, log_to_file)?;

    info!("Starting pa-applet {}", built_info::PKG_VERSION);
    let start_time = Instant::now();

    let ipc_server = IpcServer::bind().await?;
    info!("Control socket listening on {:?}", ipc_server.socket_path());

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    let connector = PulseConnector::new(APPLICATION_NAME, config.settings.server.clone());
    let presenter = DesktopPresenter::new(config.settings.notifications);
    let (mut engine, mut server_events) =
        Engine::new(connector, presenter, config.engine_options());

    let (control_tx, mut control_rx) = mpsc::channel::<ControlMessage>(16);
    let mut clients = JoinSet::new();
    let mut notified_ready = false;

    let mut flow = engine.start();

    while flow == Flow::Continue {
        let deadline = engine.next_deadline();

        flow = tokio::select! {
            Some(message) = server_events.recv() => {
                engine.handle_message(message, Instant::now())
            }

            () = sleep_until_opt(deadline) => engine.handle_deadline(Instant::now()),

            Some(control) = control_rx.recv() => {
                let uptime_secs = start_time.elapsed().as_secs();
                let (response, flow) = respond(&mut engine, control.request, uptime_secs);
                if control.reply.send(response).is_err() {
                    debug!("IPC client went away before the reply");
                }
                flow
            }

            accepted = ipc_server.accept() => {
                match accepted {
                    Ok(stream) => {
                        clients.spawn(serve_client(stream, control_tx.clone()));
                    }
                    Err(e) => warn!("{e:#}"),
                }
                Flow::Continue
            }

            Some(joined) = clients.join_next() => {
                if let Err(e) = joined {
                    error!("IPC client task failed: {e}");
                }
                Flow::Continue
            }

            _ = tokio::signal::ctrl_c() => Flow::Exit(ExitReason::Interrupted),

            _ = terminate.recv() => Flow::Exit(ExitReason::Interrupted),
        };

        if !notified_ready && engine.has_synced() {
            notified_ready = true;
            notify_systemd(NotifyState::Ready);
        }
    }

    let Flow::Exit(reason) = flow else {
        unreachable!("loop only ends on Flow::Exit");
    };

    notify_systemd(NotifyState::Stopping);
    engine.teardown();

    // Refuse queued requests, then let in-flight replies (the shutdown one included) go out
    control_rx.close();
    while let Ok(control) = control_rx.try_recv() {
        let _ = control.reply.send(Response::Error {
            message: "pa-applet is shutting down".to_string(),
        });
    }
    if time::timeout(CLIENT_DRAIN_TIMEOUT, async {
        while clients.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        clients.abort_all();
    }

    if reason.is_failure() {
        eyre::bail!("pa-applet stopped: {reason}");
    }

    info!("Shutting down ({reason})");
    Ok(())
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn notify_systemd(state: NotifyState<'_>) {
    if let Err(e) = sd_notify::notify(false, &[state]) {
        debug!("systemd notification failed: {e}");
    }
}

/// Read one request, hand it to the loop and write the reply
async fn serve_client(mut stream: UnixStream, control: mpsc::Sender<ControlMessage>) {
    let result = async {
        let request = ipc::read_request(&mut stream).await?;
        debug!("IPC request: {request:?}");

        let (reply, response) = oneshot::channel();
        control
            .send(ControlMessage { request, reply })
            .await
            .map_err(|_| eyre::eyre!("pa-applet is shutting down"))?;

        let response = response
            .await
            .context("Event loop dropped the request")?;
        ipc::write_response(&mut stream, &response).await
    }
    .await;

    if let Err(e) = result {
        error!("IPC request handling error: {e:#}");
    }
}

/// Apply a control request to the engine and build the reply
fn respond<C: Connector>(
    engine: &mut Engine<C, DesktopPresenter>,
    request: Request,
    uptime_secs: u64,
) -> (Response, Flow) {
    let response = match request {
        Request::Status => {
            let state = engine.state();
            Response::Status {
                version: built_info::PKG_VERSION.to_string(),
                uptime_secs,
                connection: engine.phase(),
                volume: state.volume(),
                muted: state.muted(),
                icon: engine.presenter().icon().to_string(),
                tooltip: engine.presenter().tooltip().to_string(),
                active_profile: state.active_profile().map(|p| p.name.clone()),
            }
        }

        Request::RaiseVolume => {
            engine.raise_volume();
            volume_response(engine)
        }

        Request::LowerVolume => {
            engine.lower_volume();
            volume_response(engine)
        }

        Request::ToggleMute => {
            engine.toggle_mute();
            volume_response(engine)
        }

        Request::ListProfiles => Response::Profiles {
            profiles: engine.state().profiles().to_vec(),
        },

        Request::SelectProfile { name } => match engine.select_profile(&name) {
            Ok(ProfileSwitch::Sent) => Response::Ok {
                message: format!("Switched to profile {name}"),
            },
            Ok(ProfileSwitch::LocalOnly) => Response::Ok {
                message: format!(
                    "Profile {name} selected locally only (audio server not reachable, card unchanged)"
                ),
            },
            Ok(ProfileSwitch::Unchanged) => Response::Ok {
                message: format!("Profile {name} is already active"),
            },
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        },

        Request::Shutdown => {
            info!("Shutdown requested via IPC");
            return (
                Response::Ok {
                    message: "pa-applet shutting down...".to_string(),
                },
                Flow::Exit(ExitReason::Requested),
            );
        }
    };

    (response, Flow::Continue)
}

fn volume_response<C: Connector>(engine: &Engine<C, DesktopPresenter>) -> Response {
    Response::Volume {
        volume: engine.state().volume(),
        muted: engine.state().muted(),
    }
}
