//! CLI commands
//!
//! Thin IPC clients for the running applet: status, volume keys, mute, and
//! card profile selection.

use color_eyre::eyre::{self, Result};
use crossterm::style::Stylize;

use crate::ipc::{self, Request, Response};
use crate::state::Profile;
use crate::style::AppletStyle;

const NOT_RUNNING: &str = "pa-applet is not running. Start it with: pa-applet run";

/// Format uptime in human-readable form
fn format_uptime(secs: u64) -> String {
    const SECS_PER_MINUTE: u64 = 60;
    const SECS_PER_HOUR: u64 = 3600;

    if secs < SECS_PER_MINUTE {
        return format!("{secs}s");
    }
    if secs < SECS_PER_HOUR {
        return format!("{mins}m", mins = secs / SECS_PER_MINUTE);
    }
    let hours = secs / SECS_PER_HOUR;
    let mins = (secs % SECS_PER_HOUR) / SECS_PER_MINUTE;
    if mins > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{hours}h")
    }
}

/// Send a request to a running applet, failing early if none is listening
async fn request(request: Request) -> Result<Response> {
    if !ipc::is_applet_running().await {
        eyre::bail!(NOT_RUNNING);
    }

    match ipc::send_request(request).await? {
        Response::Error { message } => eyre::bail!("Error: {message}"),
        response => Ok(response),
    }
}

fn unexpected(response: &Response) -> eyre::Report {
    eyre::eyre!("Unexpected response from pa-applet: {response:?}")
}

/// Query applet status
///
/// Works without a running applet; it is then reported as not running.
///
/// # Errors
/// Returns an error if IPC communication fails or JSON serialization fails.
pub async fn status(json_output: bool) -> Result<()> {
    let status = if ipc::is_applet_running().await {
        match ipc::send_request(Request::Status).await? {
            status @ Response::Status { .. } => Some(status),
            other => return Err(unexpected(&other)),
        }
    } else {
        None
    };

    if json_output {
        let json = match status {
            Some(Response::Status {
                version,
                uptime_secs,
                connection,
                volume,
                muted,
                icon,
                tooltip,
                active_profile,
            }) => serde_json::json!({
                "running": true,
                "version": version,
                "uptime_secs": uptime_secs,
                "uptime_human": format_uptime(uptime_secs),
                "connection": connection,
                "volume": volume,
                "muted": muted,
                "icon": icon,
                "tooltip": tooltip,
                "active_profile": active_profile,
            }),
            _ => serde_json::json!({ "running": false }),
        };
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!("{}", "Applet".header());
    println!("{}", "-".repeat(6));

    let Some(Response::Status {
        version,
        uptime_secs,
        connection,
        volume,
        muted,
        icon,
        tooltip: _,
        active_profile,
    }) = status
    else {
        println!("{} {}", "Status:".dim(), "Not running".error());
        println!("  Start with: {}", "pa-applet run".technical());
        return Ok(());
    };

    println!(
        "{} {}",
        "Status:".dim(),
        format!("Running (uptime: {})", format_uptime(uptime_secs)).success()
    );
    println!("{} {}", "Version:".dim(), version);

    let connection_text = connection.to_string();
    let connection_text = if connection == crate::engine::ConnectionPhase::Ready {
        connection_text.success()
    } else {
        connection_text.warning()
    };
    println!("{} {}", "Server:".dim(), connection_text);

    println!();
    println!("{}", "Output".header());
    println!("{}", "-".repeat(6));
    print_volume(volume, muted);
    println!("{} {}", "Icon:".dim(), icon.technical());
    if let Some(profile) = active_profile {
        println!("{} {}", "Profile:".dim(), profile.technical());
    }

    Ok(())
}

fn print_volume(volume: f64, muted: bool) {
    let level = format!("{}%", volume as u32);
    if muted {
        println!("{} {} {}", "Volume:".dim(), level, "(muted)".warning());
    } else {
        println!("{} {}", "Volume:".dim(), level.bold());
    }
}

async fn volume_command(req: Request) -> Result<()> {
    match request(req).await? {
        Response::Volume { volume, muted } => {
            print_volume(volume, muted);
            Ok(())
        }
        other => Err(unexpected(&other)),
    }
}

/// Raise the volume one step
///
/// # Errors
/// Returns an error if no applet is running or IPC communication fails.
pub async fn volume_up() -> Result<()> {
    volume_command(Request::RaiseVolume).await
}

/// Lower the volume one step
///
/// # Errors
/// Returns an error if no applet is running or IPC communication fails.
pub async fn volume_down() -> Result<()> {
    volume_command(Request::LowerVolume).await
}

/// Flip the mute switch
///
/// # Errors
/// Returns an error if no applet is running or IPC communication fails.
pub async fn toggle_mute() -> Result<()> {
    volume_command(Request::ToggleMute).await
}

/// List the default output's card profiles
///
/// # Errors
/// Returns an error if no applet is running or IPC communication fails.
pub async fn list_profiles(json_output: bool) -> Result<()> {
    let profiles = match request(Request::ListProfiles).await? {
        Response::Profiles { profiles } => profiles,
        other => return Err(unexpected(&other)),
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&profiles)?);
        return Ok(());
    }

    println!("{}", "PROFILES:".header());
    println!("{}", "-".repeat(9));
    if profiles.is_empty() {
        println!("  {}", "(none)".dim());
        return Ok(());
    }

    for line in profile_lines(&profiles) {
        println!("{line}");
    }
    println!("\n  {} = active", "*".dim());

    Ok(())
}

fn profile_lines(profiles: &[Profile]) -> Vec<String> {
    profiles
        .iter()
        .map(|p| {
            let marker = if p.active { "* " } else { "  " };
            format!("{marker}{} - {}", p.name, p.description)
        })
        .collect()
}

/// Switch the card to profile `name`
///
/// # Errors
/// Returns an error if no applet is running, the profile is unknown, or IPC fails.
pub async fn select_profile(name: &str) -> Result<()> {
    let req = Request::SelectProfile {
        name: name.to_string(),
    };
    match request(req).await? {
        Response::Ok { message } => {
            println!("{}", message.success());
            Ok(())
        }
        other => Err(unexpected(&other)),
    }
}

/// Gracefully stop the applet
///
/// # Errors
/// Returns an error if no applet is running or IPC communication fails.
pub async fn shutdown() -> Result<()> {
    match request(Request::Shutdown).await? {
        Response::Ok { message } => {
            println!("{}", message.success());
            Ok(())
        }
        other => Err(unexpected(&other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, "0s")]
    #[test_case(59, "59s")]
    #[test_case(60, "1m")]
    #[test_case(3599, "59m")]
    #[test_case(3600, "1h")]
    #[test_case(5400, "1h 30m")]
    fn test_format_uptime(secs: u64, expected: &str) {
        assert_eq!(format_uptime(secs), expected);
    }

    #[test]
    fn test_profile_lines_mark_active() {
        let profiles = vec![
            Profile {
                name: "output:hdmi-stereo".to_string(),
                description: "Digital Stereo (HDMI)".to_string(),
                priority: 5900,
                active: true,
            },
            Profile {
                name: "off".to_string(),
                description: "Off".to_string(),
                priority: 0,
                active: false,
            },
        ];

        assert_eq!(
            profile_lines(&profiles),
            vec![
                "* output:hdmi-stereo - Digital Stereo (HDMI)".to_string(),
                "  off - Off".to_string(),
            ]
        );
    }
}
