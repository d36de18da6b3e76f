//! Desktop presentation
//!
//! Tray icon selection using `FreeDesktop` standard icon names, the volume
//! tooltip, and on-screen volume notifications via notify-rust.

use notify_rust::{Hint, Notification};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

use crate::presenter::Presenter;
use crate::state::AudioState;

/// Icon name for the current volume and mute switch
#[must_use]
pub fn volume_icon(volume: f64, muted: bool) -> &'static str {
    if muted {
        "audio-volume-muted"
    } else if volume < 50.0 {
        "audio-volume-low"
    } else if volume < 100.0 {
        "audio-volume-medium"
    } else {
        "audio-volume-high"
    }
}

/// Tooltip text, e.g. `Volume: 75% (muted)`. The percentage is truncated.
#[must_use]
pub fn volume_tooltip(volume: f64, muted: bool) -> String {
    let percent = volume as u32;
    if muted {
        format!("Volume: {percent}% (muted)")
    } else {
        format!("Volume: {percent}%")
    }
}

/// Build a volume notification with a level bar (`value` hint).
///
/// `replaces` is the id of a notification still on screen; the server
/// updates it in place instead of stacking a new one.
#[must_use]
pub fn volume_notification(
    summary: &str,
    icon: &str,
    volume: f64,
    replaces: Option<u32>,
) -> Notification {
    let mut notification = Notification::new();
    notification
        .summary(summary)
        .appname("pa-applet")
        .icon(icon)
        .hint(Hint::CustomInt("value".to_string(), volume as i32))
        .hint(Hint::Custom("synchronous".to_string(), "volume".to_string()))
        .timeout(2000);
    if let Some(id) = replaces {
        notification.id(id);
    }
    notification
}

/// Id of the last notification we showed. Zero until the first one succeeds.
#[derive(Debug, Default, Clone)]
struct LastNotification(Arc<AtomicU32>);

impl LastNotification {
    fn get(&self) -> Option<u32> {
        match self.0.load(Ordering::Relaxed) {
            0 => None,
            id => Some(id),
        }
    }

    fn set(&self, id: u32) {
        self.0.store(id, Ordering::Relaxed);
    }
}

/// Presenter for a desktop session. Keeps the last icon and tooltip so the
/// status command can report them.
#[derive(Debug)]
pub struct DesktopPresenter {
    notifications: bool,
    icon: &'static str,
    tooltip: String,
    last_notification: LastNotification,
}

impl DesktopPresenter {
    #[must_use]
    pub fn new(notifications: bool) -> Self {
        let state = AudioState::default();
        Self {
            notifications,
            icon: volume_icon(state.volume(), state.muted()),
            tooltip: volume_tooltip(state.volume(), state.muted()),
            last_notification: LastNotification::default(),
        }
    }

    #[must_use]
    pub fn icon(&self) -> &str {
        self.icon
    }

    #[must_use]
    pub fn tooltip(&self) -> &str {
        &self.tooltip
    }
}

impl Presenter for DesktopPresenter {
    fn refresh_tray_icon(&mut self, state: &AudioState) {
        self.icon = volume_icon(state.volume(), state.muted());
        self.tooltip = volume_tooltip(state.volume(), state.muted());
        debug!("Tray: {} ({})", self.icon, self.tooltip);
    }

    fn refresh_volume_control(&mut self, state: &AudioState) {
        debug!("Volume control at {:.0}", state.volume());
    }

    fn refresh_profile_menu(&mut self, state: &AudioState) {
        debug!(
            "Profile menu: {} entries, active {:?}",
            state.profiles().len(),
            state.active_profile().map(|p| p.name.as_str())
        );
    }

    /// Must be called from inside the tokio runtime.
    fn flash(&mut self, state: &AudioState) {
        if !self.notifications {
            return;
        }

        let summary = if state.muted() { "Muted" } else { "Volume" };
        let icon = volume_icon(state.volume(), state.muted());
        let notification =
            volume_notification(summary, icon, state.volume(), self.last_notification.get());
        let last_notification = self.last_notification.clone();

        // show() is a blocking D-Bus round trip; keep it off the event loop
        let _ = tokio::task::spawn_blocking(move || match notification.show() {
            Ok(handle) => last_notification.set(handle.id()),
            Err(e) => warn!("Could not send volume notification: {e}"),
        });
    }
}
