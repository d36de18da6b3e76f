//! Presentation boundary
//!
//! The engine pulls no widgets; it tells the presentation layer to repaint
//! from the current [`AudioState`] after every reload or local mutation.
//! All calls are idempotent and must not fail loudly when nothing is shown.

use crate::state::AudioState;

pub trait Presenter {
    /// Repaint the tray icon (icon name + tooltip)
    fn refresh_tray_icon(&mut self, state: &AudioState);

    /// Repaint the volume slider
    fn refresh_volume_control(&mut self, state: &AudioState);

    /// Rebuild the profile selection menu
    fn refresh_profile_menu(&mut self, state: &AudioState);

    /// Briefly show the new volume after a user-driven change
    fn flash(&mut self, _state: &AudioState) {}
}
