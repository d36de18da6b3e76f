//! Shared audio state
//!
//! Single owned record of the default sink's volume and mute switch plus the
//! owning card's profiles. Rebuilt from the server on every (re)connect and
//! mutated only from the event loop.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::server::CardSnapshot;
use crate::volume;

/// Amount `raise_volume`/`lower_volume` move the canonical volume
pub const VOLUME_STEP: f64 = 5.0;

/// A selectable card profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Opaque server identifier
    pub name: String,
    /// Human-readable label
    pub description: String,
    /// Higher is preferred
    pub priority: u32,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("unknown profile '{0}'")]
    UnknownProfile(String),
}

/// Volume, mute switch and profile list of the default output device
#[derive(Debug, Clone, PartialEq)]
pub struct AudioState {
    volume: f64,
    muted: bool,
    /// Sorted by descending priority. At most one entry is active.
    profiles: Vec<Profile>,
}

impl Default for AudioState {
    fn default() -> Self {
        // Muted until the first snapshot says otherwise
        Self {
            volume: volume::VOLUME_MIN,
            muted: true,
            profiles: Vec::new(),
        }
    }
}

impl AudioState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical volume in `[0, 150]`
    #[must_use]
    pub fn volume(&self) -> f64 {
        self.volume
    }

    #[must_use]
    pub fn muted(&self) -> bool {
        self.muted
    }

    #[must_use]
    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// The active profile, if any
    #[must_use]
    pub fn active_profile(&self) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.active)
    }

    /// Set the canonical volume, clamped to `[0, 150]`
    pub fn set_volume(&mut self, value: f64) {
        self.volume = volume::clamp(value);
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Step the volume up. The caller syncs it to the server.
    pub fn raise_volume(&mut self) {
        self.set_volume(self.volume + VOLUME_STEP);
    }

    /// Step the volume down. The caller syncs it to the server.
    pub fn lower_volume(&mut self) {
        self.set_volume(self.volume - VOLUME_STEP);
    }

    /// Flip the mute switch. The caller syncs it to the server.
    pub fn toggle_mute(&mut self) {
        self.muted = !self.muted;
    }

    /// Mark `name` active and every sibling inactive.
    ///
    /// Returns `Ok(false)` when `name` was already the active profile (nothing
    /// to sync), `Ok(true)` when the selection changed.
    ///
    /// # Errors
    /// Returns `ProfileError::UnknownProfile` if no profile has that name; the
    /// list is left untouched.
    pub fn select_profile(&mut self, name: &str) -> Result<bool, ProfileError> {
        if !self.profiles.iter().any(|p| p.name == name) {
            return Err(ProfileError::UnknownProfile(name.to_string()));
        }

        if self.active_profile().is_some_and(|p| p.name == name) {
            return Ok(false);
        }

        for profile in &mut self.profiles {
            profile.active = profile.name == name;
        }
        debug!("Selected profile {name}");
        Ok(true)
    }

    /// Replace the whole profile list
    pub fn replace_profiles(&mut self, profiles: Vec<Profile>) {
        self.profiles = profiles;
    }

    pub fn clear_profiles(&mut self) {
        self.profiles.clear();
    }
}

/// Build the profile list from a card snapshot.
///
/// One profile per entry, active flag taken from the snapshot's active name
/// (first match only), then a stable sort by descending priority so ties keep
/// server order.
#[must_use]
pub fn build_profiles(card: &CardSnapshot) -> Vec<Profile> {
    let mut seen_active = false;

    let mut profiles: Vec<Profile> = card
        .profiles
        .iter()
        .map(|p| {
            let active = !seen_active && card.active_profile.as_deref() == Some(p.name.as_str());
            seen_active |= active;
            Profile {
                name: p.name.clone(),
                description: p.description.clone(),
                priority: p.priority,
                active,
            }
        })
        .collect();

    profiles.sort_by(|a, b| b.priority.cmp(&a.priority));
    profiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ProfileSnapshot;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn snapshot(name: &str, priority: u32) -> ProfileSnapshot {
        ProfileSnapshot {
            name: name.to_string(),
            description: format!("{name} output"),
            priority,
        }
    }

    fn card(profiles: Vec<ProfileSnapshot>, active: Option<&str>) -> CardSnapshot {
        CardSnapshot {
            index: 0,
            profiles,
            active_profile: active.map(str::to_string),
        }
    }

    fn state_with_profiles(active: Option<&str>) -> AudioState {
        let mut state = AudioState::new();
        state.replace_profiles(build_profiles(&card(
            vec![
                snapshot("output:analog-stereo", 6500),
                snapshot("output:hdmi-stereo", 5900),
                snapshot("off", 0),
            ],
            active,
        )));
        state
    }

    #[test]
    fn test_default_state() {
        let state = AudioState::new();
        assert!(state.volume().abs() < f64::EPSILON);
        assert!(state.muted());
        assert!(state.profiles().is_empty());
        assert!(state.active_profile().is_none());
    }

    #[rstest]
    #[case(50.0, 55.0)]
    #[case(147.0, 150.0)]
    #[case(150.0, 150.0)]
    fn test_raise_volume(#[case] start: f64, #[case] expected: f64) {
        let mut state = AudioState::new();
        state.set_volume(start);
        state.raise_volume();
        assert!((state.volume() - expected).abs() < f64::EPSILON);
    }

    #[rstest]
    #[case(50.0, 45.0)]
    #[case(3.0, 0.0)]
    #[case(0.0, 0.0)]
    fn test_lower_volume(#[case] start: f64, #[case] expected: f64) {
        let mut state = AudioState::new();
        state.set_volume(start);
        state.lower_volume();
        assert!((state.volume() - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn test_volume_steps_stay_in_range() {
        let mut state = AudioState::new();
        state.set_volume(72.0);

        // Deterministic mixed walk that hits both boundaries
        for i in 0..200 {
            let before = state.volume();
            if (i / 40) % 2 == 0 {
                state.raise_volume();
            } else {
                state.lower_volume();
            }
            let after = state.volume();

            assert!((0.0..=150.0).contains(&after), "volume {after} out of range");
            let moved = (after - before).abs();
            let clamped = after == 0.0 || after == 150.0;
            assert!(
                (moved - VOLUME_STEP).abs() < f64::EPSILON || clamped,
                "step {before} -> {after}"
            );
        }
    }

    #[test]
    fn test_set_volume_clamps() {
        let mut state = AudioState::new();
        state.set_volume(400.0);
        assert!((state.volume() - 150.0).abs() < f64::EPSILON);
        state.set_volume(-1.0);
        assert!(state.volume().abs() < f64::EPSILON);
    }

    #[test]
    fn test_toggle_mute() {
        let mut state = AudioState::new();
        state.toggle_mute();
        assert!(!state.muted());
        state.toggle_mute();
        assert!(state.muted());
    }

    #[test]
    fn test_build_profiles_sorted_by_priority() {
        let profiles = build_profiles(&card(
            vec![
                snapshot("off", 0),
                snapshot("output:hdmi-stereo", 5900),
                snapshot("output:analog-stereo", 6500),
            ],
            Some("output:hdmi-stereo"),
        ));

        let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["output:analog-stereo", "output:hdmi-stereo", "off"]);
        assert_eq!(profiles.iter().filter(|p| p.active).count(), 1);
        assert!(profiles[1].active);
    }

    #[test]
    fn test_build_profiles_ties_keep_server_order() {
        let profiles = build_profiles(&card(
            vec![snapshot("b", 10), snapshot("a", 10), snapshot("c", 20)],
            None,
        ));

        let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
        assert!(profiles.iter().all(|p| !p.active));
    }

    #[test]
    fn test_build_profiles_duplicate_active_name_marks_one() {
        let profiles = build_profiles(&card(
            vec![snapshot("dup", 1), snapshot("dup", 2)],
            Some("dup"),
        ));
        assert_eq!(profiles.iter().filter(|p| p.active).count(), 1);
    }

    #[test]
    fn test_build_profiles_empty_card() {
        assert!(build_profiles(&card(vec![], Some("gone"))).is_empty());
    }

    #[test]
    fn test_replace_profiles_is_wholesale() {
        let mut state = state_with_profiles(Some("off"));
        state.replace_profiles(build_profiles(&card(vec![snapshot("new", 1)], Some("new"))));

        assert_eq!(
            state.profiles(),
            &[Profile {
                name: "new".to_string(),
                description: "new output".to_string(),
                priority: 1,
                active: true,
            }]
        );
    }

    #[test]
    fn test_select_profile_switches_active() {
        let mut state = state_with_profiles(Some("output:analog-stereo"));

        assert_eq!(state.select_profile("output:hdmi-stereo"), Ok(true));

        let active: Vec<&str> = state
            .profiles()
            .iter()
            .filter(|p| p.active)
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(active, vec!["output:hdmi-stereo"]);
    }

    #[test]
    fn test_select_profile_already_active() {
        let mut state = state_with_profiles(Some("off"));
        assert_eq!(state.select_profile("off"), Ok(false));
        assert_eq!(state.active_profile().map(|p| p.name.as_str()), Some("off"));
    }

    #[test]
    fn test_select_profile_without_active_entry() {
        let mut state = state_with_profiles(None);
        assert_eq!(state.select_profile("off"), Ok(true));
        assert_eq!(state.active_profile().map(|p| p.name.as_str()), Some("off"));
    }

    #[test]
    fn test_select_unknown_profile_leaves_list_untouched() {
        let mut state = state_with_profiles(Some("off"));
        let before = state.clone();

        assert_eq!(
            state.select_profile("output:spdif"),
            Err(ProfileError::UnknownProfile("output:spdif".to_string()))
        );
        assert_eq!(state, before);
    }

    #[test]
    fn test_select_profile_on_empty_list() {
        let mut state = AudioState::new();
        assert!(state.select_profile("anything").is_err());
        assert!(state.active_profile().is_none());
    }

    #[test]
    fn test_clear_profiles() {
        let mut state = state_with_profiles(Some("off"));
        state.clear_profiles();
        assert!(state.profiles().is_empty());
    }
}
