//! Volume scale conversion
//!
//! The applet works on a canonical `[0, 150]` scale where 150 maps to the
//! server's UI maximum (+11 dB) and 100 is roughly the reference level.
//! The server speaks its own linear unit (`pa_volume_t`).

/// Canonical ceiling
pub const VOLUME_MAX: f64 = 150.0;

/// Canonical floor
pub const VOLUME_MIN: f64 = 0.0;

/// Server's UI maximum in native units (`PA_VOLUME_UI_MAX`, +11 dB)
pub const NATIVE_UI_MAX: u32 = 99_957;

/// Clamp a canonical volume into `[0, 150]`
#[must_use]
pub fn clamp(volume: f64) -> f64 {
    if volume.is_nan() {
        return VOLUME_MIN;
    }
    volume.clamp(VOLUME_MIN, VOLUME_MAX)
}

/// Convert a native server volume into the canonical scale.
///
/// Anything above the UI maximum is clamped to 150, never wrapped.
#[must_use]
pub fn to_canonical(native: u32) -> f64 {
    let native = native.min(NATIVE_UI_MAX);
    f64::from(native) * VOLUME_MAX / f64::from(NATIVE_UI_MAX)
}

/// Convert a canonical volume back into native server units
#[must_use]
pub fn to_native(canonical: f64) -> u32 {
    let canonical = clamp(canonical);
    (canonical * f64::from(NATIVE_UI_MAX) / VOLUME_MAX).round() as u32
}

/// Average a per-channel native volume vector, the way the server does
#[must_use]
pub fn average(channels: &[u32]) -> u32 {
    if channels.is_empty() {
        return 0;
    }
    let sum: u64 = channels.iter().map(|&v| u64::from(v)).sum();
    (sum / channels.len() as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, 0.0 ; "silence")]
    #[test_case(NATIVE_UI_MAX, 150.0 ; "ui maximum")]
    #[test_case(u32::MAX, 150.0 ; "above ui maximum clamps")]
    #[test_case(NATIVE_UI_MAX * 2, 150.0 ; "double ui maximum clamps")]
    fn test_to_canonical(native: u32, expected: f64) {
        assert!((to_canonical(native) - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn test_to_canonical_midpoint() {
        let half = to_canonical(NATIVE_UI_MAX / 2);
        assert!((half - 75.0).abs() < 0.01, "got {half}");
    }

    #[test_case(-10.0, 0 ; "negative clamps to zero")]
    #[test_case(150.0, NATIVE_UI_MAX ; "ceiling")]
    #[test_case(500.0, NATIVE_UI_MAX ; "above ceiling clamps")]
    fn test_to_native(canonical: f64, expected: u32) {
        assert_eq!(to_native(canonical), expected);
    }

    #[test]
    fn test_canonical_survives_conversion_within_one_unit() {
        for step in 0..=30 {
            let canonical = f64::from(step) * 5.0;
            let back = to_canonical(to_native(canonical));
            assert!((back - canonical).abs() < 0.01, "{canonical} -> {back}");
        }
    }

    #[test]
    fn test_clamp_nan() {
        assert!((clamp(f64::NAN) - VOLUME_MIN).abs() < f64::EPSILON);
    }

    #[test]
    fn test_average() {
        assert_eq!(average(&[]), 0);
        assert_eq!(average(&[100, 200]), 150);
        assert_eq!(average(&[u32::MAX, u32::MAX]), u32::MAX);
    }
}
