// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 sigport developers

//! Precision UTC timestamp with split whole/fractional seconds.
//!
//! Sample timing in SDR pipelines needs more resolution than a single `f64`
//! of epoch seconds can carry, so [`UtcTime`] keeps whole seconds and the
//! sub-second fraction in separate fields. Every constructor and arithmetic
//! operation normalizes so that the fraction stays in `[0.0, 1.0)` and the
//! whole-second field holds an integral value.
//!
//! # Example
//! ```
//! use sigport::UtcTime;
//!
//! let t = UtcTime::new(100.0, -3.125);
//! assert_eq!(t.wsec(), 96.0);
//! assert_eq!(t.fsec(), 0.875);
//!
//! let later = t + 0.25;
//! assert_eq!(later - t, 0.25);
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::time::{SystemTime, UNIX_EPOCH};

/// Clock that produced a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeSource {
    /// No timing information (timestamp is a placeholder).
    Off,
    /// Host CPU clock.
    Cpu,
    /// Zero-time-of-capture hardware reference.
    Ztc,
    /// SDDS-distributed time.
    Sdds,
}

/// Whether a timestamp carries meaningful time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeStatus {
    /// Timestamp fields are not meaningful.
    Invalid,
    /// Timestamp fields are meaningful.
    Valid,
}

/// UTC timestamp with separate whole and fractional seconds.
///
/// Stored values are always normalized: `wsec` is integral-valued and
/// `0.0 <= fsec < 1.0`. Comparison is a strict total order over
/// `(wsec, fsec)`; the source/status/offset fields do not participate.
#[derive(Debug, Clone, Copy)]
pub struct UtcTime {
    wsec: f64,
    fsec: f64,
    source: TimeSource,
    status: TimeStatus,
    toff: f64,
}

/// Resolve an arbitrary (whole, fraction) pair into normalized form.
///
/// Uses `floor`, not truncation, so a negative fraction borrows from the
/// whole seconds: `(100.0, -3.125)` becomes `(96.0, 0.875)`.
fn normalize(mut wsec: f64, mut fsec: f64) -> (f64, f64) {
    let frac = wsec.fract();
    if frac != 0.0 {
        wsec -= frac;
        fsec += frac;
    }
    let carry = fsec.floor();
    if carry != 0.0 {
        wsec += carry;
        fsec -= carry;
    }
    (wsec, fsec)
}

impl UtcTime {
    /// Create a normalized timestamp from whole and fractional seconds
    /// (CPU-sourced, valid).
    #[must_use]
    pub fn new(wsec: f64, fsec: f64) -> Self {
        Self::with_source(wsec, fsec, TimeSource::Cpu)
    }

    /// Create a normalized timestamp with an explicit clock source.
    #[must_use]
    pub fn with_source(wsec: f64, fsec: f64, source: TimeSource) -> Self {
        let (wsec, fsec) = normalize(wsec, fsec);
        UtcTime {
            wsec,
            fsec,
            source,
            status: TimeStatus::Valid,
            toff: 0.0,
        }
    }

    /// Current system time.
    #[must_use]
    pub fn now() -> Self {
        let (wsec, fsec) = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => (elapsed.as_secs() as f64, f64::from(elapsed.subsec_nanos()) * 1e-9),
            Err(_) => (0.0, 0.0),
        };
        Self::with_source(wsec, fsec, TimeSource::Cpu)
    }

    /// Placeholder timestamp for packets that carry no timing information
    /// (e.g. XML document pushes).
    #[must_use]
    pub fn not_set() -> Self {
        UtcTime {
            wsec: 0.0,
            fsec: 0.0,
            source: TimeSource::Off,
            status: TimeStatus::Invalid,
            toff: 0.0,
        }
    }

    /// Whole seconds since the UTC epoch (integral-valued).
    #[must_use]
    pub fn wsec(&self) -> f64 {
        self.wsec
    }

    /// Fractional seconds in `[0.0, 1.0)`.
    #[must_use]
    pub fn fsec(&self) -> f64 {
        self.fsec
    }

    /// Clock source of this timestamp.
    #[must_use]
    pub fn source(&self) -> TimeSource {
        self.source
    }

    /// Validity status of this timestamp.
    #[must_use]
    pub fn status(&self) -> TimeStatus {
        self.status
    }

    /// Fractional offset between the timestamp and the sample it marks.
    #[must_use]
    pub fn toff(&self) -> f64 {
        self.toff
    }

    /// Return this timestamp re-normalized.
    ///
    /// Stored values are already normalized, so this is a fixpoint; it is
    /// exposed for callers assembling timestamps field-by-field.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let (wsec, fsec) = normalize(self.wsec, self.fsec);
        UtcTime { wsec, fsec, ..*self }
    }

    /// Strict total order over `(wsec, fsec)`.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        self.wsec
            .total_cmp(&other.wsec)
            .then(self.fsec.total_cmp(&other.fsec))
    }
}

impl Default for UtcTime {
    fn default() -> Self {
        Self::not_set()
    }
}

impl PartialEq for UtcTime {
    fn eq(&self, other: &Self) -> bool {
        self.wsec == other.wsec && self.fsec == other.fsec
    }
}

impl PartialOrd for UtcTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Add<f64> for UtcTime {
    type Output = UtcTime;

    fn add(self, seconds: f64) -> UtcTime {
        let (wsec, fsec) = normalize(self.wsec, self.fsec + seconds);
        UtcTime { wsec, fsec, ..self }
    }
}

impl AddAssign<f64> for UtcTime {
    fn add_assign(&mut self, seconds: f64) {
        *self = *self + seconds;
    }
}

impl Sub<f64> for UtcTime {
    type Output = UtcTime;

    fn sub(self, seconds: f64) -> UtcTime {
        self + (-seconds)
    }
}

impl SubAssign<f64> for UtcTime {
    fn sub_assign(&mut self, seconds: f64) {
        *self = *self - seconds;
    }
}

/// Signed elapsed seconds between two timestamps.
impl Sub for UtcTime {
    type Output = f64;

    fn sub(self, rhs: UtcTime) -> f64 {
        (self.wsec - rhs.wsec) + (self.fsec - rhs.fsec)
    }
}

/// Days-since-epoch to (year, month, day), proleptic Gregorian.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month as u32, day as u32)
}

impl fmt::Display for UtcTime {
    /// `YYYY:MM:DD::HH:MM:SS.ssssss`, UTC, microseconds rounded to 6 digits.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut whole = self.wsec as i64;
        let mut micros = (self.fsec * 1e6).round() as i64;
        if micros >= 1_000_000 {
            whole += 1;
            micros -= 1_000_000;
        }

        let days = whole.div_euclid(86_400);
        let secs = whole.rem_euclid(86_400);
        let (year, month, day) = civil_from_days(days);

        write!(
            f,
            "{:04}:{:02}:{:02}::{:02}:{:02}:{:02}.{:06}",
            year,
            month,
            day,
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            micros
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_fraction_carry() {
        let t = UtcTime::new(100.0, 2.5);
        assert_eq!(t.wsec(), 102.0);
        assert_eq!(t.fsec(), 0.5);
    }

    #[test]
    fn test_normalize_whole_fraction_moves_down() {
        let t = UtcTime::new(100.25, 0.25);
        assert_eq!(t.wsec(), 100.0);
        assert_eq!(t.fsec(), 0.5);
    }

    #[test]
    fn test_normalize_negative_fraction_borrows() {
        let t = UtcTime::new(100.0, -3.125);
        assert_eq!(t.wsec(), 96.0);
        assert_eq!(t.fsec(), 0.875);
    }

    #[test]
    fn test_normalize_double_borrow() {
        // Fractional whole seconds and a negative fraction at the same time
        let t = UtcTime::new(100.5, -2.25);
        assert_eq!(t.wsec(), 98.0);
        assert_eq!(t.fsec(), 0.25);
    }

    #[test]
    fn test_normalize_idempotent() {
        let t = UtcTime::new(12_345.678, -0.9);
        let renorm = t.normalized();
        assert_eq!(t, renorm);
        assert!(t.fsec() >= 0.0 && t.fsec() < 1.0);
        assert_eq!(t.wsec().fract(), 0.0);
    }

    #[test]
    fn test_add_round_trip() {
        let t = UtcTime::new(1000.0, 0.25);
        for offset in [0.0625, 1.5, 100.125, 0.999_999] {
            let back = (t + offset) - offset;
            assert!((back - t).abs() < 1e-9, "offset {} did not round-trip", offset);
        }
    }

    #[test]
    fn test_difference_matches_offset() {
        let t = UtcTime::new(500.0, 0.5);
        let shifted = t + 2.375;
        assert!(((shifted - t) - 2.375).abs() < 1e-12);
        assert!(((t - shifted) + 2.375).abs() < 1e-12);
    }

    #[test]
    fn test_subtract_borrows_across_whole_seconds() {
        let t = UtcTime::new(10.0, 0.25) - 0.5;
        assert_eq!(t.wsec(), 9.0);
        assert_eq!(t.fsec(), 0.75);
    }

    #[test]
    fn test_in_place_increment_decrement() {
        let mut t = UtcTime::new(100.0, 0.0);
        t += 1.5;
        assert_eq!(t, UtcTime::new(101.0, 0.5));
        t -= 2.0;
        assert_eq!(t, UtcTime::new(99.0, 0.5));
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let a = UtcTime::new(100.0, 0.1);
        let b = UtcTime::new(100.0, 0.2);
        let c = UtcTime::new(101.0, 0.0);
        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(b.compare(&c), Ordering::Less);
        assert_eq!(c.compare(&a), Ordering::Greater);
        assert_eq!(a.compare(&a), Ordering::Equal);
        assert!(a < b && b < c);
    }

    #[test]
    fn test_ordering_consistent_after_normalization() {
        // Same instant expressed two ways
        let a = UtcTime::new(100.0, 1.5);
        let b = UtcTime::new(101.0, 0.5);
        assert_eq!(a.compare(&b), Ordering::Equal);
        assert_eq!(a, b);
    }

    #[test]
    fn test_display_epoch() {
        let t = UtcTime::new(0.0, 0.0);
        assert_eq!(t.to_string(), "1970:01:01::00:00:00.000000");
    }

    #[test]
    fn test_display_with_microseconds() {
        // 2001-02-03 04:05:06.789012 UTC
        let t = UtcTime::new(981_173_106.0, 0.789_012);
        assert_eq!(t.to_string(), "2001:02:03::04:05:06.789012");
    }

    #[test]
    fn test_display_rounds_microseconds_with_carry() {
        // 0.9999995 rounds to a full second
        let t = UtcTime::new(59.0, 0.999_999_5);
        assert_eq!(t.to_string(), "1970:01:01::00:01:00.000000");
    }

    #[test]
    fn test_not_set_is_invalid() {
        let t = UtcTime::not_set();
        assert_eq!(t.status(), TimeStatus::Invalid);
        assert_eq!(t.source(), TimeSource::Off);
        assert_eq!(t.wsec(), 0.0);
    }

    #[test]
    fn test_now_is_normalized() {
        let t = UtcTime::now();
        assert_eq!(t.status(), TimeStatus::Valid);
        assert!(t.fsec() >= 0.0 && t.fsec() < 1.0);
        assert_eq!(t.wsec().fract(), 0.0);
        assert!(t.wsec() > 1.0e9, "system clock should be past 2001");
    }
}
