//! Backoff interval policy.
//!
//! Maps the current gap between checks to the next one. Errors hold the
//! interval, a detected change resets it to one day, and an unchanged
//! resource doubles it up to a ceiling.

use crate::error::{MonitorError, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Interval a fresh entity starts with, and the value a change resets to.
pub const MIN_INTERVAL_DAYS: u32 = 1;

/// Upper bound of the doubling sequence.
pub const DEFAULT_CEILING_DAYS: u32 = 16;

/// Largest ceiling or delay a configuration may ask for.
pub const MAX_CONFIGURED_DAYS: u32 = 36_500;

/// Verdict of one cycle, as seen by the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Resource bytes hash differently from the stored fingerprint.
    Changed,
    /// Resource bytes hash identically.
    Unchanged,
    /// The check (or the decoration that followed it) failed.
    Errored,
}

impl Verdict {
    /// Build a verdict from the two raw flags. `errored` dominates.
    pub fn from_flags(changed: bool, errored: bool) -> Self {
        if errored {
            Self::Errored
        } else if changed {
            Self::Changed
        } else {
            Self::Unchanged
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Changed => write!(f, "changed"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

/// Doubling backoff with a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalPolicy {
    /// Largest interval, in days, the doubling sequence may reach.
    pub ceiling_days: u32,
}

impl Default for IntervalPolicy {
    fn default() -> Self {
        Self {
            ceiling_days: DEFAULT_CEILING_DAYS,
        }
    }
}

impl IntervalPolicy {
    /// Policy with a custom ceiling.
    pub fn with_ceiling(ceiling_days: u32) -> Self {
        Self { ceiling_days }
    }

    /// Next interval for a cycle that ended with `verdict`.
    pub fn next(&self, current: u32, verdict: Verdict) -> u32 {
        match verdict {
            Verdict::Errored => current,
            Verdict::Changed => MIN_INTERVAL_DAYS,
            // A zero interval would never grow; treat it as the minimum before doubling.
            Verdict::Unchanged => current
                .max(MIN_INTERVAL_DAYS)
                .saturating_mul(2)
                .min(self.ceiling_days),
        }
    }
}

/// Next interval under the default ceiling.
///
/// `errored` takes precedence over `changed`: an errored cycle never
/// advances or resets the interval.
pub fn next_interval(current: u32, changed: bool, errored: bool) -> u32 {
    IntervalPolicy::default().next(current, Verdict::from_flags(changed, errored))
}

/// The instant `days` whole days after `at`.
///
/// # Errors
///
/// Returns [`MonitorError::Schedule`] when the result falls outside the
/// representable date range.
pub fn days_after(at: DateTime<Utc>, days: u32) -> Result<DateTime<Utc>> {
    TimeDelta::try_days(i64::from(days))
        .and_then(|delta| at.checked_add_signed(delta))
        .ok_or_else(|| MonitorError::Schedule(format!("{days} days after {at} is out of range")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn error_holds_interval() {
        for c in [0, 1, 2, 3, 8, 16, 32, u32::MAX] {
            assert_eq!(next_interval(c, false, true), c);
        }
    }

    #[test]
    fn error_dominates_change() {
        for c in [1, 4, 16] {
            assert_eq!(next_interval(c, true, true), c);
        }
    }

    #[test]
    fn change_resets_to_one() {
        for c in [0, 1, 2, 8, 16, u32::MAX] {
            assert_eq!(next_interval(c, true, false), 1);
        }
    }

    #[test]
    fn doubling_progression_reaches_ceiling() {
        assert_eq!(next_interval(1, false, false), 2);
        assert_eq!(next_interval(2, false, false), 4);
        assert_eq!(next_interval(4, false, false), 8);
        assert_eq!(next_interval(8, false, false), 16);
        assert_eq!(
            next_interval(DEFAULT_CEILING_DAYS, false, false),
            DEFAULT_CEILING_DAYS
        );
    }

    #[test]
    fn non_power_of_two_is_capped() {
        assert_eq!(next_interval(12, false, false), 16);
        assert_eq!(next_interval(3, false, false), 6);
    }

    #[test]
    fn zero_interval_grows() {
        assert_eq!(next_interval(0, false, false), 2);
    }

    #[test]
    fn huge_interval_does_not_overflow() {
        assert_eq!(next_interval(u32::MAX, false, false), DEFAULT_CEILING_DAYS);
    }

    #[test]
    fn custom_ceiling_is_respected() {
        let policy = IntervalPolicy::with_ceiling(32);
        assert_eq!(policy.next(16, Verdict::Unchanged), 32);
        assert_eq!(policy.next(32, Verdict::Unchanged), 32);
    }

    #[test]
    fn days_after_adds_whole_days() {
        let at = Utc::now();
        assert_eq!(days_after(at, 4).unwrap(), at + TimeDelta::days(4));
        assert_eq!(days_after(at, 0).unwrap(), at);
    }

    #[test]
    fn days_after_out_of_range_is_schedule_error() {
        let err = days_after(Utc::now(), 200_000_000).unwrap_err();
        assert!(matches!(err, MonitorError::Schedule(_)));
        assert!(days_after(Utc::now(), u32::MAX).is_err());
    }

    #[test]
    fn verdict_from_flags() {
        assert_eq!(Verdict::from_flags(true, true), Verdict::Errored);
        assert_eq!(Verdict::from_flags(true, false), Verdict::Changed);
        assert_eq!(Verdict::from_flags(false, false), Verdict::Unchanged);
        assert_eq!(Verdict::from_flags(false, true), Verdict::Errored);
    }

    #[test]
    fn verdict_display() {
        assert_eq!(Verdict::Changed.to_string(), "changed");
        assert_eq!(Verdict::Unchanged.to_string(), "unchanged");
        assert_eq!(Verdict::Errored.to_string(), "errored");
    }
}
