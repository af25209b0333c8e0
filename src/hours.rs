//! `H:MM` hour values.
//!
//! Volunteer hours and goals travel as strings like `"3:30"`. Internally they
//! are a whole number of minutes so sums never lose precision.

use std::fmt;
use std::iter::Sum;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};

lazy_static! {
    static ref HOURS_RE: Regex = Regex::new(r"^([0-9]+):([0-5][0-9])$").unwrap();
}

/// A duration in whole minutes, displayed as `H:MM`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hours {
    minutes: u64,
}

impl Hours {
    /// Build from a minute count.
    #[must_use]
    pub const fn from_minutes(minutes: u64) -> Self {
        Self { minutes }
    }

    /// Total minutes.
    #[must_use]
    pub const fn minutes(self) -> u64 {
        self.minutes
    }

    /// Parse an `H:MM` string.
    ///
    /// # Errors
    /// * Returns a validation error when the string is not `digits:00-59`
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || Error::validation("Hours must be in HH:MM format");
        let caps = HOURS_RE.captures(s.trim()).ok_or_else(invalid)?;
        let hours: u64 = caps[1].parse().map_err(|_| invalid())?;
        let minutes: u64 = caps[2].parse().map_err(|_| invalid())?;
        hours
            .checked_mul(60)
            .and_then(|m| m.checked_add(minutes))
            .map(Self::from_minutes)
            .ok_or_else(invalid)
    }

    /// Whether `s` is a well formed `H:MM` string.
    #[must_use]
    pub fn is_valid(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    /// Sum a sequence of hour strings, ignoring malformed entries.
    pub fn total<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        values.into_iter().filter_map(|v| Self::parse(v).ok()).sum()
    }
}

impl Sum for Hours {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self::from_minutes(iter.map(|h| h.minutes).fold(0, u64::saturating_add))
    }
}

impl fmt::Display for Hours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}", self.minutes / 60, self.minutes % 60)
    }
}

/// Percentage of `goal` covered by `total`, rounded to the nearest integer.
///
/// Returns 0 when there is no goal or the goal is zero. The value is not
/// capped, so a volunteer past their goal reports more than 100.
#[must_use]
pub fn progress_percentage(total: Hours, goal: Option<Hours>) -> u64 {
    match goal {
        Some(goal) if goal.minutes() > 0 => {
            let scaled = u128::from(total.minutes()) * 100;
            let goal = u128::from(goal.minutes());
            u64::try_from((scaled + goal / 2) / goal).unwrap_or(u64::MAX)
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        assert_eq!(Hours::parse("0:05").unwrap().minutes(), 5);
        assert_eq!(Hours::parse("3:30").unwrap().minutes(), 210);
        assert_eq!(Hours::parse("120:00").unwrap().minutes(), 7200);
    }

    #[test]
    fn test_parse_rejects_bad_formats() {
        for bad in ["", "3", "3:6", "3:60", "-1:00", "1.5", "a:00", "1:00:00"] {
            assert!(Hours::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_display_pads_minutes_only() {
        assert_eq!(Hours::from_minutes(5).to_string(), "0:05");
        assert_eq!(Hours::from_minutes(7420).to_string(), "123:40");
    }

    #[test]
    fn test_total_rolls_minutes_into_hours() {
        let total = Hours::total(["1:45", "0:30", "2:50"]);
        assert_eq!(total.to_string(), "5:05");
    }

    #[test]
    fn test_total_skips_malformed() {
        assert_eq!(Hours::total(["1:00", "oops"]).to_string(), "1:00");
    }

    #[test]
    fn test_progress_percentage() {
        let goal = Hours::parse("10:00").ok();
        assert_eq!(progress_percentage(Hours::parse("2:30").unwrap(), goal), 25);
        assert_eq!(progress_percentage(Hours::parse("0:20").unwrap(), goal), 3);
        assert_eq!(progress_percentage(Hours::parse("15:00").unwrap(), goal), 150);
        assert_eq!(progress_percentage(Hours::parse("1:00").unwrap(), None), 0);
        assert_eq!(
            progress_percentage(Hours::parse("1:00").unwrap(), Some(Hours::default())),
            0
        );
    }
}
