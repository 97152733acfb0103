//! Contextual attributes derived for each visit: season, time of day, moon
//! phase and weather.
//!
//! Season and time of day are evaluated in the user's local offset; the moon
//! phase is a function of the absolute instant.

use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Reference new moon used as the synodic epoch (2000-01-06 18:14 UTC).
pub const NEW_MOON_EPOCH_UNIX_SECS: i64 = 947_182_440;

/// Mean synodic month in days.
pub const SYNODIC_MONTH_DAYS: f64 = 29.530_588_67;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
}

impl Season {
    /// Spring Mar-May, summer Jun-Aug, autumn Sep-Nov, winter Dec-Feb.
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Self::Spring,
            6..=8 => Self::Summer,
            9..=11 => Self::Autumn,
            _ => Self::Winter,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spring => "spring",
            Self::Summer => "summer",
            Self::Autumn => "autumn",
            Self::Winter => "winter",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Dawn,
    Morning,
    Afternoon,
    Dusk,
    Night,
}

impl TimeOfDay {
    /// Dawn 5-8, morning 8-12, afternoon 12-17, dusk 17-20, night otherwise.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=7 => Self::Dawn,
            8..=11 => Self::Morning,
            12..=16 => Self::Afternoon,
            17..=19 => Self::Dusk,
            _ => Self::Night,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dawn => "dawn",
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Dusk => "dusk",
            Self::Night => "night",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum MoonPhase {
    New,
    WaxingCrescent,
    FirstQuarter,
    WaxingGibbous,
    Full,
    WaningGibbous,
    LastQuarter,
    WaningCrescent,
}

impl MoonPhase {
    /// Fraction of the synodic cycle elapsed at `at`, in [0, 1).
    pub fn cycle_fraction(at: DateTime<Utc>) -> f64 {
        let secs = (at.timestamp() - NEW_MOON_EPOCH_UNIX_SECS) as f64
            + f64::from(at.timestamp_subsec_millis()) / 1000.0;
        let days = secs / 86_400.0;
        days.rem_euclid(SYNODIC_MONTH_DAYS) / SYNODIC_MONTH_DAYS
    }

    /// Phase at an instant, eight phases split on sixteenths of the cycle.
    pub fn at(at: DateTime<Utc>) -> Self {
        Self::from_fraction(Self::cycle_fraction(at))
    }

    pub fn from_fraction(phase: f64) -> Self {
        if phase < 0.0625 {
            Self::New
        } else if phase < 0.1875 {
            Self::WaxingCrescent
        } else if phase < 0.3125 {
            Self::FirstQuarter
        } else if phase < 0.4375 {
            Self::WaxingGibbous
        } else if phase < 0.5625 {
            Self::Full
        } else if phase < 0.6875 {
            Self::WaningGibbous
        } else if phase < 0.8125 {
            Self::LastQuarter
        } else if phase < 0.9375 {
            Self::WaningCrescent
        } else {
            Self::New
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::WaxingCrescent => "waxing_crescent",
            Self::FirstQuarter => "first_quarter",
            Self::WaxingGibbous => "waxing_gibbous",
            Self::Full => "full",
            Self::WaningGibbous => "waning_gibbous",
            Self::LastQuarter => "last_quarter",
            Self::WaningCrescent => "waning_crescent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    Clear,
    Cloudy,
    Rain,
    Snow,
    Fog,
    #[default]
    Unknown,
}

impl Weather {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Cloudy => "cloudy",
            Self::Rain => "rain",
            Self::Snow => "snow",
            Self::Fog => "fog",
            Self::Unknown => "unknown",
        }
    }
}

macro_rules! display_via_as_str {
    ($($t:ty),*) => {
        $(impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_via_as_str!(Season, TimeOfDay, MoonPhase, Weather);

/// Caller-supplied context for recording a visit.
#[derive(Debug, Clone, Copy)]
pub struct VisitContext {
    pub weather: Weather,
    /// The user's local offset from UTC
    pub utc_offset: FixedOffset,
}

impl VisitContext {
    pub fn new(weather: Weather, utc_offset: FixedOffset) -> Self {
        Self {
            weather,
            utc_offset,
        }
    }

    /// Build from an offset in minutes, falling back to UTC when out of range.
    pub fn with_offset_minutes(weather: Weather, minutes: i32) -> Self {
        Self::new(weather, offset_from_minutes(minutes))
    }
}

impl Default for VisitContext {
    fn default() -> Self {
        Self::new(Weather::Unknown, offset_from_minutes(0))
    }
}

/// `FixedOffset` from minutes east of UTC; out-of-range values map to UTC.
pub fn offset_from_minutes(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
}

/// Everything derived from the instant and local offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedContext {
    pub season: Season,
    pub time_of_day: TimeOfDay,
    pub moon_phase: MoonPhase,
}

impl DerivedContext {
    pub fn derive(at: DateTime<Utc>, offset: FixedOffset) -> Self {
        let local = at.with_timezone(&offset);
        Self {
            season: Season::from_month(local.month()),
            time_of_day: TimeOfDay::from_hour(local.hour()),
            moon_phase: MoonPhase::at(at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_epoch_constant() {
        let epoch = Utc.with_ymd_and_hms(2000, 1, 6, 18, 14, 0).unwrap();
        assert_eq!(epoch.timestamp(), NEW_MOON_EPOCH_UNIX_SECS);
        assert_eq!(MoonPhase::at(epoch), MoonPhase::New);
    }

    #[test]
    fn test_full_moon_half_cycle_later() {
        let epoch = Utc.with_ymd_and_hms(2000, 1, 6, 18, 14, 0).unwrap();
        let half = epoch + Duration::seconds((SYNODIC_MONTH_DAYS / 2.0 * 86_400.0) as i64);
        assert_eq!(MoonPhase::at(half), MoonPhase::Full);

        // Many cycles later still lands on full.
        let later = half + Duration::seconds((SYNODIC_MONTH_DAYS * 300.0 * 86_400.0) as i64);
        assert_eq!(MoonPhase::at(later), MoonPhase::Full);
    }

    #[test]
    fn test_before_epoch_wraps() {
        let epoch = Utc.with_ymd_and_hms(2000, 1, 6, 18, 14, 0).unwrap();
        let before = epoch - Duration::days(1);
        assert_eq!(MoonPhase::at(before), MoonPhase::New);
        let f = MoonPhase::cycle_fraction(before);
        assert!((0.0..1.0).contains(&f));
    }

    #[test]
    fn test_phase_boundaries() {
        assert_eq!(MoonPhase::from_fraction(0.0), MoonPhase::New);
        assert_eq!(MoonPhase::from_fraction(0.0625), MoonPhase::WaxingCrescent);
        assert_eq!(MoonPhase::from_fraction(0.5), MoonPhase::Full);
        assert_eq!(MoonPhase::from_fraction(0.9), MoonPhase::WaningCrescent);
        assert_eq!(MoonPhase::from_fraction(0.95), MoonPhase::New);
    }

    #[test]
    fn test_season_and_time_of_day() {
        assert_eq!(Season::from_month(3), Season::Spring);
        assert_eq!(Season::from_month(8), Season::Summer);
        assert_eq!(Season::from_month(11), Season::Autumn);
        assert_eq!(Season::from_month(12), Season::Winter);
        assert_eq!(Season::from_month(2), Season::Winter);

        assert_eq!(TimeOfDay::from_hour(4), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(5), TimeOfDay::Dawn);
        assert_eq!(TimeOfDay::from_hour(8), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(12), TimeOfDay::Afternoon);
        assert_eq!(TimeOfDay::from_hour(17), TimeOfDay::Dusk);
        assert_eq!(TimeOfDay::from_hour(20), TimeOfDay::Night);
    }

    #[test]
    fn test_derive_uses_local_offset() {
        // 22:00 UTC on Feb 28 is 07:00 on Feb 29 in Tokyo.
        let at = Utc.with_ymd_and_hms(2024, 2, 28, 22, 0, 0).unwrap();
        let tokyo = offset_from_minutes(9 * 60);
        let derived = DerivedContext::derive(at, tokyo);
        assert_eq!(derived.season, Season::Winter);
        assert_eq!(derived.time_of_day, TimeOfDay::Dawn);

        let utc = DerivedContext::derive(at, offset_from_minutes(0));
        assert_eq!(utc.time_of_day, TimeOfDay::Night);
    }

    #[test]
    fn test_out_of_range_offset_is_utc() {
        assert_eq!(offset_from_minutes(100_000).local_minus_utc(), 0);
    }
}
