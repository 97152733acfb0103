//! Immutable visit records.

use attestation::VerificationMethod;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::context::{offset_from_minutes, DerivedContext, MoonPhase, Season, TimeOfDay, Weather};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// One verified landmark visit. Created once, never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct VisitRecord {
    /// Unique visit id (UUID v4)
    pub id: String,
    pub user_id: String,
    pub landmark_id: String,
    /// When the visit was recorded
    pub timestamp: DateTime<Utc>,
    /// User's offset from UTC at the time of the visit, in seconds
    #[serde(default)]
    pub utc_offset_secs: i32,
    pub verification_method: VerificationMethod,
    pub season: Season,
    pub time_of_day: TimeOfDay,
    pub weather: Weather,
    pub moon_phase: MoonPhase,
}

impl VisitRecord {
    /// Build a record, deriving season, time of day and moon phase.
    pub fn new(
        user_id: impl Into<String>,
        landmark_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        offset: FixedOffset,
        verification_method: VerificationMethod,
        weather: Weather,
    ) -> Self {
        let derived = DerivedContext::derive(timestamp, offset);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            landmark_id: landmark_id.into(),
            timestamp,
            utc_offset_secs: offset.local_minus_utc(),
            verification_method,
            season: derived.season,
            time_of_day: derived.time_of_day,
            weather,
            moon_phase: derived.moon_phase,
        }
    }

    /// Offset the visit was recorded in.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_secs).unwrap_or_else(|| offset_from_minutes(0))
    }

    /// Local timestamp in the offset the visit was recorded in.
    pub fn local_time(&self) -> DateTime<FixedOffset> {
        self.timestamp.with_timezone(&self.offset())
    }

    /// Local calendar date in the offset the visit was recorded in.
    pub fn local_date(&self) -> NaiveDate {
        self.local_time().date_naive()
    }

    /// Local calendar date in another offset.
    pub fn date_in(&self, offset: FixedOffset) -> NaiveDate {
        self.timestamp.with_timezone(&offset).date_naive()
    }

    /// Basic shape checks applied to records loaded from storage.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("empty id".to_string());
        }
        if self.user_id.is_empty() {
            return Err(format!("visit {} has an empty user id", self.id));
        }
        if self.landmark_id.is_empty() {
            return Err(format!("visit {} has an empty landmark id", self.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_derives_context() {
        let at = Utc.with_ymd_and_hms(2024, 4, 10, 21, 30, 0).unwrap();
        let tokyo = offset_from_minutes(540);
        let record = VisitRecord::new("u", "sensoji", at, tokyo, VerificationMethod::Location, Weather::Rain);

        assert_eq!(record.season, Season::Spring);
        // 06:30 local
        assert_eq!(record.time_of_day, TimeOfDay::Dawn);
        assert_eq!(record.local_date(), NaiveDate::from_ymd_opt(2024, 4, 11).unwrap());
        assert_eq!(record.date_in(offset_from_minutes(0)), NaiveDate::from_ymd_opt(2024, 4, 10).unwrap());
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_serde_shape() {
        let at = Utc.with_ymd_and_hms(2024, 4, 10, 9, 0, 0).unwrap();
        let record = VisitRecord::new("u", "sensoji", at, offset_from_minutes(0), VerificationMethod::Both, Weather::Clear);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["verification_method"], "both");
        assert_eq!(json["time_of_day"], "morning");

        let back: VisitRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
