//! Configuration for the habit loop.

use attestation::{LocationConfig, PhotoConfig};
use chrono::FixedOffset;
use reward_engine::RewardConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use visit_ledger::offset_from_minutes;

/// Error types for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level habit loop configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HabitLoopConfig {
    /// Location evidence radii and timeout
    pub location: LocationConfig,
    /// Photo acceptance policy
    pub photo: PhotoConfig,
    /// Reward tuning
    pub rewards: RewardConfig,
    /// General settings
    pub general: GeneralConfig,
}

impl HabitLoopConfig {
    /// Parse config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Load config from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Reject values the loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.location.verification_radius_m <= 0.0 {
            return Err(ConfigError::Invalid(
                "location.verification_radius_m must be positive".to_string(),
            ));
        }
        if self.location.vicinity_radius_m < self.location.verification_radius_m {
            return Err(ConfigError::Invalid(
                "location.vicinity_radius_m must be at least the verification radius".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.photo.accept_threshold) {
            return Err(ConfigError::Invalid(
                "photo.accept_threshold must be within [0, 1]".to_string(),
            ));
        }
        if self.rewards.cap < 1.0 {
            return Err(ConfigError::Invalid("rewards.cap must be at least 1.0".to_string()));
        }
        if FixedOffset::east_opt(self.general.utc_offset_minutes.saturating_mul(60)).is_none() {
            return Err(ConfigError::Invalid(
                "general.utc_offset_minutes is out of range".to_string(),
            ));
        }
        if self.general.event_buffer == 0 {
            return Err(ConfigError::Invalid("general.event_buffer must be positive".to_string()));
        }
        Ok(())
    }
}

/// How many verified visits a user may record per local day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DailyVisitPolicy {
    /// One visit per day; the loop stays completed until midnight
    #[default]
    OncePerDay,
    /// One visit per landmark per day; other landmarks stay eligible
    OncePerLandmarkPerDay,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Local offset from UTC, in minutes, for users with no timezone of
    /// their own yet
    pub utc_offset_minutes: i32,
    pub daily_visit_policy: DailyVisitPolicy,
    /// Capacity of the change-event broadcast channel
    pub event_buffer: usize,
    /// Timeout for a single mint submission
    pub mint_timeout_ms: u64,
    /// Weather lookups slower than this record `unknown`
    pub weather_timeout_ms: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            daily_visit_policy: DailyVisitPolicy::OncePerDay,
            event_buffer: 64,
            mint_timeout_ms: 5_000,
            weather_timeout_ms: 2_000,
        }
    }
}

impl GeneralConfig {
    pub fn utc_offset(&self) -> FixedOffset {
        offset_from_minutes(self.utc_offset_minutes)
    }

    pub fn mint_timeout(&self) -> Duration {
        Duration::from_millis(self.mint_timeout_ms)
    }

    pub fn weather_timeout(&self) -> Duration {
        Duration::from_millis(self.weather_timeout_ms)
    }
}
