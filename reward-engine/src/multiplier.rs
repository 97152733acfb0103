//! Contextual reward multiplier.
//!
//! The multiplier is a product of independent factors (streak tier, time of
//! day, weather, moon, season). A product above the perfect-conditions
//! threshold earns one extra factor, and the result is capped.

use serde::{Deserialize, Serialize};
use visit_ledger::{MoonPhase, Season, TimeOfDay, VisitRecord, Weather};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// One step of the streak bonus table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreakTier {
    pub min_days: u32,
    pub factor: f64,
}

/// Roll cut-offs; a draw strictly above a threshold earns that tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RarityThresholds {
    pub legendary: f64,
    pub epic: f64,
    pub rare: f64,
    pub uncommon: f64,
}

impl Default for RarityThresholds {
    fn default() -> Self {
        Self {
            legendary: 2.5,
            epic: 1.8,
            rare: 1.2,
            uncommon: 0.6,
        }
    }
}

/// Reward tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Streak bonus steps; the highest satisfied tier applies
    pub streak_tiers: Vec<StreakTier>,
    pub dawn_bonus: f64,
    pub dusk_bonus: f64,
    pub rain_bonus: f64,
    pub snow_bonus: f64,
    pub full_moon_bonus: f64,
    pub spring_bonus: f64,
    pub summer_bonus: f64,
    pub autumn_bonus: f64,
    pub winter_bonus: f64,
    /// Product above which the perfect-conditions factor applies
    pub perfect_threshold: f64,
    pub perfect_bonus: f64,
    /// Upper bound on the final multiplier
    pub cap: f64,
    pub rarity_thresholds: RarityThresholds,
    /// Base probability of a secondary prayer card
    pub secondary_base_chance: f64,
    /// Extra secondary chance per streak day
    pub secondary_streak_step: f64,
    /// Ceiling on the streak contribution
    pub secondary_streak_max: f64,
    /// Ceiling on the final secondary chance
    pub secondary_chance_cap: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            streak_tiers: vec![
                StreakTier { min_days: 7, factor: 1.2 },
                StreakTier { min_days: 30, factor: 1.5 },
                StreakTier { min_days: 100, factor: 2.0 },
                StreakTier { min_days: 365, factor: 3.0 },
            ],
            dawn_bonus: 1.3,
            dusk_bonus: 1.1,
            rain_bonus: 1.2,
            snow_bonus: 1.5,
            full_moon_bonus: 1.5,
            spring_bonus: 1.2,
            summer_bonus: 1.0,
            autumn_bonus: 1.2,
            winter_bonus: 1.1,
            perfect_threshold: 2.0,
            perfect_bonus: 1.2,
            cap: 5.0,
            rarity_thresholds: RarityThresholds::default(),
            secondary_base_chance: 0.10,
            secondary_streak_step: 0.02,
            secondary_streak_max: 0.30,
            secondary_chance_cap: 0.95,
        }
    }
}

/// Factor breakdown and final value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Multiplier {
    pub streak: f64,
    pub time_of_day: f64,
    pub weather: f64,
    pub moon: f64,
    pub season: f64,
    /// Perfect-conditions factor was applied
    pub perfect: bool,
    /// Final capped value
    pub value: f64,
}

impl RewardConfig {
    pub fn streak_factor(&self, streak: u32) -> f64 {
        self.streak_tiers
            .iter()
            .filter(|t| streak >= t.min_days)
            .max_by_key(|t| t.min_days)
            .map_or(1.0, |t| t.factor)
    }

    pub fn time_factor(&self, time: TimeOfDay) -> f64 {
        match time {
            TimeOfDay::Dawn => self.dawn_bonus,
            TimeOfDay::Dusk => self.dusk_bonus,
            _ => 1.0,
        }
    }

    pub fn weather_factor(&self, weather: Weather) -> f64 {
        match weather {
            Weather::Rain => self.rain_bonus,
            Weather::Snow => self.snow_bonus,
            _ => 1.0,
        }
    }

    pub fn moon_factor(&self, moon: MoonPhase) -> f64 {
        if moon == MoonPhase::Full {
            self.full_moon_bonus
        } else {
            1.0
        }
    }

    pub fn season_factor(&self, season: Season) -> f64 {
        match season {
            Season::Spring => self.spring_bonus,
            Season::Summer => self.summer_bonus,
            Season::Autumn => self.autumn_bonus,
            Season::Winter => self.winter_bonus,
        }
    }

    /// Compute the multiplier for a visit at the given streak.
    pub fn multiplier(&self, visit: &VisitRecord, streak: u32) -> Multiplier {
        let streak_f = self.streak_factor(streak);
        let time = self.time_factor(visit.time_of_day);
        let weather = self.weather_factor(visit.weather);
        let moon = self.moon_factor(visit.moon_phase);
        let season = self.season_factor(visit.season);

        let mut value = streak_f * time * weather * moon * season;
        let perfect = value > self.perfect_threshold;
        if perfect {
            value *= self.perfect_bonus;
        }

        Multiplier {
            streak: streak_f,
            time_of_day: time,
            weather,
            moon,
            season,
            perfect,
            value: value.min(self.cap),
        }
    }

    /// Probability of a secondary prayer card.
    pub fn secondary_chance(&self, streak: u32, multiplier: f64) -> f64 {
        let streak_bonus = (f64::from(streak) * self.secondary_streak_step).min(self.secondary_streak_max);
        ((self.secondary_base_chance + streak_bonus) * multiplier).clamp(0.0, self.secondary_chance_cap)
    }
}
