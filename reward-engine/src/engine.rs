//! Reward generation.
//!
//! `generate` is pure apart from the injected random source: the same visit,
//! streak, totals and seed always produce the same items.

use attestation::LandmarkRegistry;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use visit_ledger::{MoonPhase, Season, VisitRecord};

use crate::bundle::{ProvenanceRecord, RewardBundle};
use crate::items::{graded_blessing, Goshuin, GoshuinVariant, PrayerCard, PrayerCardKind, RewardItem};
use crate::milestones::{check_milestones, MilestoneInput};
use crate::multiplier::RewardConfig;
use crate::rarity::roll_rarity;

/// Error types for reward generation. Only invalid input fails.
#[derive(Debug, thiserror::Error)]
pub enum RewardError {
    /// Visit references a landmark that is not registered
    #[error("Unknown landmark: {0}")]
    UnknownLandmark(String),

    /// Visit record or counters are inconsistent
    #[error("Invalid visit: {0}")]
    InvalidVisit(String),

    /// Provenance metadata could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Inputs for one reward generation.
#[derive(Debug, Clone, Copy)]
pub struct RewardContext<'a> {
    pub visit: &'a VisitRecord,
    /// Streak after this visit was applied
    pub streak: u32,
    /// Total visits including this one
    pub total_visits: usize,
    /// Milestone keys the user already holds
    pub awarded_milestones: &'a HashSet<String>,
}

/// Builds reward bundles from recorded visits.
pub struct RewardEngine {
    registry: Arc<LandmarkRegistry>,
    config: RewardConfig,
}

impl RewardEngine {
    pub fn new(registry: Arc<LandmarkRegistry>, config: RewardConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Generate the bundle for a visit.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        ctx: &RewardContext<'_>,
        rng: &mut R,
    ) -> Result<RewardBundle, RewardError> {
        let visit = ctx.visit;
        visit.validate().map_err(RewardError::InvalidVisit)?;
        if ctx.total_visits == 0 {
            return Err(RewardError::InvalidVisit(
                "total visits must include the visit being rewarded".to_string(),
            ));
        }
        let landmark = self
            .registry
            .get(&visit.landmark_id)
            .ok_or_else(|| RewardError::UnknownLandmark(visit.landmark_id.clone()))?;

        let multiplier = self.config.multiplier(visit, ctx.streak);
        let rarity = roll_rarity(multiplier.value, &self.config.rarity_thresholds, rng);
        let variant = roll_variant(visit.season, visit.moon_phase, rng);

        let goshuin = Goshuin {
            id: uuid::Uuid::new_v4().to_string(),
            landmark_id: landmark.id.clone(),
            landmark_name: landmark.name.clone(),
            rarity,
            variant,
            blessing: graded_blessing(landmark, rarity),
            cultural_value: landmark.cultural_value * u32::from(rarity.level()),
        };

        let bundle_id = uuid::Uuid::new_v4().to_string();
        let provenance = ProvenanceRecord::describe(&bundle_id, visit, landmark, &goshuin)?;

        let mut items = vec![RewardItem::Goshuin(goshuin)];

        let chance = self.config.secondary_chance(ctx.streak, multiplier.value);
        if rng.gen::<f64>() < chance {
            let kind = PrayerCardKind::from_weighted_roll(rng.gen_range(0..PrayerCardKind::total_weight()));
            items.push(RewardItem::PrayerCard(PrayerCard {
                id: uuid::Uuid::new_v4().to_string(),
                kind,
                name: kind.name().to_string(),
                rarity: kind.rarity(),
                landmark_id: landmark.id.clone(),
            }));
        }

        items.extend(check_milestones(&MilestoneInput {
            streak: ctx.streak,
            total_visits: ctx.total_visits,
            season: visit.season,
            perfect_conditions: multiplier.perfect,
            awarded: ctx.awarded_milestones,
        }));

        tracing::debug!(
            user_id = %visit.user_id,
            visit_id = %visit.id,
            rarity = %rarity,
            multiplier = multiplier.value,
            items = items.len(),
            "Reward generated"
        );

        Ok(RewardBundle {
            id: bundle_id,
            visit_id: visit.id.clone(),
            user_id: visit.user_id.clone(),
            timestamp: visit.timestamp,
            items,
            multiplier,
            provenance,
        })
    }
}

/// Seasonal variant: spring 30% sakura, autumn 30% momiji, full moon 20% moon.
fn roll_variant<R: Rng + ?Sized>(season: Season, moon: MoonPhase, rng: &mut R) -> GoshuinVariant {
    if season == Season::Spring && rng.gen_bool(0.3) {
        GoshuinVariant::Sakura
    } else if season == Season::Autumn && rng.gen_bool(0.3) {
        GoshuinVariant::Momiji
    } else if moon == MoonPhase::Full && rng.gen_bool(0.2) {
        GoshuinVariant::Moon
    } else {
        GoshuinVariant::Standard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::ItemCategory;
    use attestation::VerificationMethod;
    use chrono::{TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use visit_ledger::{offset_from_minutes, Weather};

    fn engine() -> RewardEngine {
        RewardEngine::new(Arc::new(LandmarkRegistry::tokyo_seed()), RewardConfig::default())
    }

    fn visit(landmark: &str, y: i32, m: u32, d: u32, h: u32) -> VisitRecord {
        let at = Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap();
        VisitRecord::new("u1", landmark, at, offset_from_minutes(0), VerificationMethod::Location, Weather::Clear)
    }

    #[test]
    fn test_always_has_goshuin() {
        let engine = engine();
        let awarded = HashSet::new();
        let v = visit("sensoji", 2024, 7, 10, 14);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..500 {
            let bundle = engine
                .generate(
                    &RewardContext {
                        visit: &v,
                        streak: 1,
                        total_visits: 1,
                        awarded_milestones: &awarded,
                    },
                    &mut rng,
                )
                .unwrap();
            assert!(!bundle.items.is_empty());
            assert_eq!(bundle.items[0].category(), ItemCategory::Goshuin);
            assert!(bundle.provenance.verify_hash());
        }
    }

    #[test]
    fn test_spring_full_moon_multiplier() {
        // 2024-04-23 12:00 UTC: spring afternoon under a full moon
        let v = visit("meiji-jingu", 2024, 4, 23, 12);
        assert_eq!(v.season, Season::Spring);
        assert_eq!(v.moon_phase, MoonPhase::Full);

        let awarded = HashSet::new();
        let mut rng = StdRng::seed_from_u64(2024);
        let bundle = engine()
            .generate(
                &RewardContext {
                    visit: &v,
                    streak: 1,
                    total_visits: 1,
                    awarded_milestones: &awarded,
                },
                &mut rng,
            )
            .unwrap();

        assert_eq!(bundle.multiplier.season, 1.2);
        assert_eq!(bundle.multiplier.moon, 1.5);
        assert!((bundle.multiplier.value - 1.8).abs() < 1e-9);
        assert!(!bundle.multiplier.perfect);
    }

    #[test]
    fn test_seed_determinism() {
        let engine = engine();
        let awarded = HashSet::new();
        let v = visit("nezu-jinja", 2024, 10, 5, 6);
        let ctx = RewardContext {
            visit: &v,
            streak: 12,
            total_visits: 40,
            awarded_milestones: &awarded,
        };

        let shape = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let b = engine.generate(&ctx, &mut rng).unwrap();
            b.items
                .iter()
                .map(|i| (i.category(), i.rarity()))
                .collect::<Vec<_>>()
        };
        assert_eq!(shape(99), shape(99));
    }

    #[test]
    fn test_cultural_value_scales_with_rarity() {
        let engine = engine();
        let awarded = HashSet::new();
        let v = visit("sensoji", 2024, 7, 10, 14);
        let mut rng = StdRng::seed_from_u64(11);
        let bundle = engine
            .generate(
                &RewardContext {
                    visit: &v,
                    streak: 1,
                    total_visits: 1,
                    awarded_milestones: &awarded,
                },
                &mut rng,
            )
            .unwrap();
        let g = bundle.goshuin().unwrap();
        assert_eq!(g.cultural_value, 120 * u32::from(g.rarity.level()));
    }

    #[test]
    fn test_invalid_input() {
        let engine = engine();
        let awarded = HashSet::new();
        let mut rng = StdRng::seed_from_u64(0);

        let unknown = visit("atlantis", 2024, 7, 10, 14);
        let err = engine
            .generate(
                &RewardContext {
                    visit: &unknown,
                    streak: 1,
                    total_visits: 1,
                    awarded_milestones: &awarded,
                },
                &mut rng,
            )
            .unwrap_err();
        assert!(matches!(err, RewardError::UnknownLandmark(_)));

        let v = visit("sensoji", 2024, 7, 10, 14);
        let err = engine
            .generate(
                &RewardContext {
                    visit: &v,
                    streak: 1,
                    total_visits: 0,
                    awarded_milestones: &awarded,
                },
                &mut rng,
            )
            .unwrap_err();
        assert!(matches!(err, RewardError::InvalidVisit(_)));
    }

    #[test]
    fn test_milestones_not_repeated() {
        let engine = engine();
        let mut awarded = HashSet::new();
        let v = visit("sensoji", 2024, 7, 10, 14);
        let mut rng = StdRng::seed_from_u64(5);

        let first = engine
            .generate(
                &RewardContext {
                    visit: &v,
                    streak: 1,
                    total_visits: 1,
                    awarded_milestones: &awarded,
                },
                &mut rng,
            )
            .unwrap();
        assert!(first.milestone_keys().any(|k| k == "badge_first_visit"));
        awarded.extend(first.milestone_keys().map(String::from));

        let second = engine
            .generate(
                &RewardContext {
                    visit: &v,
                    streak: 1,
                    total_visits: 2,
                    awarded_milestones: &awarded,
                },
                &mut rng,
            )
            .unwrap();
        assert_eq!(second.milestone_keys().count(), 0);
    }
}
