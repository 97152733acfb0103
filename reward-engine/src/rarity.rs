//! Weighted rarity roll.

use attestation::RarityTier;
use rand::Rng;

use crate::multiplier::RarityThresholds;

/// One uniform draw in `[0, multiplier)` mapped through the thresholds.
///
/// A higher multiplier stretches the draw range, so higher tiers become
/// reachable and more likely.
pub fn roll_rarity<R: Rng + ?Sized>(
    multiplier: f64,
    thresholds: &RarityThresholds,
    rng: &mut R,
) -> RarityTier {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return RarityTier::Common;
    }
    tier_for_roll(rng.gen_range(0.0..multiplier), thresholds)
}

/// Map a roll value to a tier.
pub fn tier_for_roll(roll: f64, thresholds: &RarityThresholds) -> RarityTier {
    if roll > thresholds.legendary {
        RarityTier::Legendary
    } else if roll > thresholds.epic {
        RarityTier::Epic
    } else if roll > thresholds.rare {
        RarityTier::Rare
    } else if roll > thresholds.uncommon {
        RarityTier::Uncommon
    } else {
        RarityTier::Common
    }
}
