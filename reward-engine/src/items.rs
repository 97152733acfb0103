//! Collectible reward items.

use attestation::{Landmark, RarityTier};
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Broad item family, used for collection statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Goshuin,
    PrayerCard,
    Badge,
    Title,
    SpecialBonus,
}

impl ItemCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Goshuin => "goshuin",
            Self::PrayerCard => "prayer_card",
            Self::Badge => "badge",
            Self::Title => "title",
            Self::SpecialBonus => "special_bonus",
        }
    }
}

impl fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seasonal artwork variant of a goshuin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum GoshuinVariant {
    #[default]
    Standard,
    /// Cherry blossom (spring)
    Sakura,
    /// Maple leaves (autumn)
    Momiji,
    /// Moon glow (full moon)
    Moon,
}

impl GoshuinVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Sakura => "sakura",
            Self::Momiji => "momiji",
            Self::Moon => "moon",
        }
    }
}

/// Shrine seal, always present in a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Goshuin {
    pub id: String,
    pub landmark_id: String,
    pub landmark_name: String,
    pub rarity: RarityTier,
    pub variant: GoshuinVariant,
    pub blessing: String,
    pub cultural_value: u32,
}

/// Blessing text for a landmark, graded by rarity.
pub fn graded_blessing(landmark: &Landmark, rarity: RarityTier) -> String {
    let base = landmark.blessing_text();
    match rarity {
        RarityTier::Common => base.to_string(),
        RarityTier::Uncommon => format!("{base} - with a special blessing"),
        RarityTier::Rare => format!("{base} - under the guardian's protection"),
        RarityTier::Epic => format!("{base} - by sacred protection"),
        RarityTier::Legendary => format!("{base} - an everlasting grace"),
        RarityTier::Mythical => format!("{base} - beyond the reach of time"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum PrayerCardKind {
    Health,
    Business,
    Study,
    Love,
    Safety,
}

impl PrayerCardKind {
    pub const ALL: [Self; 5] = [
        Self::Health,
        Self::Business,
        Self::Study,
        Self::Love,
        Self::Safety,
    ];

    /// Relative draw weight.
    pub fn weight(&self) -> u32 {
        match self {
            Self::Health => 30,
            Self::Business => 25,
            Self::Study => 20,
            Self::Love => 15,
            Self::Safety => 10,
        }
    }

    pub fn rarity(&self) -> RarityTier {
        match self {
            Self::Health => RarityTier::Common,
            Self::Business | Self::Study => RarityTier::Uncommon,
            Self::Love | Self::Safety => RarityTier::Rare,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Health => "Health Charm",
            Self::Business => "Prosperity Charm",
            Self::Study => "Scholar's Charm",
            Self::Love => "Bond Charm",
            Self::Safety => "Safe Travels Charm",
        }
    }

    /// Pick a kind by walking the cumulative weights with `roll` in `[0, total)`.
    pub fn from_weighted_roll(roll: u32) -> Self {
        let mut remaining = roll;
        for kind in Self::ALL {
            if remaining < kind.weight() {
                return kind;
            }
            remaining -= kind.weight();
        }
        Self::Safety
    }

    pub fn total_weight() -> u32 {
        Self::ALL.iter().map(|k| k.weight()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct PrayerCard {
    pub id: String,
    pub kind: PrayerCardKind,
    pub name: String,
    pub rarity: RarityTier,
    /// Landmark the card was received at
    pub landmark_id: String,
}

/// Milestone badge. `id` is the milestone key, unique per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Badge {
    pub id: String,
    pub name: String,
    pub description: String,
    pub rarity: RarityTier,
}

/// Milestone title. `id` is the milestone key, unique per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Title {
    pub id: String,
    pub name: String,
    pub description: String,
    pub rarity: RarityTier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct SpecialBonus {
    pub id: String,
    pub name: String,
    pub description: String,
    pub rarity: RarityTier,
    pub bonus_points: u32,
}

/// One collectible in a reward bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RewardItem {
    Goshuin(Goshuin),
    PrayerCard(PrayerCard),
    Badge(Badge),
    Title(Title),
    SpecialBonus(SpecialBonus),
}

impl RewardItem {
    pub fn id(&self) -> &str {
        match self {
            Self::Goshuin(g) => &g.id,
            Self::PrayerCard(p) => &p.id,
            Self::Badge(b) => &b.id,
            Self::Title(t) => &t.id,
            Self::SpecialBonus(s) => &s.id,
        }
    }

    pub fn rarity(&self) -> RarityTier {
        match self {
            Self::Goshuin(g) => g.rarity,
            Self::PrayerCard(p) => p.rarity,
            Self::Badge(b) => b.rarity,
            Self::Title(t) => t.rarity,
            Self::SpecialBonus(s) => s.rarity,
        }
    }

    pub fn category(&self) -> ItemCategory {
        match self {
            Self::Goshuin(_) => ItemCategory::Goshuin,
            Self::PrayerCard(_) => ItemCategory::PrayerCard,
            Self::Badge(_) => ItemCategory::Badge,
            Self::Title(_) => ItemCategory::Title,
            Self::SpecialBonus(_) => ItemCategory::SpecialBonus,
        }
    }

    /// Milestone key, for items awarded at most once per user.
    pub fn milestone_key(&self) -> Option<&str> {
        match self {
            Self::Badge(b) => Some(&b.id),
            Self::Title(t) => Some(&t.id),
            Self::SpecialBonus(s) => Some(&s.id),
            Self::Goshuin(_) | Self::PrayerCard(_) => None,
        }
    }
}
