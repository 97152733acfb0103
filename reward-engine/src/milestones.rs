//! Milestone rules: badges, titles and special bonuses awarded at most once
//! per user.
//!
//! Thresholds use `>=` so a milestone missed once (e.g. a streak computed
//! across a reload) is still awarded on the next visit. The awarded set makes
//! every rule idempotent.

use attestation::RarityTier;
use std::collections::HashSet;
use visit_ledger::Season;

use crate::items::{Badge, RewardItem, SpecialBonus, Title};

pub const FIRST_VISIT: &str = "badge_first_visit";
pub const SAKURA_PILGRIM: &str = "title_sakura_pilgrim";
pub const PERFECT_CONDITIONS: &str = "bonus_perfect_conditions";

/// Streak badges: (days, name, rarity).
const STREAK_BADGES: [(u32, &str, RarityTier); 5] = [
    (3, "Three-Day Pilgrim", RarityTier::Common),
    (7, "Week of Devotion", RarityTier::Uncommon),
    (30, "Month of Devotion", RarityTier::Rare),
    (100, "Hundred-Day Pilgrimage", RarityTier::Epic),
    (365, "Year of Devotion", RarityTier::Legendary),
];

/// Total-visit titles: (visits, name, rarity).
const VISIT_TITLES: [(usize, &str, RarityTier); 5] = [
    (7, "Regular Worshipper", RarityTier::Uncommon),
    (30, "Devoted Visitor", RarityTier::Rare),
    (100, "Hundredfold Visitor", RarityTier::Epic),
    (365, "Keeper of the Calendar", RarityTier::Legendary),
    (1000, "Thousand Gates", RarityTier::Mythical),
];

/// Total visits needed before a spring visit earns the sakura title.
pub const SAKURA_PILGRIM_MIN_VISITS: usize = 10;

pub const PERFECT_BONUS_POINTS: u32 = 1000;

/// Inputs for one milestone check.
#[derive(Debug, Clone, Copy)]
pub struct MilestoneInput<'a> {
    pub streak: u32,
    pub total_visits: usize,
    pub season: Season,
    pub perfect_conditions: bool,
    pub awarded: &'a HashSet<String>,
}

/// Milestone items earned by this visit and not yet awarded.
pub fn check_milestones(input: &MilestoneInput<'_>) -> Vec<RewardItem> {
    let mut items = Vec::new();
    let mut award = |item: RewardItem| {
        if let Some(key) = item.milestone_key() {
            if !input.awarded.contains(key) {
                items.push(item);
            }
        }
    };

    if input.total_visits >= 1 {
        award(RewardItem::Badge(Badge {
            id: FIRST_VISIT.to_string(),
            name: "First Visit".to_string(),
            description: "Your first landmark visit".to_string(),
            rarity: RarityTier::Common,
        }));
    }

    for (days, name, rarity) in STREAK_BADGES {
        if input.streak >= days {
            award(RewardItem::Badge(Badge {
                id: format!("badge_streak_{days}"),
                name: name.to_string(),
                description: format!("{days} day visit streak"),
                rarity,
            }));
        }
    }

    for (visits, name, rarity) in VISIT_TITLES {
        if input.total_visits >= visits {
            award(RewardItem::Title(Title {
                id: format!("title_visits_{visits}"),
                name: name.to_string(),
                description: format!("{visits} landmark visits"),
                rarity,
            }));
        }
    }

    if input.season == Season::Spring && input.total_visits >= SAKURA_PILGRIM_MIN_VISITS {
        award(RewardItem::Title(Title {
            id: SAKURA_PILGRIM.to_string(),
            name: "Sakura Pilgrim".to_string(),
            description: "Spring visitor of many landmarks".to_string(),
            rarity: RarityTier::Rare,
        }));
    }

    if input.perfect_conditions {
        award(RewardItem::SpecialBonus(SpecialBonus {
            id: PERFECT_CONDITIONS.to_string(),
            name: "Perfect Moment".to_string(),
            description: "Visit under perfect conditions".to_string(),
            rarity: RarityTier::Epic,
            bonus_points: PERFECT_BONUS_POINTS,
        }));
    }

    items
}
