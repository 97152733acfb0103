//! Reward Engine - variable rewards for verified visits
//!
//! Turns a recorded visit into a reward bundle:
//! - Contextual multiplier (streak, time of day, weather, moon, season)
//! - Weighted rarity roll from an injected random source
//! - Bundle assembly: goshuin, optional prayer card, milestones
//! - Self-describing provenance record with a content hash
//!
//! # Architecture
//!
//! ```text
//! VisitRecord + streak + totals
//!              │
//!              ▼
//! ┌─────────────────────────┐      ┌──────────────────┐
//! │      RewardEngine       │─────▶│ ProvenanceStore  │
//! │ multiplier → rarity →   │      │ (append-only,    │
//! │ items → provenance      │      │  stats folds)    │
//! └─────────────────────────┘      └──────────────────┘
//!              │
//!              ▼
//!       ┌─────────────┐
//!       │  MintQueue  │──▶ MintLedger (external, optional)
//!       └─────────────┘
//! ```

pub mod bundle;
pub mod engine;
pub mod items;
pub mod milestones;
pub mod mint;
pub mod multiplier;
pub mod provenance;
pub mod rarity;

pub use bundle::{Attribute, ProvenanceRecord, RewardBundle};
pub use engine::{RewardContext, RewardEngine, RewardError};
pub use items::{
    Badge, Goshuin, GoshuinVariant, ItemCategory, PrayerCard, PrayerCardKind, RewardItem,
    SpecialBonus, Title,
};
pub use mint::{
    FlushReport, LocalMintLedger, MintError, MintLedger, MintOutcome, MintQueue, MintReceipt,
    OfflineMintLedger,
};
pub use multiplier::{Multiplier, RarityThresholds, RewardConfig, StreakTier};
pub use provenance::{CollectionStats, ProvenanceError, ProvenanceStore};
pub use rarity::roll_rarity;
