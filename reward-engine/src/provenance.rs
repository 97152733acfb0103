//! Append-only store of reward bundles and collection statistics.
//!
//! Every statistic is a fold over the persisted bundles; nothing is cached
//! separately, so stats cannot disagree with storage.

use attestation::RarityTier;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use visit_ledger::{DocumentStore, StoreError};

use crate::bundle::RewardBundle;
use crate::items::{ItemCategory, RewardItem};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Collection bundles are appended to.
pub const BUNDLES_COLLECTION: &str = "reward_bundles";

/// Error types for provenance persistence.
#[derive(Debug, thiserror::Error)]
pub enum ProvenanceError {
    /// Storage rejected the write or read
    #[error("Provenance storage error: {0}")]
    Store(#[from] StoreError),

    /// A bundle with this id already exists
    #[error("Duplicate bundle: {0}")]
    DuplicateBundle(String),

    /// Stored bundle could not be decoded
    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),
}

/// Aggregate view of a user's collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct CollectionStats {
    pub total_bundles: usize,
    pub total_items: usize,
    /// Item count per rarity tier, across all item kinds
    pub count_by_rarity: BTreeMap<RarityTier, usize>,
    pub count_by_category: BTreeMap<ItemCategory, usize>,
    /// Sum of goshuin cultural values
    pub total_cultural_value: u64,
    /// Distinct prayer card kinds collected
    pub unique_prayer_cards: usize,
}

impl CollectionStats {
    fn add(mut self, bundle: &RewardBundle) -> Self {
        self.total_bundles += 1;
        for item in &bundle.items {
            self.total_items += 1;
            *self.count_by_rarity.entry(item.rarity()).or_insert(0) += 1;
            *self.count_by_category.entry(item.category()).or_insert(0) += 1;
            if let RewardItem::Goshuin(g) = item {
                self.total_cultural_value += u64::from(g.cultural_value);
            }
        }
        self
    }
}

/// Persists reward bundles.
pub struct ProvenanceStore {
    store: Arc<dyn DocumentStore>,
    bundles: RwLock<Vec<RewardBundle>>,
}

impl ProvenanceStore {
    /// Load every persisted bundle.
    pub async fn load(store: Arc<dyn DocumentStore>) -> Result<Self, ProvenanceError> {
        let bundles = store
            .load(BUNDLES_COLLECTION)
            .await?
            .into_iter()
            .map(|doc| {
                serde_json::from_value::<RewardBundle>(doc)
                    .map_err(|e| ProvenanceError::InvalidBundle(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let tampered = bundles
            .iter()
            .filter(|b| !b.provenance.verify_hash())
            .count();
        if tampered > 0 {
            tracing::warn!(tampered, "Provenance records with mismatched content hash");
        }
        tracing::info!(bundles = bundles.len(), "Provenance store loaded");

        Ok(Self {
            store,
            bundles: RwLock::new(bundles),
        })
    }

    /// Append a bundle. Rejects an id that was already persisted.
    pub async fn persist(&self, bundle: &RewardBundle) -> Result<(), ProvenanceError> {
        let mut bundles = self.bundles.write().await;
        if bundles.iter().any(|b| b.id == bundle.id) {
            return Err(ProvenanceError::DuplicateBundle(bundle.id.clone()));
        }

        let doc = serde_json::to_value(bundle).map_err(StoreError::from)?;
        if let Err(e) = self.store.append(BUNDLES_COLLECTION, doc).await {
            tracing::error!(bundle_id = %bundle.id, user_id = %bundle.user_id, error = %e, "Failed to persist reward bundle");
            return Err(e.into());
        }
        bundles.push(bundle.clone());

        tracing::debug!(bundle_id = %bundle.id, user_id = %bundle.user_id, "Reward bundle persisted");
        Ok(())
    }

    pub async fn stats_for(&self, user_id: &str) -> CollectionStats {
        let bundles = self.bundles.read().await;
        let mine = || bundles.iter().filter(|b| b.user_id == user_id);

        let stats = mine().fold(CollectionStats::default(), |acc, b| acc.add(b));
        let unique_cards: HashSet<_> = mine()
            .flat_map(|b| b.items.iter())
            .filter_map(|i| match i {
                RewardItem::PrayerCard(p) => Some(p.kind),
                _ => None,
            })
            .collect();

        CollectionStats {
            unique_prayer_cards: unique_cards.len(),
            ..stats
        }
    }

    /// Most recent bundles first.
    pub async fn recent(&self, user_id: &str, limit: usize) -> Vec<RewardBundle> {
        self.bundles
            .read()
            .await
            .iter()
            .rev()
            .filter(|b| b.user_id == user_id)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Milestone keys already awarded to a user.
    pub async fn awarded_milestones(&self, user_id: &str) -> HashSet<String> {
        self.bundles
            .read()
            .await
            .iter()
            .filter(|b| b.user_id == user_id)
            .flat_map(|b| b.milestone_keys())
            .map(String::from)
            .collect()
    }

    pub async fn bundle_for_visit(&self, visit_id: &str) -> Option<RewardBundle> {
        self.bundles
            .read()
            .await
            .iter()
            .find(|b| b.visit_id == visit_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RewardContext, RewardEngine};
    use crate::multiplier::RewardConfig;
    use attestation::{LandmarkRegistry, VerificationMethod};
    use chrono::{Duration, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use visit_ledger::{offset_from_minutes, MemoryStore, VisitRecord, Weather};

    fn bundles(user: &str, n: usize, seed: u64) -> Vec<RewardBundle> {
        let engine = RewardEngine::new(Arc::new(LandmarkRegistry::tokyo_seed()), RewardConfig::default());
        let mut rng = StdRng::seed_from_u64(seed);
        let mut awarded = HashSet::new();
        let start = Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap();

        (0..n)
            .map(|i| {
                let at = start + Duration::days(i as i64);
                let visit = VisitRecord::new(user, "sensoji", at, offset_from_minutes(0), VerificationMethod::Location, Weather::Clear);
                let bundle = engine
                    .generate(
                        &RewardContext {
                            visit: &visit,
                            streak: i as u32 + 1,
                            total_visits: i + 1,
                            awarded_milestones: &awarded,
                        },
                        &mut rng,
                    )
                    .unwrap();
                awarded.extend(bundle.milestone_keys().map(String::from));
                bundle
            })
            .collect()
    }

    #[tokio::test]
    async fn test_persist_and_stats() {
        let store = ProvenanceStore::load(Arc::new(MemoryStore::new())).await.unwrap();
        let generated = bundles("u1", 5, 1);
        for b in &generated {
            store.persist(b).await.unwrap();
        }
        for b in bundles("u2", 2, 2) {
            store.persist(&b).await.unwrap();
        }

        let stats = store.stats_for("u1").await;
        assert_eq!(stats.total_bundles, 5);
        assert_eq!(stats.count_by_category[&ItemCategory::Goshuin], 5);
        let item_count: usize = generated.iter().map(|b| b.items.len()).sum();
        assert_eq!(stats.total_items, item_count);
        assert_eq!(stats.count_by_rarity.values().sum::<usize>(), item_count);
        let cultural: u64 = generated
            .iter()
            .filter_map(|b| b.goshuin())
            .map(|g| u64::from(g.cultural_value))
            .sum();
        assert_eq!(stats.total_cultural_value, cultural);

        assert_eq!(store.stats_for("nobody").await, CollectionStats::default());
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let store = ProvenanceStore::load(Arc::new(MemoryStore::new())).await.unwrap();
        let b = bundles("u1", 1, 3).remove(0);
        store.persist(&b).await.unwrap();
        let err = store.persist(&b).await.unwrap_err();
        assert!(matches!(err, ProvenanceError::DuplicateBundle(_)));
        assert_eq!(store.stats_for("u1").await.total_bundles, 1);
    }

    #[tokio::test]
    async fn test_recent_and_awarded() {
        let store = ProvenanceStore::load(Arc::new(MemoryStore::new())).await.unwrap();
        let generated = bundles("u1", 4, 4);
        for b in &generated {
            store.persist(b).await.unwrap();
        }

        let recent = store.recent("u1", 2).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, generated[3].id);
        assert_eq!(recent[1].id, generated[2].id);

        let awarded = store.awarded_milestones("u1").await;
        assert!(awarded.contains("badge_first_visit"));
        assert!(awarded.contains("badge_streak_3"));
        assert!(store.bundle_for_visit(&generated[1].visit_id).await.is_some());
    }

    #[tokio::test]
    async fn test_reload_and_write_failure() {
        let backing = Arc::new(MemoryStore::new());
        let store = ProvenanceStore::load(backing.clone()).await.unwrap();
        let generated = bundles("u1", 3, 5);
        store.persist(&generated[0]).await.unwrap();

        backing.set_writable(false);
        assert!(matches!(
            store.persist(&generated[1]).await,
            Err(ProvenanceError::Store(_))
        ));
        backing.set_writable(true);

        let reloaded = ProvenanceStore::load(backing).await.unwrap();
        assert_eq!(reloaded.stats_for("u1").await.total_bundles, 1);
    }
}
