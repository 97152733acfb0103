//! Append-only per-user visit ledger.
//!
//! Every derived figure (totals, uniqueness, same-day checks) is computed from
//! the records themselves, so it cannot drift from what was persisted.
//! A record reaches the in-memory index only after the store accepted it.

use attestation::VerificationMethod;
use chrono::{DateTime, FixedOffset, NaiveDate};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::clock::Clock;
use crate::context::VisitContext;
use crate::record::VisitRecord;
use crate::store::{DocumentStore, StoreError};

/// Collection visits are appended to.
pub const VISITS_COLLECTION: &str = "visits";

/// Error types for ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Storage rejected the write or read
    #[error("Ledger storage error: {0}")]
    Store(#[from] StoreError),

    /// A stored record could not be decoded
    #[error("Invalid visit record: {0}")]
    InvalidRecord(String),

    /// Caller passed malformed input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Visit ledger backed by a [`DocumentStore`].
pub struct VisitLedger {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    /// Per-user records in append order
    visits: RwLock<HashMap<String, Vec<VisitRecord>>>,
}

impl VisitLedger {
    /// Load all persisted visits.
    pub async fn load(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Result<Self> {
        let docs = store.load(VISITS_COLLECTION).await?;
        let mut visits: HashMap<String, Vec<VisitRecord>> = HashMap::new();
        let mut seen = HashSet::new();

        for doc in docs {
            let record: VisitRecord = serde_json::from_value(doc)
                .map_err(|e| LedgerError::InvalidRecord(e.to_string()))?;
            record.validate().map_err(LedgerError::InvalidRecord)?;
            if !seen.insert(record.id.clone()) {
                tracing::warn!(visit_id = %record.id, "Skipping duplicate visit record");
                continue;
            }
            visits.entry(record.user_id.clone()).or_default().push(record);
        }

        for records in visits.values_mut() {
            records.sort_by_key(|r| r.timestamp);
        }

        tracing::info!(
            users = visits.len(),
            visits = seen.len(),
            "Visit ledger loaded"
        );

        Ok(Self {
            store,
            clock,
            visits: RwLock::new(visits),
        })
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Append a visit. Only fails when the store rejects the write, in which
    /// case nothing is recorded.
    pub async fn record(
        &self,
        user_id: &str,
        landmark_id: &str,
        method: VerificationMethod,
        context: &VisitContext,
    ) -> Result<VisitRecord> {
        if user_id.is_empty() || landmark_id.is_empty() {
            return Err(LedgerError::InvalidInput(
                "user id and landmark id are required".to_string(),
            ));
        }

        let record = VisitRecord::new(
            user_id,
            landmark_id,
            self.clock.now(),
            context.utc_offset,
            method,
            context.weather,
        );
        let doc = serde_json::to_value(&record).map_err(StoreError::from)?;

        let mut visits = self.visits.write().await;
        if let Err(e) = self.store.append(VISITS_COLLECTION, doc).await {
            tracing::error!(user_id = %user_id, landmark_id = %landmark_id, error = %e, "Failed to persist visit");
            return Err(e.into());
        }
        visits
            .entry(user_id.to_string())
            .or_default()
            .push(record.clone());

        tracing::debug!(
            user_id = %user_id,
            landmark_id = %landmark_id,
            visit_id = %record.id,
            "Visit recorded"
        );
        Ok(record)
    }

    /// Most recent visits first.
    pub async fn history(&self, user_id: &str, limit: usize) -> Vec<VisitRecord> {
        self.visits
            .read()
            .await
            .get(user_id)
            .map(|records| records.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub async fn total_visits(&self, user_id: &str) -> usize {
        self.visits
            .read()
            .await
            .get(user_id)
            .map_or(0, |records| records.len())
    }

    pub async fn unique_landmarks(&self, user_id: &str) -> usize {
        self.visits
            .read()
            .await
            .get(user_id)
            .map_or(0, |records| {
                records
                    .iter()
                    .map(|r| r.landmark_id.as_str())
                    .collect::<HashSet<_>>()
                    .len()
            })
    }

    /// Whether any visit falls on the reference's local calendar day.
    pub async fn has_visited_today(&self, user_id: &str, reference: DateTime<FixedOffset>) -> bool {
        let offset = *reference.offset();
        let today = reference.date_naive();
        self.visits
            .read()
            .await
            .get(user_id)
            .is_some_and(|records| records.iter().any(|r| r.date_in(offset) == today))
    }

    /// Whether a specific landmark was visited on the reference's local day.
    pub async fn has_visited_landmark_on(
        &self,
        user_id: &str,
        landmark_id: &str,
        reference: DateTime<FixedOffset>,
    ) -> bool {
        let offset = *reference.offset();
        let today = reference.date_naive();
        self.visits.read().await.get(user_id).is_some_and(|records| {
            records
                .iter()
                .any(|r| r.landmark_id == landmark_id && r.date_in(offset) == today)
        })
    }

    /// Distinct local calendar days with at least one visit.
    pub async fn visit_days(&self, user_id: &str, offset: FixedOffset) -> BTreeSet<NaiveDate> {
        self.visits
            .read()
            .await
            .get(user_id)
            .map(|records| records.iter().map(|r| r.date_in(offset)).collect())
            .unwrap_or_default()
    }

    pub async fn last_visit(&self, user_id: &str) -> Option<VisitRecord> {
        self.visits
            .read()
            .await
            .get(user_id)
            .and_then(|records| records.last().cloned())
    }

    /// Users with at least one visit.
    pub async fn users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.visits.read().await.keys().cloned().collect();
        users.sort();
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::context::{offset_from_minutes, Weather};
    use crate::store::{JsonFileStore, MemoryStore};
    use chrono::{Duration, TimeZone, Utc};

    fn start() -> DateTime<chrono::Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 3, 0, 0).unwrap()
    }

    async fn ledger() -> (VisitLedger, Arc<ManualClock>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let ledger = VisitLedger::load(store.clone(), clock.clone()).await.unwrap();
        (ledger, clock, store)
    }

    fn tokyo() -> VisitContext {
        VisitContext::with_offset_minutes(Weather::Clear, 540)
    }

    #[tokio::test]
    async fn test_record_and_totals() {
        let (ledger, clock, _) = ledger().await;
        ledger.record("u1", "sensoji", VerificationMethod::Location, &tokyo()).await.unwrap();
        clock.advance(Duration::hours(1));
        ledger.record("u1", "sensoji", VerificationMethod::Photo, &tokyo()).await.unwrap();
        clock.advance(Duration::hours(1));
        let last = ledger.record("u1", "meiji-jingu", VerificationMethod::Both, &tokyo()).await.unwrap();

        assert_eq!(ledger.total_visits("u1").await, 3);
        assert_eq!(ledger.unique_landmarks("u1").await, 2);
        assert_eq!(ledger.total_visits("u2").await, 0);

        let history = ledger.history("u1", 2).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, last.id);
        assert_eq!(ledger.last_visit("u1").await.unwrap().id, last.id);
    }

    #[tokio::test]
    async fn test_same_day_in_local_calendar() {
        let (ledger, _, _) = ledger().await;
        // 03:00 UTC = 12:00 Tokyo on Apr 1
        ledger.record("u1", "sensoji", VerificationMethod::Location, &tokyo()).await.unwrap();

        let tokyo_offset = offset_from_minutes(540);
        let noon = start().with_timezone(&tokyo_offset);
        assert!(ledger.has_visited_today("u1", noon).await);
        assert!(ledger.has_visited_landmark_on("u1", "sensoji", noon).await);
        assert!(!ledger.has_visited_landmark_on("u1", "meiji-jingu", noon).await);

        // 16:00 UTC Apr 1 is already Apr 2 in Tokyo.
        let next_local_day = (start() + Duration::hours(13)).with_timezone(&tokyo_offset);
        assert!(!ledger.has_visited_today("u1", next_local_day).await);

        // ...but still Apr 1 in UTC.
        let utc_same_day = (start() + Duration::hours(13)).with_timezone(&offset_from_minutes(0));
        assert!(ledger.has_visited_today("u1", utc_same_day).await);
    }

    #[tokio::test]
    async fn test_persistence_failure_leaves_ledger_untouched() {
        let (ledger, _, store) = ledger().await;
        store.set_writable(false);
        let err = tokio_test::assert_err!(
            ledger
                .record("u1", "sensoji", VerificationMethod::Location, &tokyo())
                .await
        );
        assert!(matches!(err, LedgerError::Store(_)));
        assert_eq!(ledger.total_visits("u1").await, 0);
        assert!(store.load(VISITS_COLLECTION).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let (ledger, _, _) = ledger().await;
        let err = ledger
            .record("", "sensoji", VerificationMethod::Location, &tokyo())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_reload_from_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(start()));
        {
            let store = Arc::new(JsonFileStore::open(dir.path()).await.unwrap());
            let ledger = VisitLedger::load(store, clock.clone()).await.unwrap();
            ledger.record("u1", "sensoji", VerificationMethod::Location, &tokyo()).await.unwrap();
            clock.advance(Duration::days(1));
            ledger.record("u1", "nezu-jinja", VerificationMethod::Location, &tokyo()).await.unwrap();
        }

        let store = Arc::new(JsonFileStore::open(dir.path()).await.unwrap());
        let ledger = VisitLedger::load(store, clock).await.unwrap();
        assert_eq!(ledger.total_visits("u1").await, 2);
        assert_eq!(ledger.visit_days("u1", offset_from_minutes(540)).await.len(), 2);
        assert_eq!(ledger.users().await, vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_record() {
        let store = Arc::new(MemoryStore::new());
        store
            .append(VISITS_COLLECTION, serde_json::json!({"id": "x"}))
            .await
            .unwrap();
        let clock = Arc::new(ManualClock::new(start()));
        let result = VisitLedger::load(store, clock).await;
        assert!(matches!(result, Err(LedgerError::InvalidRecord(_))));
    }
}
