//! Queue for submitting provenance records to an external ledger.
//!
//! The ledger is an opaque collaborator: it takes a finalized provenance record
//! and returns a receipt id. When it is unreachable the record stays pending
//! (persisted) and [`MintQueue::flush`] retries in FIFO order later.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use visit_ledger::{DocumentStore, StoreError};

use crate::bundle::ProvenanceRecord;

/// Key of the persisted pending list.
pub const PENDING_KEY: &str = "mint_pending";

/// Collection receipts are appended to.
pub const RECEIPTS_COLLECTION: &str = "mint_receipts";

/// Error types for mint submission.
#[derive(Debug, thiserror::Error)]
pub enum MintError {
    /// Ledger could not be reached
    #[error("Ledger unreachable: {0}")]
    Unreachable(String),

    /// Ledger refused the record
    #[error("Ledger rejected record: {0}")]
    Rejected(String),

    /// No response within the timeout
    #[error("Ledger submission timed out")]
    Timeout,

    /// Queue state could not be persisted
    #[error("Mint queue storage error: {0}")]
    Store(#[from] StoreError),
}

/// Receipt returned by the ledger for a minted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MintReceipt {
    /// Opaque id issued by the ledger
    pub receipt_id: String,
    pub provenance_id: String,
    pub bundle_id: String,
    pub minted_at: DateTime<Utc>,
}

/// External ledger collaborator.
#[async_trait]
pub trait MintLedger: Send + Sync {
    async fn submit(&self, record: &ProvenanceRecord) -> Result<MintReceipt, MintError>;
}

/// Ledger that is never reachable. Everything stays queued.
#[derive(Debug, Default)]
pub struct OfflineMintLedger;

#[async_trait]
impl MintLedger for OfflineMintLedger {
    async fn submit(&self, _record: &ProvenanceRecord) -> Result<MintReceipt, MintError> {
        Err(MintError::Unreachable("no ledger configured".to_string()))
    }
}

/// Ledger that issues local receipts. Availability can be toggled.
pub struct LocalMintLedger {
    available: AtomicBool,
}

impl LocalMintLedger {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
        }
    }

    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl Default for LocalMintLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MintLedger for LocalMintLedger {
    async fn submit(&self, record: &ProvenanceRecord) -> Result<MintReceipt, MintError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(MintError::Unreachable("local ledger offline".to_string()));
        }
        if !record.verify_hash() {
            return Err(MintError::Rejected(format!(
                "content hash mismatch for {}",
                record.id
            )));
        }
        Ok(MintReceipt {
            receipt_id: uuid::Uuid::new_v4().to_string(),
            provenance_id: record.id.clone(),
            bundle_id: record.bundle_id.clone(),
            minted_at: Utc::now(),
        })
    }
}

/// Result of a single submission.
#[derive(Debug, Clone, PartialEq)]
pub enum MintOutcome {
    Minted(MintReceipt),
    /// Kept for retry; `pending` is the queue length afterwards
    Queued { pending: usize },
}

/// Result of a flush.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    pub minted: Vec<MintReceipt>,
    pub remaining: usize,
}

struct QueueState {
    pending: VecDeque<ProvenanceRecord>,
    /// Pending list differs from what is persisted
    dirty: bool,
    /// Issued receipts the store has not taken yet
    unsaved_receipts: Vec<MintReceipt>,
}

/// Submits records, queueing those the ledger cannot take right now.
///
/// A record leaves the queue as soon as the ledger issues a receipt, so it
/// is never submitted twice. Receipts the store rejects are held in memory
/// and written on the next `submit` or `flush`.
pub struct MintQueue {
    ledger: Arc<dyn MintLedger>,
    store: Arc<dyn DocumentStore>,
    timeout: Duration,
    state: Mutex<QueueState>,
}

impl MintQueue {
    /// Restore the pending list from storage.
    pub async fn load(
        ledger: Arc<dyn MintLedger>,
        store: Arc<dyn DocumentStore>,
        timeout: Duration,
    ) -> Result<Self, MintError> {
        let pending: VecDeque<ProvenanceRecord> = match store.get(PENDING_KEY).await? {
            Some(doc) => serde_json::from_value(doc).map_err(StoreError::from)?,
            None => VecDeque::new(),
        };
        if !pending.is_empty() {
            tracing::info!(pending = pending.len(), "Restored pending mints");
        }
        Ok(Self {
            ledger,
            store,
            timeout,
            state: Mutex::new(QueueState {
                pending,
                dirty: false,
                unsaved_receipts: Vec::new(),
            }),
        })
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Pending records in submission order.
    pub async fn pending(&self) -> Vec<ProvenanceRecord> {
        self.state.lock().await.pending.iter().cloned().collect()
    }

    /// Submit a record, queueing it if the ledger fails.
    ///
    /// Records go straight to the back of the queue while older ones are
    /// still pending, so minting order matches submission order.
    pub async fn submit(&self, record: ProvenanceRecord) -> Result<MintOutcome, MintError> {
        let mut state = self.state.lock().await;
        self.write_unsaved_receipts(&mut state).await;

        if state.pending.is_empty() {
            match self.try_submit(&record).await {
                Ok(receipt) => {
                    self.keep_receipt(&mut state, receipt.clone()).await;
                    return Ok(MintOutcome::Minted(receipt));
                }
                Err(e) => {
                    tracing::warn!(provenance_id = %record.id, error = %e, "Mint failed, queueing for retry");
                }
            }
        }

        state.pending.push_back(record);
        state.dirty = true;
        self.save_pending(&mut state).await?;
        Ok(MintOutcome::Queued {
            pending: state.pending.len(),
        })
    }

    /// Retry pending records oldest first, stopping at the first failure.
    ///
    /// Minted records are reported even when the shortened pending list
    /// cannot be persisted yet; that write is retried on the next call.
    pub async fn flush(&self) -> Result<FlushReport, MintError> {
        let mut state = self.state.lock().await;
        self.write_unsaved_receipts(&mut state).await;
        let mut minted = Vec::new();

        while let Some(record) = state.pending.front().cloned() {
            match self.try_submit(&record).await {
                Ok(receipt) => {
                    state.pending.pop_front();
                    state.dirty = true;
                    self.keep_receipt(&mut state, receipt.clone()).await;
                    minted.push(receipt);
                }
                Err(e) => {
                    tracing::warn!(provenance_id = %record.id, error = %e, "Flush stopped");
                    break;
                }
            }
        }

        if let Err(e) = self.save_pending(&mut state).await {
            tracing::warn!(error = %e, "Failed to persist pending mints, will retry");
        }
        if !minted.is_empty() {
            tracing::info!(minted = minted.len(), remaining = state.pending.len(), "Flushed pending mints");
        }

        Ok(FlushReport {
            minted,
            remaining: state.pending.len(),
        })
    }

    /// Every receipt issued so far, including any not yet persisted.
    pub async fn receipts(&self) -> Result<Vec<MintReceipt>, MintError> {
        let mut receipts = self
            .store
            .load(RECEIPTS_COLLECTION)
            .await?
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(|e| MintError::Store(e.into())))
            .collect::<Result<Vec<MintReceipt>, MintError>>()?;
        receipts.extend(self.state.lock().await.unsaved_receipts.iter().cloned());
        Ok(receipts)
    }

    async fn try_submit(&self, record: &ProvenanceRecord) -> Result<MintReceipt, MintError> {
        match tokio::time::timeout(self.timeout, self.ledger.submit(record)).await {
            Ok(result) => result,
            Err(_) => Err(MintError::Timeout),
        }
    }

    /// Store a receipt, holding on to it if the store refuses.
    async fn keep_receipt(&self, state: &mut QueueState, receipt: MintReceipt) {
        if let Err(e) = self.store_receipt(&receipt).await {
            tracing::warn!(receipt_id = %receipt.receipt_id, error = %e, "Receipt not stored, will retry");
            state.unsaved_receipts.push(receipt);
        }
    }

    async fn write_unsaved_receipts(&self, state: &mut QueueState) {
        while let Some(receipt) = state.unsaved_receipts.first() {
            if let Err(e) = self.store_receipt(receipt).await {
                tracing::debug!(error = %e, unsaved = state.unsaved_receipts.len(), "Receipts still not stored");
                return;
            }
            state.unsaved_receipts.remove(0);
        }
    }

    async fn store_receipt(&self, receipt: &MintReceipt) -> Result<(), MintError> {
        let doc = serde_json::to_value(receipt).map_err(StoreError::from)?;
        self.store.append(RECEIPTS_COLLECTION, doc).await?;
        tracing::debug!(receipt_id = %receipt.receipt_id, bundle_id = %receipt.bundle_id, "Mint receipt stored");
        Ok(())
    }

    async fn save_pending(&self, state: &mut QueueState) -> Result<(), MintError> {
        if !state.dirty {
            return Ok(());
        }
        let doc = serde_json::to_value(&state.pending).map_err(StoreError::from)?;
        self.store.put(PENDING_KEY, doc).await?;
        state.dirty = false;
        Ok(())
    }
}
