//! Visit Ledger - append-only record of verified landmark visits
//!
//! Owns the durable side of a visit:
//! - DocumentStore: append-only collections plus keyed documents
//!   (in-memory and JSON-lines implementations)
//! - Clock: injectable time source
//! - Visit context: season, time of day, moon phase and weather
//! - VisitLedger: per-user history, totals and local-day checks

pub mod clock;
pub mod context;
pub mod ledger;
pub mod record;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{
    offset_from_minutes, DerivedContext, MoonPhase, Season, TimeOfDay, VisitContext, Weather,
};
pub use ledger::{LedgerError, VisitLedger, VISITS_COLLECTION};
pub use record::VisitRecord;
pub use store::{DocumentStore, JsonFileStore, MemoryStore, StoreError};
