#![allow(dead_code)]

use attestation::{Coordinate, Evidence, LandmarkRegistry, LocationFix};
use chrono::{DateTime, TimeZone, Utc};
use habit_loop::{
    DailyVisitPolicy, HabitLoopConfig, HabitLoopController, HabitLoopControllerBuilder,
    LoopEvent, Result, VisitOutcome,
};
use reward_engine::OfflineMintLedger;
use std::sync::Arc;
use tokio::sync::broadcast;
use visit_ledger::{Clock, DocumentStore, ManualClock, MemoryStore};

pub const USER: &str = "pilgrim";

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap()
}

pub fn coordinate_of(landmark_id: &str) -> Coordinate {
    LandmarkRegistry::tokyo_seed()
        .get(landmark_id)
        .unwrap()
        .coordinate
}

pub fn fix_at(landmark_id: &str) -> LocationFix {
    LocationFix::new(coordinate_of(landmark_id), 10.0, Utc::now())
}

pub struct Harness {
    pub controller: Arc<HabitLoopController>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
}

pub fn builder(
    config: HabitLoopConfig,
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
) -> HabitLoopControllerBuilder {
    HabitLoopController::builder(config)
        .with_clock(clock as Arc<dyn Clock>)
        .with_store(store as Arc<dyn DocumentStore>)
        .with_mint_ledger(Arc::new(OfflineMintLedger))
        .with_seed(42)
}

pub async fn harness_with(config: HabitLoopConfig) -> Harness {
    let clock = Arc::new(ManualClock::new(start()));
    let store = Arc::new(MemoryStore::new());
    let controller = builder(config, clock.clone(), store.clone())
        .build()
        .await
        .unwrap();
    Harness {
        controller: Arc::new(controller),
        clock,
        store,
    }
}

pub async fn harness() -> Harness {
    harness_with(HabitLoopConfig::default()).await
}

pub fn per_landmark_config() -> HabitLoopConfig {
    let mut config = HabitLoopConfig::default();
    config.general.daily_visit_policy = DailyVisitPolicy::OncePerLandmarkPerDay;
    config
}

impl Harness {
    /// Walk up to a landmark and visit it with location evidence.
    pub async fn visit(&self, landmark_id: &str) -> Result<VisitOutcome> {
        let fix = fix_at(landmark_id);
        self.controller.on_location(USER, fix).await;
        self.controller
            .trigger_visit(USER, Evidence::location(fix))
            .await
    }

    pub fn advance_days(&self, days: i64) {
        self.clock.advance(chrono::Duration::days(days));
    }
}

pub fn drain(events: &mut broadcast::Receiver<LoopEvent>) -> Vec<LoopEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
