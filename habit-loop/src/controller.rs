//! Habit loop controller.
//!
//! Drives the per-user state machine:
//!
//! ```text
//! Idle ⇄ NearbyDetected → Eligible → Visiting → Completed
//!   ▲                        ▲          │           │
//!   │                        └─ failure ┘           │
//!   └──────────────── local midnight ───────────────┘
//! ```
//!
//! Sessions are partitioned by user id. Every transition for one user
//! happens under that user's session lock; verification runs with the lock
//! released and the `Visiting` state rejects re-entrant triggers. A visit
//! whose future is dropped part way through hands the session back through
//! [`VisitGuard`].
//!
//! Each user has their own local timezone. It is set explicitly with
//! [`HabitLoopController::set_utc_offset`], otherwise taken from the user's
//! latest recorded visit, otherwise the configured default.

use attestation::{
    Coordinate, Evidence, LandmarkRegistry, LocationError, LocationFix, LocationSource,
    LocationVerifier, NearbyLandmark, PhotoHeuristic, PhotoVerifier, VisitAttempt, VisitAttestor,
};
use chrono::{FixedOffset, NaiveDate};
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reward_engine::{
    CollectionStats, FlushReport, MintLedger, MintOutcome, MintQueue, ProvenanceStore,
    RewardBundle, RewardContext, RewardEngine,
};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};
use visit_ledger::{
    Clock, DocumentStore, MemoryStore, SystemClock, VisitContext, VisitLedger, VisitRecord,
    Weather,
};

use crate::config::{DailyVisitPolicy, HabitLoopConfig};
use crate::streak;
use crate::types::{HabitLoopError, LoopEvent, LoopState, Result, StreakState, VisitOutcome};
use crate::weather::{FixedWeather, WeatherProvider};

fn streak_key(user_id: &str) -> String {
    format!("streak/{user_id}")
}

struct Session {
    state: LoopState,
    nearby: Option<NearbyLandmark>,
    streak: StreakState,
    /// Local day the session's daily fields refer to
    day: NaiveDate,
    landmarks_today: HashSet<String>,
}

impl Session {
    fn can_visit(&self, policy: DailyVisitPolicy, landmark_id: &str) -> bool {
        match policy {
            DailyVisitPolicy::OncePerDay => !self.streak.today_visited,
            DailyVisitPolicy::OncePerLandmarkPerDay => !self.landmarks_today.contains(landmark_id),
        }
    }

    /// State implied by proximity and today's visits, ignoring `Visiting`.
    fn settled_state(&self, policy: DailyVisitPolicy) -> LoopState {
        match &self.nearby {
            None => LoopState::Idle,
            Some(n) if self.can_visit(policy, &n.landmark.id) => LoopState::Eligible,
            Some(_) => LoopState::NearbyDetected,
        }
    }
}

fn set_state(
    events: &broadcast::Sender<LoopEvent>,
    user_id: &str,
    session: &mut Session,
    to: LoopState,
) {
    let from = session.state;
    if from == to {
        return;
    }
    session.state = to;
    info!(user_id = %user_id, from = %from, to = %to, "Loop state changed");
    // No receivers is fine.
    let _ = events.send(LoopEvent::StateChanged {
        user_id: user_id.to_string(),
        from,
        to,
    });
}

/// How to leave `Visiting` if a visit is abandoned.
struct Abandon {
    user_id: String,
    policy: DailyVisitPolicy,
    events: broadcast::Sender<LoopEvent>,
    committed: bool,
}

impl Abandon {
    fn apply(&self, session: &mut Session) {
        if session.state != LoopState::Visiting {
            return;
        }
        let to = if self.committed {
            LoopState::Completed
        } else {
            session.settled_state(self.policy)
        };
        warn!(user_id = %self.user_id, committed = self.committed, to = %to, "Visit abandoned");
        set_state(&self.events, &self.user_id, session, to);
    }
}

/// Owns a session's `Visiting` state for the length of one visit.
///
/// Dropped while armed, it moves the session to `Completed` if the visit was
/// recorded and back to the settled state otherwise.
struct VisitGuard {
    session: Arc<Mutex<Session>>,
    pending: Option<Abandon>,
}

impl VisitGuard {
    /// Everything after this is cleanup for a recorded visit.
    fn commit(&mut self) {
        if let Some(abandon) = &mut self.pending {
            abandon.committed = true;
        }
    }

    fn disarm(&mut self) {
        self.pending = None;
    }
}

impl Drop for VisitGuard {
    fn drop(&mut self) {
        let Some(abandon) = self.pending.take() else {
            return;
        };
        if let Ok(mut s) = self.session.try_lock() {
            abandon.apply(&mut s);
            return;
        }
        let session = self.session.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let mut s = session.lock().await;
                    abandon.apply(&mut s);
                });
            }
            Err(_) => {
                error!(user_id = %abandon.user_id, "Visit abandoned outside a runtime, session left visiting");
            }
        }
    }
}

/// Orchestrates verification, the visit ledger and rewards for every user.
pub struct HabitLoopController {
    config: HabitLoopConfig,
    registry: Arc<LandmarkRegistry>,
    attestor: VisitAttestor,
    ledger: VisitLedger,
    engine: RewardEngine,
    provenance: ProvenanceStore,
    mint: Option<MintQueue>,
    weather: Arc<dyn WeatherProvider>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn DocumentStore>,
    sessions: DashMap<String, Arc<Mutex<Session>>>,
    /// Per-user local timezone
    timezones: DashMap<String, FixedOffset>,
    events: broadcast::Sender<LoopEvent>,
    /// Seeds one generator per reward roll
    seeder: std::sync::Mutex<StdRng>,
}

impl HabitLoopController {
    pub fn builder(config: HabitLoopConfig) -> HabitLoopControllerBuilder {
        HabitLoopControllerBuilder::new(config)
    }

    pub fn config(&self) -> &HabitLoopConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<LandmarkRegistry> {
        &self.registry
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn ledger(&self) -> &VisitLedger {
        &self.ledger
    }

    /// Receive change notifications for all users.
    pub fn subscribe(&self) -> broadcast::Receiver<LoopEvent> {
        self.events.subscribe()
    }

    fn policy(&self) -> DailyVisitPolicy {
        self.config.general.daily_visit_policy
    }

    /// Timezone the user's calendar days are counted in.
    pub fn utc_offset(&self, user_id: &str) -> FixedOffset {
        self.timezones
            .get(user_id)
            .map(|offset| *offset)
            .unwrap_or_else(|| self.config.general.utc_offset())
    }

    /// Every timezone a day boundary can fall in, the default included.
    pub(crate) fn known_offsets(&self) -> Vec<FixedOffset> {
        let mut offsets: Vec<FixedOffset> = self.timezones.iter().map(|e| *e.value()).collect();
        offsets.push(self.config.general.utc_offset());
        offsets.sort_by_key(|o| o.local_minus_utc());
        offsets.dedup();
        offsets
    }

    /// Move a user to another timezone and re-derive their day.
    pub async fn set_utc_offset(&self, user_id: &str, offset: FixedOffset) {
        let session = self.session(user_id).await;
        let mut s = session.lock().await;
        self.timezones.insert(user_id.to_string(), offset);
        info!(user_id = %user_id, offset = %offset, "User timezone set");
        let today = self.today(user_id);
        self.refresh_day(user_id, &mut s, today).await;
    }

    fn today(&self, user_id: &str) -> NaiveDate {
        self.clock
            .now()
            .with_timezone(&self.utc_offset(user_id))
            .date_naive()
    }

    fn emit(&self, event: LoopEvent) {
        let _ = self.events.send(event);
    }

    fn transition(&self, user_id: &str, session: &mut Session, to: LoopState) {
        set_state(&self.events, user_id, session, to);
    }

    async fn landmarks_on(
        &self,
        user_id: &str,
        day: NaiveDate,
        offset: FixedOffset,
    ) -> HashSet<String> {
        self.ledger
            .history(user_id, usize::MAX)
            .await
            .into_iter()
            .filter(|v| v.date_in(offset) == day)
            .map(|v| v.landmark_id)
            .collect()
    }

    async fn session(&self, user_id: &str) -> Arc<Mutex<Session>> {
        if let Some(existing) = self.sessions.get(user_id) {
            return existing.clone();
        }
        let session = self.load_session(user_id).await;
        self.sessions
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(session)))
            .clone()
    }

    async fn load_session(&self, user_id: &str) -> Session {
        if !self.timezones.contains_key(user_id) {
            if let Some(last) = self.ledger.last_visit(user_id).await {
                self.timezones.entry(user_id.to_string()).or_insert(last.offset());
            }
        }
        let offset = self.utc_offset(user_id);
        let today = self.today(user_id);
        let days = self.ledger.visit_days(user_id, offset).await;
        self.check_snapshot(user_id, &days).await;

        let mut session = Session {
            state: LoopState::Idle,
            nearby: None,
            streak: StreakState::new(user_id),
            day: today,
            landmarks_today: HashSet::new(),
        };
        self.refresh_day(user_id, &mut session, today).await;
        debug!(
            user_id = %user_id,
            offset = %offset,
            streak = session.streak.current_streak,
            today_visited = session.streak.today_visited,
            "Session loaded"
        );
        session
    }

    /// Compare the persisted snapshot against the ledger. The ledger wins.
    async fn check_snapshot(&self, user_id: &str, days: &BTreeSet<NaiveDate>) {
        let doc = match self.store.get(&streak_key(user_id)).await {
            Ok(Some(doc)) => doc,
            Ok(None) => return,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to read streak snapshot");
                return;
            }
        };
        let snapshot: StreakState = match serde_json::from_value(doc) {
            Ok(s) => s,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Ignoring unreadable streak snapshot");
                return;
            }
        };
        let last = days.iter().next_back().copied();
        let derived = last.map(|d| streak::compute(days, d)).unwrap_or(0);
        if snapshot.last_visit_date != last || snapshot.current_streak != derived {
            warn!(
                user_id = %user_id,
                snapshot = snapshot.current_streak,
                derived,
                "Streak snapshot drifted from ledger, using ledger"
            );
        }
    }

    async fn save_snapshot(&self, streak: &StreakState) {
        let doc = match serde_json::to_value(streak) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(user_id = %streak.user_id, error = %e, "Failed to encode streak snapshot");
                return;
            }
        };
        if let Err(e) = self.store.put(&streak_key(&streak.user_id), doc).await {
            warn!(user_id = %streak.user_id, error = %e, "Failed to save streak snapshot");
        }
    }

    /// Re-derive the streak and daily fields for `today` from the ledger.
    ///
    /// Never interrupts a visit in flight.
    async fn refresh_day(&self, user_id: &str, session: &mut Session, today: NaiveDate) {
        let offset = self.utc_offset(user_id);
        let days = self.ledger.visit_days(user_id, offset).await;

        session.day = today;
        session.landmarks_today = self.landmarks_on(user_id, today, offset).await;
        session.streak.current_streak = streak::compute(&days, today);
        session.streak.last_visit_date = days.range(..=today).next_back().copied();
        session.streak.today_visited = !session.landmarks_today.is_empty();
        if session.state == LoopState::Completed && !session.streak.today_visited {
            let next = session.settled_state(self.policy());
            self.transition(user_id, session, next);
        }
    }

    /// Checked-on-read day rollover.
    async fn roll_day(&self, user_id: &str, session: &mut Session) {
        let today = self.today(user_id);
        if session.day != today {
            debug!(user_id = %user_id, from = %session.day, to = %today, "Local day rolled over");
            self.refresh_day(user_id, session, today).await;
        }
    }

    /// Apply a location update.
    pub async fn on_location(&self, user_id: &str, fix: LocationFix) -> LoopState {
        let session = self.session(user_id).await;
        let mut s = session.lock().await;
        self.roll_day(user_id, &mut s).await;

        let nearest = self
            .registry
            .nearest_within(fix.coordinate, self.config.location.vicinity_radius_m);

        let previous_id = s.nearby.as_ref().map(|n| n.landmark.id.clone());
        let current_id = nearest.as_ref().map(|n| n.landmark.id.clone());
        if previous_id != current_id {
            if let Some(landmark_id) = previous_id {
                debug!(user_id = %user_id, landmark_id = %landmark_id, "Nearby landmark lost");
                self.emit(LoopEvent::NearbyLandmarkLost {
                    user_id: user_id.to_string(),
                    landmark_id,
                });
            }
            if let Some(n) = &nearest {
                debug!(
                    user_id = %user_id,
                    landmark_id = %n.landmark.id,
                    distance_m = n.distance_m,
                    "Nearby landmark found"
                );
                self.emit(LoopEvent::NearbyLandmarkFound {
                    user_id: user_id.to_string(),
                    landmark_id: n.landmark.id.clone(),
                    distance_m: n.distance_m,
                });
            }
        }
        s.nearby = nearest;

        let policy = self.policy();
        let next = match s.state {
            LoopState::Visiting => LoopState::Visiting,
            LoopState::Completed => match policy {
                DailyVisitPolicy::OncePerLandmarkPerDay
                    if s.settled_state(policy) == LoopState::Eligible =>
                {
                    LoopState::Eligible
                }
                _ => LoopState::Completed,
            },
            _ => s.settled_state(policy),
        };
        if s.state == LoopState::Idle && next == LoopState::Eligible {
            self.transition(user_id, &mut s, LoopState::NearbyDetected);
        }
        self.transition(user_id, &mut s, next);
        next
    }

    /// Location failures are reported but never change state.
    pub fn on_location_error(&self, user_id: &str, error: &LocationError) {
        warn!(user_id = %user_id, error = %error, "Location update failed");
    }

    fn next_rng(&self) -> StdRng {
        let seed = self
            .seeder
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .gen::<u64>();
        StdRng::seed_from_u64(seed)
    }

    async fn current_weather(&self, at: Coordinate) -> Weather {
        let timeout = self.config.general.weather_timeout();
        match tokio::time::timeout(timeout, self.weather.current(at)).await {
            Ok(weather) => weather,
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Weather lookup timed out");
                Weather::Unknown
            }
        }
    }

    /// Verify and record a visit to the nearby landmark.
    ///
    /// Safe to cancel: dropping the future before it resolves leaves the
    /// session `Completed` if the visit was already recorded and eligible
    /// again otherwise.
    pub async fn trigger_visit(&self, user_id: &str, evidence: Evidence) -> Result<VisitOutcome> {
        let mut rng = self.next_rng();
        self.trigger_visit_with_rng(user_id, evidence, &mut rng).await
    }

    /// [`trigger_visit`](Self::trigger_visit) with an explicit random source
    /// for the reward roll.
    pub async fn trigger_visit_with_rng<R: Rng + ?Sized + Send>(
        &self,
        user_id: &str,
        evidence: Evidence,
        rng: &mut R,
    ) -> Result<VisitOutcome> {
        let session = self.session(user_id).await;

        let (landmark_id, mut guard) = {
            let mut s = session.lock().await;
            self.roll_day(user_id, &mut s).await;
            match s.state {
                LoopState::Eligible => {}
                LoopState::Visiting => return Err(HabitLoopError::AlreadyInProgress),
                state => return Err(HabitLoopError::NotEligible { state }),
            }
            let Some(nearby) = &s.nearby else {
                return Err(HabitLoopError::NotEligible { state: s.state });
            };
            let id = nearby.landmark.id.clone();
            self.transition(user_id, &mut s, LoopState::Visiting);
            let guard = VisitGuard {
                session: session.clone(),
                pending: Some(Abandon {
                    user_id: user_id.to_string(),
                    policy: self.policy(),
                    events: self.events.clone(),
                    committed: false,
                }),
            };
            (id, guard)
        };

        let attempt = VisitAttempt::new(user_id, &landmark_id, self.clock.now(), evidence);
        let verified = match tokio::time::timeout(
            self.config.location.timeout(),
            self.attestor.attest(&attempt),
        )
        .await
        {
            Ok(Ok(attestation)) => Ok(attestation),
            Ok(Err(e)) => Err(HabitLoopError::from(e)),
            Err(_) => Err(HabitLoopError::VerificationTimeout),
        };
        let attestation = match verified {
            Ok(a) => a,
            Err(e) => {
                warn!(user_id = %user_id, landmark_id = %landmark_id, error = %e, "Visit not verified");
                let mut s = session.lock().await;
                self.transition(user_id, &mut s, LoopState::Eligible);
                guard.disarm();
                return Err(e);
            }
        };

        let weather = self.current_weather(attestation.landmark.coordinate).await;

        let mut s = session.lock().await;
        self.roll_day(user_id, &mut s).await;
        let offset = self.utc_offset(user_id);
        let context = VisitContext::new(weather, offset);

        let visit = match self
            .ledger
            .record(user_id, &landmark_id, attestation.method, &context)
            .await
        {
            Ok(visit) => visit,
            Err(e) => {
                error!(user_id = %user_id, landmark_id = %landmark_id, error = %e, "Visit not recorded");
                self.transition(user_id, &mut s, LoopState::Eligible);
                guard.disarm();
                return Err(e.into());
            }
        };
        guard.commit();

        let day = visit.date_in(offset);
        s.streak.current_streak =
            streak::advance(s.streak.current_streak, s.streak.last_visit_date, day);
        s.streak.last_visit_date = Some(day);
        if day == s.day {
            s.streak.today_visited = true;
            s.landmarks_today.insert(landmark_id.clone());
        }
        self.save_snapshot(&s.streak).await;

        // The visit is committed from here on, so failures end in Completed.
        let bundle = match self.reward(&visit, s.streak.current_streak, rng).await {
            Ok(bundle) => bundle,
            Err(e) => {
                error!(user_id = %user_id, visit_id = %visit.id, error = %e, "Reward not issued");
                self.transition(user_id, &mut s, LoopState::Completed);
                guard.disarm();
                return Err(e);
            }
        };

        self.transition(user_id, &mut s, LoopState::Completed);
        guard.disarm();
        let streak = s.streak.clone();
        drop(s);

        let total_visits = self.ledger.total_visits(user_id).await;
        let unique_landmarks = self.ledger.unique_landmarks(user_id).await;

        info!(
            user_id = %user_id,
            landmark_id = %landmark_id,
            method = %visit.verification_method,
            streak = streak.current_streak,
            rarity = %bundle.top_rarity(),
            "Visit completed"
        );
        self.emit(LoopEvent::VisitCompleted {
            user_id: user_id.to_string(),
            visit: visit.clone(),
            streak: streak.current_streak,
        });
        self.emit(LoopEvent::RewardReady {
            user_id: user_id.to_string(),
            bundle: bundle.clone(),
        });

        let mint = self.submit_mint(user_id, &bundle).await;

        Ok(VisitOutcome {
            visit,
            streak,
            total_visits,
            unique_landmarks,
            bundle,
            confidence: attestation.confidence(),
            mint,
        })
    }

    async fn reward<R: Rng + ?Sized + Send>(
        &self,
        visit: &VisitRecord,
        streak: u32,
        rng: &mut R,
    ) -> Result<RewardBundle> {
        let total_visits = self.ledger.total_visits(&visit.user_id).await;
        let awarded = self.provenance.awarded_milestones(&visit.user_id).await;
        let ctx = RewardContext {
            visit,
            streak,
            total_visits,
            awarded_milestones: &awarded,
        };
        let bundle = self.engine.generate(&ctx, rng)?;
        self.provenance.persist(&bundle).await?;
        Ok(bundle)
    }

    async fn submit_mint(&self, user_id: &str, bundle: &RewardBundle) -> Option<MintOutcome> {
        let queue = self.mint.as_ref()?;
        match queue.submit(bundle.provenance.clone()).await {
            Ok(outcome) => {
                if let MintOutcome::Queued { pending } = &outcome {
                    self.emit(LoopEvent::MintQueued {
                        user_id: user_id.to_string(),
                        bundle_id: bundle.id.clone(),
                        pending: *pending,
                    });
                }
                Some(outcome)
            }
            Err(e) => {
                warn!(user_id = %user_id, bundle_id = %bundle.id, error = %e, "Mint submission failed");
                None
            }
        }
    }

    /// Current loop state.
    pub async fn state(&self, user_id: &str) -> LoopState {
        let session = self.session(user_id).await;
        let mut s = session.lock().await;
        self.roll_day(user_id, &mut s).await;
        s.state
    }

    pub async fn current_streak_state(&self, user_id: &str) -> StreakState {
        let session = self.session(user_id).await;
        let mut s = session.lock().await;
        self.roll_day(user_id, &mut s).await;
        s.streak.clone()
    }

    /// Most recent visits first.
    pub async fn recent_history(&self, user_id: &str, limit: usize) -> Vec<VisitRecord> {
        self.ledger.history(user_id, limit).await
    }

    pub async fn collection_stats(&self, user_id: &str) -> CollectionStats {
        self.provenance.stats_for(user_id).await
    }

    /// Most recent reward bundles first.
    pub async fn recent_rewards(&self, user_id: &str, limit: usize) -> Vec<RewardBundle> {
        self.provenance.recent(user_id, limit).await
    }

    /// Re-derive today's flags and the streak from the ledger. Safe to repeat.
    pub async fn daily_reset(&self, user_id: &str) {
        let session = self.session(user_id).await;
        let mut s = session.lock().await;
        let today = self.today(user_id);
        self.refresh_day(user_id, &mut s, today).await;
    }

    /// [`daily_reset`](Self::daily_reset) for every loaded session.
    pub async fn daily_reset_all(&self) {
        let users: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        debug!(users = users.len(), "Daily reset");
        for user_id in users {
            self.daily_reset(&user_id).await;
        }
    }

    /// Retry queued mints. A no-op without a mint ledger.
    pub async fn flush_mints(&self) -> Result<FlushReport> {
        match &self.mint {
            Some(queue) => Ok(queue.flush().await?),
            None => Ok(FlushReport::default()),
        }
    }

    pub async fn pending_mints(&self) -> usize {
        match &self.mint {
            Some(queue) => queue.pending_count().await,
            None => 0,
        }
    }
}


/// Builder for [`HabitLoopController`].
pub struct HabitLoopControllerBuilder {
    config: HabitLoopConfig,
    registry: Option<Arc<LandmarkRegistry>>,
    store: Option<Arc<dyn DocumentStore>>,
    clock: Option<Arc<dyn Clock>>,
    weather: Option<Arc<dyn WeatherProvider>>,
    mint_ledger: Option<Arc<dyn MintLedger>>,
    location_source: Option<Arc<dyn LocationSource>>,
    photo_heuristics: Vec<Arc<dyn PhotoHeuristic>>,
    seed: Option<u64>,
}

impl HabitLoopControllerBuilder {
    pub fn new(config: HabitLoopConfig) -> Self {
        Self {
            config,
            registry: None,
            store: None,
            clock: None,
            weather: None,
            mint_ledger: None,
            location_source: None,
            photo_heuristics: Vec::new(),
            seed: None,
        }
    }

    /// Landmarks to detect and verify against. Defaults to the Tokyo seed set.
    pub fn with_registry(mut self, registry: Arc<LandmarkRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Durable storage. Defaults to an in-memory store.
    pub fn with_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_weather(mut self, weather: Arc<dyn WeatherProvider>) -> Self {
        self.weather = Some(weather);
        self
    }

    /// Enable minting through this ledger.
    pub fn with_mint_ledger(mut self, ledger: Arc<dyn MintLedger>) -> Self {
        self.mint_ledger = Some(ledger);
        self
    }

    /// Source for a fix when evidence carries none.
    pub fn with_location_source(mut self, source: Arc<dyn LocationSource>) -> Self {
        self.location_source = Some(source);
        self
    }

    pub fn with_photo_heuristic(mut self, heuristic: Arc<dyn PhotoHeuristic>) -> Self {
        self.photo_heuristics.push(heuristic);
        self
    }

    /// Seed reward randomness for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Load persisted state and assemble the controller.
    pub async fn build(self) -> Result<HabitLoopController> {
        let config = self.config;
        config.validate()?;

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(LandmarkRegistry::tokyo_seed()));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn DocumentStore>);
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let weather = self
            .weather
            .unwrap_or_else(|| Arc::new(FixedWeather::default()) as Arc<dyn WeatherProvider>);

        let mut photo = PhotoVerifier::new(config.photo.clone());
        for heuristic in self.photo_heuristics {
            photo = photo.with_heuristic(heuristic);
        }
        let mut attestor = VisitAttestor::new(
            registry.clone(),
            LocationVerifier::new(config.location.clone()),
            photo,
        );
        if let Some(source) = self.location_source {
            attestor = attestor.with_location_source(source);
        }

        let ledger = VisitLedger::load(store.clone(), clock.clone()).await?;
        let provenance = ProvenanceStore::load(store.clone()).await?;
        let mint = match self.mint_ledger {
            Some(ledger) => {
                Some(MintQueue::load(ledger, store.clone(), config.general.mint_timeout()).await?)
            }
            None => None,
        };

        let seeder = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (events, _) = broadcast::channel(config.general.event_buffer);
        let engine = RewardEngine::new(registry.clone(), config.rewards.clone());

        info!(
            landmarks = registry.len(),
            policy = ?config.general.daily_visit_policy,
            minting = mint.is_some(),
            "Habit loop ready"
        );

        Ok(HabitLoopController {
            config,
            registry,
            attestor,
            ledger,
            engine,
            provenance,
            mint,
            weather,
            clock,
            store,
            sessions: DashMap::new(),
            timezones: DashMap::new(),
            events,
            seeder: std::sync::Mutex::new(seeder),
        })
    }
}
