//! Core types for the habit loop.

use attestation::{AttestationError, LocationError};
use chrono::NaiveDate;
use reward_engine::{MintError, MintOutcome, ProvenanceError, RewardBundle, RewardError};
use serde::{Deserialize, Serialize};
use std::fmt;
use visit_ledger::{LedgerError, StoreError, VisitRecord};

use crate::config::ConfigError;

/// Per-user loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// No landmark in the vicinity
    Idle,
    /// A landmark is nearby but a visit is not available
    NearbyDetected,
    /// A visit can be triggered
    Eligible,
    /// Verification in flight
    Visiting,
    /// Today's visit is done
    Completed,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::NearbyDetected => "nearby_detected",
            Self::Eligible => "eligible",
            Self::Visiting => "visiting",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cached streak view, derived from the visit ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    pub user_id: String,
    pub current_streak: u32,
    /// Local calendar date of the most recent visit
    pub last_visit_date: Option<NaiveDate>,
    /// A visit exists for the current local day
    pub today_visited: bool,
}

impl StreakState {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            current_streak: 0,
            last_visit_date: None,
            today_visited: false,
        }
    }
}

/// Everything produced by a successful visit.
#[derive(Debug, Clone)]
pub struct VisitOutcome {
    pub visit: VisitRecord,
    pub streak: StreakState,
    pub total_visits: usize,
    pub unique_landmarks: usize,
    pub bundle: RewardBundle,
    /// Confidence of the strongest passing evidence channel
    pub confidence: f64,
    /// `None` when no mint queue is configured or submission failed
    pub mint: Option<MintOutcome>,
}

/// Change notifications for UI collaborators.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoopEvent {
    StateChanged {
        user_id: String,
        from: LoopState,
        to: LoopState,
    },
    NearbyLandmarkFound {
        user_id: String,
        landmark_id: String,
        distance_m: f64,
    },
    NearbyLandmarkLost {
        user_id: String,
        landmark_id: String,
    },
    VisitCompleted {
        user_id: String,
        visit: VisitRecord,
        streak: u32,
    },
    RewardReady {
        user_id: String,
        bundle: RewardBundle,
    },
    MintQueued {
        user_id: String,
        bundle_id: String,
        pending: usize,
    },
}

impl LoopEvent {
    pub fn user_id(&self) -> &str {
        match self {
            Self::StateChanged { user_id, .. }
            | Self::NearbyLandmarkFound { user_id, .. }
            | Self::NearbyLandmarkLost { user_id, .. }
            | Self::VisitCompleted { user_id, .. }
            | Self::RewardReady { user_id, .. }
            | Self::MintQueued { user_id, .. } => user_id,
        }
    }
}

/// Error types for the habit loop.
#[derive(Debug, thiserror::Error)]
pub enum HabitLoopError {
    /// Visit triggered outside the eligible state
    #[error("Not eligible to visit (state: {state})")]
    NotEligible { state: LoopState },

    /// Another visit for this user is being verified
    #[error("A visit is already in progress")]
    AlreadyInProgress,

    /// Evidence was rejected or unavailable
    #[error("Attestation failed: {0}")]
    Attestation(#[from] AttestationError),

    /// Verification did not finish in time
    #[error("Verification timed out")]
    VerificationTimeout,

    /// Ledger write or read failed
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Reward generation rejected its input
    #[error("Reward error: {0}")]
    Reward(#[from] RewardError),

    /// Bundle could not be persisted
    #[error("Provenance error: {0}")]
    Provenance(#[from] ProvenanceError),

    /// Other storage failure
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Mint queue could not be read or written
    #[error("Mint error: {0}")]
    Mint(#[from] MintError),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, HabitLoopError>;

impl HabitLoopError {
    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotEligible {
                state: LoopState::Completed,
            } => "You have already visited today. Come back tomorrow.".to_string(),
            Self::NotEligible { .. } => "Move closer to a landmark to start a visit.".to_string(),
            Self::AlreadyInProgress => "Your visit is already being verified.".to_string(),
            Self::Attestation(AttestationError::Location(LocationError::PermissionDenied)) => {
                "Location access was denied. Allow it, or verify with a photo.".to_string()
            }
            Self::Attestation(AttestationError::Location(_)) | Self::VerificationTimeout => {
                "Could not get your location. Try again, or verify with a photo.".to_string()
            }
            Self::Attestation(AttestationError::UnknownLandmark(_)) => {
                "That landmark is not recognised.".to_string()
            }
            Self::Attestation(e) => format!("{e}."),
            Self::Ledger(_)
            | Self::Reward(_)
            | Self::Provenance(_)
            | Self::Store(_)
            | Self::Mint(_)
            | Self::Config(_) => "Something went wrong saving your visit. Please try again.".to_string(),
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AlreadyInProgress | Self::VerificationTimeout | Self::Mint(_) => true,
            Self::Attestation(e) => e.is_retryable(),
            Self::Ledger(LedgerError::Store(_)) | Self::Store(_) | Self::Provenance(ProvenanceError::Store(_)) => true,
            Self::NotEligible { .. }
            | Self::Ledger(_)
            | Self::Reward(_)
            | Self::Provenance(_)
            | Self::Config(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        let too_far = HabitLoopError::Attestation(AttestationError::TooFar {
            distance_m: 640.0,
            threshold_m: 500.0,
        });
        assert_eq!(too_far.user_message(), "You are 640 m away, need <= 500 m.");
        assert!(too_far.is_retryable());

        let done = HabitLoopError::NotEligible {
            state: LoopState::Completed,
        };
        assert!(done.user_message().contains("already visited"));
        assert!(!done.is_retryable());

        let store = HabitLoopError::Store(StoreError::Unavailable("disk".into()));
        assert!(store.user_message().contains("try again"));
        assert!(store.is_retryable());
    }

    #[test]
    fn test_event_serialization() {
        let event = LoopEvent::StateChanged {
            user_id: "u1".into(),
            from: LoopState::Idle,
            to: LoopState::NearbyDetected,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "state_changed");
        assert_eq!(json["to"], "nearby_detected");
        assert_eq!(event.user_id(), "u1");
    }
}
