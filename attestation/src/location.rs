//! Location evidence: proximity checks against a landmark.
//!
//! The device position arrives through a [`LocationSource`], either as a one-shot
//! fix or as a stream of fixes. [`LocationVerifier`] turns a fix into a
//! [`LocationVerification`] for a given radius.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::geo::haversine_distance;
use crate::types::{Coordinate, Landmark, LocationFix};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Typed failure from the device geolocation provider.
///
/// All variants are recoverable: the caller may retry or fall back to photo
/// evidence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    /// User refused location access
    #[error("Location permission denied")]
    PermissionDenied,

    /// Provider could not produce a fix
    #[error("Location unavailable: {0}")]
    Unavailable(String),

    /// No fix within the configured timeout
    #[error("Location request timed out")]
    Timeout,
}

/// Outcome of a proximity check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct LocationVerification {
    /// Whether the distance is within the threshold
    pub verified: bool,
    /// Great-circle distance to the landmark
    pub distance_m: f64,
    /// Threshold the distance was compared against
    pub threshold_m: f64,
    /// 1.0 for a perfect fix, 0.0 when accuracy is no better than the threshold
    pub confidence: f64,
}

impl LocationVerification {
    /// Confidence below one half marks a nominal pass from a coarse fix.
    pub fn is_low_confidence(&self) -> bool {
        self.confidence < 0.5
    }
}

/// Check a user position against a landmark.
///
/// `verified` is `distance <= threshold`; confidence is
/// `clamp(1 - accuracy / threshold, 0, 1)`.
pub fn verify_location(
    user: Coordinate,
    accuracy_m: f64,
    landmark: &Landmark,
    threshold_m: f64,
) -> LocationVerification {
    let distance_m = haversine_distance(user, landmark.coordinate);
    let confidence = if threshold_m > 0.0 && accuracy_m.is_finite() {
        (1.0 - accuracy_m.max(0.0) / threshold_m).clamp(0.0, 1.0)
    } else {
        0.0
    };

    LocationVerification {
        verified: distance_m <= threshold_m,
        distance_m,
        threshold_m,
        confidence,
    }
}

/// Device geolocation provider.
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// Request a single fix.
    async fn current_fix(&self) -> Result<LocationFix, LocationError>;

    /// Continuous position updates. The stream ends when the provider stops.
    fn watch(&self) -> BoxStream<'static, Result<LocationFix, LocationError>>;
}

/// Radii and timeout for location evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Radius for "near a landmark" detection
    pub vicinity_radius_m: f64,
    /// Radius a fix must fall within to verify a visit
    pub verification_radius_m: f64,
    /// Timeout for acquiring a fix or completing verification
    pub timeout_ms: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            vicinity_radius_m: 500.0,
            verification_radius_m: 100.0,
            timeout_ms: 10_000,
        }
    }
}

impl LocationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Applies [`LocationConfig`] radii to fixes and sources.
#[derive(Debug, Clone, Default)]
pub struct LocationVerifier {
    config: LocationConfig,
}

impl LocationVerifier {
    pub fn new(config: LocationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LocationConfig {
        &self.config
    }

    /// Verify a fix at the landmark (verification radius).
    pub fn verify(&self, fix: &LocationFix, landmark: &Landmark) -> LocationVerification {
        let result = verify_location(
            fix.coordinate,
            fix.accuracy_m,
            landmark,
            self.config.verification_radius_m,
        );
        tracing::debug!(
            landmark_id = %landmark.id,
            distance_m = result.distance_m,
            verified = result.verified,
            confidence = result.confidence,
            "Location verified"
        );
        result
    }

    /// Check whether a fix is in the vicinity of the landmark.
    pub fn in_vicinity(&self, fix: &LocationFix, landmark: &Landmark) -> LocationVerification {
        verify_location(
            fix.coordinate,
            fix.accuracy_m,
            landmark,
            self.config.vicinity_radius_m,
        )
    }

    /// Acquire one fix from the source, bounded by the configured timeout.
    pub async fn acquire(&self, source: &dyn LocationSource) -> Result<LocationFix, LocationError> {
        match tokio::time::timeout(self.config.timeout(), source.current_fix()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_ms = self.config.timeout_ms, "Location fix timed out");
                Err(LocationError::Timeout)
            }
        }
    }
}

/// Fixed-response source for tests and offline use.
pub struct StaticLocationSource {
    result: Result<LocationFix, LocationError>,
    delay: Option<Duration>,
}

impl StaticLocationSource {
    pub fn new(fix: LocationFix) -> Self {
        Self {
            result: Ok(fix),
            delay: None,
        }
    }

    pub fn failing(err: LocationError) -> Self {
        Self {
            result: Err(err),
            delay: None,
        }
    }

    /// Delay every fix, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl LocationSource for StaticLocationSource {
    async fn current_fix(&self) -> Result<LocationFix, LocationError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone()
    }

    fn watch(&self) -> BoxStream<'static, Result<LocationFix, LocationError>> {
        Box::pin(futures::stream::once(futures::future::ready(
            self.result.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::offset_north;
    use crate::types::{LandmarkCategory, RarityTier};
    use chrono::Utc;

    fn shrine() -> Landmark {
        Landmark::new(
            "meiji-jingu",
            "Meiji Jingu",
            Coordinate::new(35.6764, 139.6993),
            LandmarkCategory::Shrine,
            RarityTier::Legendary,
            100,
        )
    }

    #[test]
    fn test_identical_coordinates_verify() {
        let landmark = shrine();
        let result = verify_location(landmark.coordinate, 10.0, &landmark, 500.0);
        assert!(result.verified);
        assert!(result.distance_m < 1e-6);
        assert!((result.confidence - 0.98).abs() < 1e-9);
    }

    #[test]
    fn test_ten_km_away_fails() {
        let landmark = shrine();
        let far = offset_north(landmark.coordinate, 10_000.0);
        let result = verify_location(far, 10.0, &landmark, 500.0);
        assert!(!result.verified);
        assert!((result.distance_m - 10_000.0).abs() < 5.0);
    }

    #[test]
    fn test_coarse_fix_is_low_confidence() {
        let landmark = shrine();
        let result = verify_location(landmark.coordinate, 450.0, &landmark, 500.0);
        assert!(result.verified);
        assert!(result.is_low_confidence());

        let result = verify_location(landmark.coordinate, 900.0, &landmark, 500.0);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_verified_implies_within_threshold() {
        let landmark = shrine();
        for meters in [0.0, 50.0, 99.0, 101.0, 499.0, 501.0, 2_000.0] {
            let p = offset_north(landmark.coordinate, meters);
            let r = verify_location(p, 5.0, &landmark, 100.0);
            if r.verified {
                assert!(r.distance_m <= 100.0);
            }
        }
    }

    #[test]
    fn test_verifier_radii() {
        let landmark = shrine();
        let verifier = LocationVerifier::default();
        let fix = LocationFix::new(offset_north(landmark.coordinate, 300.0), 10.0, Utc::now());

        assert!(verifier.in_vicinity(&fix, &landmark).verified);
        assert!(!verifier.verify(&fix, &landmark).verified);
    }

    #[tokio::test]
    async fn test_acquire_propagates_denial() {
        let verifier = LocationVerifier::default();
        let source = StaticLocationSource::failing(LocationError::PermissionDenied);
        let err = verifier.acquire(&source).await.unwrap_err();
        assert_eq!(err, LocationError::PermissionDenied);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_times_out() {
        let verifier = LocationVerifier::new(LocationConfig {
            timeout_ms: 100,
            ..Default::default()
        });
        let fix = LocationFix::new(shrine().coordinate, 5.0, Utc::now());
        let source = StaticLocationSource::new(fix).with_delay(Duration::from_secs(30));

        let err = verifier.acquire(&source).await.unwrap_err();
        assert_eq!(err, LocationError::Timeout);
    }
}
