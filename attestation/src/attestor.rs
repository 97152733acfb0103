//! Combines the location and photo channels into one attestation.
//!
//! A visit passes if either channel passes. When both pass the method is
//! [`VerificationMethod::Both`].

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::location::{LocationError, LocationSource, LocationVerification, LocationVerifier};
use crate::photo::{PhotoEvidence, PhotoVerification, PhotoVerifier};
use crate::registry::LandmarkRegistry;
use crate::types::{Landmark, LocationFix, VerificationMethod};

/// Error types for visit attestation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttestationError {
    /// Landmark id not in the registry
    #[error("Unknown landmark: {0}")]
    UnknownLandmark(String),

    /// Neither a location fix nor a photo was supplied
    #[error("No evidence supplied")]
    NoEvidence,

    /// Location provider failed and there was no photo to fall back to
    #[error("Location error: {0}")]
    Location(#[from] LocationError),

    /// Position was outside the verification radius
    #[error("You are {distance_m:.0} m away, need <= {threshold_m:.0} m")]
    TooFar { distance_m: f64, threshold_m: f64 },

    /// Photo did not reach the acceptance threshold
    #[error("Photo not accepted (confidence {confidence:.2}, need >= {threshold:.2})")]
    PhotoRejected { confidence: f64, threshold: f64 },
}

impl AttestationError {
    /// Evidence and verification failures can be retried with new evidence.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::UnknownLandmark(_))
    }
}

/// Evidence submitted with a visit attempt.
#[derive(Debug, Clone, Default)]
pub struct Evidence {
    pub location: Option<LocationFix>,
    pub photo: Option<PhotoEvidence>,
}

impl Evidence {
    pub fn location(fix: LocationFix) -> Self {
        Self {
            location: Some(fix),
            photo: None,
        }
    }

    pub fn photo(photo: PhotoEvidence) -> Self {
        Self {
            location: None,
            photo: Some(photo),
        }
    }

    pub fn with_photo(mut self, photo: PhotoEvidence) -> Self {
        self.photo = Some(photo);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.location.is_none() && self.photo.is_none()
    }
}

/// A claimed visit. Lives only for one verification call.
#[derive(Debug, Clone)]
pub struct VisitAttempt {
    pub landmark_id: String,
    pub user_id: String,
    pub claimed_at: DateTime<Utc>,
    pub evidence: Evidence,
}

impl VisitAttempt {
    pub fn new(
        user_id: impl Into<String>,
        landmark_id: impl Into<String>,
        claimed_at: DateTime<Utc>,
        evidence: Evidence,
    ) -> Self {
        Self {
            landmark_id: landmark_id.into(),
            user_id: user_id.into(),
            claimed_at,
            evidence,
        }
    }
}

/// A successful verification.
#[derive(Debug, Clone)]
pub struct Attestation {
    pub landmark: Landmark,
    pub method: VerificationMethod,
    pub location: Option<LocationVerification>,
    pub photo: Option<PhotoVerification>,
}

impl Attestation {
    /// Highest confidence among the passing channels.
    pub fn confidence(&self) -> f64 {
        let loc = self
            .location
            .filter(|l| l.verified)
            .map(|l| l.confidence)
            .unwrap_or(0.0);
        let photo = self
            .photo
            .filter(|p| p.verified)
            .map(|p| p.confidence)
            .unwrap_or(0.0);
        loc.max(photo)
    }
}

/// Verifies visit attempts against the landmark registry.
pub struct VisitAttestor {
    registry: Arc<LandmarkRegistry>,
    location: LocationVerifier,
    photo: PhotoVerifier,
    source: Option<Arc<dyn LocationSource>>,
}

impl VisitAttestor {
    pub fn new(registry: Arc<LandmarkRegistry>, location: LocationVerifier, photo: PhotoVerifier) -> Self {
        Self {
            registry,
            location,
            photo,
            source: None,
        }
    }

    /// Fetch a fix from this source when an attempt carries none.
    pub fn with_location_source(mut self, source: Arc<dyn LocationSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn registry(&self) -> &Arc<LandmarkRegistry> {
        &self.registry
    }

    pub fn location_verifier(&self) -> &LocationVerifier {
        &self.location
    }

    /// Verify an attempt. Never touches any ledger state.
    pub async fn attest(&self, attempt: &VisitAttempt) -> Result<Attestation, AttestationError> {
        let landmark = self
            .registry
            .get(&attempt.landmark_id)
            .cloned()
            .ok_or_else(|| AttestationError::UnknownLandmark(attempt.landmark_id.clone()))?;

        let fix = match (&attempt.evidence.location, &self.source) {
            (Some(fix), _) => Some(*fix),
            (None, Some(source)) => match self.location.acquire(source.as_ref()).await {
                Ok(fix) => Some(fix),
                Err(e) if attempt.evidence.photo.is_some() => {
                    tracing::warn!(
                        user_id = %attempt.user_id,
                        error = %e,
                        "Location unavailable, falling back to photo"
                    );
                    None
                }
                Err(e) => return Err(e.into()),
            },
            (None, None) => None,
        };

        if fix.is_none() && attempt.evidence.photo.is_none() {
            return Err(AttestationError::NoEvidence);
        }

        let location = fix.map(|f| self.location.verify(&f, &landmark));
        let photo = match &attempt.evidence.photo {
            Some(p) => Some(self.photo.verify(p, &landmark).await),
            None => None,
        };

        let location_ok = location.is_some_and(|l| l.verified);
        let photo_ok = photo.is_some_and(|p| p.verified);

        let method = match (location_ok, photo_ok) {
            (true, true) => VerificationMethod::Both,
            (true, false) => VerificationMethod::Location,
            (false, true) => VerificationMethod::Photo,
            (false, false) => {
                let err = match (location, photo) {
                    (Some(l), _) => AttestationError::TooFar {
                        distance_m: l.distance_m,
                        threshold_m: l.threshold_m,
                    },
                    (None, Some(p)) => AttestationError::PhotoRejected {
                        confidence: p.confidence,
                        threshold: self.photo.config().accept_threshold,
                    },
                    (None, None) => AttestationError::NoEvidence,
                };
                tracing::info!(
                    user_id = %attempt.user_id,
                    landmark_id = %landmark.id,
                    reason = %err,
                    "Visit verification failed"
                );
                return Err(err);
            }
        };

        tracing::debug!(
            user_id = %attempt.user_id,
            landmark_id = %landmark.id,
            method = %method,
            "Visit attested"
        );

        Ok(Attestation {
            landmark,
            method,
            location,
            photo,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::offset_north;
    use crate::location::{LocationConfig, StaticLocationSource};
    use crate::photo::PhotoConfig;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0];

    fn attestor() -> VisitAttestor {
        VisitAttestor::new(
            Arc::new(LandmarkRegistry::tokyo_seed()),
            LocationVerifier::new(LocationConfig::default()),
            PhotoVerifier::new(PhotoConfig::default()),
        )
    }

    fn fix_at(meters: f64) -> LocationFix {
        let meiji = LandmarkRegistry::tokyo_seed()
            .get("meiji-jingu")
            .unwrap()
            .coordinate;
        LocationFix::new(offset_north(meiji, meters), 5.0, Utc::now())
    }

    fn attempt(evidence: Evidence) -> VisitAttempt {
        VisitAttempt::new("user-1", "meiji-jingu", Utc::now(), evidence)
    }

    #[tokio::test]
    async fn test_location_only() {
        let a = attestor()
            .attest(&attempt(Evidence::location(fix_at(20.0))))
            .await
            .unwrap();
        assert_eq!(a.method, VerificationMethod::Location);
        assert!(a.photo.is_none());
    }

    #[tokio::test]
    async fn test_too_far_reports_distance() {
        let err = attestor()
            .attest(&attempt(Evidence::location(fix_at(640.0))))
            .await
            .unwrap_err();
        match &err {
            AttestationError::TooFar {
                distance_m,
                threshold_m,
            } => {
                assert!((distance_m - 640.0).abs() < 1.0);
                assert_eq!(*threshold_m, 100.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(err.to_string(), "You are 640 m away, need <= 100 m");
    }

    #[tokio::test]
    async fn test_photo_rescues_far_fix() {
        let meiji = fix_at(0.0).coordinate;
        let photo = PhotoEvidence::new(JPEG.to_vec()).with_exif_location(meiji);
        let a = attestor()
            .attest(&attempt(Evidence::location(fix_at(640.0)).with_photo(photo)))
            .await
            .unwrap();
        assert_eq!(a.method, VerificationMethod::Photo);
    }

    #[tokio::test]
    async fn test_both_channels() {
        let meiji = fix_at(0.0).coordinate;
        let photo = PhotoEvidence::new(JPEG.to_vec()).with_exif_location(meiji);
        let a = attestor()
            .attest(&attempt(Evidence::location(fix_at(10.0)).with_photo(photo)))
            .await
            .unwrap();
        assert_eq!(a.method, VerificationMethod::Both);
        assert!(a.confidence() > 0.9);
    }

    #[tokio::test]
    async fn test_unknown_landmark() {
        let attempt = VisitAttempt::new("u", "nowhere", Utc::now(), Evidence::location(fix_at(0.0)));
        let err = attestor().attest(&attempt).await.unwrap_err();
        assert_eq!(err, AttestationError::UnknownLandmark("nowhere".into()));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_no_evidence() {
        let err = tokio_test::assert_err!(attestor().attest(&attempt(Evidence::default())).await);
        assert_eq!(err, AttestationError::NoEvidence);
    }

    #[tokio::test]
    async fn test_source_failure_without_photo() {
        let attestor = attestor().with_location_source(Arc::new(StaticLocationSource::failing(
            LocationError::PermissionDenied,
        )));
        let err = attestor.attest(&attempt(Evidence::default())).await.unwrap_err();
        assert_eq!(err, AttestationError::Location(LocationError::PermissionDenied));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_source_fix_used_when_attempt_has_none() {
        let attestor = attestor().with_location_source(Arc::new(StaticLocationSource::new(fix_at(30.0))));
        let a = attestor.attest(&attempt(Evidence::default())).await.unwrap();
        assert_eq!(a.method, VerificationMethod::Location);
    }
}
