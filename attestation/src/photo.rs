//! Photo evidence channel.
//!
//! A [`PhotoVerifier`] runs every registered [`PhotoHeuristic`] over the photo and
//! accepts when the strongest signal reaches the threshold. Heuristic failures
//! never surface as errors: a broken detector resolves to an unverified result
//! with zero confidence.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::geo::haversine_distance;
use crate::types::{Coordinate, Landmark};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Error types for photo heuristics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhotoError {
    /// Bytes are empty or not a recognised image
    #[error("Unreadable image: {0}")]
    Unreadable(String),

    /// Detector could not run
    #[error("Detector unavailable: {0}")]
    DetectorUnavailable(String),
}

/// Recognised container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Heic,
    Webp,
}

impl ImageFormat {
    /// Identify the format from magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            Some(Self::Png)
        } else if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" && &bytes[8..12] == b"heic" {
            Some(Self::Heic)
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(Self::Webp)
        } else {
            None
        }
    }
}

/// Photo bytes plus the GPS position from EXIF, if the camera embedded one.
#[derive(Debug, Clone, Default)]
pub struct PhotoEvidence {
    pub bytes: Vec<u8>,
    pub exif_location: Option<Coordinate>,
}

impl PhotoEvidence {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            exif_location: None,
        }
    }

    pub fn with_exif_location(mut self, coordinate: Coordinate) -> Self {
        self.exif_location = Some(coordinate);
        self
    }

    pub fn format(&self) -> Option<ImageFormat> {
        ImageFormat::sniff(&self.bytes)
    }
}

/// A single confidence signal for "this photo was taken at this landmark".
#[async_trait]
pub trait PhotoHeuristic: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Confidence in [0, 1], or `None` when the heuristic has nothing to say.
    async fn assess(
        &self,
        photo: &PhotoEvidence,
        landmark: &Landmark,
    ) -> Result<Option<f64>, PhotoError>;
}

/// Uses the EXIF GPS tag as a secondary location signal.
///
/// Confidence falls linearly from 1.0 at the landmark to 0.0 at `radius_m`.
pub struct ExifLocationHeuristic {
    radius_m: f64,
}

impl ExifLocationHeuristic {
    pub fn new(radius_m: f64) -> Self {
        Self { radius_m }
    }
}

#[async_trait]
impl PhotoHeuristic for ExifLocationHeuristic {
    fn name(&self) -> &str {
        "exif_location"
    }

    async fn assess(
        &self,
        photo: &PhotoEvidence,
        landmark: &Landmark,
    ) -> Result<Option<f64>, PhotoError> {
        let Some(taken_at) = photo.exif_location else {
            return Ok(None);
        };
        if !taken_at.is_valid() {
            return Err(PhotoError::Unreadable("EXIF GPS out of range".to_string()));
        }
        if self.radius_m <= 0.0 {
            return Ok(Some(0.0));
        }

        let distance = haversine_distance(taken_at, landmark.coordinate);
        Ok(Some((1.0 - distance / self.radius_m).clamp(0.0, 1.0)))
    }
}

/// Stand-in architecture classifier returning a fixed confidence.
///
/// Toggle availability to simulate a detector outage.
pub struct MockClassifier {
    confidence: Option<f64>,
    available: AtomicBool,
}

impl MockClassifier {
    pub fn new(confidence: Option<f64>) -> Self {
        Self {
            confidence,
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

#[async_trait]
impl PhotoHeuristic for MockClassifier {
    fn name(&self) -> &str {
        "mock_classifier"
    }

    async fn assess(
        &self,
        _photo: &PhotoEvidence,
        _landmark: &Landmark,
    ) -> Result<Option<f64>, PhotoError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(PhotoError::DetectorUnavailable(
                "classifier offline".to_string(),
            ));
        }
        Ok(self.confidence)
    }
}

/// Photo acceptance policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoConfig {
    /// Minimum heuristic confidence to accept
    pub accept_threshold: f64,
    /// Accept (flagged low-confidence) when no heuristic produced a signal
    pub permissive_fallback: bool,
    /// Confidence reported for a permissive acceptance
    pub fallback_confidence: f64,
    /// Radius for the EXIF location heuristic
    pub exif_radius_m: f64,
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 0.5,
            permissive_fallback: true,
            fallback_confidence: 0.25,
            exif_radius_m: 250.0,
        }
    }
}

/// Outcome of photo verification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct PhotoVerification {
    pub verified: bool,
    pub confidence: f64,
    /// Accepted without any supporting signal
    pub low_confidence: bool,
}

impl PhotoVerification {
    fn rejected() -> Self {
        Self {
            verified: false,
            confidence: 0.0,
            low_confidence: false,
        }
    }
}

/// Runs heuristics and applies [`PhotoConfig`].
pub struct PhotoVerifier {
    config: PhotoConfig,
    heuristics: Vec<Arc<dyn PhotoHeuristic>>,
}

impl PhotoVerifier {
    /// Create a verifier with the EXIF location heuristic installed.
    pub fn new(config: PhotoConfig) -> Self {
        let exif = Arc::new(ExifLocationHeuristic::new(config.exif_radius_m));
        Self {
            config,
            heuristics: vec![exif],
        }
    }

    /// Add another heuristic (e.g. an architecture classifier).
    pub fn with_heuristic(mut self, heuristic: Arc<dyn PhotoHeuristic>) -> Self {
        self.heuristics.push(heuristic);
        self
    }

    pub fn config(&self) -> &PhotoConfig {
        &self.config
    }

    /// Judge a photo. Never fails.
    pub async fn verify(&self, photo: &PhotoEvidence, landmark: &Landmark) -> PhotoVerification {
        if photo.format().is_none() {
            tracing::warn!(landmark_id = %landmark.id, bytes = photo.bytes.len(), "Unreadable photo");
            return PhotoVerification::rejected();
        }

        let mut best: Option<f64> = None;
        let mut failures = 0usize;
        for heuristic in &self.heuristics {
            match heuristic.assess(photo, landmark).await {
                Ok(Some(confidence)) => {
                    let confidence = confidence.clamp(0.0, 1.0);
                    best = Some(best.map_or(confidence, |b| b.max(confidence)));
                }
                Ok(None) => {}
                Err(e) => {
                    failures += 1;
                    tracing::warn!(heuristic = heuristic.name(), error = %e, "Photo heuristic failed");
                }
            }
        }

        match best {
            Some(confidence) => PhotoVerification {
                verified: confidence >= self.config.accept_threshold,
                confidence,
                low_confidence: false,
            },
            None if failures > 0 => PhotoVerification::rejected(),
            None => {
                tracing::debug!(landmark_id = %landmark.id, "No photo signal, applying fallback policy");
                if self.config.permissive_fallback {
                    PhotoVerification {
                        verified: true,
                        confidence: self.config.fallback_confidence,
                        low_confidence: true,
                    }
                } else {
                    PhotoVerification::rejected()
                }
            }
        }
    }
}

impl Default for PhotoVerifier {
    fn default() -> Self {
        Self::new(PhotoConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::offset_north;
    use crate::types::{LandmarkCategory, RarityTier};

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    fn shrine() -> Landmark {
        Landmark::new(
            "sensoji",
            "Senso-ji",
            Coordinate::new(35.7148, 139.7967),
            LandmarkCategory::Temple,
            RarityTier::Legendary,
            120,
        )
    }

    #[test]
    fn test_sniff() {
        assert_eq!(ImageFormat::sniff(JPEG), Some(ImageFormat::Jpeg));
        assert_eq!(
            ImageFormat::sniff(&[0x89, b'P', b'N', b'G', 0x0D]),
            Some(ImageFormat::Png)
        );
        assert_eq!(ImageFormat::sniff(b"hello"), None);
        assert_eq!(ImageFormat::sniff(&[]), None);
    }

    #[tokio::test]
    async fn test_unreadable_image_rejected() {
        let verifier = PhotoVerifier::default();
        let result = verifier
            .verify(&PhotoEvidence::new(b"not an image".to_vec()), &shrine())
            .await;
        assert!(!result.verified);
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_exif_near_landmark_accepted() {
        let landmark = shrine();
        let photo = PhotoEvidence::new(JPEG.to_vec())
            .with_exif_location(offset_north(landmark.coordinate, 50.0));
        let result = PhotoVerifier::default().verify(&photo, &landmark).await;
        assert!(result.verified);
        assert!((result.confidence - 0.8).abs() < 0.01);
        assert!(!result.low_confidence);
    }

    #[tokio::test]
    async fn test_exif_far_from_landmark_rejected() {
        let landmark = shrine();
        let photo = PhotoEvidence::new(JPEG.to_vec())
            .with_exif_location(offset_north(landmark.coordinate, 5_000.0));
        let result = PhotoVerifier::default().verify(&photo, &landmark).await;
        assert!(!result.verified);
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_permissive_fallback() {
        let photo = PhotoEvidence::new(JPEG.to_vec());
        let result = PhotoVerifier::default().verify(&photo, &shrine()).await;
        assert!(result.verified);
        assert!(result.low_confidence);
        assert_eq!(result.confidence, 0.25);

        let strict = PhotoVerifier::new(PhotoConfig {
            permissive_fallback: false,
            ..Default::default()
        });
        assert!(!strict.verify(&photo, &shrine()).await.verified);
    }

    #[tokio::test]
    async fn test_detector_outage_rejects() {
        let classifier = Arc::new(MockClassifier::new(Some(0.9)).with_available(false));
        let verifier = PhotoVerifier::default().with_heuristic(classifier.clone());
        let photo = PhotoEvidence::new(JPEG.to_vec());

        let result = verifier.verify(&photo, &shrine()).await;
        assert!(!result.verified);
        assert_eq!(result.confidence, 0.0);

        classifier.set_available(true);
        let result = verifier.verify(&photo, &shrine()).await;
        assert!(result.verified);
        assert_eq!(result.confidence, 0.9);
    }
}
