//! Attestation - landmark registry and visit evidence verification
//!
//! Judges whether a claimed landmark visit is plausible:
//! - GeoMath: haversine great-circle distance
//! - LocationVerifier: device position vs. landmark radius
//! - PhotoVerifier: pluggable confidence heuristics (EXIF GPS, classifiers)
//! - VisitAttestor: either channel passing attests the visit
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             VisitAttestor               │
//! │  (VisitAttempt -> Attestation)          │
//! └────────────────┬────────────────────────┘
//!                  │
//!      ┌───────────┴───────────┐
//!      ▼                       ▼
//! ┌─────────────┐       ┌─────────────┐
//! │ Location    │       │ Photo       │
//! │ Verifier    │       │ Verifier    │
//! └──────┬──────┘       └─────────────┘
//!        ▼
//! ┌─────────────┐
//! │ Landmark    │
//! │ Registry    │
//! └─────────────┘
//! ```

pub mod attestor;
pub mod geo;
pub mod location;
pub mod photo;
pub mod registry;
pub mod types;

pub use attestor::{Attestation, AttestationError, Evidence, VisitAttempt, VisitAttestor};
pub use geo::haversine_distance;
pub use location::{
    verify_location, LocationConfig, LocationError, LocationSource, LocationVerification,
    LocationVerifier, StaticLocationSource,
};
pub use photo::{
    ExifLocationHeuristic, MockClassifier, PhotoConfig, PhotoError, PhotoEvidence, PhotoHeuristic,
    PhotoVerification, PhotoVerifier,
};
pub use registry::{LandmarkRegistry, NearbyLandmark, RegistryError};
pub use types::*;
