//! Core domain types shared across the Omairi crates.
//!
//! With the `typescript` feature enabled, these types can be exported to TypeScript
//! using ts-rs for the UI collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// A point on the Earth's surface in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Coordinate {
    /// Latitude (-90 to 90)
    pub lat: f64,
    /// Longitude (-180 to 180)
    pub lng: f64,
}

impl Coordinate {
    /// Create a coordinate.
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether both components are finite and within range.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lng)
    }
}

/// Rarity classification, strictly ordered from most to least common.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum RarityTier {
    Common = 1,
    Uncommon = 2,
    Rare = 3,
    Epic = 4,
    Legendary = 5,
    Mythical = 6,
}

impl RarityTier {
    /// Numeric level (Common = 1 ... Mythical = 6).
    pub fn level(&self) -> u8 {
        *self as u8
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Uncommon => "uncommon",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
            Self::Mythical => "mythical",
        }
    }

    /// Human-readable label used in provenance records.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Common => "Common",
            Self::Uncommon => "Uncommon",
            Self::Rare => "Rare",
            Self::Epic => "Epic",
            Self::Legendary => "Legendary",
            Self::Mythical => "Mythical",
        }
    }

    /// All tiers in ascending order.
    pub fn all() -> [Self; 6] {
        [
            Self::Common,
            Self::Uncommon,
            Self::Rare,
            Self::Epic,
            Self::Legendary,
            Self::Mythical,
        ]
    }
}

impl Default for RarityTier {
    fn default() -> Self {
        Self::Common
    }
}

impl fmt::Display for RarityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of landmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum LandmarkCategory {
    /// Shinto shrine
    Shrine,
    /// Buddhist temple
    Temple,
    /// Any other registered landmark
    Other,
}

impl LandmarkCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shrine => "shrine",
            Self::Temple => "temple",
            Self::Other => "other",
        }
    }
}

/// A registered real-world visitable location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Landmark {
    /// Stable identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Location of the main gate / hall
    pub coordinate: Coordinate,
    /// Landmark kind
    pub category: LandmarkCategory,
    /// Static rarity of the landmark itself
    pub rarity_tier: RarityTier,
    /// Base cultural value credited for a visit
    pub cultural_value: u32,
    /// Short blessing text used on collectibles
    #[serde(default)]
    pub blessing: Option<String>,
}

impl Landmark {
    /// Create a landmark with no blessing text.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        coordinate: Coordinate,
        category: LandmarkCategory,
        rarity_tier: RarityTier,
        cultural_value: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            coordinate,
            category,
            rarity_tier,
            cultural_value,
            blessing: None,
        }
    }

    /// Set the blessing text.
    pub fn with_blessing(mut self, blessing: impl Into<String>) -> Self {
        self.blessing = Some(blessing.into());
        self
    }

    /// Blessing text, falling back to a generic one.
    pub fn blessing_text(&self) -> &str {
        self.blessing.as_deref().unwrap_or("Safe travels and good fortune")
    }
}

/// How a visit was substantiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    /// Device position within the verification radius
    Location,
    /// Photo evidence accepted by the photo verifier
    Photo,
    /// Both channels passed
    Both,
}

impl VerificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Photo => "photo",
            Self::Both => "both",
        }
    }
}

impl fmt::Display for VerificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single device position fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct LocationFix {
    /// Reported position
    pub coordinate: Coordinate,
    /// Horizontal accuracy radius in meters
    pub accuracy_m: f64,
    /// When the fix was taken
    pub timestamp: DateTime<Utc>,
}

impl LocationFix {
    pub fn new(coordinate: Coordinate, accuracy_m: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            coordinate,
            accuracy_m,
            timestamp,
        }
    }
}
