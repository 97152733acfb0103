//! Reward bundles and their self-describing provenance records.

use attestation::{Landmark, RarityTier, VerificationMethod};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use visit_ledger::VisitRecord;

use crate::items::{Goshuin, RewardItem};
use crate::multiplier::Multiplier;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// `{trait_type, value}` pair in the collectible metadata convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Attribute {
    pub trait_type: String,
    pub value: String,
}

impl Attribute {
    fn new(trait_type: &str, value: impl Into<String>) -> Self {
        Self {
            trait_type: trait_type.to_string(),
            value: value.into(),
        }
    }
}

/// Metadata describing a bundle well enough to be minted or audited alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ProvenanceRecord {
    /// Globally unique id (UUID v4)
    pub id: String,
    pub bundle_id: String,
    pub visit_id: String,
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub landmark_id: String,
    pub landmark_name: String,
    pub rarity: RarityTier,
    pub verification_method: VerificationMethod,
    pub timestamp: DateTime<Utc>,
    pub attributes: Vec<Attribute>,
    /// SHA-256 over the canonical JSON of every other field
    #[serde(default)]
    pub content_hash: String,
}

impl ProvenanceRecord {
    /// Describe the goshuin of a bundle and seal the content hash.
    pub fn describe(
        bundle_id: &str,
        visit: &VisitRecord,
        landmark: &Landmark,
        goshuin: &Goshuin,
    ) -> Result<Self, serde_json::Error> {
        let rarity = goshuin.rarity.display_name();
        let mut record = Self {
            id: uuid::Uuid::new_v4().to_string(),
            bundle_id: bundle_id.to_string(),
            visit_id: visit.id.clone(),
            user_id: visit.user_id.clone(),
            name: format!("{} Goshuin - {}", landmark.name, rarity),
            description: format!(
                "A {} goshuin received at {} on {}",
                rarity,
                landmark.name,
                visit.local_date()
            ),
            landmark_id: landmark.id.clone(),
            landmark_name: landmark.name.clone(),
            rarity: goshuin.rarity,
            verification_method: visit.verification_method,
            timestamp: visit.timestamp,
            attributes: vec![
                Attribute::new("Landmark", landmark.name.clone()),
                Attribute::new("Rarity", rarity),
                Attribute::new("Variant", goshuin.variant.as_str()),
                Attribute::new("Season", visit.season.as_str()),
                Attribute::new("Time", visit.time_of_day.as_str()),
                Attribute::new("Weather", visit.weather.as_str()),
                Attribute::new("Moon Phase", visit.moon_phase.as_str()),
                Attribute::new("Verification", visit.verification_method.as_str()),
            ],
            content_hash: String::new(),
        };
        record.content_hash = record.compute_hash()?;
        Ok(record)
    }

    /// Hash of the record with `content_hash` excluded.
    ///
    /// `serde_json::Value` maps are key-sorted, which makes the encoding canonical.
    pub fn compute_hash(&self) -> Result<String, serde_json::Error> {
        let mut body = serde_json::to_value(self)?;
        if let Some(map) = body.as_object_mut() {
            map.remove("content_hash");
        }
        let bytes = serde_json::to_vec(&body)?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Whether the stored hash matches the content.
    pub fn verify_hash(&self) -> bool {
        self.compute_hash()
            .map(|h| h == self.content_hash)
            .unwrap_or(false)
    }

    pub fn attribute(&self, trait_type: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.trait_type == trait_type)
            .map(|a| a.value.as_str())
    }
}

/// Everything issued for one visit. Immutable once generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct RewardBundle {
    pub id: String,
    pub visit_id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    /// Never empty; the first item is the goshuin
    pub items: Vec<RewardItem>,
    pub multiplier: Multiplier,
    pub provenance: ProvenanceRecord,
}

impl RewardBundle {
    pub fn goshuin(&self) -> Option<&Goshuin> {
        self.items.iter().find_map(|i| match i {
            RewardItem::Goshuin(g) => Some(g),
            _ => None,
        })
    }

    /// Highest rarity among the bundle's items.
    pub fn top_rarity(&self) -> RarityTier {
        self.items
            .iter()
            .map(|i| i.rarity())
            .max()
            .unwrap_or_default()
    }

    /// Milestone keys carried by this bundle.
    pub fn milestone_keys(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|i| i.milestone_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::GoshuinVariant;
    use attestation::LandmarkRegistry;
    use chrono::TimeZone;
    use visit_ledger::{offset_from_minutes, Weather};

    fn fixture() -> ProvenanceRecord {
        let registry = LandmarkRegistry::tokyo_seed();
        let landmark = registry.get("sensoji").unwrap();
        let at = Utc.with_ymd_and_hms(2024, 4, 23, 12, 0, 0).unwrap();
        let visit = VisitRecord::new("u", "sensoji", at, offset_from_minutes(540), VerificationMethod::Location, Weather::Clear);
        let goshuin = Goshuin {
            id: "g1".into(),
            landmark_id: landmark.id.clone(),
            landmark_name: landmark.name.clone(),
            rarity: RarityTier::Epic,
            variant: GoshuinVariant::Sakura,
            blessing: "b".into(),
            cultural_value: 480,
        };
        ProvenanceRecord::describe("bundle-1", &visit, landmark, &goshuin).unwrap()
    }

    #[test]
    fn test_attributes() {
        let record = fixture();
        assert_eq!(record.attribute("Landmark"), Some("Senso-ji"));
        assert_eq!(record.attribute("Rarity"), Some("Epic"));
        assert_eq!(record.attribute("Variant"), Some("sakura"));
        assert_eq!(record.attribute("Season"), Some("spring"));
        assert_eq!(record.attribute("Moon Phase"), Some("full"));
        assert_eq!(record.name, "Senso-ji Goshuin - Epic");
    }

    #[test]
    fn test_content_hash_detects_tampering() {
        let mut record = fixture();
        assert_eq!(record.content_hash.len(), 64);
        assert!(record.verify_hash());

        record.rarity = RarityTier::Mythical;
        assert!(!record.verify_hash());
    }

    #[test]
    fn test_hash_survives_serde() {
        let record = fixture();
        let json = serde_json::to_string(&record).unwrap();
        let back: ProvenanceRecord = serde_json::from_str(&json).unwrap();
        assert!(back.verify_hash());
    }
}
