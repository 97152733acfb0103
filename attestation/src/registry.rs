//! Static landmark reference data.

use std::collections::HashMap;
use std::path::Path;

use crate::geo::haversine_distance;
use crate::types::{Coordinate, Landmark, LandmarkCategory, RarityTier};

/// Error types for registry loading.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// File could not be read
    #[error("Failed to read landmark file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse failure
    #[error("Invalid landmark YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parse failure
    #[error("Invalid landmark JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Two landmarks share an id
    #[error("Duplicate landmark id: {0}")]
    DuplicateId(String),

    /// Coordinate out of range
    #[error("Landmark {0} has an invalid coordinate")]
    InvalidCoordinate(String),
}

/// A landmark together with its distance from a query point.
#[derive(Debug, Clone)]
pub struct NearbyLandmark {
    pub landmark: Landmark,
    pub distance_m: f64,
}

/// Registry of visitable landmarks, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct LandmarkRegistry {
    landmarks: Vec<Landmark>,
    index: HashMap<String, usize>,
}

impl LandmarkRegistry {
    /// Build a registry, rejecting duplicate ids and invalid coordinates.
    pub fn new(landmarks: Vec<Landmark>) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(landmarks.len());
        for (i, landmark) in landmarks.iter().enumerate() {
            if !landmark.coordinate.is_valid() {
                return Err(RegistryError::InvalidCoordinate(landmark.id.clone()));
            }
            if index.insert(landmark.id.clone(), i).is_some() {
                return Err(RegistryError::DuplicateId(landmark.id.clone()));
            }
        }
        Ok(Self { landmarks, index })
    }

    /// Parse a YAML list of landmarks.
    pub fn from_yaml(yaml: &str) -> Result<Self, RegistryError> {
        let landmarks: Vec<Landmark> = serde_yaml::from_str(yaml)?;
        Self::new(landmarks)
    }

    /// Parse a JSON array of landmarks.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let landmarks: Vec<Landmark> = serde_json::from_str(json)?;
        Self::new(landmarks)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Built-in set of well-known Tokyo shrines and temples.
    pub fn tokyo_seed() -> Self {
        let landmarks = vec![
            Landmark::new(
                "meiji-jingu",
                "Meiji Jingu",
                Coordinate::new(35.6764, 139.6993),
                LandmarkCategory::Shrine,
                RarityTier::Legendary,
                100,
            )
            .with_blessing("Harmony of city and forest"),
            Landmark::new(
                "sensoji",
                "Senso-ji",
                Coordinate::new(35.7148, 139.7967),
                LandmarkCategory::Temple,
                RarityTier::Legendary,
                120,
            )
            .with_blessing("Prosperity in trade"),
            Landmark::new(
                "yasukuni-jinja",
                "Yasukuni Jinja",
                Coordinate::new(35.6938, 139.7426),
                LandmarkCategory::Shrine,
                RarityTier::Rare,
                90,
            )
            .with_blessing("Peace and remembrance"),
            Landmark::new(
                "hie-jinja",
                "Hie Jinja",
                Coordinate::new(35.6743, 139.7396),
                LandmarkCategory::Shrine,
                RarityTier::Rare,
                80,
            )
            .with_blessing("Protection from misfortune"),
            Landmark::new(
                "kanda-myojin",
                "Kanda Myojin",
                Coordinate::new(35.7019, 139.7678),
                LandmarkCategory::Shrine,
                RarityTier::Epic,
                110,
            )
            .with_blessing("Fortune in business and craft"),
            Landmark::new(
                "nezu-jinja",
                "Nezu Jinja",
                Coordinate::new(35.7280, 139.7614),
                LandmarkCategory::Shrine,
                RarityTier::Uncommon,
                70,
            )
            .with_blessing("Good encounters"),
        ];

        // Static data, validated by tests.
        let index = landmarks
            .iter()
            .enumerate()
            .map(|(i, l)| (l.id.clone(), i))
            .collect();
        Self { landmarks, index }
    }

    /// Look up a landmark by id.
    pub fn get(&self, id: &str) -> Option<&Landmark> {
        self.index.get(id).map(|&i| &self.landmarks[i])
    }

    /// Whether a landmark id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All landmarks in registration order.
    pub fn all(&self) -> &[Landmark] {
        &self.landmarks
    }

    /// Landmarks of one category.
    pub fn by_category(&self, category: LandmarkCategory) -> Vec<&Landmark> {
        self.landmarks
            .iter()
            .filter(|l| l.category == category)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    /// Closest landmark within `radius_m` of `point`, if any.
    pub fn nearest_within(&self, point: Coordinate, radius_m: f64) -> Option<NearbyLandmark> {
        self.landmarks
            .iter()
            .map(|l| (l, haversine_distance(point, l.coordinate)))
            .filter(|(_, d)| *d <= radius_m)
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(l, d)| NearbyLandmark {
                landmark: l.clone(),
                distance_m: d,
            })
    }

    /// All landmarks within `radius_m`, nearest first.
    pub fn within(&self, point: Coordinate, radius_m: f64) -> Vec<NearbyLandmark> {
        let mut found: Vec<NearbyLandmark> = self
            .landmarks
            .iter()
            .map(|l| NearbyLandmark {
                landmark: l.clone(),
                distance_m: haversine_distance(point, l.coordinate),
            })
            .filter(|n| n.distance_m <= radius_m)
            .collect();
        found.sort_by(|a, b| {
            a.distance_m
                .partial_cmp(&b.distance_m)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::offset_north;

    #[test]
    fn test_seed_is_valid() {
        let seed = LandmarkRegistry::tokyo_seed();
        let rebuilt = LandmarkRegistry::new(seed.all().to_vec()).unwrap();
        assert_eq!(rebuilt.len(), seed.len());
        assert!(seed.get("meiji-jingu").is_some());
        assert!(seed.get("nowhere").is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let l = LandmarkRegistry::tokyo_seed().all()[0].clone();
        let err = LandmarkRegistry::new(vec![l.clone(), l]).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateId(_)));
    }

    #[test]
    fn test_nearest_within() {
        let registry = LandmarkRegistry::tokyo_seed();
        let meiji = registry.get("meiji-jingu").unwrap().coordinate;

        let near = registry.nearest_within(offset_north(meiji, 120.0), 500.0).unwrap();
        assert_eq!(near.landmark.id, "meiji-jingu");
        assert!((near.distance_m - 120.0).abs() < 1.0);

        assert!(registry
            .nearest_within(offset_north(meiji, -3_000.0), 500.0)
            .is_none());
    }

    #[test]
    fn test_yaml_load() {
        let yaml = r#"
- id: test-shrine
  name: Test Shrine
  coordinate: { lat: 35.0, lng: 135.0 }
  category: shrine
  rarity_tier: mythical
  cultural_value: 200
"#;
        let registry = LandmarkRegistry::from_yaml(yaml).unwrap();
        let l = registry.get("test-shrine").unwrap();
        assert_eq!(l.rarity_tier, RarityTier::Mythical);
        assert_eq!(l.blessing, None);
    }
}
