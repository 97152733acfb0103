//! Weather collaborator.

use async_trait::async_trait;
use attestation::Coordinate;
use std::sync::RwLock;
use visit_ledger::Weather;

/// Current conditions at a coordinate.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Never fails; unknown conditions are [`Weather::Unknown`].
    async fn current(&self, at: Coordinate) -> Weather;
}

/// Reports a fixed condition, changeable at runtime.
pub struct FixedWeather {
    weather: RwLock<Weather>,
}

impl FixedWeather {
    pub fn new(weather: Weather) -> Self {
        Self {
            weather: RwLock::new(weather),
        }
    }

    pub fn set(&self, weather: Weather) {
        *self.weather.write().unwrap_or_else(|p| p.into_inner()) = weather;
    }
}

impl Default for FixedWeather {
    fn default() -> Self {
        Self::new(Weather::Unknown)
    }
}

#[async_trait]
impl WeatherProvider for FixedWeather {
    async fn current(&self, _at: Coordinate) -> Weather {
        *self.weather.read().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_weather() {
        let provider = FixedWeather::default();
        let here = Coordinate::new(35.0, 139.0);
        assert_eq!(provider.current(here).await, Weather::Unknown);
        provider.set(Weather::Snow);
        assert_eq!(provider.current(here).await, Weather::Snow);
    }
}
