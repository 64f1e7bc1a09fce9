//! Address geocoding behind a persistent, de-duplicating cache.

mod google;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use shopdir_core::{
    normalize_address, AppConfig, Coordinate, GeocodeCacheEntry, GeocodeCacheStore,
};

use crate::error::GeocodeProviderError;

pub use google::GoogleGeocoder;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

/// External geocoding service. `Ok(None)` means the provider has no result.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Option<LatLng>, GeocodeProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Found(Coordinate),
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved {
    pub resolution: Resolution,
    /// Answered without calling the provider.
    pub cache_hit: bool,
}

/// Validity windows for cached answers.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    /// `None` keeps found coordinates forever.
    pub found_ttl: Option<Duration>,
    pub not_found_ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            found_ttl: None,
            not_found_ttl: Duration::hours(168),
        }
    }
}

impl From<&AppConfig> for CachePolicy {
    fn from(config: &AppConfig) -> Self {
        let found_ttl = config
            .geocode_found_ttl_days
            .and_then(|d| i64::try_from(d).ok())
            .and_then(Duration::try_days);
        let not_found_ttl = i64::try_from(config.geocode_not_found_ttl_hours)
            .ok()
            .and_then(Duration::try_hours)
            .unwrap_or(Duration::MAX);
        Self {
            found_ttl,
            not_found_ttl,
        }
    }
}

pub struct GeocodeCache {
    store: Arc<dyn GeocodeCacheStore>,
    provider: Arc<dyn GeocodeProvider>,
    policy: CachePolicy,
}

impl GeocodeCache {
    #[must_use]
    pub fn new(
        store: Arc<dyn GeocodeCacheStore>,
        provider: Arc<dyn GeocodeProvider>,
        policy: CachePolicy,
    ) -> Self {
        Self {
            store,
            provider,
            policy,
        }
    }

    /// Resolves `address`, consulting the cache first.
    ///
    /// Found and not-found answers are cached; provider errors are not.
    /// Cache store failures are logged and treated as a miss.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeProviderError`] when the provider call fails.
    pub async fn resolve(&self, address: &str) -> Result<Resolved, GeocodeProviderError> {
        let key = normalize_address(address);
        let now = Utc::now();

        match self.store.get(&key).await {
            Ok(Some(entry))
                if entry.is_fresh(now, self.policy.found_ttl, self.policy.not_found_ttl) =>
            {
                let resolution = match entry.coordinate {
                    Some(coordinate) => Resolution::Found(coordinate),
                    None => Resolution::NotFound,
                };
                return Ok(Resolved {
                    resolution,
                    cache_hit: true,
                });
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(address = %key, error = %e, "geocode cache read failed");
            }
        }

        let answer = self.provider.geocode(address).await?;
        let resolved_at = Utc::now();
        let coordinate = answer.map(|ll| Coordinate {
            latitude: ll.latitude,
            longitude: ll.longitude,
            resolved_at,
        });

        let entry = GeocodeCacheEntry {
            address_key: key,
            coordinate,
            resolved_at,
        };
        if let Err(e) = self.store.put(&entry).await {
            tracing::warn!(address = %entry.address_key, error = %e, "geocode cache write failed");
        }

        let resolution = match coordinate {
            Some(coordinate) => Resolution::Found(coordinate),
            None => Resolution::NotFound,
        };
        Ok(Resolved {
            resolution,
            cache_hit: false,
        })
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
