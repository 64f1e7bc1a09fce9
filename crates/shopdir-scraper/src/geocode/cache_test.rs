use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use shopdir_core::{normalize_address, GeocodeCacheEntry};

use super::*;
use crate::memory::MemoryGeocodeCacheStore;

/// Answers from a fixed script and counts calls.
struct ScriptedProvider {
    calls: AtomicU32,
    answer: fn() -> Result<Option<LatLng>, GeocodeProviderError>,
}

impl ScriptedProvider {
    fn new(answer: fn() -> Result<Option<LatLng>, GeocodeProviderError>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            answer,
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeocodeProvider for ScriptedProvider {
    async fn geocode(&self, _address: &str) -> Result<Option<LatLng>, GeocodeProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.answer)()
    }
}

fn found() -> Result<Option<LatLng>, GeocodeProviderError> {
    Ok(Some(LatLng {
        latitude: 36.37,
        longitude: 140.47,
    }))
}

fn not_found() -> Result<Option<LatLng>, GeocodeProviderError> {
    Ok(None)
}

fn failing() -> Result<Option<LatLng>, GeocodeProviderError> {
    Err(GeocodeProviderError::Status {
        status: "OVER_QUERY_LIMIT".to_string(),
        message: "slow down".to_string(),
    })
}

fn cache(
    store: &Arc<MemoryGeocodeCacheStore>,
    provider: &Arc<ScriptedProvider>,
    policy: CachePolicy,
) -> GeocodeCache {
    GeocodeCache::new(store.clone(), provider.clone(), policy)
}

#[tokio::test]
async fn found_result_is_served_from_cache_afterwards() {
    let store = Arc::new(MemoryGeocodeCacheStore::default());
    let provider = ScriptedProvider::new(found);
    let cache = cache(&store, &provider, CachePolicy::default());

    let first = cache.resolve("茨城県水戸市南町1-2").await.unwrap();
    assert!(!first.cache_hit);
    assert!(matches!(first.resolution, Resolution::Found(c) if (c.latitude - 36.37).abs() < 1e-9));

    // Same address with different spacing normalizes to the same key.
    let second = cache.resolve("  茨城県水戸市南町1-2 ").await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.resolution, first.resolution);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn not_found_is_cached_within_window() {
    let store = Arc::new(MemoryGeocodeCacheStore::default());
    let provider = ScriptedProvider::new(not_found);
    let cache = cache(&store, &provider, CachePolicy::default());

    assert_eq!(
        cache.resolve("nowhere 1").await.unwrap().resolution,
        Resolution::NotFound
    );
    let again = cache.resolve("nowhere 1").await.unwrap();
    assert!(again.cache_hit);
    assert_eq!(again.resolution, Resolution::NotFound);
    assert_eq!(provider.calls(), 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn expired_not_found_is_queried_again() {
    let store = Arc::new(MemoryGeocodeCacheStore::default());
    store.insert(GeocodeCacheEntry {
        address_key: normalize_address("nowhere 2"),
        coordinate: None,
        resolved_at: Utc::now() - Duration::hours(200),
    });
    let provider = ScriptedProvider::new(found);
    let cache = cache(&store, &provider, CachePolicy::default());

    let resolved = cache.resolve("nowhere 2").await.unwrap();
    assert!(!resolved.cache_hit);
    assert!(matches!(resolved.resolution, Resolution::Found(_)));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn provider_errors_are_not_cached() {
    let store = Arc::new(MemoryGeocodeCacheStore::default());
    let provider = ScriptedProvider::new(failing);
    let cache = cache(&store, &provider, CachePolicy::default());

    assert!(cache.resolve("flaky 3").await.is_err());
    assert!(cache.resolve("flaky 3").await.is_err());
    assert_eq!(provider.calls(), 2);
    assert!(store.is_empty());
}
