//! Database operations for `geocode_cache`.

use chrono::{DateTime, Utc};
use shopdir_core::{Coordinate, GeocodeCacheEntry};
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
struct GeocodeCacheRow {
    address_key: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    resolved_at: DateTime<Utc>,
}

impl From<GeocodeCacheRow> for GeocodeCacheEntry {
    fn from(row: GeocodeCacheRow) -> Self {
        let coordinate = match (row.latitude, row.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinate {
                latitude,
                longitude,
                resolved_at: row.resolved_at,
            }),
            _ => None,
        };
        Self {
            address_key: row.address_key,
            coordinate,
            resolved_at: row.resolved_at,
        }
    }
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_geocode_entry(
    pool: &PgPool,
    address_key: &str,
) -> Result<Option<GeocodeCacheEntry>, DbError> {
    let row = sqlx::query_as::<_, GeocodeCacheRow>(
        "SELECT address_key, latitude, longitude, resolved_at \
         FROM geocode_cache WHERE address_key = $1",
    )
    .bind(address_key)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(GeocodeCacheEntry::from))
}

/// Inserts or replaces the cached answer for `entry.address_key`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn put_geocode_entry(pool: &PgPool, entry: &GeocodeCacheEntry) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO geocode_cache (address_key, latitude, longitude, resolved_at) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (address_key) DO UPDATE SET \
             latitude    = EXCLUDED.latitude, \
             longitude   = EXCLUDED.longitude, \
             resolved_at = EXCLUDED.resolved_at",
    )
    .bind(&entry.address_key)
    .bind(entry.coordinate.map(|c| c.latitude))
    .bind(entry.coordinate.map(|c| c.longitude))
    .bind(entry.resolved_at)
    .execute(pool)
    .await?;
    Ok(())
}
