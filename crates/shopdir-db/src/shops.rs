//! Database operations for `shops`.

use chrono::{DateTime, Utc};
use shopdir_core::{Coordinate, Record, UpsertCounts};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `shops` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShopRow {
    pub id: String,
    pub region_code: String,
    pub region_name: String,
    pub detail_url: String,
    pub name: String,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub phone: Option<String>,
    pub business_hours: Option<String>,
    pub closed_days: Option<String>,
    pub website: Option<String>,
    pub benefits: Option<String>,
    pub description: Option<String>,
    pub parking: Option<String>,
    pub category: Option<String>,
    pub genre: Option<String>,
    pub extra_fields: serde_json::Value,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub geocoded_at: Option<DateTime<Utc>>,
    pub scraped_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShopRow {
    #[must_use]
    pub fn into_record(self) -> Record {
        let coordinate = match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinate {
                latitude,
                longitude,
                resolved_at: self.geocoded_at.unwrap_or(self.updated_at),
            }),
            _ => None,
        };
        let extra_fields = match self.extra_fields {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Record {
            id: self.id,
            region_code: self.region_code,
            region_name: self.region_name,
            detail_url: self.detail_url,
            name: self.name,
            address: self.address,
            postal_code: self.postal_code,
            phone: self.phone,
            business_hours: self.business_hours,
            closed_days: self.closed_days,
            website: self.website,
            benefits: self.benefits,
            description: self.description,
            parking: self.parking,
            category: self.category,
            genre: self.genre,
            extra_fields,
            coordinate,
            scraped_at: self.scraped_at,
            updated_at: self.updated_at,
        }
    }
}

const SHOP_COLUMNS: &str = "id, region_code, region_name, detail_url, name, address, \
     postal_code, phone, business_hours, closed_days, website, benefits, description, \
     parking, category, genre, extra_fields, latitude, longitude, geocoded_at, \
     scraped_at, created_at, updated_at";

/// Upserts `records` by id inside one transaction.
///
/// Existing rows get every scraped column replaced and `updated_at = NOW()`.
/// Coordinates are only overwritten when the incoming record has one, so a
/// run with geocoding disabled does not erase earlier results.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; nothing is committed.
pub async fn upsert_shops(pool: &PgPool, records: &[Record]) -> Result<UpsertCounts, DbError> {
    let mut tx = pool.begin().await?;
    let mut counts = UpsertCounts::default();

    for record in records {
        let inserted: bool = sqlx::query_scalar::<_, bool>(
            "INSERT INTO shops \
                 (id, region_code, region_name, detail_url, name, address, postal_code, \
                  phone, business_hours, closed_days, website, benefits, description, \
                  parking, category, genre, extra_fields, latitude, longitude, geocoded_at, \
                  scraped_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, \
                     $16, $17, $18, $19, $20, $21) \
             ON CONFLICT (id) DO UPDATE SET \
                 region_code    = EXCLUDED.region_code, \
                 region_name    = EXCLUDED.region_name, \
                 detail_url     = EXCLUDED.detail_url, \
                 name           = EXCLUDED.name, \
                 address        = EXCLUDED.address, \
                 postal_code    = EXCLUDED.postal_code, \
                 phone          = EXCLUDED.phone, \
                 business_hours = EXCLUDED.business_hours, \
                 closed_days    = EXCLUDED.closed_days, \
                 website        = EXCLUDED.website, \
                 benefits       = EXCLUDED.benefits, \
                 description    = EXCLUDED.description, \
                 parking        = EXCLUDED.parking, \
                 category       = EXCLUDED.category, \
                 genre          = EXCLUDED.genre, \
                 extra_fields   = EXCLUDED.extra_fields, \
                 latitude       = COALESCE(EXCLUDED.latitude, shops.latitude), \
                 longitude      = COALESCE(EXCLUDED.longitude, shops.longitude), \
                 geocoded_at    = COALESCE(EXCLUDED.geocoded_at, shops.geocoded_at), \
                 scraped_at     = EXCLUDED.scraped_at, \
                 updated_at     = NOW() \
             RETURNING (xmax = 0)",
        )
        .bind(&record.id)
        .bind(&record.region_code)
        .bind(&record.region_name)
        .bind(&record.detail_url)
        .bind(&record.name)
        .bind(&record.address)
        .bind(&record.postal_code)
        .bind(&record.phone)
        .bind(&record.business_hours)
        .bind(&record.closed_days)
        .bind(&record.website)
        .bind(&record.benefits)
        .bind(&record.description)
        .bind(&record.parking)
        .bind(&record.category)
        .bind(&record.genre)
        .bind(serde_json::Value::Object(record.extra_fields.clone()))
        .bind(record.coordinate.map(|c| c.latitude))
        .bind(record.coordinate.map(|c| c.longitude))
        .bind(record.geocoded_at())
        .bind(record.scraped_at)
        .fetch_one(&mut *tx)
        .await?;

        if inserted {
            counts.created += 1;
        } else {
            counts.updated += 1;
        }
    }

    tx.commit().await?;
    Ok(counts)
}

/// Fetches one shop by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_shop(pool: &PgPool, id: &str) -> Result<Option<ShopRow>, DbError> {
    let row = sqlx::query_as::<_, ShopRow>(&format!("SELECT {SHOP_COLUMNS} FROM shops WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Number of stored shops, optionally for one region.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_shops(pool: &PgPool, region_code: Option<&str>) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM shops WHERE $1::text IS NULL OR region_code = $1",
    )
    .bind(region_code)
    .fetch_one(pool)
    .await?;
    Ok(count)
}
