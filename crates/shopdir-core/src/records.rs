use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A resolved latitude/longitude pair. Only ever built from a provider answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
    pub resolved_at: DateTime<Utc>,
}

/// One scraped shop.
///
/// `id` is unique within a region and stable across re-scrapes, so writing
/// the same shop twice updates it in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
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
    /// Labelled values the parser found but has no column for.
    #[serde(default)]
    pub extra_fields: serde_json::Map<String, serde_json::Value>,
    pub coordinate: Option<Coordinate>,
    pub scraped_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    #[must_use]
    pub fn geocoded_at(&self) -> Option<DateTime<Utc>> {
        self.coordinate.map(|c| c.resolved_at)
    }

    /// Reasons this record cannot be stored, if any.
    #[must_use]
    pub fn validation_error(&self) -> Option<String> {
        if self.id.trim().is_empty() {
            return Some("record id is empty".to_string());
        }
        if self.name.trim().is_empty() {
            return Some("shop name is empty".to_string());
        }
        if let Some(c) = self.coordinate {
            if !(-90.0..=90.0).contains(&c.latitude) || !(-180.0..=180.0).contains(&c.longitude) {
                return Some(format!(
                    "coordinate out of range: {}, {}",
                    c.latitude, c.longitude
                ));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        let now = Utc::now();
        Record {
            id: "08_deadbeef".to_string(),
            region_code: "08".to_string(),
            region_name: "Ibaraki".to_string(),
            detail_url: "https://example.test/shop/1".to_string(),
            name: "Mito Bakery".to_string(),
            address: Some("Mito 1-1".to_string()),
            postal_code: None,
            phone: None,
            business_hours: None,
            closed_days: None,
            website: None,
            benefits: None,
            description: None,
            parking: None,
            category: None,
            genre: None,
            extra_fields: serde_json::Map::new(),
            coordinate: None,
            scraped_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn valid_record_has_no_validation_error() {
        assert_eq!(sample().validation_error(), None);
    }

    #[test]
    fn blank_name_is_invalid() {
        let mut record = sample();
        record.name = "  ".to_string();
        assert!(record.validation_error().is_some());
    }

    #[test]
    fn out_of_range_coordinate_is_invalid() {
        let mut record = sample();
        record.coordinate = Some(Coordinate {
            latitude: 120.0,
            longitude: 140.0,
            resolved_at: Utc::now(),
        });
        assert!(record.validation_error().is_some());
        assert!(record.geocoded_at().is_some());
    }

    #[test]
    fn serde_round_trip_keeps_extra_fields() {
        let mut record = sample();
        record
            .extra_fields
            .insert("payment".to_string(), serde_json::json!("cash only"));
        let json = serde_json::to_string(&record).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
