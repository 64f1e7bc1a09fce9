use chrono::Utc;
use shopdir_core::Record;

pub(crate) fn record(id: &str, name: &str) -> Record {
    let now = Utc::now();
    Record {
        id: id.to_string(),
        region_code: "08".to_string(),
        region_name: "Ibaraki".to_string(),
        detail_url: format!("https://shops.example.test/detail/{id}"),
        name: name.to_string(),
        address: None,
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
