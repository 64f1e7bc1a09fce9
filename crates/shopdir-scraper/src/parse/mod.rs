//! Per-region detail parsing. Which parser a region uses is data in its
//! [`RegionConfig`]; [`parser_for`] is the lookup.

mod label_table;
mod links;
mod pattern;
mod text;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use shopdir_core::{ParserConfig, Record, RegionConfig};

use crate::error::{ParseError, SetupError};

pub use label_table::LabelTableParser;
pub use links::LinkExtractor;
pub use pattern::PatternParser;
pub use text::clean_text;

pub trait Parser: Send + Sync {
    /// Absolute detail URLs on a list page, in page order, without repeats.
    fn extract_detail_links(&self, list_html: &str) -> Vec<String>;

    /// # Errors
    ///
    /// Returns [`ParseError`] if the page lacks the fields a record needs.
    fn parse_detail(&self, detail_url: &str, detail_html: &str) -> Result<ShopFields, ParseError>;
}

/// Builds the parser configured for `region`.
///
/// # Errors
///
/// Returns [`SetupError`] if a configured pattern or the base URL is invalid.
pub fn parser_for(region: &RegionConfig) -> Result<Arc<dyn Parser>, SetupError> {
    let links = LinkExtractor::new(&region.base_url, &region.detail_link_pattern)?;
    Ok(match &region.parser {
        ParserConfig::Pattern(selectors) => Arc::new(PatternParser::new(links, selectors)?),
        ParserConfig::LabelTable(selectors) => Arc::new(LabelTableParser::new(links, selectors)?),
    })
}

/// Fields read from one detail page, before identity and timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShopFields {
    pub name: Option<String>,
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
    pub source_id: Option<String>,
    pub extra_fields: serde_json::Map<String, serde_json::Value>,
}

impl ShopFields {
    /// Stores `value` under `field`; unknown names go to `extra_fields`.
    /// The first non-empty value for a field wins.
    pub fn set(&mut self, field: &str, value: String) {
        if value.is_empty() {
            return;
        }
        let slot = match field {
            "name" => &mut self.name,
            "address" => &mut self.address,
            "postal_code" => &mut self.postal_code,
            "phone" => &mut self.phone,
            "business_hours" => &mut self.business_hours,
            "closed_days" => &mut self.closed_days,
            "website" => &mut self.website,
            "benefits" => &mut self.benefits,
            "description" => &mut self.description,
            "parking" => &mut self.parking,
            "category" => &mut self.category,
            "genre" => &mut self.genre,
            "source_id" => &mut self.source_id,
            other => {
                self.extra_fields
                    .entry(other.to_string())
                    .or_insert(serde_json::Value::String(value));
                return;
            }
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    /// Turns parsed fields into a [`Record`] with a stable id.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::MissingField`] when there is no shop name.
    pub fn into_record(
        self,
        region: &RegionConfig,
        canonical_url: &str,
        scraped_at: DateTime<Utc>,
    ) -> Result<Record, ParseError> {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| ParseError::MissingField {
                url: canonical_url.to_string(),
                field: "name",
            })?;
        Ok(Record {
            id: record_id(&region.code, self.source_id.as_deref(), canonical_url),
            region_code: region.code.clone(),
            region_name: region.name.clone(),
            detail_url: canonical_url.to_string(),
            name,
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
            extra_fields: self.extra_fields,
            coordinate: None,
            scraped_at,
            updated_at: scraped_at,
        })
    }
}

/// `{region}_{source_id}` when the site exposes an id, otherwise
/// `{region}_{first 8 hex of sha256(url)}`.
#[must_use]
pub fn record_id(region_code: &str, source_id: Option<&str>, canonical_url: &str) -> String {
    match source_id.map(str::trim).filter(|s| !s.is_empty()) {
        Some(source_id) => format!("{region_code}_{source_id}"),
        None => {
            let digest = Sha256::digest(canonical_url.as_bytes());
            let short: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();
            format!("{region_code}_{short}")
        }
    }
}

#[cfg(test)]
#[path = "parse_test.rs"]
mod tests;
