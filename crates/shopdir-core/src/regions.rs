use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Field names a parser may fill. Anything else lands in `extra_fields`.
pub const RECORD_FIELDS: &[&str] = &[
    "name",
    "address",
    "postal_code",
    "phone",
    "business_hours",
    "closed_days",
    "website",
    "benefits",
    "description",
    "parking",
    "category",
    "genre",
    "source_id",
];

/// Immutable per-region scrape settings, loaded once from `regions.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Two-digit prefecture code, e.g. `08`.
    pub code: String,
    pub name: String,
    pub base_url: String,
    /// List page URL with a `{page}` and optional `{token}` placeholder.
    pub list_url: String,
    /// First capture group is a detail link, absolute or relative to `base_url`.
    pub detail_link_pattern: String,
    /// Optional regex over the detail URL whose first group is the source id.
    #[serde(default)]
    pub source_id_pattern: Option<String>,
    /// Page encoding label such as `shift_jis`. Overrides whatever the
    /// response declares; unset means the `Content-Type` charset, else UTF-8.
    #[serde(default)]
    pub encoding: Option<String>,
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub session: Option<SessionConfig>,
    pub parser: ParserConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PaginationConfig {
    Fixed {
        #[serde(default = "default_start_page")]
        start_page: u32,
        end_page: u32,
    },
    Auto {
        #[serde(default = "default_start_page")]
        start_page: u32,
        #[serde(default = "default_max_empty_pages")]
        max_empty_pages: u32,
        #[serde(default = "default_max_repeated_pages")]
        max_repeated_pages: u32,
    },
}

impl PaginationConfig {
    #[must_use]
    pub fn start_page(&self) -> u32 {
        match self {
            PaginationConfig::Fixed { start_page, .. } | PaginationConfig::Auto { start_page, .. } => {
                *start_page
            }
        }
    }
}

fn default_start_page() -> u32 {
    1
}

fn default_max_empty_pages() -> u32 {
    3
}

fn default_max_repeated_pages() -> u32 {
    3
}

/// Randomised pause between consecutive requests to one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub min_wait_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_wait_ms: 1000,
            max_wait_ms: 1800,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub bootstrap_url: String,
    /// Submit the bootstrap page's first form and read the token from the result.
    #[serde(default)]
    pub submit_form: bool,
    /// First capture group is the token.
    pub token_pattern: String,
    /// Query parameter that carries the token on detail URLs.
    #[serde(default)]
    pub token_param: Option<String>,
    /// Response statuses that mean the token expired.
    #[serde(default = "default_stale_statuses")]
    pub stale_statuses: Vec<u16>,
    /// Body text that means the token expired.
    #[serde(default)]
    pub stale_body_pattern: Option<String>,
}

fn default_stale_statuses() -> Vec<u16> {
    vec![403]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParserConfig {
    Pattern(PatternSelectors),
    LabelTable(LabelTableSelectors),
}

impl ParserConfig {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ParserConfig::Pattern(_) => "pattern",
            ParserConfig::LabelTable(_) => "label_table",
        }
    }
}

/// One regex over the detail page; each named group fills the field of
/// the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSelectors {
    pub pattern: String,
}

/// Label cells (`<th>`/`<dt>`) mapped to record fields by their text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelTableSelectors {
    /// Regex for the shop name when it is not in the table.
    #[serde(default)]
    pub name_pattern: Option<String>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegionsFile {
    pub regions: Vec<RegionConfig>,
}

impl RegionsFile {
    #[must_use]
    pub fn find(&self, code: &str) -> Option<&RegionConfig> {
        self.regions.iter().find(|r| r.code == code)
    }
}

/// Load and validate region configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_regions(path: &Path) -> Result<RegionsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::RegionsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_regions(&content)
}

/// Parse and validate region configuration from YAML text.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_regions(content: &str) -> Result<RegionsFile, ConfigError> {
    let regions_file: RegionsFile =
        serde_yaml::from_str(content).map_err(ConfigError::RegionsFileParse)?;
    validate_regions(&regions_file)?;
    Ok(regions_file)
}

fn validate_regions(regions_file: &RegionsFile) -> Result<(), ConfigError> {
    let mut seen_codes = HashSet::new();
    for region in &regions_file.regions {
        validate_region(region)?;
        if !seen_codes.insert(region.code.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate region code: '{}'",
                region.code
            )));
        }
    }
    Ok(())
}

fn validate_region(region: &RegionConfig) -> Result<(), ConfigError> {
    let fail = |msg: String| ConfigError::Validation(format!("region '{}': {msg}", region.code));

    if region.code.len() != 2 || !region.code.chars().all(|c| c.is_ascii_digit()) {
        return Err(fail("code must be two digits".to_string()));
    }
    if region.name.trim().is_empty() {
        return Err(fail("name must be non-empty".to_string()));
    }
    if !region.base_url.starts_with("http://") && !region.base_url.starts_with("https://") {
        return Err(fail(format!("base_url is not http(s): {}", region.base_url)));
    }
    if !region.list_url.contains("{page}") {
        return Err(fail("list_url must contain {page}".to_string()));
    }
    if region.list_url.contains("{token}") && region.session.is_none() {
        return Err(fail("list_url uses {token} but no session is configured".to_string()));
    }

    if let Some(label) = &region.encoding {
        if encoding_rs::Encoding::for_label(label.trim().as_bytes()).is_none() {
            return Err(fail(format!("unknown encoding '{label}'")));
        }
    }

    compile_with_group(&region.detail_link_pattern, "detail_link_pattern").map_err(&fail)?;
    if let Some(pattern) = &region.source_id_pattern {
        compile_with_group(pattern, "source_id_pattern").map_err(&fail)?;
    }

    match region.pagination {
        PaginationConfig::Fixed {
            start_page,
            end_page,
        } => {
            if start_page == 0 || end_page < start_page {
                return Err(fail(format!(
                    "fixed pagination needs 1 <= start_page <= end_page, got {start_page}..={end_page}"
                )));
            }
        }
        PaginationConfig::Auto {
            start_page,
            max_empty_pages,
            max_repeated_pages,
        } => {
            if start_page == 0 {
                return Err(fail("start_page must be at least 1".to_string()));
            }
            if max_empty_pages == 0 {
                return Err(fail("max_empty_pages must be at least 1".to_string()));
            }
            if max_repeated_pages < 2 {
                return Err(fail("max_repeated_pages must be at least 2".to_string()));
            }
        }
    }

    if region.rate_limit.min_wait_ms > region.rate_limit.max_wait_ms {
        return Err(fail(format!(
            "rate_limit.min_wait_ms ({}) exceeds max_wait_ms ({})",
            region.rate_limit.min_wait_ms, region.rate_limit.max_wait_ms
        )));
    }

    if let Some(session) = &region.session {
        compile_with_group(&session.token_pattern, "session.token_pattern").map_err(&fail)?;
        if let Some(pattern) = &session.stale_body_pattern {
            Regex::new(pattern)
                .map_err(|e| fail(format!("session.stale_body_pattern does not compile: {e}")))?;
        }
    }

    match &region.parser {
        ParserConfig::Pattern(selectors) => {
            let re = Regex::new(&selectors.pattern)
                .map_err(|e| fail(format!("parser.pattern does not compile: {e}")))?;
            if !re.capture_names().flatten().any(|n| n == "name") {
                return Err(fail("parser.pattern needs a (?P<name>...) group".to_string()));
            }
        }
        ParserConfig::LabelTable(selectors) => {
            for field in selectors.labels.values() {
                if !RECORD_FIELDS.contains(&field.as_str()) {
                    return Err(fail(format!("parser.labels maps to unknown field '{field}'")));
                }
            }
            if let Some(pattern) = &selectors.name_pattern {
                compile_with_group(pattern, "parser.name_pattern").map_err(&fail)?;
            } else if !selectors.labels.values().any(|f| f == "name") {
                return Err(fail(
                    "parser needs a name_pattern or a label mapped to 'name'".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn compile_with_group(pattern: &str, what: &str) -> Result<Regex, String> {
    let re = Regex::new(pattern).map_err(|e| format!("{what} does not compile: {e}"))?;
    if re.captures_len() < 2 {
        return Err(format!("{what} needs at least one capture group"));
    }
    Ok(re)
}

#[cfg(test)]
#[path = "regions_test.rs"]
mod tests;
