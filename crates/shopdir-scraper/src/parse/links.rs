use regex::Regex;
use reqwest::Url;

use crate::error::SetupError;

/// Pulls detail links out of list pages with a regex and resolves them
/// against the site's base URL.
pub struct LinkExtractor {
    base: Url,
    pattern: Regex,
}

impl LinkExtractor {
    /// # Errors
    ///
    /// Returns [`SetupError`] if the base URL or pattern is invalid.
    pub fn new(base_url: &str, pattern: &str) -> Result<Self, SetupError> {
        let base = Url::parse(base_url).map_err(|e| SetupError::BaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        let pattern = Regex::new(pattern).map_err(|source| SetupError::Pattern {
            what: "detail link",
            source,
        })?;
        Ok(Self { base, pattern })
    }

    #[must_use]
    pub fn extract(&self, html: &str) -> Vec<String> {
        let mut links: Vec<String> = Vec::new();
        for caps in self.pattern.captures_iter(html) {
            let Some(raw) = caps.get(1) else { continue };
            let raw = raw.as_str().trim().replace("&amp;", "&");
            let Ok(url) = self.base.join(&raw) else {
                tracing::debug!(link = %raw, "skipping unresolvable detail link");
                continue;
            };
            let url = url.to_string();
            if !links.contains(&url) {
                links.push(url);
            }
        }
        links
    }
}
