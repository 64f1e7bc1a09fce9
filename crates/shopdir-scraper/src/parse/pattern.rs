use regex::{Regex, RegexBuilder};
use shopdir_core::PatternSelectors;

use super::{clean_text, LinkExtractor, Parser, ShopFields};
use crate::error::{ParseError, SetupError};

/// One regex over the whole detail page; named groups become fields.
pub struct PatternParser {
    links: LinkExtractor,
    pattern: Regex,
}

impl PatternParser {
    /// # Errors
    ///
    /// Returns [`SetupError::Pattern`] if the detail pattern does not compile.
    pub fn new(links: LinkExtractor, selectors: &PatternSelectors) -> Result<Self, SetupError> {
        let pattern = RegexBuilder::new(&selectors.pattern)
            .dot_matches_new_line(true)
            .build()
            .map_err(|source| SetupError::Pattern {
                what: "detail",
                source,
            })?;
        Ok(Self { links, pattern })
    }
}

impl Parser for PatternParser {
    fn extract_detail_links(&self, list_html: &str) -> Vec<String> {
        self.links.extract(list_html)
    }

    fn parse_detail(&self, detail_url: &str, detail_html: &str) -> Result<ShopFields, ParseError> {
        let caps = self
            .pattern
            .captures(detail_html)
            .ok_or_else(|| ParseError::NoMatch {
                url: detail_url.to_string(),
            })?;
        let mut fields = ShopFields::default();
        for name in self.pattern.capture_names().flatten() {
            if let Some(value) = caps.name(name).and_then(|m| clean_text(m.as_str())) {
                fields.set(name, value);
            }
        }
        Ok(fields)
    }
}
