use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use shopdir_core::LabelTableSelectors;

use super::{clean_text, LinkExtractor, Parser, ShopFields};
use crate::error::{ParseError, SetupError};

static LABEL_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:th|dt)\b[^>]*>(.*?)</(?:th|dt)>\s*<(?:td|dd)\b[^>]*>(.*?)</(?:td|dd)>")
        .expect("valid regex")
});

/// Reads `<th>/<td>` and `<dt>/<dd>` pairs, mapping label text to fields.
/// Unmapped labels are kept as extra fields.
pub struct LabelTableParser {
    links: LinkExtractor,
    name_pattern: Option<Regex>,
    labels: BTreeMap<String, String>,
}

impl LabelTableParser {
    /// # Errors
    ///
    /// Returns [`SetupError::Pattern`] if the name pattern does not compile.
    pub fn new(links: LinkExtractor, selectors: &LabelTableSelectors) -> Result<Self, SetupError> {
        let name_pattern = selectors
            .name_pattern
            .as_deref()
            .map(|p| RegexBuilder::new(p).dot_matches_new_line(true).build())
            .transpose()
            .map_err(|source| SetupError::Pattern {
                what: "shop name",
                source,
            })?;
        let labels = selectors
            .labels
            .iter()
            .map(|(label, field)| (normalize_label(label), field.clone()))
            .collect();
        Ok(Self {
            links,
            name_pattern,
            labels,
        })
    }
}

fn normalize_label(label: &str) -> String {
    label
        .trim()
        .trim_end_matches([':', '：'])
        .trim()
        .to_string()
}

impl Parser for LabelTableParser {
    fn extract_detail_links(&self, list_html: &str) -> Vec<String> {
        self.links.extract(list_html)
    }

    fn parse_detail(&self, detail_url: &str, detail_html: &str) -> Result<ShopFields, ParseError> {
        let mut fields = ShopFields::default();

        if let Some(re) = &self.name_pattern {
            if let Some(name) = re
                .captures(detail_html)
                .and_then(|c| c.get(1))
                .and_then(|m| clean_text(m.as_str()))
            {
                fields.set("name", name);
            }
        }

        let mut matched_any = false;
        for caps in LABEL_VALUE_RE.captures_iter(detail_html) {
            let (Some(label), Some(value)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let Some(label) = clean_text(label.as_str()).map(|l| normalize_label(&l)) else {
                continue;
            };
            let Some(value) = clean_text(value.as_str()) else {
                continue;
            };
            matched_any = true;
            match self.labels.get(&label) {
                Some(field) => fields.set(field, value),
                None => fields.set(&label, value),
            }
        }

        if !matched_any && fields.name.is_none() {
            return Err(ParseError::NoMatch {
                url: detail_url.to_string(),
            });
        }
        Ok(fields)
    }
}
