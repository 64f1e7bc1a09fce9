use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use encoding_rs::Encoding;
use regex::Regex;
use shopdir_core::{AppConfig, Record, RegionConfig};

use crate::error::{DetailError, SetupError, SiteError};
use crate::fetch::{FetcherConfig, RateLimitedFetcher};
use crate::pacing::RequestPacer;
use crate::parse::{parser_for, Parser};
use crate::session::SessionManager;
use crate::site::{SiteClient, TokenPlacement};
use crate::walker::{PageWalker, WalkMode};

/// HTTP settings shared by every region.
#[derive(Debug, Clone)]
pub struct ScraperSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl From<&AppConfig> for ScraperSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeout_secs: config.scraper_request_timeout_secs,
            user_agent: config.scraper_user_agent.clone(),
            max_retries: config.scraper_max_retries,
            backoff_base_ms: config.scraper_retry_backoff_base_ms,
        }
    }
}

/// Everything needed to scrape one region: its site, its parser and its
/// configuration.
pub struct RegionScraper {
    region: RegionConfig,
    site: Arc<SiteClient>,
    parser: Arc<dyn Parser>,
    source_id_pattern: Option<Regex>,
}

impl RegionScraper {
    /// Wires a region from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] if a pattern is invalid or the HTTP client
    /// cannot be built.
    pub fn from_config(region: &RegionConfig, settings: &ScraperSettings) -> Result<Self, SetupError> {
        let allowed_statuses = region
            .session
            .as_ref()
            .map(|s| s.stale_statuses.clone())
            .unwrap_or_default();
        let encoding = region
            .encoding
            .as_deref()
            .map(|label| {
                Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| SetupError::Encoding {
                    label: label.to_string(),
                })
            })
            .transpose()?;
        let fetcher_config = FetcherConfig {
            timeout_secs: settings.timeout_secs,
            user_agent: settings.user_agent.clone(),
            max_retries: settings.max_retries,
            backoff_base_ms: settings.backoff_base_ms,
            allowed_statuses,
            encoding,
        };
        let pacer = RequestPacer::new(
            Duration::from_millis(region.rate_limit.min_wait_ms),
            Duration::from_millis(region.rate_limit.max_wait_ms),
        );
        let fetcher = Arc::new(RateLimitedFetcher::new(&fetcher_config, pacer)?);

        let session = region
            .session
            .as_ref()
            .map(|config| SessionManager::from_config(config, Arc::clone(&fetcher)))
            .transpose()?;
        let tokens = TokenPlacement {
            detail_param: region.session.as_ref().and_then(|s| s.token_param.clone()),
        };
        let site = Arc::new(SiteClient::new(fetcher, session, tokens));

        Self::new(region.clone(), site, parser_for(region)?)
    }

    /// # Errors
    ///
    /// Returns [`SetupError::Pattern`] if the source id pattern is invalid.
    pub fn new(
        region: RegionConfig,
        site: Arc<SiteClient>,
        parser: Arc<dyn Parser>,
    ) -> Result<Self, SetupError> {
        let source_id_pattern = region
            .source_id_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|source| SetupError::Pattern {
                what: "source id",
                source,
            })?;
        Ok(Self {
            region,
            site,
            parser,
            source_id_pattern,
        })
    }

    #[must_use]
    pub fn region(&self) -> &RegionConfig {
        &self.region
    }

    /// # Errors
    ///
    /// Returns [`SiteError::Session`] if the site needs a session and none
    /// can be established.
    pub async fn fetch_session_if_needed(&self) -> Result<(), SiteError> {
        self.site.fetch_session_if_needed().await
    }

    #[must_use]
    pub fn walk_pages(&self, start_page: u32, initial_empty_streak: u32) -> PageWalker {
        PageWalker::new(
            Arc::clone(&self.site),
            Arc::clone(&self.parser),
            &self.region.list_url,
            WalkMode::from(&self.region.pagination),
            start_page,
            initial_empty_streak,
        )
    }

    /// The detail URL with session tokens stripped; two links naming the
    /// same shop map to the same string.
    #[must_use]
    pub fn canonical_detail_url(&self, link: &str) -> String {
        self.site.canonical_detail_url(link)
    }

    /// Fetches and parses one detail page into a record.
    ///
    /// # Errors
    ///
    /// Returns [`DetailError`] if the page cannot be fetched or parsed.
    pub async fn fetch_record(&self, link: &str) -> Result<Record, DetailError> {
        let canonical = self.site.canonical_detail_url(link);
        let response = self.site.detail_page(&canonical).await?;
        let mut fields = self.parser.parse_detail(&canonical, &response.body)?;
        if fields.source_id.is_none() {
            fields.source_id = self.source_id_pattern.as_ref().and_then(|re| {
                re.captures(&canonical)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
            });
        }
        Ok(fields.into_record(&self.region, &canonical, Utc::now())?)
    }
}
