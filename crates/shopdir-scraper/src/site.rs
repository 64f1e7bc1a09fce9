use std::sync::Arc;

use crate::error::SiteError;
use crate::fetch::{FetchRequest, FetchResponse, RateLimitedFetcher};
use crate::session::{with_query_pairs, without_query_param, SessionManager};

/// How a session token is attached to detail URLs.
#[derive(Debug, Clone, Default)]
pub struct TokenPlacement {
    /// Query parameter carrying the token on detail URLs.
    pub detail_param: Option<String>,
}

/// One region's site: list and detail pages, with the session handled
/// when the site needs one.
pub struct SiteClient {
    fetcher: Arc<RateLimitedFetcher>,
    session: Option<SessionManager>,
    tokens: TokenPlacement,
}

impl SiteClient {
    #[must_use]
    pub fn new(
        fetcher: Arc<RateLimitedFetcher>,
        session: Option<SessionManager>,
        tokens: TokenPlacement,
    ) -> Self {
        Self {
            fetcher,
            session,
            tokens,
        }
    }

    #[must_use]
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Bootstraps the session up front when the site uses one.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Session`] if the bootstrap fails.
    pub async fn fetch_session_if_needed(&self) -> Result<(), SiteError> {
        if let Some(session) = &self.session {
            session.ensure_session().await?;
        }
        Ok(())
    }

    /// Fetches list page `page` from a template with `{page}` and optional
    /// `{token}` placeholders.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError`] if the page cannot be fetched.
    pub async fn list_page(&self, template: &str, page: u32) -> Result<FetchResponse, SiteError> {
        let page = page.to_string();
        self.get(|token| {
            let url = template.replace("{page}", &page);
            match token {
                Some(token) => url.replace("{token}", token),
                None => url,
            }
        })
        .await
    }

    /// Fetches a detail page, attaching the current token if configured.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError`] if the page cannot be fetched.
    pub async fn detail_page(&self, url: &str) -> Result<FetchResponse, SiteError> {
        self.get(|token| match (token, &self.tokens.detail_param) {
            (Some(token), Some(param)) => {
                with_query_pairs(url, &[(param.clone(), token.to_string())])
            }
            _ => url.to_string(),
        })
        .await
    }

    /// Detail URL with any session token removed, for stable identities.
    #[must_use]
    pub fn canonical_detail_url(&self, url: &str) -> String {
        match &self.tokens.detail_param {
            Some(param) => without_query_param(url, param),
            None => url.to_string(),
        }
    }

    async fn get<F>(&self, url_for: F) -> Result<FetchResponse, SiteError>
    where
        F: Fn(Option<&str>) -> String,
    {
        match &self.session {
            Some(session) => {
                session
                    .fetch_with_session(|token| FetchRequest::get(url_for(Some(token))))
                    .await
            }
            None => Ok(self.fetcher.fetch(&FetchRequest::get(url_for(None))).await?),
        }
    }
}
