//! Session tokens for sites that embed one in every list/detail URL.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use reqwest::Url;
use shopdir_core::SessionConfig;
use tokio::sync::Mutex;

use crate::error::{SessionError, SetupError, SiteError};
use crate::fetch::{FetchRequest, FetchResponse, RateLimitedFetcher};

/// Decides whether a response means the current token is no longer accepted.
pub type StalePredicate = Box<dyn Fn(&FetchResponse) -> bool + Send + Sync>;

/// Bootstraps, caches and refreshes a site's session token.
pub struct SessionManager {
    fetcher: Arc<RateLimitedFetcher>,
    bootstrap_url: String,
    submit_form: bool,
    token_pattern: Regex,
    is_stale: StalePredicate,
    token: Mutex<Option<String>>,
}

impl SessionManager {
    /// # Errors
    ///
    /// Returns [`SetupError::Pattern`] if a configured regex does not compile.
    pub fn from_config(
        config: &SessionConfig,
        fetcher: Arc<RateLimitedFetcher>,
    ) -> Result<Self, SetupError> {
        let token_pattern = Regex::new(&config.token_pattern).map_err(|source| {
            SetupError::Pattern {
                what: "session token",
                source,
            }
        })?;
        let is_stale = stale_predicate(config)?;
        Ok(Self {
            fetcher,
            bootstrap_url: config.bootstrap_url.clone(),
            submit_form: config.submit_form,
            token_pattern,
            is_stale,
            token: Mutex::new(None),
        })
    }

    /// Replaces the stale-session heuristic.
    #[must_use]
    pub fn with_stale_predicate(mut self, is_stale: StalePredicate) -> Self {
        self.is_stale = is_stale;
        self
    }

    /// Returns the cached token, bootstrapping one first if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the bootstrap request fails or the token
    /// pattern does not match.
    pub async fn ensure_session(&self) -> Result<String, SessionError> {
        let mut token = self.token.lock().await;
        if let Some(existing) = token.as_ref() {
            return Ok(existing.clone());
        }
        let fresh = self.bootstrap().await?;
        tracing::info!(bootstrap_url = %self.bootstrap_url, "session established");
        *token = Some(fresh.clone());
        Ok(fresh)
    }

    pub async fn invalidate(&self) {
        *self.token.lock().await = None;
    }

    #[must_use]
    pub fn is_stale(&self, response: &FetchResponse) -> bool {
        (self.is_stale)(response)
    }

    /// Fetches the request built from the current token. A stale answer
    /// triggers exactly one re-bootstrap and retry.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError`] if the fetch fails, the session cannot be
    /// bootstrapped, or the site rejects the fresh token too.
    pub async fn fetch_with_session<F>(&self, build: F) -> Result<FetchResponse, SiteError>
    where
        F: Fn(&str) -> FetchRequest,
    {
        let token = self.ensure_session().await?;
        let request = build(&token);
        let response = self.fetcher.fetch(&request).await?;
        if !self.is_stale(&response) {
            return Ok(response);
        }

        tracing::info!(url = %request.url, status = response.status, "stale session, re-bootstrapping");
        self.invalidate().await;
        let token = self.ensure_session().await?;
        let request = build(&token);
        let response = self.fetcher.fetch(&request).await?;
        if self.is_stale(&response) {
            return Err(SessionError::StillStale { url: request.url }.into());
        }
        Ok(response)
    }

    async fn bootstrap(&self) -> Result<String, SessionError> {
        let entry = self
            .fetcher
            .fetch(&FetchRequest::get(&self.bootstrap_url))
            .await
            .map_err(|source| SessionError::Fetch {
                url: self.bootstrap_url.clone(),
                source,
            })?;

        let landing = if self.submit_form {
            let form = first_form(&entry.body, &entry.final_url).ok_or_else(|| {
                SessionError::BootstrapFailed {
                    url: self.bootstrap_url.clone(),
                    reason: "no form found on bootstrap page".to_string(),
                }
            })?;
            let request = if form.method_is_get {
                FetchRequest::get(with_query_pairs(&form.action, &form.fields))
            } else {
                FetchRequest::post_form(form.action.clone(), form.fields)
            };
            self.fetcher
                .fetch(&request)
                .await
                .map_err(|source| SessionError::Fetch {
                    url: form.action,
                    source,
                })?
        } else {
            entry
        };

        self.extract_token(&landing)
            .ok_or_else(|| SessionError::BootstrapFailed {
                url: self.bootstrap_url.clone(),
                reason: "token pattern matched neither the final URL nor the body".to_string(),
            })
    }

    fn extract_token(&self, response: &FetchResponse) -> Option<String> {
        [response.final_url.as_str(), response.body.as_str()]
            .into_iter()
            .find_map(|haystack| {
                self.token_pattern
                    .captures(haystack)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
            })
    }
}

fn stale_predicate(config: &SessionConfig) -> Result<StalePredicate, SetupError> {
    let statuses = config.stale_statuses.clone();
    let body_pattern = config
        .stale_body_pattern
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|source| SetupError::Pattern {
            what: "stale session body",
            source,
        })?;
    Ok(Box::new(move |response: &FetchResponse| {
        statuses.contains(&response.status)
            || body_pattern
                .as_ref()
                .is_some_and(|re| re.is_match(&response.body))
    }))
}

static FORM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<form\b([^>]*)>(.*?)</form>").expect("valid regex"));
static INPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<input\b([^>]*)>").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HtmlForm {
    pub action: String,
    pub method_is_get: bool,
    pub fields: Vec<(String, String)>,
}

/// The first `<form>` on the page with its named `<input>` values, its
/// action resolved against `page_url`.
pub(crate) fn first_form(html: &str, page_url: &str) -> Option<HtmlForm> {
    let caps = FORM_RE.captures(html)?;
    let attrs = caps.get(1).map_or("", |m| m.as_str());
    let inner = caps.get(2).map_or("", |m| m.as_str());

    let base = Url::parse(page_url).ok()?;
    let action = match attribute(attrs, "action") {
        Some(a) if !a.is_empty() => base.join(&a).ok()?.to_string(),
        _ => base.to_string(),
    };
    let method_is_get =
        attribute(attrs, "method").is_some_and(|m| m.eq_ignore_ascii_case("get"));

    let fields = INPUT_RE
        .captures_iter(inner)
        .filter_map(|c| {
            let input_attrs = c.get(1)?.as_str();
            let name = attribute(input_attrs, "name")?;
            let value = attribute(input_attrs, "value").unwrap_or_default();
            Some((name, value))
        })
        .collect();

    Some(HtmlForm {
        action,
        method_is_get,
        fields,
    })
}

fn attribute(attrs: &str, name: &str) -> Option<String> {
    let re = Regex::new(&format!(
        r#"(?i)\b{}\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#,
        regex::escape(name)
    ))
    .ok()?;
    let caps = re.captures(attrs)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str().to_string())
}

/// Sets `pairs` as query parameters on `url`, replacing existing keys.
pub(crate) fn with_query_pairs(url: &str, pairs: &[(String, String)]) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !pairs.iter().any(|(name, _)| name == k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    {
        let mut query = parsed.query_pairs_mut();
        query.clear();
        query.extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        query.extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    if parsed.query() == Some("") {
        parsed.set_query(None);
    }
    parsed.to_string()
}

/// Drops the query parameter `name` from `url`.
pub(crate) fn without_query_param(url: &str, name: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if parsed.query().is_none() {
        return url.to_string();
    }
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed
            .query_pairs_mut()
            .clear()
            .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    parsed.to_string()
}
