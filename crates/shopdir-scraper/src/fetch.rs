//! HTTP fetching with request pacing and retry on transient failure.

use std::time::Duration;

use encoding_rs::Encoding;
use reqwest::{Client, Method, Response};

use crate::error::{FetchError, SetupError};
use crate::pacing::RequestPacer;
use crate::retry::retry_with_backoff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub form: Option<Vec<(String, String)>>,
}

impl FetchRequest {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            form: None,
        }
    }

    #[must_use]
    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            form: Some(form),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    /// URL after redirects.
    pub final_url: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    /// 4xx statuses handed back to the caller instead of raised.
    pub allowed_statuses: Vec<u16>,
    /// Forced body encoding. `None` follows the `Content-Type` charset.
    pub encoding: Option<&'static Encoding>,
}

/// Paced, retrying HTTP client shared by everything that talks to one site.
pub struct RateLimitedFetcher {
    client: Client,
    pacer: RequestPacer,
    max_retries: u32,
    backoff_base_ms: u64,
    allowed_statuses: Vec<u16>,
    encoding: Option<&'static Encoding>,
}

impl RateLimitedFetcher {
    /// # Errors
    ///
    /// Returns [`SetupError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(config: &FetcherConfig, pacer: RequestPacer) -> Result<Self, SetupError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(&config.user_agent)
            .cookie_store(true)
            .build()?;
        Ok(Self {
            client,
            pacer,
            max_retries: config.max_retries,
            backoff_base_ms: config.backoff_base_ms,
            allowed_statuses: config.allowed_statuses.clone(),
            encoding: config.encoding,
        })
    }

    /// Sends `request`, retrying network failures and 5xx responses.
    ///
    /// # Errors
    ///
    /// - [`FetchError::ClientError`] for a 4xx outside the allow-list (not retried).
    /// - [`FetchError::ServerError`] for a 5xx once retries are exhausted.
    /// - [`FetchError::Network`] / [`FetchError::Body`] for transport failures
    ///   once retries are exhausted.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            self.fetch_once(request)
        })
        .await
    }

    async fn fetch_once(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        self.pacer.wait().await;

        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(form) = &request.form {
            builder = builder.form(form);
        }

        let response = builder.send().await.map_err(|source| FetchError::Network {
            url: request.url.clone(),
            source,
        })?;
        let status = response.status();
        let final_url = response.url().to_string();

        if status.is_server_error() {
            return Err(FetchError::ServerError {
                status: status.as_u16(),
                url: request.url.clone(),
            });
        }
        if status.is_client_error() && !self.allowed_statuses.contains(&status.as_u16()) {
            return Err(FetchError::ClientError {
                status: status.as_u16(),
                url: request.url.clone(),
            });
        }

        let body = self.decode_body(response).await.map_err(|source| FetchError::Body {
            url: request.url.clone(),
            source,
        })?;
        tracing::debug!(
            url = %request.url,
            status = status.as_u16(),
            bytes = body.len(),
            "fetched"
        );
        Ok(FetchResponse {
            status: status.as_u16(),
            final_url,
            body,
        })
    }

    async fn decode_body(&self, response: Response) -> Result<String, reqwest::Error> {
        let Some(encoding) = self.encoding else {
            return response.text().await;
        };
        let url = response.url().to_string();
        let bytes = response.bytes().await?;
        let (text, _, had_errors) = encoding.decode(&bytes);
        if had_errors {
            tracing::warn!(url = %url, encoding = encoding.name(), "body has bytes invalid in the configured encoding");
        }
        Ok(text.into_owned())
    }
}
