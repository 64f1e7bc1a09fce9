//! Run notifications over a Slack incoming webhook.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use shopdir_core::{AppConfig, Notifier, NotifyError, RunEvent, RunResult};

use crate::error::SetupError;

pub struct SlackNotifier {
    client: Client,
    webhook_url: String,
    channel: Option<String>,
}

impl SlackNotifier {
    /// # Errors
    ///
    /// Returns [`SetupError::Http`] if the HTTP client cannot be built.
    pub fn new(webhook_url: &str, channel: Option<String>) -> Result<Self, SetupError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url.to_string(),
            channel,
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, event: &RunEvent) -> Result<(), NotifyError> {
        let mut payload = json!({ "text": message_for(event) });
        if let Some(channel) = &self.channel {
            payload["channel"] = json!(channel);
        }
        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| NotifyError(e.to_string()))?;
        Ok(())
    }
}

/// Drops every event. Used when no webhook is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _event: &RunEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

pub(crate) fn message_for(event: &RunEvent) -> String {
    match event {
        RunEvent::Started {
            region_code,
            region_name,
            resume_page,
        } => format!(":rocket: Scrape started for {region_name} ({region_code}) from page {resume_page}"),
        RunEvent::Completed(result) => {
            format!(":white_check_mark: {}", summary(result))
        }
        RunEvent::Failed(result) => {
            let reason = result.fatal_error.as_deref().unwrap_or("unknown error");
            format!(":x: {}\nError: {reason}", summary(result))
        }
    }
}

fn summary(result: &RunResult) -> String {
    let c = &result.counts;
    format!(
        "Scrape {} for {} ({}): {} pages, {} extracted, {} written, {} failed, geocode {} hit / {} miss, {:.1}s",
        result.status,
        result.region_name,
        result.region_code,
        c.pages_processed,
        c.records_extracted,
        c.records_written,
        c.records_failed,
        c.geocode_hits,
        c.geocode_misses,
        result.duration_secs(),
    )
}

/// Slack when a webhook is configured, otherwise a no-op.
///
/// # Errors
///
/// Returns [`SetupError::Http`] if the HTTP client cannot be built.
pub fn notifier_from_config(
    config: &AppConfig,
) -> Result<Arc<dyn Notifier>, SetupError> {
    let notifier: Arc<dyn Notifier> = match &config.slack_webhook_url {
        Some(url) => Arc::new(SlackNotifier::new(url, config.slack_channel.clone())?),
        None => Arc::new(NoopNotifier),
    };
    Ok(notifier)
}
