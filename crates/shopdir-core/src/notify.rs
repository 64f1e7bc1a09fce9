use async_trait::async_trait;
use thiserror::Error;

use crate::run::RunResult;

#[derive(Debug, Clone)]
pub enum RunEvent {
    Started {
        region_code: String,
        region_name: String,
        resume_page: u32,
    },
    Completed(Box<RunResult>),
    Failed(Box<RunResult>),
}

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Fire-and-forget run notifications. Callers log and drop errors.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &RunEvent) -> Result<(), NotifyError>;
}
