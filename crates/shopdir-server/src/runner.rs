//! Runs scrape jobs on behalf of the API and the scheduler, one at a time
//! per region within this process.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use shopdir_core::{AppConfig, Notifier, RegionConfig, RegionsFile, RunResult, Stores};
use shopdir_scraper::{JobOptions, ScrapeJob, SetupError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("region '{0}' is not configured")]
    UnknownRegion(String),

    #[error("a scrape of region '{0}' is already running")]
    AlreadyRunning(String),

    #[error("could not set up scrape of region '{code}': {source}")]
    Setup {
        code: String,
        #[source]
        source: SetupError,
    },
}

#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub reset: bool,
    pub page_budget: Option<u32>,
}

pub struct ScrapeRunner {
    config: Arc<AppConfig>,
    regions: Arc<RegionsFile>,
    stores: Stores,
    notifier: Arc<dyn Notifier>,
    active: Mutex<HashSet<String>>,
}

/// Marks a region busy until dropped.
struct ActiveRun<'a> {
    active: &'a Mutex<HashSet<String>>,
    code: String,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.code);
    }
}

impl ScrapeRunner {
    #[must_use]
    pub fn new(
        config: Arc<AppConfig>,
        regions: Arc<RegionsFile>,
        stores: Stores,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            regions,
            stores,
            notifier,
            active: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn regions(&self) -> &[RegionConfig] {
        &self.regions.regions
    }

    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn is_running(&self, code: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(code)
    }

    /// Runs region `code` to completion.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] when the run could not start. Failures during
    /// the run are reported in the returned [`RunResult`].
    pub async fn run(
        &self,
        code: &str,
        trigger: &str,
        request: &RunRequest,
    ) -> Result<RunResult, RunnerError> {
        let region = self
            .regions
            .find(code)
            .ok_or_else(|| RunnerError::UnknownRegion(code.to_string()))?;
        let _guard = self.claim(code)?;

        let job = ScrapeJob::from_config(
            region,
            &self.config,
            self.stores.clone(),
            Arc::clone(&self.notifier),
        )
        .map_err(|source| RunnerError::Setup {
            code: code.to_string(),
            source,
        })?;
        let options = JobOptions {
            reset: request.reset,
            page_budget: request.page_budget,
            ..JobOptions::from_config(&self.config, trigger)
        };
        Ok(job.run(&options).await)
    }

    fn claim(&self, code: &str) -> Result<ActiveRun<'_>, RunnerError> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(code.to_string()) {
            return Err(RunnerError::AlreadyRunning(code.to_string()));
        }
        Ok(ActiveRun {
            active: &self.active,
            code: code.to_string(),
        })
    }
}
