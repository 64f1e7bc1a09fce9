use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use shopdir_core::{RunResult, RunStatus};

use crate::middleware::RequestId;
use crate::runner::{RunRequest, RunnerError};

use super::{unknown_region, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Default, Deserialize)]
pub(super) struct ScrapeParams {
    #[serde(default)]
    pub reset: bool,
    pub max_pages: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(super) struct ScrapeRunData {
    pub run: RunResult,
    pub warnings: Vec<String>,
}

/// Runs one region synchronously and returns its summary. A failed run still
/// carries the summary, under a 500.
pub(super) async fn run_scrape(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(region): Path<String>,
    Query(params): Query<ScrapeParams>,
) -> Result<(StatusCode, Json<ApiResponse<ScrapeRunData>>), ApiError> {
    if params.max_pages == Some(0) {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "max_pages must be at least 1",
        ));
    }

    let request = RunRequest {
        reset: params.reset,
        page_budget: params.max_pages,
    };
    let run = match state.runner.run(&region, "api", &request).await {
        Ok(run) => run,
        Err(RunnerError::UnknownRegion(code)) => return Err(unknown_region(req_id.0, &code)),
        Err(e @ RunnerError::AlreadyRunning(_)) => {
            return Err(ApiError::new(req_id.0, "conflict", e.to_string()))
        }
        Err(e @ RunnerError::Setup { .. }) => {
            tracing::error!(error = %e, "scrape setup failed");
            return Err(ApiError::new(req_id.0, "internal_error", e.to_string()));
        }
    };

    let status = match run.status {
        RunStatus::Success | RunStatus::PartialFailure => StatusCode::OK,
        RunStatus::Failed => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let warnings = warnings_for(&run);

    Ok((
        status,
        Json(ApiResponse {
            data: ScrapeRunData { run, warnings },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

fn warnings_for(run: &RunResult) -> Vec<String> {
    let mut warnings = Vec::new();
    if let Some(reason) = run.stop_reason.filter(|r| !r.is_terminal()) {
        if run.status != RunStatus::Failed {
            let reason = serde_json::to_value(reason)
                .ok()
                .and_then(|v| v.as_str().map(ToOwned::to_owned))
                .unwrap_or_default();
            warnings.push(format!(
                "run stopped early ({reason}); the next run resumes from the checkpoint"
            ));
        }
    }
    if let Some(error) = &run.fatal_error {
        warnings.push(error.clone());
    }
    warnings.extend(run.failures.iter().map(|f| match &f.record_id {
        Some(id) => format!("page {}: {id} ({}): {}", f.page, f.url, f.reason),
        None => format!("page {}: {}: {}", f.page, f.url, f.reason),
    }));
    warnings
}
