use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Serialize;
use shopdir_core::{Progress, ProgressKey};

use crate::middleware::RequestId;

use super::{map_store_error, unknown_region, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct ProgressData {
    pub region_code: String,
    /// `None` when the next run starts from the first page.
    pub progress: Option<Progress>,
}

#[derive(Debug, Serialize)]
pub(super) struct ClearedData {
    pub region_code: String,
    pub cleared: bool,
}

pub(super) async fn get_progress(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(region): Path<String>,
) -> Result<Json<ApiResponse<ProgressData>>, ApiError> {
    if state.runner.regions().iter().all(|r| r.code != region) {
        return Err(unknown_region(req_id.0, &region));
    }

    let progress = state
        .runner
        .stores()
        .progress
        .load(&ProgressKey::scrape(&region))
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: ProgressData {
            region_code: region,
            progress,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn clear_progress(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(region): Path<String>,
) -> Result<Json<ApiResponse<ClearedData>>, ApiError> {
    if state.runner.regions().iter().all(|r| r.code != region) {
        return Err(unknown_region(req_id.0, &region));
    }
    if state.runner.is_running(&region) {
        return Err(ApiError::new(
            req_id.0,
            "conflict",
            format!("a scrape of region '{region}' is running"),
        ));
    }

    state
        .runner
        .stores()
        .progress
        .clear(&ProgressKey::scrape(&region))
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;
    tracing::info!(region = %region, "progress cleared");

    Ok(Json(ApiResponse {
        data: ClearedData {
            region_code: region,
            cleared: true,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}
