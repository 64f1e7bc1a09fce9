use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;
use shopdir_core::RunResult;

use crate::middleware::RequestId;

use super::{map_store_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct RunsQuery {
    pub region: Option<String>,
    pub limit: Option<i64>,
}

pub(super) async fn list_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<ApiResponse<Vec<RunResult>>>, ApiError> {
    let limit = usize::try_from(normalize_limit(query.limit)).unwrap_or(1);
    let runs = state
        .runner
        .stores()
        .history
        .recent_runs(query.region.as_deref(), limit)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: runs,
        meta: ResponseMeta::new(req_id.0),
    }))
}
