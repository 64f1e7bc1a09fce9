use axum::{extract::State, Extension, Json};
use serde::Serialize;
use shopdir_core::{PaginationConfig, RegionConfig};

use crate::middleware::RequestId;

use super::{ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct RegionItem {
    pub code: String,
    pub name: String,
    pub base_url: String,
    pub pagination: &'static str,
    pub parser: &'static str,
    pub uses_session: bool,
    pub running: bool,
}

impl RegionItem {
    fn new(region: &RegionConfig, running: bool) -> Self {
        Self {
            code: region.code.clone(),
            name: region.name.clone(),
            base_url: region.base_url.clone(),
            pagination: match region.pagination {
                PaginationConfig::Fixed { .. } => "fixed",
                PaginationConfig::Auto { .. } => "auto",
            },
            parser: region.parser.kind(),
            uses_session: region.session.is_some(),
            running,
        }
    }
}

pub(super) async fn list_regions(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<Vec<RegionItem>>> {
    let data = state
        .runner
        .regions()
        .iter()
        .map(|r| RegionItem::new(r, state.runner.is_running(&r.code)))
        .collect();

    Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    })
}
