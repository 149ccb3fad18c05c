// Rate limiter inspection and reset endpoints

use axum::{
    extract::{Path, State},
    response::Json,
};
use std::collections::BTreeMap;
use tracing::info;

use super::common::{not_found, ApiResponse, ApiResult};
use crate::rate_limiter::RateLimiterStatus;
use crate::web::AppState;

pub async fn list_rate_limiters(
    State(state): State<AppState>,
) -> ApiResult<BTreeMap<String, RateLimiterStatus>> {
    Ok(Json(ApiResponse::success(state.limiters.statuses())))
}

pub async fn reset_rate_limiter(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<RateLimiterStatus> {
    let limiter = state
        .limiters
        .get(&name)
        .ok_or_else(|| not_found("Rate limiter", &name))?;

    limiter.reset();
    info!("Rate limiter {} reset via API", name);
    Ok(Json(ApiResponse::success(limiter.get_status())))
}
