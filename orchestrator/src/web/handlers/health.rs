// Health history endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use tracing::error;

use super::common::{ApiResponse, ApiResult, HistoryQuery};
use crate::database::HealthRecord;
use crate::web::AppState;

/// Most recent health record written by the monitor
pub async fn get_latest_health(State(state): State<AppState>) -> ApiResult<HealthRecord> {
    match state.database.get_latest_health_record().await {
        Ok(Some(record)) => Ok(Json(ApiResponse::success(record))),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(
                "No health records available yet".to_string(),
            )),
        )),
        Err(e) => {
            error!("Failed to load latest health record: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            ))
        }
    }
}

pub async fn get_health_history(
    Query(query): Query<HistoryQuery>,
    State(state): State<AppState>,
) -> ApiResult<Vec<HealthRecord>> {
    if query.limit <= 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("limit must be positive".to_string())),
        ));
    }

    match state.database.get_health_history(query.limit).await {
        Ok(records) => Ok(Json(ApiResponse::success(records))),
        Err(e) => {
            error!("Failed to load health history: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            ))
        }
    }
}
