// Unit status, lifecycle control and runtime configuration endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use tracing::{error, info, warn};

use super::common::{internal_error, not_found, ApiResponse, ApiResult};
use crate::constants::web::CONTROL_RESPONSE_WAIT;
use crate::database::UnitConfigRecord;
use crate::services::{ConfigResult, UnitStatus};
use crate::web::AppState;

/// Compact per-unit view served by `/api/status`
#[derive(Debug, Serialize)]
pub struct StatusEntry {
    pub running: bool,
    pub healthy: bool,
    pub uptime_seconds: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
}

impl From<&UnitStatus> for StatusEntry {
    fn from(status: &UnitStatus) -> Self {
        Self {
            running: status.running,
            healthy: status.healthy,
            uptime_seconds: status.uptime_seconds,
            error_count: status.error_count,
            last_error: status.last_error.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceDetail {
    #[serde(flatten)]
    pub status: UnitStatus,
    pub config_overrides: Vec<UnitConfigRecord>,
}

/// Dashboard status map, not wrapped in the response envelope
pub async fn get_status(State(state): State<AppState>) -> Json<BTreeMap<String, StatusEntry>> {
    let statuses = state.manager.get_all_services_status().await;
    Json(
        statuses
            .iter()
            .map(|(name, status)| (name.clone(), StatusEntry::from(status)))
            .collect(),
    )
}

pub async fn list_services(
    State(state): State<AppState>,
) -> ApiResult<BTreeMap<String, UnitStatus>> {
    Ok(Json(ApiResponse::success(
        state.manager.get_all_services_status().await,
    )))
}

pub async fn get_service(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<ServiceDetail> {
    let status = state
        .manager
        .get_service_status(&name)
        .await
        .ok_or_else(|| not_found("Service", &name))?;

    let config_overrides = state
        .database
        .get_unit_config(&name)
        .await
        .map_err(internal_error)?;

    Ok(Json(ApiResponse::success(ServiceDetail {
        status,
        config_overrides,
    })))
}

pub async fn start_service(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<()>>, (StatusCode, Json<ApiResponse<()>>)> {
    let manager = state.manager.clone();
    let target = name.clone();
    control(&state, &name, "start", async move {
        manager.start_service(&target).await
    })
    .await
}

pub async fn stop_service(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<()>>, (StatusCode, Json<ApiResponse<()>>)> {
    let manager = state.manager.clone();
    let target = name.clone();
    control(&state, &name, "stop", async move {
        manager.stop_service(&target).await
    })
    .await
}

pub async fn restart_service(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<()>>, (StatusCode, Json<ApiResponse<()>>)> {
    let manager = state.manager.clone();
    let target = name.clone();
    control(&state, &name, "restart", async move {
        manager.restart_service(&target).await
    })
    .await
}

/// Run a lifecycle operation in the background and answer within
/// `CONTROL_RESPONSE_WAIT`. Operations still running by then are reported as
/// accepted; their outcome shows up in later status polls.
async fn control<F>(
    state: &AppState,
    name: &str,
    action: &str,
    operation: F,
) -> Result<Json<ApiResponse<()>>, (StatusCode, Json<ApiResponse<()>>)>
where
    F: Future<Output = bool> + Send + 'static,
{
    if state.manager.get_service(name).await.is_none() {
        return Err(not_found("Service", name));
    }

    info!("{} requested for unit {}", action, name);
    let mut handle = tokio::spawn(operation);

    match tokio::time::timeout(CONTROL_RESPONSE_WAIT, &mut handle).await {
        Ok(Ok(true)) => Ok(Json(ApiResponse::outcome(
            true,
            format!("Unit {}: {} completed", name, action),
        ))),
        Ok(Ok(false)) => {
            warn!("{} of unit {} did not complete cleanly", action, name);
            Ok(Json(ApiResponse::outcome(
                false,
                format!("Unit {}: {} failed, see status for details", name, action),
            )))
        }
        Ok(Err(e)) => {
            error!("{} task for unit {} failed: {}", action, name, e);
            Err(internal_error(e))
        }
        Err(_) => Ok(Json(ApiResponse::outcome(
            true,
            format!("Unit {}: {} accepted and still in progress", name, action),
        ))),
    }
}

/// Apply configuration keys; keys that were accepted are persisted
pub async fn update_service_config(
    Path(name): Path<String>,
    State(state): State<AppState>,
    Json(values): Json<BTreeMap<String, Value>>,
) -> Result<Json<BTreeMap<String, ConfigResult>>, (StatusCode, Json<ApiResponse<()>>)> {
    let results = state
        .manager
        .apply_config(&name, &values)
        .await
        .map_err(|_| not_found("Service", &name))?;

    for (key, result) in &results {
        if !result.success {
            continue;
        }
        if let Some(value) = values.get(key) {
            if let Err(e) = state.database.save_unit_config(&name, key, value).await {
                error!("Failed to persist {}.{}: {}", name, key, e);
            }
        }
    }

    Ok(Json(results))
}
