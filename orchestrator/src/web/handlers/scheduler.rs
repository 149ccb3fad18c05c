// Scheduler job inspection and pause/resume endpoints

use axum::{
    extract::{Path, State},
    response::Json,
};
use tracing::info;

use super::common::{not_found, ApiResponse, ApiResult};
use crate::scheduler::JobInfo;
use crate::web::AppState;

pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Vec<JobInfo>> {
    Ok(Json(ApiResponse::success(state.scheduler.get_jobs())))
}

pub async fn pause_job(
    Path(job_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<JobInfo> {
    if !state.scheduler.pause_job(&job_id) {
        return Err(not_found("Job", &job_id));
    }
    info!("Job {} paused via API", job_id);
    job_info(&state, &job_id)
}

pub async fn resume_job(
    Path(job_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<JobInfo> {
    if !state.scheduler.resume_job(&job_id) {
        return Err(not_found("Job", &job_id));
    }
    info!("Job {} resumed via API", job_id);
    job_info(&state, &job_id)
}

fn job_info(state: &AppState, job_id: &str) -> ApiResult<JobInfo> {
    state
        .scheduler
        .get_job(job_id)
        .map(|info| Json(ApiResponse::success(info)))
        .ok_or_else(|| not_found("Job", job_id))
}
