//! Route handlers
//!
//! Handlers only translate between HTTP and [`CronSync`]; validation beyond
//! required fields is left to the lifecycle manager.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::Utc;
use std::sync::Arc;

use super::AppState;
use super::responses::{
    ApiError, ApiResult, HealthResponse, JobsResponse, MessageResponse, RunJobResponse,
    ScheduleJobRequest, ScheduleJobResponse, StatsResponse,
};
use crate::job_scheduling::ScriptTask;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
    })
}

pub async fn list_jobs(State(state): State<AppState>) -> Json<JobsResponse> {
    Json(JobsResponse {
        jobs: state.cronsync.list_jobs().await,
    })
}

fn required(value: Option<String>, field: &str) -> ApiResult<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ApiError::bad_request(format!("{field} is required"))),
    }
}

pub async fn schedule_job(
    State(state): State<AppState>,
    payload: Result<Json<ScheduleJobRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ScheduleJobResponse>)> {
    let Json(request) = payload?;
    let name = required(request.name, "name")?;
    let cron_pattern = required(request.cron_pattern, "cronPattern")?;
    let script = required(request.script, "script")?;

    let job_id = state
        .cronsync
        .schedule(
            &cron_pattern,
            &name,
            Arc::new(ScriptTask::new(script)),
            request.options.unwrap_or_default(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ScheduleJobResponse {
            message: "Job scheduled successfully".to_string(),
            job_id: job_id.to_string(),
            name,
            cron_pattern,
        }),
    ))
}

pub async fn stop_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    state.cronsync.stop_job(&job_id).await?;
    Ok(Json(MessageResponse::new("Job stopped successfully")))
}

pub async fn stop_all_jobs(State(state): State<AppState>) -> Json<MessageResponse> {
    state.cronsync.stop_all().await;
    Json(MessageResponse::new("All jobs stopped successfully"))
}

pub async fn job_stats(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<StatsResponse>> {
    let stats = state.cronsync.get_stats(&name).await?;
    Ok(Json(StatsResponse { stats }))
}

pub async fn run_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<RunJobResponse>> {
    let outcome = state.cronsync.run_now(&job_id).await?;
    Ok(Json(RunJobResponse {
        outcome: outcome.to_json(),
    }))
}
