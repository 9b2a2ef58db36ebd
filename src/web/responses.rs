//! HTTP request/response types and error mapping
//!
//! Bodies are camelCase JSON. Every error is returned as `{ "error": "..." }`
//! with a status derived from the error kind.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::errors::CronSyncError;
use crate::job_scheduling::{JobOptions, JobSummary, StatsRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleJobRequest {
    pub name: Option<String>,
    pub cron_pattern: Option<String>,
    pub script: Option<String>,
    #[serde(default)]
    pub options: Option<JobOptions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleJobResponse {
    pub message: String,
    pub job_id: String,
    pub name: String,
    pub cron_pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsResponse {
    pub jobs: Vec<JobSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub stats: StatsRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunJobResponse {
    pub outcome: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error returned by handlers
#[derive(Debug)]
pub enum ApiError {
    /// The request itself is malformed or incomplete
    BadRequest(String),
    CronSync(CronSyncError),
}

impl ApiError {
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::CronSync(error) => match error {
                CronSyncError::InvalidPattern { .. } => StatusCode::BAD_REQUEST,
                CronSyncError::JobNotFound { .. } => StatusCode::NOT_FOUND,
                CronSyncError::LockStoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                CronSyncError::TaskExecution { .. } | CronSyncError::Configuration { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl From<CronSyncError> for ApiError {
    fn from(error: CronSyncError) -> Self {
        Self::CronSync(error)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(message) => message,
            ApiError::CronSync(error) => error.to_string(),
        };
        if status.is_server_error() {
            error!("Request failed with {}: {}", status, message);
        }

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
