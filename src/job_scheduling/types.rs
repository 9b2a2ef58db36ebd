//! Job scheduling type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::{CronSyncError, CronSyncResult};

/// Free-form options handed through to the task untouched
pub type JobOptions = serde_json::Map<String, Value>;

/// Identifier of one scheduled entry on one instance: `<name>_<uuid>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh id for a job name
    pub fn generate(job_name: &str) -> Self {
        Self(format!("{job_name}_{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Result of one coordinated execution attempt
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// Another owner holds the lock for this job name. Not an error.
    Skipped,
    /// The task ran here and returned a value
    Succeeded { result: Value, duration: Duration },
    /// The task ran here and failed
    Failed { error: anyhow::Error },
}

impl ExecutionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionOutcome::Skipped => "skipped",
            ExecutionOutcome::Succeeded { .. } => "succeeded",
            ExecutionOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ExecutionOutcome::Skipped)
    }

    /// Whether the task body actually ran on this instance
    pub fn ran_locally(&self) -> bool {
        !self.is_skipped()
    }

    /// Turn a task failure into `CronSyncError::TaskExecution` so the caller
    /// sees it as an error; other outcomes pass through.
    pub fn into_task_result(self, job_name: &str) -> CronSyncResult<ExecutionOutcome> {
        match self {
            ExecutionOutcome::Failed { error } => {
                Err(CronSyncError::task_execution(job_name, error))
            }
            outcome => Ok(outcome),
        }
    }

    /// JSON shape used by the HTTP API
    pub fn to_json(&self) -> Value {
        match self {
            ExecutionOutcome::Skipped => json!({ "status": "skipped" }),
            ExecutionOutcome::Succeeded { result, duration } => json!({
                "status": "succeeded",
                "result": result,
                "durationMs": u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            }),
            ExecutionOutcome::Failed { error } => json!({
                "status": "failed",
                "error": error.to_string(),
            }),
        }
    }
}

/// What `list_jobs` reports for one local entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: JobId,
    pub name: String,
    pub pattern: String,
    pub created_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub is_running: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_embeds_name() {
        let id = JobId::generate("backup");
        assert!(id.as_str().starts_with("backup_"));
        assert_ne!(id, JobId::generate("backup"));
    }

    #[test]
    fn test_failed_outcome_becomes_task_error() {
        let outcome = ExecutionOutcome::Failed {
            error: anyhow::anyhow!("boom"),
        };
        match outcome.into_task_result("backup") {
            Err(CronSyncError::TaskExecution { name, source }) => {
                assert_eq!(name, "backup");
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("expected task error, got {other:?}"),
        }
    }

    #[test]
    fn test_skipped_and_succeeded_pass_through() {
        assert!(
            ExecutionOutcome::Skipped
                .into_task_result("a")
                .unwrap()
                .is_skipped()
        );

        let outcome = ExecutionOutcome::Succeeded {
            result: json!(42),
            duration: Duration::from_millis(7),
        };
        let json = outcome.into_task_result("a").unwrap().to_json();
        assert_eq!(json["status"], "succeeded");
        assert_eq!(json["result"], 42);
        assert_eq!(json["durationMs"], 7);
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let summary = JobSummary {
            id: JobId::from("backup_1"),
            name: "backup".to_string(),
            pattern: "*/5 * * * *".to_string(),
            created_at: Utc::now(),
            last_run: None,
            run_count: 0,
            is_running: true,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["id"], "backup_1");
        assert_eq!(json["runCount"], 0);
        assert_eq!(json["isRunning"], true);
        assert!(json["lastRun"].is_null());
    }
}
