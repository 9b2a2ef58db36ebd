//! Latest execution result per job name
//!
//! The record lives in the hash `stats:<name>` and is shared by every
//! instance. Each run replaces it whole; there is no history.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::errors::CronSyncResult;
use crate::store::{CoordinationStore, KeySpace};

const FIELD_LAST_RUN: &str = "lastRun";
const FIELD_DURATION: &str = "duration";
const FIELD_STATUS: &str = "status";
const FIELD_INSTANCE_ID: &str = "instanceId";
const FIELD_ERROR: &str = "error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Success,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Success => "success",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(JobStatus::Success),
            "error" => Ok(JobStatus::Error),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// Outcome of the most recent run of a job name.
///
/// A job that never ran reads back as the default record with every field
/// unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    /// Milliseconds, successful runs only
    #[serde(rename = "duration", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatsRecord {
    pub fn success(last_run: DateTime<Utc>, duration: Duration, instance_id: &str) -> Self {
        Self {
            last_run: Some(last_run),
            duration_ms: Some(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)),
            status: Some(JobStatus::Success),
            instance_id: Some(instance_id.to_string()),
            error: None,
        }
    }

    pub fn failure(last_run: DateTime<Utc>, error: &str, instance_id: &str) -> Self {
        Self {
            last_run: Some(last_run),
            duration_ms: None,
            status: Some(JobStatus::Error),
            instance_id: Some(instance_id.to_string()),
            error: Some(error.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Hash fields as stored, omitting unset ones
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = Vec::with_capacity(5);
        if let Some(last_run) = self.last_run {
            fields.push((
                FIELD_LAST_RUN.to_string(),
                last_run.to_rfc3339_opts(SecondsFormat::Millis, true),
            ));
        }
        if let Some(duration) = self.duration_ms {
            fields.push((FIELD_DURATION.to_string(), duration.to_string()));
        }
        if let Some(status) = self.status {
            fields.push((FIELD_STATUS.to_string(), status.to_string()));
        }
        if let Some(instance_id) = &self.instance_id {
            fields.push((FIELD_INSTANCE_ID.to_string(), instance_id.clone()));
        }
        if let Some(error) = &self.error {
            fields.push((FIELD_ERROR.to_string(), error.clone()));
        }
        fields
    }

    /// Rebuild a record from stored hash fields.
    ///
    /// Another instance may have written fields this one cannot parse; those
    /// are logged and left unset rather than failing the read.
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        let last_run = fields.get(FIELD_LAST_RUN).and_then(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| warn!("Ignoring unparseable {} '{}': {}", FIELD_LAST_RUN, raw, e))
                .ok()
        });
        let duration_ms = fields.get(FIELD_DURATION).and_then(|raw| {
            raw.parse::<u64>()
                .map_err(|e| warn!("Ignoring unparseable {} '{}': {}", FIELD_DURATION, raw, e))
                .ok()
        });
        let status = fields.get(FIELD_STATUS).and_then(|raw| {
            raw.parse::<JobStatus>()
                .map_err(|e| warn!("Ignoring unparseable {}: {}", FIELD_STATUS, e))
                .ok()
        });

        Self {
            last_run,
            duration_ms,
            status,
            instance_id: fields.get(FIELD_INSTANCE_ID).cloned(),
            error: fields.get(FIELD_ERROR).cloned(),
        }
    }
}

/// Reads and writes [`StatsRecord`]s in the shared store
#[derive(Clone)]
pub struct StatsStore {
    store: Arc<dyn CoordinationStore>,
    keys: KeySpace,
}

impl StatsStore {
    pub fn new(store: Arc<dyn CoordinationStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Overwrite the record for `job_name`
    pub async fn record(&self, job_name: &str, record: &StatsRecord) -> CronSyncResult<()> {
        let key = self.keys.stats_key(job_name);
        self.store.replace_hash(&key, &record.to_fields()).await?;
        Ok(())
    }

    /// Latest record for `job_name`; the default record if it never ran
    pub async fn get(&self, job_name: &str) -> CronSyncResult<StatsRecord> {
        let key = self.keys.stats_key(job_name);
        let fields = self.store.read_hash(&key).await?;
        Ok(StatsRecord::from_fields(&fields))
    }
}
