//! The work a job performs, as seen by the coordinator
//!
//! The coordinator never looks inside a task: it calls `run`, waits, and
//! records whether it returned a value or an error. Sandboxing, resource
//! limits and the like belong to whoever implements the trait.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use tracing::info;

use super::types::JobOptions;

/// Everything a task gets to know about the run it is part of
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub job_name: String,
    pub instance_id: String,
    pub options: JobOptions,
}

/// Asynchronous unit of work executed under the job's lock
#[async_trait]
pub trait JobTask: Send + Sync {
    async fn run(&self, ctx: &TaskContext) -> anyhow::Result<Value>;
}

/// Adapter turning an async closure into a [`JobTask`]
pub struct FnTask<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> JobTask for FnTask<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn run(&self, ctx: &TaskContext) -> anyhow::Result<Value> {
        (self.func)(ctx.clone()).await
    }
}

/// Wrap an async closure as a shareable task
pub fn task_fn<F, Fut>(func: F) -> Arc<dyn JobTask>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FnTask { func })
}

/// Task created by the HTTP API from a script reference.
///
/// Execution of the script itself is delegated to the sandbox that runs next
/// to the service; this task reports which script the tick dispatched.
#[derive(Debug, Clone)]
pub struct ScriptTask {
    script: String,
}

impl ScriptTask {
    pub fn new<S: Into<String>>(script: S) -> Self {
        Self {
            script: script.into(),
        }
    }

    pub fn script(&self) -> &str {
        &self.script
    }
}

#[async_trait]
impl JobTask for ScriptTask {
    async fn run(&self, ctx: &TaskContext) -> anyhow::Result<Value> {
        info!(
            job = %ctx.job_name,
            instance = %ctx.instance_id,
            "Executing script: {}",
            self.script
        );
        Ok(json!({ "success": true, "script": self.script }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> TaskContext {
        TaskContext {
            job_name: "report".to_string(),
            instance_id: "instance-a".to_string(),
            options: JobOptions::new(),
        }
    }

    #[tokio::test]
    async fn test_fn_task_sees_context() {
        let task = task_fn(|ctx: TaskContext| async move { Ok(json!(ctx.job_name)) });
        assert_eq!(task.run(&context()).await.unwrap(), json!("report"));
    }

    #[tokio::test]
    async fn test_fn_task_propagates_error() {
        let task = task_fn(|_ctx: TaskContext| async { Err(anyhow::anyhow!("boom")) });
        let error = task.run(&context()).await.unwrap_err();
        assert_eq!(error.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_script_task_reports_script() {
        let task = ScriptTask::new("scripts/cleanup.js");
        let result = task.run(&context()).await.unwrap();
        assert_eq!(result, json!({ "success": true, "script": "scripts/cleanup.js" }));
    }
}
