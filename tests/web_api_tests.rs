//! HTTP API over an in-memory backend

mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};
use std::sync::Arc;

use common::instance;
use cronsync::job_scheduling::CronSync;
use cronsync::store::MemoryStore;
use cronsync::web::router;

fn server() -> (TestServer, Arc<CronSync>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let (cronsync, _trigger) = instance(store.clone(), "instance-a");
    let cronsync = Arc::new(cronsync);
    let server = TestServer::new(router(cronsync.clone())).unwrap();
    (server, cronsync, store)
}

async fn schedule(server: &TestServer, name: &str) -> String {
    let response = server
        .post("/jobs")
        .json(&json!({
            "name": name,
            "cronPattern": "*/5 * * * *",
            "script": format!("{name}.js"),
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["jobId"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn health_reports_ok() {
    let (server, _, _) = server();
    let response = server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "ok");
}

#[tokio::test]
async fn schedule_then_list() {
    let (server, _, _) = server();

    let response = server
        .post("/jobs")
        .json(&json!({
            "name": "backup",
            "cronPattern": "*/5 * * * *",
            "script": "backup.js",
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body = response.json::<Value>();
    assert_eq!(body["message"], "Job scheduled successfully");
    assert_eq!(body["name"], "backup");
    assert_eq!(body["cronPattern"], "*/5 * * * *");
    let job_id = body["jobId"].as_str().unwrap();
    assert!(job_id.starts_with("backup_"));

    let listing = server.get("/jobs").await.json::<Value>();
    let jobs = listing["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"], job_id);
    assert_eq!(jobs[0]["runCount"], 0);
    assert_eq!(jobs[0]["isRunning"], true);
}

#[tokio::test]
async fn schedule_requires_all_fields() {
    let (server, _, _) = server();

    let response = server
        .post("/jobs")
        .json(&json!({ "cronPattern": "*/5 * * * *", "script": "x.js" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "name is required");

    let response = server
        .post("/jobs")
        .json(&json!({ "name": "backup", "cronPattern": "  ", "script": "x.js" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "cronPattern is required");
}

#[tokio::test]
async fn schedule_rejects_invalid_pattern_and_bad_json() {
    let (server, cronsync, store) = server();

    let response = server
        .post("/jobs")
        .json(&json!({ "name": "backup", "cronPattern": "whenever", "script": "x.js" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let error = response.json::<Value>()["error"].as_str().unwrap().to_string();
    assert!(error.starts_with("Invalid cron pattern: whenever"));

    server
        .post("/jobs")
        .text("not json")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    assert!(cronsync.list_jobs().await.is_empty());
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn stop_job_by_id() {
    let (server, cronsync, _) = server();
    let job_id = schedule(&server, "backup").await;

    let response = server.delete(&format!("/jobs/{job_id}")).await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["message"], "Job stopped successfully");
    assert!(cronsync.list_jobs().await.is_empty());

    let response = server.delete(&format!("/jobs/{job_id}")).await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(
        response.json::<Value>()["error"],
        format!("Job not found: {job_id}")
    );
}

#[tokio::test]
async fn stop_all_jobs() {
    let (server, cronsync, _) = server();
    schedule(&server, "a").await;
    schedule(&server, "b").await;

    let response = server.post("/jobs/stop-all").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["message"], "All jobs stopped successfully");
    assert!(cronsync.list_jobs().await.is_empty());
}

#[tokio::test]
async fn run_job_and_read_stats() {
    let (server, _, _) = server();
    let job_id = schedule(&server, "backup").await;

    let stats = server.get("/jobs/backup/stats").await.json::<Value>();
    assert_eq!(stats, json!({ "stats": {} }));

    let response = server.post(&format!("/jobs/{job_id}/run")).await;
    response.assert_status_ok();
    let outcome = &response.json::<Value>()["outcome"];
    assert_eq!(outcome["status"], "succeeded");
    assert_eq!(outcome["result"], json!({ "success": true, "script": "backup.js" }));

    let stats = server.get("/jobs/backup/stats").await.json::<Value>();
    assert_eq!(stats["stats"]["status"], "success");
    assert_eq!(stats["stats"]["instanceId"], "instance-a");
    assert!(stats["stats"]["lastRun"].is_string());
    assert!(stats["stats"]["duration"].is_u64());
}

#[tokio::test]
async fn running_unknown_job_is_not_found() {
    let (server, _, _) = server();
    server
        .post("/jobs/missing_1/run")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn store_outage_maps_to_service_unavailable() {
    let (server, _, store) = server();
    store.set_available(false);

    let response = server.get("/jobs/backup/stats").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert!(
        response.json::<Value>()["error"]
            .as_str()
            .unwrap()
            .starts_with("Lock store unavailable")
    );
}
