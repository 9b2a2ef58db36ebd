//! HTTP API over the lifecycle manager
//!
//! A thin layer: handlers parse the request, call [`CronSync`] and map the
//! result. Jobs created here run a [`ScriptTask`](crate::job_scheduling::ScriptTask).

use anyhow::Result;
use axum::{
    Router,
    routing::{delete, get, post},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::job_scheduling::CronSync;

pub mod handlers;
pub mod responses;

pub use responses::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub cronsync: Arc<CronSync>,
}

/// Build the API router
pub fn router(cronsync: Arc<CronSync>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/jobs", get(handlers::list_jobs).post(handlers::schedule_job))
        .route("/jobs/stop-all", post(handlers::stop_all_jobs))
        .route("/jobs/{job}", delete(handlers::stop_job))
        .route("/jobs/{job}/run", post(handlers::run_job))
        .route("/jobs/{job}/stats", get(handlers::job_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { cronsync })
}

pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(cronsync: Arc<CronSync>, host: &str, port: u16) -> Result<Self> {
        let ip: IpAddr = host
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address '{}': {}", host, e))?;
        let addr = SocketAddr::new(ip, port);
        Ok(Self {
            app: router(cronsync),
            addr,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until `cancellation_token` is cancelled, then finish in-flight
    /// requests and return.
    pub async fn serve_with_cancellation(
        self,
        cancellation_token: CancellationToken,
    ) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.addr, e))?;
        info!("CronSync API listening on {}", self.addr);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move {
                cancellation_token.cancelled().await;
                info!("Web server received cancellation signal, shutting down gracefully");
            })
            .await?;
        Ok(())
    }
}
