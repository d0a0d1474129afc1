use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use derive_new::new;
use eyre::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::CoreMetrics;

/// A server that serves the prometheus metrics of an agent
#[derive(new, Debug)]
pub struct Server {
    listen_port: u16,
    core_metrics: Arc<CoreMetrics>,
}

impl Server {
    /// Router serving `/metrics` in OpenMetrics format (this is compatible
    /// with Prometheus, which ought to be configured to scrape this endpoint)
    pub fn router(&self) -> Router {
        let core_metrics = self.core_metrics.clone();
        Router::new().route("/metrics", get(move || Self::gather_metrics(core_metrics)))
    }

    /// Bind the port and serve in the background
    pub async fn run(self: Arc<Self>) -> Result<JoinHandle<()>> {
        let url = format!("0.0.0.0:{}", self.listen_port);
        let listener = tokio::net::TcpListener::bind(&url)
            .await
            .with_context(|| format!("Failed to bind metrics server to {url}"))?;
        info!(port = self.listen_port, "starting metrics server on 0.0.0.0");
        let app = self.router();
        Ok(tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                error!(?err, "Metrics server stopped");
            }
        }))
    }

    async fn gather_metrics(core_metrics: Arc<CoreMetrics>) -> impl IntoResponse {
        debug!("Traversing route for /metrics endpoint for serving Prometheus metrics");
        match core_metrics.gather().map(String::from_utf8) {
            Ok(Ok(metrics)) => (StatusCode::OK, metrics),
            Ok(Err(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".into(),
            ),
            Err(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to gather metrics".into(),
            ),
        }
    }
}
