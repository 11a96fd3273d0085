use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::health::ExporterMetrics;
use crate::collector::Collector;
use crate::metrics::{self, exposition};
use crate::wazuh::ManagerApi;

/// HTTP server exposing `/metrics` and `/healthz`.
///
/// Every `/metrics` request runs a full scrape against the manager.
pub struct MetricsServer<A> {
    addr: SocketAddr,
    state: Arc<AppState<A>>,
    shutdown: parking_lot::Mutex<Option<CancellationToken>>,
}

/// Shared state for axum handlers.
struct AppState<A> {
    collector: Collector<A>,
    metrics: Arc<ExporterMetrics>,
}

impl<A: ManagerApi + 'static> MetricsServer<A> {
    pub fn new(addr: SocketAddr, collector: Collector<A>, metrics: Arc<ExporterMetrics>) -> Self {
        Self {
            addr,
            state: Arc::new(AppState { collector, metrics }),
            shutdown: parking_lot::Mutex::new(None),
        }
    }

    /// Routes served by the exporter.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler::<A>))
            .route("/healthz", get(healthz_handler))
            .with_state(Arc::clone(&self.state))
    }

    /// Binds the listener and starts serving in the background.
    ///
    /// Returns the bound address, which differs from the configured one when
    /// port 0 is requested.
    pub async fn start(&self) -> Result<SocketAddr> {
        let listener = TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("listening on {}", self.addr))?;

        let local_addr = listener.local_addr().context("getting local address")?;

        let app = self.router();
        let cancel = CancellationToken::new();
        *self.shutdown.lock() = Some(cancel.clone());

        tokio::spawn(async move {
            tracing::info!(addr = %local_addr, "metrics server started");

            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    cancel.cancelled().await;
                })
                .await;

            if let Err(e) = result {
                tracing::error!(error = %e, "metrics server error");
            }
        });

        Ok(local_addr)
    }

    /// Gracefully shuts down the server.
    pub async fn stop(&self) -> Result<()> {
        if let Some(cancel) = self.shutdown.lock().take() {
            cancel.cancel();
        }

        Ok(())
    }
}

/// GET /metrics - scrape the manager and render the exposition text.
async fn metrics_handler<A: ManagerApi>(State(state): State<Arc<AppState<A>>>) -> Response {
    let start = Instant::now();
    let self_metrics = &state.metrics;

    let snapshot = match state.collector.scrape().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!(error = %e, kind = e.kind(), "scrape failed");
            self_metrics.scrapes_total.with_label_values(&["error"]).inc();
            self_metrics
                .scrape_duration
                .observe(start.elapsed().as_secs_f64());
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    let mut families = metrics::build(&snapshot, state.collector.families());
    let mut body = metrics::render(families.by_ref());

    for failure in families.failures() {
        self_metrics
            .family_errors_total
            .with_label_values(&[failure.family.name()])
            .inc();
    }
    self_metrics
        .skipped_agents_total
        .inc_by(families.skipped_agents() as f64);
    self_metrics.scrapes_total.with_label_values(&["success"]).inc();
    self_metrics
        .scrape_duration
        .observe(start.elapsed().as_secs_f64());

    tracing::debug!(
        failed_families = families.failures().len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "scrape complete",
    );

    match self_metrics.encode() {
        Ok(text) => body.push_str(&text),
        Err(e) => tracing::error!(error = %e, "encoding exporter metrics"),
    }

    ([(header::CONTENT_TYPE, exposition::CONTENT_TYPE)], body).into_response()
}

/// GET /healthz - Simple health check.
async fn healthz_handler() -> &'static str {
    "ok"
}
