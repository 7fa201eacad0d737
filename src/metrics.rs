use std::net::SocketAddr;

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("relay_fetch_total", "Fetches per handle, by outcome.");
        describe_counter!(
            "relay_posts_delivered_total",
            "Posts delivered to the notification sink."
        );
        describe_counter!(
            "relay_delivery_errors_total",
            "Deliveries rejected by the notification sink."
        );
        describe_counter!(
            "relay_state_persist_errors_total",
            "Failed watermark writes."
        );
        describe_counter!("relay_alerts_total", "Operational alerts emitted, by kind.");
        describe_gauge!(
            "relay_consecutive_failures",
            "Consecutive fetch failures per handle."
        );
        describe_gauge!("relay_last_cycle_ts", "Unix ts when the last poll cycle finished.");
        describe_histogram!("relay_fetch_ms", "Fetch duration in milliseconds.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder for the whole process.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// `/metrics` in the Prometheus exposition format plus a liveness probe.
    pub fn router(&self) -> Router {
        router_for(self.handle.clone())
    }

    /// Serve the router on `addr` in the background.
    pub async fn serve(&self, addr: SocketAddr) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "metrics endpoint listening");
        let app = self.router();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::warn!("metrics server stopped: {e:#}");
            }
        });
        Ok(())
    }
}

pub fn router_for(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
}
