use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("poll_cycles_total", "Poll cycles started, per source.");
        describe_counter!(
            "poll_errors_total",
            "Poll cycles aborted by a fetch error, by kind."
        );
        describe_counter!(
            "poll_new_records_total",
            "Records reported as new by the seen log."
        );
        describe_counter!("cache_hits_total", "Fetches served from the TTL cache.");
        describe_counter!("cache_misses_total", "Fetches that went to the remote.");
        describe_counter!(
            "store_unavailable_total",
            "Store calls that failed and were treated as misses."
        );
        describe_counter!("sink_failures_total", "Failed deliveries, per sink.");
        describe_histogram!("fetch_duration_ms", "Remote fetch time in milliseconds.");
        describe_gauge!("poll_last_run_ts", "Unix ts of the last poll cycle, per source.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if one is already set.
    pub fn init() -> Result<Self, BuildError> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        ensure_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
