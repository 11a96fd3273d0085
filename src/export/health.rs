use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use prometheus::{
    Counter, CounterVec, Encoder, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};

use crate::wazuh::MetricsCallback;

const NAMESPACE: &str = "wazuh_exporter";

/// Prometheus metrics describing the exporter itself.
///
/// All metrics use the "wazuh_exporter" namespace and are appended to every
/// successful scrape.
pub struct ExporterMetrics {
    registry: Registry,

    /// Scrapes by result (success/error).
    pub scrapes_total: CounterVec,
    /// End-to-end scrape duration, including rendering.
    pub scrape_duration: Histogram,
    /// Manager API requests by endpoint and status.
    pub api_requests_total: CounterVec,
    /// Manager API request duration by endpoint.
    pub api_request_duration: HistogramVec,
    /// Metric families that failed to build, by family.
    pub family_errors_total: CounterVec,
    /// Last-registered agents left out because they never connected.
    pub skipped_agents_total: Counter,
}

impl ExporterMetrics {
    /// Creates the exporter metrics with all metrics registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let scrapes_total = CounterVec::new(
            Opts::new("scrapes_total", "Total scrapes of the Wazuh manager by result.")
                .namespace(NAMESPACE),
            &["result"],
        )?;
        let scrape_duration = Histogram::with_opts(
            HistogramOpts::new(
                "scrape_duration_seconds",
                "Time to collect and render one scrape.",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        let api_requests_total = CounterVec::new(
            Opts::new(
                "api_requests_total",
                "Total Wazuh API requests by endpoint and status.",
            )
            .namespace(NAMESPACE),
            &["endpoint", "status"],
        )?;
        let api_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "api_request_duration_seconds",
                "Wazuh API request duration by endpoint.",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["endpoint"],
        )?;
        let family_errors_total = CounterVec::new(
            Opts::new(
                "family_errors_total",
                "Total metric families that failed to build, by family.",
            )
            .namespace(NAMESPACE),
            &["family"],
        )?;
        let skipped_agents_total = Counter::with_opts(
            Opts::new(
                "skipped_agents_total",
                "Total last registered agents skipped because they never connected.",
            )
            .namespace(NAMESPACE),
        )?;

        registry.register(Box::new(scrapes_total.clone()))?;
        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(api_requests_total.clone()))?;
        registry.register(Box::new(api_request_duration.clone()))?;
        registry.register(Box::new(family_errors_total.clone()))?;
        registry.register(Box::new(skipped_agents_total.clone()))?;

        Ok(Self {
            registry,
            scrapes_total,
            scrape_duration,
            api_requests_total,
            api_request_duration,
            family_errors_total,
            skipped_agents_total,
        })
    }

    /// Record one manager API request.
    pub fn record_request(&self, endpoint: &str, status: &str, duration: Duration) {
        self.api_requests_total
            .with_label_values(&[endpoint, status])
            .inc();
        self.api_request_duration
            .with_label_values(&[endpoint])
            .observe(duration.as_secs_f64());
    }

    /// Callback for the manager client that records into these metrics.
    pub fn request_callback(self: &Arc<Self>) -> MetricsCallback {
        let metrics = Arc::clone(self);
        Box::new(move |endpoint, status, duration| {
            metrics.record_request(endpoint, status, duration)
        })
    }

    /// Encode every registered metric in the text exposition format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("encoding exporter metrics")?;

        String::from_utf8(buffer).context("converting exporter metrics to string")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_callback_records_into_registry() {
        let metrics = Arc::new(ExporterMetrics::new().expect("metrics"));
        let cb = metrics.request_callback();

        cb("agents_overview", "success", Duration::from_millis(20));
        cb("agents_overview", "success", Duration::from_millis(30));
        cb("login", "error", Duration::from_millis(5));

        assert_eq!(
            metrics
                .api_requests_total
                .with_label_values(&["agents_overview", "success"])
                .get(),
            2.0
        );

        let text = metrics.encode().expect("encode");
        assert!(text.contains(
            "wazuh_exporter_api_requests_total{endpoint=\"login\",status=\"error\"} 1"
        ));
        assert!(text.contains("wazuh_exporter_api_request_duration_seconds_bucket"));
    }

    #[test]
    fn test_encode_includes_scrape_counters() {
        let metrics = ExporterMetrics::new().expect("metrics");
        metrics.scrapes_total.with_label_values(&["success"]).inc();
        metrics.skipped_agents_total.inc_by(2.0);

        let text = metrics.encode().expect("encode");
        assert!(text.contains("wazuh_exporter_scrapes_total{result=\"success\"} 1"));
        assert!(text.contains("wazuh_exporter_skipped_agents_total 2"));
        assert!(text.contains("# TYPE wazuh_exporter_scrape_duration_seconds histogram"));
    }
}
