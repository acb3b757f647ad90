//! Metrics initialization for Prometheus exporter.
//!
//! Recorded metrics:
//!
//! - `hostgate_queries_total{record_type}`: questions received by the responder
//! - `hostgate_resolutions_total{source}`: answers per tier (`config.hosts`,
//!   `system.hosts`, `upstream`)
//! - `hostgate_upstream_errors_total`: failed upstream lookups
//! - `hostgate_upstream_duration_seconds`: upstream lookup latency

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsSettings;
use crate::error::{Error, Result};

/// Initialize the metrics system based on configuration.
///
/// When metrics are enabled, this starts an HTTP server that exposes
/// a `/metrics` endpoint for Prometheus to scrape.
///
/// When metrics are disabled, this is a no-op and the recording macros do
/// nothing.
pub fn init(settings: &MetricsSettings) -> Result<()> {
    if !settings.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(settings.listen)
        .install()
        .map_err(|e| Error::Metrics(e.to_string()))?;

    Ok(())
}
