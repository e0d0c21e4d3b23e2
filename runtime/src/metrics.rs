//! Prometheus metrics for booking attempts and cancellations.
//!
//! Recording goes through the `metrics` facade, so it costs nothing until a
//! recorder is installed. [`MetricsServer`] installs the Prometheus exporter
//! with its own HTTP listener; start it from a long-running process that
//! embeds the booking service, since the listener lives only as long as the
//! process does.
//!
//! # Example
//!
//! ```rust,no_run
//! use seat_booking_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Start metrics server on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the recorder and start the HTTP listener.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed. A recorder
    /// that is already installed is tolerated with a warning.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let (recorder, exporter) = builder
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;
        let handle = recorder.handle();

        match metrics::set_global_recorder(recorder) {
            Ok(()) => {
                tokio::spawn(exporter);
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "booking_attempts_total",
        "Booking attempts by outcome (committed or the abort reason)"
    );
    describe_histogram!(
        "booking_duration_seconds",
        "Time from the start of a booking attempt to commit or rollback"
    );
    describe_counter!(
        "booking_invariant_violations_total",
        "Bookings aborted because stored data contradicts the data model"
    );
    describe_counter!(
        "booking_cancellations_total",
        "Cancellation requests by outcome (deleted or not_found)"
    );
    describe_counter!(
        "booking_retries_total",
        "Booking attempts replayed after a transient failure"
    );
    describe_counter!(
        "booking_serialization_failures_total",
        "Transactions the database aborted to resolve a write conflict"
    );
}

/// Booking metrics recorder.
pub struct BookingMetrics;

impl BookingMetrics {
    /// Record the outcome of one booking call.
    ///
    /// `outcome` is `committed` or an error kind such as `seat_conflict`.
    pub fn record_attempt(outcome: &'static str, duration: Duration) {
        counter!("booking_attempts_total", "outcome" => outcome).increment(1);
        histogram!("booking_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a booking aborted on corrupt data.
    pub fn record_invariant_violation() {
        counter!("booking_invariant_violations_total").increment(1);
    }

    /// Record a cancellation request.
    pub fn record_cancellation(outcome: &'static str) {
        counter!("booking_cancellations_total", "outcome" => outcome).increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[tokio::test]
    async fn test_metrics_server_render() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        BookingMetrics::record_attempt("committed", Duration::from_millis(12));
        BookingMetrics::record_attempt("seat_conflict", Duration::from_millis(3));
        BookingMetrics::record_cancellation("deleted");

        // The recorder is process-wide; another test may have installed it.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("booking_attempts_total"));
            assert!(rendered.contains("outcome=\"seat_conflict\""));
            assert!(rendered.contains("booking_cancellations_total"));
        }
    }
}
