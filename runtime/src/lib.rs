//! # Seat Booking Runtime
//!
//! Operational support shared by everything that drives bookings:
//!
//! - [`retry`]: exponential backoff with jitter for transient failures
//! - [`metrics`]: Prometheus exporter and the booking metrics recorder

/// Retry logic with exponential backoff
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

pub use metrics::{BookingMetrics, MetricsError, MetricsServer};
pub use retry::{RetryPolicy, RetryPolicyBuilder, retry_with_predicate};
