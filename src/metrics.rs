//! Metrics for chat exchanges, background sync and policy changes
//!
//! # Metrics
//!
//! - `chat_messages_sent_total`: Counter of accepted user messages
//! - `chat_reply_duration_seconds`: Histogram of send-to-reply time by outcome
//! - `chat_replies_total`: Counter of finished exchanges by outcome
//! - `chat_replies_in_flight`: Gauge of exchanges awaiting a reply
//! - `chat_sync_failures_total`: Counter of failed background syncs by job kind
//! - `policy_changes_applied_total`: Counter of users whose policy changed
//!
//! # Examples
//!
//! ```
//! use iamguard::metrics::ReplyMetrics;
//!
//! let metrics = ReplyMetrics::start("session-1");
//! metrics.record_outcome("success");
//! ```

use metrics::{counter, decrement_gauge, histogram, increment_counter, increment_gauge};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Metrics for one send-message exchange
///
/// Created when a send is accepted. The in-flight gauge is decremented
/// exactly once, either by [`ReplyMetrics::record_outcome`] or on drop.
#[derive(Debug)]
pub struct ReplyMetrics {
    session_id: String,
    start: Instant,
    recorded: AtomicBool,
}

impl ReplyMetrics {
    /// Starts tracking an exchange in `session_id`
    ///
    /// # Examples
    ///
    /// ```
    /// use iamguard::metrics::ReplyMetrics;
    ///
    /// let metrics = ReplyMetrics::start("s1");
    /// assert_eq!(metrics.session_id(), "s1");
    /// ```
    pub fn start(session_id: &str) -> Self {
        increment_counter!("chat_messages_sent_total");
        increment_gauge!("chat_replies_in_flight", 1.0);

        Self {
            session_id: session_id.to_string(),
            start: Instant::now(),
            recorded: AtomicBool::new(false),
        }
    }

    /// Records how the exchange ended (`success`, `error`)
    ///
    /// Later calls are ignored.
    pub fn record_outcome(&self, outcome: &str) {
        if self.recorded.swap(true, Ordering::SeqCst) {
            return;
        }

        histogram!(
            "chat_reply_duration_seconds",
            self.start.elapsed().as_secs_f64(),
            "outcome" => outcome.to_string()
        );
        increment_counter!("chat_replies_total", "outcome" => outcome.to_string());
        decrement_gauge!("chat_replies_in_flight", 1.0);
    }

    /// Session the exchange belongs to
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Time since the exchange started
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for ReplyMetrics {
    fn drop(&mut self) {
        if !self.recorded.load(Ordering::SeqCst) {
            decrement_gauge!("chat_replies_in_flight", 1.0);
        }
    }
}

/// Counts a failed background sync job.
pub fn record_sync_failure(kind: &str) {
    increment_counter!("chat_sync_failures_total", "kind" => kind.to_string());
}

/// Counts users whose policy changes were submitted.
pub fn record_policy_apply(users: usize) {
    counter!("policy_changes_applied_total", users as u64);
}

/// Initializes the metrics exporter for Prometheus
///
/// A no-op unless the `prometheus` feature is enabled.
///
/// # Examples
///
/// ```
/// use iamguard::metrics::init_metrics_exporter;
///
/// init_metrics_exporter();
/// ```
pub fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let _ = builder.install().map_err(|e| {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        });
    }
}
