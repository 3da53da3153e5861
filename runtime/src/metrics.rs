//! Prometheus metrics for the lottery coordinator.
//!
//! Counters are recorded through the `metrics` facade; without an installed
//! recorder they are no-ops. [`MetricsExporter::install`] installs a Prometheus
//! recorder whose output can be rendered on demand.
//!
//! # Example
//!
//! ```rust,no_run
//! use waitlist_lottery_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let exporter = MetricsExporter::install()?;
//! // ... drive the coordinator ...
//! if let Some(text) = exporter.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;
use waitlist_lottery_core::notification::OutcomeKind;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Actions handled by the coordinator, by action and result
pub const ACTIONS_TOTAL: &str = "lottery_actions_total";
/// Entrants moved into `selected`, by kind (lottery | replacement)
pub const ENTRANTS_SELECTED_TOTAL: &str = "lottery_entrants_selected_total";
/// Notification deliveries, by outcome and status
pub const NOTIFICATIONS_TOTAL: &str = "lottery_notifications_total";
/// Writes rejected by the store's version check
pub const PERSIST_CONFLICTS_TOTAL: &str = "lottery_persist_conflicts_total";
/// Time from loading an event to persisting the result
pub const ACTION_DURATION_SECONDS: &str = "lottery_action_duration_seconds";

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

/// Installed Prometheus recorder.
pub struct MetricsExporter {
    handle: Option<PrometheusHandle>,
}

impl MetricsExporter {
    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// If a recorder is already installed (e.g. a second call in tests) the
    /// returned exporter cannot render but the call still succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be built or installed.
    pub fn install() -> Result<Self, MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                tracing::info!("Prometheus metrics recorder installed");
                Ok(Self {
                    handle: Some(handle),
                })
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(Self { handle: None })
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this exporter did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        ACTIONS_TOTAL,
        "Total number of lottery actions handled, by action and result"
    );
    describe_counter!(
        ENTRANTS_SELECTED_TOTAL,
        "Total number of entrants moved from the waiting list into a slot"
    );
    describe_counter!(
        NOTIFICATIONS_TOTAL,
        "Total number of notification deliveries, by outcome and status"
    );
    describe_counter!(
        PERSIST_CONFLICTS_TOTAL,
        "Total number of event writes rejected by the version check"
    );
    describe_histogram!(
        ACTION_DURATION_SECONDS,
        "Time taken to load, reduce and persist one action"
    );
}

/// Result label for [`ACTIONS_TOTAL`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionResult {
    /// Persisted
    Applied,
    /// Precondition skip
    Skipped,
    /// Store error or retries exhausted
    Failed,
}

impl ActionResult {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// Coordinator metrics recorder.
pub struct LotteryMetrics;

impl LotteryMetrics {
    /// Record one handled action.
    pub fn record_action(action: &'static str, result: ActionResult, duration: Duration) {
        counter!(ACTIONS_TOTAL, "action" => action, "result" => result.as_str()).increment(1);
        histogram!(ACTION_DURATION_SECONDS, "action" => action).record(duration.as_secs_f64());
    }

    /// Record entrants drawn by the main lottery or as replacements.
    pub fn record_selected(kind: &'static str, count: usize) {
        if count > 0 {
            counter!(ENTRANTS_SELECTED_TOTAL, "kind" => kind)
                .increment(u64::try_from(count).unwrap_or(u64::MAX));
        }
    }

    /// Record a version conflict on write.
    pub fn record_conflict() {
        counter!(PERSIST_CONFLICTS_TOTAL).increment(1);
    }

    /// Record a notification delivery attempt's final status.
    pub fn record_notification(outcome: OutcomeKind, delivered: bool) {
        let status = if delivered { "delivered" } else { "failed" };
        counter!(NOTIFICATIONS_TOTAL, "outcome" => outcome.as_str(), "status" => status).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        register_metrics();
        LotteryMetrics::record_action("run_lottery", ActionResult::Applied, Duration::from_millis(1));
        LotteryMetrics::record_selected("lottery", 3);
        LotteryMetrics::record_conflict();
        LotteryMetrics::record_notification(OutcomeKind::Cancelled, false);
    }

    #[test]
    fn test_action_result_labels() {
        assert_eq!(ActionResult::Applied.as_str(), "applied");
        assert_eq!(ActionResult::Skipped.as_str(), "skipped");
        assert_eq!(ActionResult::Failed.as_str(), "failed");
    }
}
