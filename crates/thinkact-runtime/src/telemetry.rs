//! Logging setup and a tracing-backed event tracker.

use serde_json::Value;
use thinkact_core::observability::Tracker;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}

/// Forwards run events to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTracker;

impl Tracker for LogTracker {
    fn track(&self, event: &str, properties: &Value) -> anyhow::Result<()> {
        tracing::debug!(target: "thinkact::events", event, %properties, "event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_init_is_idempotent() {
        init("warn");
        init("debug");
    }

    #[test]
    fn test_log_tracker_never_fails() {
        assert!(LogTracker.track("agent.run.started", &json!({"run_id": "r"})).is_ok());
    }
}
