//! Observability hook.
//!
//! A [`Tracker`] receives coarse run events. Tracking is fire-and-forget: a
//! failing tracker is logged and otherwise ignored.

use serde_json::Value;

pub const RUN_STARTED: &str = "agent.run.started";
pub const TOOL_INVOKED: &str = "agent.tool.invoked";
pub const RUN_FINISHED: &str = "agent.run.finished";

/// Sink for run events
pub trait Tracker: Send + Sync {
    fn track(&self, event: &str, properties: &Value) -> anyhow::Result<()>;
}

/// Tracker that drops every event
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTracker;

impl Tracker for NoopTracker {
    fn track(&self, _event: &str, _properties: &Value) -> anyhow::Result<()> {
        Ok(())
    }
}

pub(crate) fn emit(tracker: &dyn Tracker, event: &str, properties: &Value) {
    if let Err(e) = tracker.track(event, properties) {
        tracing::warn!(event, error = %e, "tracker failed");
    }
}
