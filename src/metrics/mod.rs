//! Lightweight counters for grid activity.
//!
//! A [`UiMetrics`] value is shared through a grid's config as
//! `Arc<Mutex<UiMetrics>>`; snapshots convert into structured log events so
//! embedders can emit them on whatever cadence they like.

use crate::logging::{LogEvent, LogFields, LogLevel};
use serde_json::json;

#[derive(Debug, Default, Clone)]
pub struct UiMetrics {
    events: u64,
    draws: u64,
    slot_writes: u64,
    broadcasts: u64,
    rejections: u64,
}

impl UiMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&mut self) {
        self.events = self.events.saturating_add(1);
    }

    pub fn record_draw(&mut self, slot_writes: usize) {
        self.draws = self.draws.saturating_add(1);
        self.slot_writes = self.slot_writes.saturating_add(slot_writes as u64);
    }

    pub fn record_broadcast(&mut self, targets: usize) {
        self.broadcasts = self.broadcasts.saturating_add(targets as u64);
    }

    pub fn record_rejection(&mut self) {
        self.rejections = self.rejections.saturating_add(1);
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        MetricSnapshot {
            events: self.events,
            draws: self.draws,
            slot_writes: self.slot_writes,
            broadcasts: self.broadcasts,
            rejections: self.rejections,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSnapshot {
    pub events: u64,
    pub draws: u64,
    pub slot_writes: u64,
    pub broadcasts: u64,
    pub rejections: u64,
}

impl MetricSnapshot {
    pub fn to_log_event(&self, target: &str) -> LogEvent {
        let mut fields = LogFields::new();
        fields.insert("events".into(), json!(self.events));
        fields.insert("draws".into(), json!(self.draws));
        fields.insert("slot_writes".into(), json!(self.slot_writes));
        fields.insert("broadcasts".into(), json!(self.broadcasts));
        fields.insert("rejections".into(), json!(self.rejections));
        LogEvent::with_fields(LogLevel::Info, target, "metrics_snapshot", fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let mut metrics = UiMetrics::new();
        metrics.record_event();
        metrics.record_event();
        metrics.record_draw(5);
        metrics.record_broadcast(2);
        metrics.record_rejection();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.events, 2);
        assert_eq!(snapshot.draws, 1);
        assert_eq!(snapshot.slot_writes, 5);
        assert_eq!(snapshot.broadcasts, 2);
        assert_eq!(snapshot.rejections, 1);
    }

    #[test]
    fn snapshot_converts_to_log_event() {
        let mut metrics = UiMetrics::new();
        metrics.record_draw(3);
        let event = metrics.snapshot().to_log_event("tessera::grid.metrics");
        assert_eq!(event.message, "metrics_snapshot");
        assert_eq!(event.fields.get("slot_writes"), Some(&json!(3)));
    }
}
