//! Unified event bus — trait for emitting delivery lifecycle events.
//!
//! The engine, session supervisor, and control surface accept an
//! `Arc<dyn EventSink>` so operators can route events to logs or an
//! external pipeline, and tests can capture them deterministically.

use crate::types::{DeliveryEvent, EventType};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Trait for emitting delivery events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DeliveryEvent);
}

/// No-op sink for modules that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: DeliveryEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<DeliveryEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<DeliveryEvent> {
        self.events.lock().expect("event bus mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("event bus mutex poisoned").len()
    }

    pub fn count_type(&self, event_type: EventType) -> usize {
        self.events
            .lock()
            .expect("event bus mutex poisoned")
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().expect("event bus mutex poisoned").clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: DeliveryEvent) {
        self.events.lock().expect("event bus mutex poisoned").push(event);
    }
}

/// Convenience builder for creating `DeliveryEvent` with minimal boilerplate.
pub fn make_event(
    event_type: EventType,
    recipient_id: Option<String>,
    day: Option<u32>,
    detail: Option<String>,
) -> DeliveryEvent {
    DeliveryEvent {
        event_id: Uuid::new_v4(),
        event_type,
        recipient_id,
        day,
        detail,
        timestamp: Utc::now(),
    }
}

/// Convenience: create a no-op event bus for modules that don't need it.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sink() {
        let sink = capture_sink();
        assert_eq!(sink.count(), 0);

        sink.emit(make_event(
            EventType::MessageDelivered,
            Some("group-1".into()),
            Some(3),
            None,
        ));
        sink.emit(make_event(
            EventType::DeliveryFailed,
            Some("group-1".into()),
            Some(3),
            Some("session disconnected".into()),
        ));

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.count_type(EventType::MessageDelivered), 1);
        assert_eq!(sink.count_type(EventType::DeliveryFailed), 1);

        let events = sink.events();
        assert_eq!(events[0].recipient_id, Some("group-1".into()));
        assert_eq!(events[1].detail, Some("session disconnected".into()));
    }

    #[test]
    fn test_noop_sink() {
        let sink = noop_sink();
        // Should not panic
        sink.emit(make_event(EventType::TickStarted, None, None, None));
    }
}
