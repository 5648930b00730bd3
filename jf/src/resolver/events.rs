//! Form events
//!
//! The resolver publishes every observable change on a broadcast channel so a
//! rendering layer can redraw only what changed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::mapping::Side;

use super::DEFAULT_CHANNEL_CAPACITY;

/// Observable change of the form state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FormEvent {
    /// A model key was written by the caller
    FieldChanged { key: String, value: Value },
    /// A descriptor's span changed
    SpanChanged { id: String, span: u8 },
    /// A descriptor's options were replaced
    OptionsUpdated { id: String, count: usize },
    /// A column list was replaced or cleared
    MappingChanged { side: Side, len: usize },
    /// A lookup was issued for a trigger
    LookupIssued {
        trigger: String,
        generation: u64,
        lookup: String,
    },
    /// A lookup result was written to the model
    LookupApplied { trigger: String, generation: u64 },
    /// A superseded lookup result was dropped
    LookupDiscarded { trigger: String, generation: u64 },
    /// A lookup failed; downstream keys stay cleared
    LookupFailed {
        trigger: String,
        generation: u64,
        error: String,
    },
}

impl FormEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            FormEvent::FieldChanged { .. } => "FieldChanged",
            FormEvent::SpanChanged { .. } => "SpanChanged",
            FormEvent::OptionsUpdated { .. } => "OptionsUpdated",
            FormEvent::MappingChanged { .. } => "MappingChanged",
            FormEvent::LookupIssued { .. } => "LookupIssued",
            FormEvent::LookupApplied { .. } => "LookupApplied",
            FormEvent::LookupDiscarded { .. } => "LookupDiscarded",
            FormEvent::LookupFailed { .. } => "LookupFailed",
        }
    }
}

/// Broadcast bus for form events
pub struct EventBus {
    tx: broadcast::Sender<FormEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: without subscribers the event is dropped.
    pub fn emit(&self, event: FormEvent) {
        debug!(event_type = event.event_type(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Receive every event emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<FormEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::default();
        bus.emit(FormEvent::SpanChanged {
            id: "where".to_string(),
            span: 0,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_subscriber_receives_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.emit(FormEvent::OptionsUpdated {
            id: "dataSource".to_string(),
            count: 2,
        });
        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type(), "OptionsUpdated");
    }

    #[test]
    fn test_default_bus_holds_channel_capacity() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        for count in 0..DEFAULT_CHANNEL_CAPACITY {
            bus.emit(FormEvent::OptionsUpdated {
                id: "dataSource".to_string(),
                count,
            });
        }
        for count in 0..DEFAULT_CHANNEL_CAPACITY {
            match rx.try_recv().unwrap() {
                FormEvent::OptionsUpdated { count: received, .. } => assert_eq!(received, count),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[test]
    fn test_event_serialization() {
        let event = FormEvent::LookupDiscarded {
            trigger: "dataSource".to_string(),
            generation: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "LookupDiscarded");
        assert_eq!(json["generation"], 3);
    }
}
