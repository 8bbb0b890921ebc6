//! Publish/subscribe notification bus.
//!
//! Events are non-authoritative: nothing in the core reads them back, and a
//! slow or absent subscriber can never stall an authorization decision.
//! Lagging receivers simply miss events (`broadcast` semantics).

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Default number of buffered events per subscriber.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// A notification published on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusEvent {
    /// A tool invocation began running its handler.
    ToolStart {
        call_id: String,
        tool_id: String,
        agent_id: String,
        session_id: Option<String>,
        at: DateTime<Utc>,
    },
    /// A tool invocation finished, successfully or not.
    ToolEnd {
        call_id: String,
        tool_id: String,
        success: bool,
        outcome: String,
        duration_ms: u64,
        at: DateTime<Utc>,
    },
    /// A circuit breaker changed state.
    CircuitStateChanged {
        provider: String,
        from: String,
        to: String,
        at: DateTime<Utc>,
    },
    /// An inbound channel connected.
    ChannelConnected { channel: String, at: DateTime<Utc> },
    /// An inbound channel disconnected.
    ChannelDisconnected { channel: String, at: DateTime<Utc> },
}

impl BusEvent {
    /// The topic string subscribers filter on.
    pub fn topic(&self) -> &'static str {
        match self {
            BusEvent::ToolStart { .. } => "tool:start",
            BusEvent::ToolEnd { .. } => "tool:end",
            BusEvent::CircuitStateChanged { .. } => "circuit:state",
            BusEvent::ChannelConnected { .. } => "channel:connected",
            BusEvent::ChannelDisconnected { .. } => "channel:disconnected",
        }
    }
}

/// Broadcast bus shared by all components.
///
/// Cheap to share behind an `Arc`; `publish` takes `&self`.
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
    published: AtomicU64,
}

impl EventBus {
    /// Creates a bus with [`DEFAULT_BUS_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Creates a bus buffering up to `capacity` events per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            published: AtomicU64::new(0),
        }
    }

    /// Publishes an event. Never blocks; having no subscribers is not an error.
    pub fn publish(&self, event: BusEvent) {
        self.published.fetch_add(1, Ordering::Relaxed);
        let topic = event.topic();
        if self.sender.send(event).is_err() {
            trace!(topic, "event published with no subscribers");
        }
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total events published since creation.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(channel: &str) -> BusEvent {
        BusEvent::ChannelConnected {
            channel: channel.to_string(),
            at: Utc::now(),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(connected("slack"));
        assert_eq!(bus.published_count(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(connected("a"));
        bus.publish(BusEvent::ChannelDisconnected {
            channel: "a".to_string(),
            at: Utc::now(),
        });

        assert_eq!(rx.recv().await.unwrap().topic(), "channel:connected");
        assert_eq!(rx.recv().await.unwrap().topic(), "channel:disconnected");
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = BusEvent::ToolEnd {
            call_id: "c1".to_string(),
            tool_id: "file_read".to_string(),
            success: true,
            outcome: "success".to_string(),
            duration_ms: 12,
            at: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "tool_end");
        assert_eq!(event.topic(), "tool:end");
    }
}
