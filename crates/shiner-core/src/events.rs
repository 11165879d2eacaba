//! Event system for core lifecycle and property notifications.
//!
//! Two event streams exist: [`ManagerEvent`] for discovery and connection
//! lifecycle (one per [`CoreManager`](crate::CoreManager)), and [`CoreEvent`]
//! for property updates (one per [`Core`](crate::Core)). Both are broadcast
//! channels; a slow receiver lags rather than blocking the engine.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use shiner_types::Property;

/// Label used when a core did not advertise a name.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Identity of a core.
///
/// Equality and hashing use the transport identifier only; the advertised
/// name is informational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreId {
    /// Unique identifier assigned by the transport.
    pub id: String,
    /// Advertised name, if any.
    pub name: Option<String>,
}

impl CoreId {
    /// Create a new core ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    /// Create a core ID with name.
    pub fn with_name(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }

    /// The advertised name, or `"Unknown"`.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_NAME)
    }
}

impl PartialEq for CoreId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CoreId {}

impl Hash for CoreId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for CoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.id)
    }
}

/// Discovery and connection lifecycle events.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ManagerEvent {
    /// A new core started advertising.
    Found { core: CoreId, rssi: Option<i16> },
    /// A known core stopped advertising and was evicted.
    Lost { core: CoreId },
    /// A core was connected and its properties bound.
    Connected { core: CoreId },
    /// The connected core was disconnected.
    Disconnected {
        core: CoreId,
        reason: DisconnectReason,
    },
    /// A connection attempt failed.
    ConnectFailed { core: CoreId, reason: String },
    /// The transport became ready or unavailable.
    TransportStateChanged { ready: bool },
}

/// Reason for disconnection.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Normal disconnection requested by the app.
    UserRequested,
    /// The link dropped without being asked to.
    LinkLost,
    /// The manager shut down.
    Shutdown,
}

/// Property-level events of one core.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum CoreEvent {
    /// The raw value of a property changed.
    PropertyChanged {
        property: Property,
        raw: Option<String>,
    },
    /// A property gained or lost its endpoint binding.
    AvailabilityChanged { property: Property, available: bool },
    /// A throttled write could not be delivered.
    WriteFailed { property: Property, reason: String },
    /// A read request failed.
    ReadFailed { property: Property, reason: String },
    /// A value arrived that is not valid UTF-8; it was dropped.
    DecodeError { endpoint: Uuid, reason: String },
    /// Endpoint discovery and initial reads finished.
    SyncComplete { available: Vec<Property> },
}

/// Sender for events.
pub type EventSender<E> = broadcast::Sender<E>;

/// Receiver for events.
pub type EventReceiver<E> = broadcast::Receiver<E>;

/// Default channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher<E> {
    sender: EventSender<E>,
}

impl<E: Clone> EventDispatcher<E> {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver<E> {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: E) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Clone> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_core_id_equality_ignores_name() {
        let a = CoreId::with_name("AA", "Kitchen");
        let b = CoreId::new("AA");
        assert_eq!(a, b);

        let set: HashSet<_> = [a, b, CoreId::new("BB")].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_core_id_fallback_name() {
        assert_eq!(CoreId::new("AA").display_name(), "Unknown");
        assert_eq!(CoreId::with_name("AA", "Desk").display_name(), "Desk");
        assert_eq!(CoreId::new("AA").to_string(), "Unknown (AA)");
    }

    #[test]
    fn test_manager_event_serialization() {
        let event = ManagerEvent::Disconnected {
            core: CoreId::new("AA"),
            reason: DisconnectReason::LinkLost,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"disconnected""#));
        assert!(json.contains(r#""reason":"link_lost""#));

        let back: ManagerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_core_event_serialization() {
        let event = CoreEvent::PropertyChanged {
            property: Property::BlendMode,
            raw: Some("Add".to_string()),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"property_changed""#));
        assert!(json.contains(r#""property":"blendMode""#));
    }

    #[tokio::test]
    async fn test_dispatcher() {
        let dispatcher = EventDispatcher::<CoreEvent>::new(8);
        assert_eq!(dispatcher.receiver_count(), 0);
        // no receivers, must not panic
        dispatcher.send(CoreEvent::SyncComplete { available: vec![] });

        let mut rx = dispatcher.subscribe();
        dispatcher.send(CoreEvent::AvailabilityChanged {
            property: Property::Name,
            available: true,
        });
        assert_eq!(
            rx.recv().await.unwrap(),
            CoreEvent::AvailabilityChanged {
                property: Property::Name,
                available: true
            }
        );
    }
}
