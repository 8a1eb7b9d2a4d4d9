//! Event System
//!
//! Provides a pub/sub event bus so components can announce state changes
//! without knowing who renders them.

use std::path::PathBuf;

use parking_lot::RwLock;
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

/// Events emitted by the device, wireless, build, and logcat components
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The device list was replaced
    DevicesChanged,
    /// The selected device pointer changed
    SelectionChanged { device_id: String },
    /// Saved or connected wireless devices changed
    WirelessDevicesChanged,
    /// The active module target changed
    ModuleTargetChanged { module: Option<String> },
    /// A Gradle task started
    BuildStarted { task: String },
    /// A Gradle task finished
    BuildCompleted { success: bool, artifact: Option<PathBuf> },
    /// A logcat stream started for a device
    LogcatStarted { device_id: String },
    /// The live logcat stream was torn down
    LogcatStopped,
    /// The session is shutting down
    Shutdown,
}

/// Subscriber handle for receiving events
#[derive(Clone)]
pub struct EventSubscription {
    receiver: Receiver<Event>,
}

impl EventSubscription {
    /// Receive the next event (blocking)
    pub fn recv(&self) -> Result<Event, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv(&self) -> Result<Event, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Drain every event received so far
    pub fn drain(&self) -> Vec<Event> {
        self.receiver.try_iter().collect()
    }
}

/// Event bus for publish/subscribe pattern
pub struct EventBus {
    subscribers: RwLock<Vec<Sender<Event>>>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> EventSubscription {
        let (sender, receiver) = unbounded();
        self.subscribers.write().push(sender);
        EventSubscription { receiver }
    }

    /// Emit an event to all subscribers, returning how many received it.
    /// Subscribers whose receiving end is gone are dropped.
    pub fn emit(&self, event: Event) -> usize {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
        let delivered = subscribers.len();

        debug!("Event {:?} delivered to {} subscribers", event, delivered);
        delivered
    }

    /// Get the number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
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

    #[test]
    fn test_event_bus() {
        let bus = EventBus::new();
        let sub1 = bus.subscribe();
        let sub2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        let delivered = bus.emit(Event::DevicesChanged);
        assert_eq!(delivered, 2);

        assert_eq!(sub1.try_recv().unwrap(), Event::DevicesChanged);
        assert_eq!(sub2.try_recv().unwrap(), Event::DevicesChanged);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        assert_eq!(bus.emit(Event::LogcatStopped), 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.drain(), vec![Event::LogcatStopped]);
    }
}
