//! Local event fan-out.
//!
//! UI layers observe reservation state through [`EventBus::subscribe`]. Events
//! are delivered synchronously, in registration order, one event at a time.
//! A panicking listener is contained so the remaining listeners still see the
//! event.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use serde::Serialize;
use tracing::error;

use crate::reservation::types::{OwnerId, SlotId, SlotPosition};

/// A state transition observed by the local client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ReservationEvent {
    SlotClaimed {
        slot_id: SlotId,
        owner: OwnerId,
    },
    SlotReleased {
        slot_id: SlotId,
        owner: OwnerId,
    },
    SlotConfirmed {
        slot_id: SlotId,
        position: SlotPosition,
        owner: OwnerId,
    },
    /// A player stepped away from their confirmed spot.
    SlotCancelled {
        owner: OwnerId,
    },
    PresenceJoined {
        player_id: OwnerId,
    },
    PresenceLeft {
        player_id: OwnerId,
    },
    ImageReceived {
        image_data: String,
        position: SlotPosition,
        timestamp: i64,
        owner: OwnerId,
    },
    /// The room host evicted this client; the session is over.
    Kicked,
    /// The bus connection was lost; a reload is needed.
    ConnectionLost,
}

type Listener = Arc<dyn Fn(&ReservationEvent) + Send + Sync>;
type ListenerList = Mutex<Vec<(u64, Listener)>>;

/// Typed observer list with RAII unsubscription.
pub struct EventBus {
    listeners: Arc<ListenerList>,
    next_id: AtomicU64,
    delivery: ReentrantMutex<()>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
            delivery: ReentrantMutex::new(()),
        }
    }

    /// Registers a listener. It stays registered until the returned
    /// [`Subscription`] is dropped or explicitly unsubscribed.
    #[must_use = "dropping the subscription unsubscribes the listener"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ReservationEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));
        Subscription {
            id: Some(id),
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Delivers an event to every listener registered at the time of the call.
    pub fn publish(&self, event: ReservationEvent) {
        // Listeners may subscribe or publish from inside a callback, so the
        // list lock is not held during delivery.
        let _delivery = self.delivery.lock();
        let snapshot: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                error!(?event, "event listener panicked");
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`EventBus::subscribe`].
pub struct Subscription {
    id: Option<u64>,
    listeners: Weak<ListenerList>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    /// Keeps the listener registered for the lifetime of the bus.
    pub fn detach(mut self) {
        self.id = None;
    }

    fn remove(&mut self) {
        if let (Some(id), Some(listeners)) = (self.id.take(), self.listeners.upgrade()) {
            listeners.lock().retain(|(existing, _)| *existing != id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claimed(slot: u8) -> ReservationEvent {
        ReservationEvent::SlotClaimed {
            slot_id: SlotId::new(slot).unwrap(),
            owner: OwnerId::new("a"),
        }
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |_| seen.lock().push("first"))
        };
        let second = {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |_| seen.lock().push("second"))
        };

        bus.publish(claimed(1));
        assert_eq!(*seen.lock(), vec!["first", "second"]);

        drop(first);
        second.unsubscribe();
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));

        let subscription = {
            let count = Arc::clone(&count);
            bus.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        bus.publish(claimed(0));
        subscription.unsubscribe();
        bus.publish(claimed(0));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let bus = EventBus::new();
        let delivered = Arc::new(AtomicU64::new(0));

        let _bad = bus.subscribe(|_| panic!("listener failure"));
        let _good = {
            let delivered = Arc::clone(&delivered);
            bus.subscribe(move |_| {
                delivered.fetch_add(1, Ordering::SeqCst);
            })
        };

        bus.publish(claimed(2));
        bus.publish(claimed(3));

        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_detached_listener_outlives_handle() {
        let bus = EventBus::new();
        bus.subscribe(|_| {}).detach();
        assert_eq!(bus.listener_count(), 1);
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(claimed(4)).unwrap();
        assert_eq!(json["type"], "slot-claimed");
        assert_eq!(json["slotId"], 4);
        assert_eq!(json["owner"], "a");

        let kicked = serde_json::to_value(ReservationEvent::Kicked).unwrap();
        assert_eq!(kicked["type"], "kicked");
    }
}
