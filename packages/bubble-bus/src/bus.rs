//! Type-keyed handler registry.
//!
//! `publish` snapshots the handler list for the event type before invoking
//! anything, so handlers may subscribe, unsubscribe (themselves included) or
//! publish again without disturbing the delivery in progress.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, warn};

use crate::event::Event;

type Handler<E> = Box<dyn Fn(&E) -> anyhow::Result<()> + Send + Sync>;

/// Identifier of one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Clone)]
struct Slot {
    id: SubscriptionId,
    active: Arc<AtomicBool>,
    handler: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    slots: Mutex<HashMap<TypeId, Vec<Slot>>>,
}

impl Registry {
    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<TypeId, Vec<Slot>>> {
        // Handlers never run under this lock, so poisoning only means a
        // panic elsewhere; the map itself is still consistent.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Publish/subscribe bus keyed by event type.
///
/// Cloning shares the same registry.
///
/// # Example
///
/// ```
/// use bubble_bus::{Event, EventBus};
///
/// struct Pinged(u32);
/// impl Event for Pinged {
///     const NAME: &'static str = "PINGED";
/// }
///
/// let bus = EventBus::new();
/// let sub = bus.subscribe(|event: &Pinged| {
///     assert_eq!(event.0, 7);
///     Ok(())
/// });
///
/// assert_eq!(bus.publish(Pinged(7)), 1);
/// sub.unsubscribe();
/// assert_eq!(bus.publish(Pinged(8)), 0);
/// ```
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of type `E`.
    ///
    /// The returned [`Subscription`] is the only way to remove the handler;
    /// dropping it leaves the handler registered.
    pub fn subscribe<E, F>(&self, handler: F) -> Subscription
    where
        E: Event,
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.registry.next_id.fetch_add(1, Ordering::Relaxed));
        let active = Arc::new(AtomicBool::new(true));
        let boxed: Handler<E> = Box::new(handler);

        self.registry
            .slots()
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Slot {
                id,
                active: active.clone(),
                handler: Arc::new(boxed),
            });

        debug!(event = E::NAME, subscription = %id, "handler subscribed");

        Subscription {
            id,
            type_id: TypeId::of::<E>(),
            event_name: E::NAME,
            active,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `event` to every handler subscribed for `E`.
    ///
    /// Returns how many handlers completed without error or panic.
    pub fn publish<E: Event>(&self, event: E) -> usize {
        let snapshot: Vec<Slot> = self
            .registry
            .slots()
            .get(&TypeId::of::<E>())
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        for slot in &snapshot {
            // Unsubscribed while this publish was already running.
            if !slot.active.load(Ordering::Acquire) {
                continue;
            }

            let Some(handler) = slot.handler.downcast_ref::<Handler<E>>() else {
                warn!(event = E::NAME, subscription = %slot.id, "handler registered under wrong type");
                continue;
            };

            match std::panic::catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(error)) => {
                    warn!(event = E::NAME, subscription = %slot.id, error = %error, "event handler failed");
                }
                Err(panic) => {
                    warn!(
                        event = E::NAME,
                        subscription = %slot.id,
                        panic = %panic_message(&panic),
                        "event handler panicked"
                    );
                }
            }
        }

        debug!(event = E::NAME, delivered, subscribers = snapshot.len(), "event published");
        delivered
    }

    /// Number of handlers currently registered for `E`.
    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.registry
            .slots()
            .get(&TypeId::of::<E>())
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total: usize = self.registry.slots().values().map(Vec::len).sum();
        f.debug_struct("EventBus")
            .field("subscriber_count", &total)
            .finish()
    }
}

/// Handle to a registered handler.
///
/// Clones refer to the same registration, so a handler can hold a clone of
/// its own subscription and cancel itself.
#[derive(Clone)]
pub struct Subscription {
    id: SubscriptionId,
    type_id: TypeId,
    event_name: &'static str,
    active: Arc<AtomicBool>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Remove the handler. Idempotent.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(registry) = self.registry.upgrade() {
            let mut slots = registry.slots();
            if let Some(list) = slots.get_mut(&self.type_id) {
                list.retain(|slot| slot.id != self.id);
                if list.is_empty() {
                    slots.remove(&self.type_id);
                }
            }
        }

        debug!(event = self.event_name, subscription = %self.id, "handler unsubscribed");
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event", &self.event_name)
            .field("active", &self.is_active())
            .finish()
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
