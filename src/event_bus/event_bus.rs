use std::any::Any;
use std::any::TypeId;
use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::error;
use tracing::trace;

use super::Event;
use crate::metrics::CALLBACK_PANICS;
use crate::utils::panic_message;

type ErasedHandler = Arc<dyn Fn(&dyn Any) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    handler: ErasedHandler,
}

/// Typed publish/subscribe bus.
///
/// Handlers are grouped per event type; each group is a growable list behind
/// its own map shard, so subscribing to one type never blocks publishing
/// another.
pub struct EventBus {
    handlers: DashMap<TypeId, Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("event_types", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers `handler` for every future `E` published on this bus.
    pub fn subscribe<E, F>(
        &self,
        handler: F,
    ) -> SubscriptionId
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let erased: ErasedHandler = Arc::new(move |event: &dyn Any| {
            if let Some(event) = event.downcast_ref::<E>() {
                handler(event);
            }
        });

        self.handlers
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Subscriber { id, handler: erased });

        trace!(event = E::NAME, subscription = id.0, "handler subscribed");
        id
    }

    /// Removes a handler. Returns false if it was not registered for `E`.
    pub fn unsubscribe<E: Event>(
        &self,
        id: SubscriptionId,
    ) -> bool {
        let mut removed = false;
        self.handlers.remove_if_mut(&TypeId::of::<E>(), |_, subscribers| {
            let before = subscribers.len();
            subscribers.retain(|s| s.id != id);
            removed = subscribers.len() != before;
            subscribers.is_empty()
        });
        removed
    }

    /// Synchronously invokes every handler registered for `E`.
    ///
    /// Returns the number of handlers that completed without panicking.
    pub fn publish<E: Event>(
        &self,
        event: &E,
    ) -> usize {
        // Snapshot so that handlers may (un)subscribe without deadlocking.
        let handlers: Vec<ErasedHandler> = match self.handlers.get(&TypeId::of::<E>()) {
            Some(subscribers) => subscribers.iter().map(|s| s.handler.clone()).collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event as &dyn Any))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    CALLBACK_PANICS.with_label_values(&["event_bus"]).inc();
                    error!(
                        event = E::NAME,
                        panic = %panic_message(payload.as_ref()),
                        "event handler panicked"
                    );
                }
            }
        }
        delivered
    }

    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.handlers.get(&TypeId::of::<E>()).map(|s| s.len()).unwrap_or(0)
    }
}
