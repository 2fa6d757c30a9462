//! Subscription registry for fanning out live events.
//!
//! Subscribers register callbacks that are invoked when events are published.
//! Registration returns a [`SubscriptionHandle`]; removing a subscription is
//! O(1) and a stale handle (already removed, slot reused) is a no-op.
//!
//! Publishing takes a snapshot of the subscriber list and releases the lock
//! before invoking any callback, so callbacks may subscribe or unsubscribe
//! (themselves included) while a publish is in flight. A callback that fails
//! or panics is logged and skipped; delivery to the others continues.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use super::lock;

/// Subscriber callback. Returning an error only affects logging.
pub type SubscriberCallback<E> = Arc<dyn Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static>;

/// Opaque token identifying one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    index: u32,
    generation: u32,
}

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
}

struct Subscription<E> {
    seq: u64,
    consumer_id: Arc<str>,
    callback: SubscriberCallback<E>,
}

struct Slot<E> {
    generation: u32,
    subscription: Option<Subscription<E>>,
}

struct Delivery<E> {
    consumer_id: Arc<str>,
    callback: SubscriberCallback<E>,
}

impl<E> Clone for Delivery<E> {
    fn clone(&self) -> Self {
        Self {
            consumer_id: Arc::clone(&self.consumer_id),
            callback: Arc::clone(&self.callback),
        }
    }
}

struct Arena<E> {
    slots: Vec<Slot<E>>,
    free: Vec<u32>,
    next_seq: u64,
    live: usize,
    /// Registration-ordered view, rebuilt lazily after a change
    ordered: Option<Arc<[Delivery<E>]>>,
}

impl<E> Arena<E> {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            next_seq: 0,
            live: 0,
            ordered: None,
        }
    }

    fn ordered(&mut self) -> Arc<[Delivery<E>]> {
        if let Some(ordered) = &self.ordered {
            return Arc::clone(ordered);
        }
        let mut entries: Vec<(u64, Delivery<E>)> = self
            .slots
            .iter()
            .filter_map(|slot| slot.subscription.as_ref())
            .map(|sub| {
                (
                    sub.seq,
                    Delivery {
                        consumer_id: Arc::clone(&sub.consumer_id),
                        callback: Arc::clone(&sub.callback),
                    },
                )
            })
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        let ordered: Arc<[Delivery<E>]> = entries.into_iter().map(|(_, d)| d).collect();
        self.ordered = Some(Arc::clone(&ordered));
        ordered
    }
}

/// Registry of event subscribers.
///
/// Cheap to clone; clones share the same subscriber set.
pub struct SubscriptionRegistry<E> {
    inner: Arc<Mutex<Arena<E>>>,
}

impl<E> Clone for SubscriptionRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: 'static> Default for SubscriptionRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> SubscriptionRegistry<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Arena::new())),
        }
    }

    /// Register a callback for every subsequently published event.
    ///
    /// `consumer_id` only labels the subscriber in logs.
    pub fn subscribe<F>(&self, consumer_id: impl Into<String>, callback: F) -> SubscriptionHandle
    where
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let consumer_id: Arc<str> = Arc::from(consumer_id.into());
        let mut arena = lock(&self.inner);
        let seq = arena.next_seq;
        arena.next_seq += 1;

        let subscription = Subscription {
            seq,
            consumer_id: Arc::clone(&consumer_id),
            callback: Arc::new(callback),
        };

        let handle = match arena.free.pop() {
            Some(index) => {
                let slot = &mut arena.slots[index as usize];
                slot.subscription = Some(subscription);
                SubscriptionHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = arena.slots.len() as u32;
                arena.slots.push(Slot {
                    generation: 0,
                    subscription: Some(subscription),
                });
                SubscriptionHandle {
                    index,
                    generation: 0,
                }
            }
        };
        arena.live += 1;
        arena.ordered = None;

        tracing::debug!(consumer = %consumer_id, subscribers = arena.live, "Subscriber registered");
        handle
    }

    /// Remove a registration. Returns false for stale or unknown handles.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut arena = lock(&self.inner);
        let Some(slot) = arena.slots.get_mut(handle.index as usize) else {
            return false;
        };
        if slot.generation != handle.generation {
            return false;
        }
        let Some(removed) = slot.subscription.take() else {
            return false;
        };
        slot.generation = slot.generation.wrapping_add(1);
        arena.free.push(handle.index);
        arena.live -= 1;
        arena.ordered = None;

        tracing::debug!(consumer = %removed.consumer_id, subscribers = arena.live, "Subscriber removed");
        true
    }

    pub fn is_subscribed(&self, handle: SubscriptionHandle) -> bool {
        let arena = lock(&self.inner);
        arena
            .slots
            .get(handle.index as usize)
            .is_some_and(|slot| slot.generation == handle.generation && slot.subscription.is_some())
    }

    /// Deliver `event` to every subscriber registered at the time of the call,
    /// in registration order.
    pub fn publish(&self, event: &E) -> PublishReport {
        let snapshot = lock(&self.inner).ordered();

        let mut report = PublishReport::default();
        for delivery in snapshot.iter() {
            match catch_unwind(AssertUnwindSafe(|| (delivery.callback)(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(consumer = %delivery.consumer_id, error = %e, "Subscriber failed to handle event");
                }
                Err(_) => {
                    report.failed += 1;
                    tracing::error!(consumer = %delivery.consumer_id, "Subscriber panicked while handling event");
                }
            }
        }
        report
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).live
    }

    /// Drop every registration. Outstanding handles become stale.
    pub fn clear(&self) {
        let mut arena = lock(&self.inner);
        let Arena { slots, free, .. } = &mut *arena;
        for (index, slot) in slots.iter_mut().enumerate() {
            if slot.subscription.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                free.push(index as u32);
            }
        }
        arena.live = 0;
        arena.ordered = None;
    }
}
