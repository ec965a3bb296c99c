//! Tag-keyed publish/subscribe registry.
//!
//! `emit` calls listeners from a snapshot taken before dispatch, so
//! listeners may subscribe or unsubscribe (themselves or others) while an
//! event is being delivered. A listener removed mid-dispatch is skipped for
//! the rest of that dispatch.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync + 'static>;

struct Slot<E> {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Callback<E>,
}

impl<E> Clone for Slot<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            active: self.active.clone(),
            callback: self.callback.clone(),
        }
    }
}

struct Inner<K, E> {
    next_id: u64,
    slots: HashMap<K, Vec<Slot<E>>>,
}

pub struct EventRegistry<K, E> {
    inner: Arc<Mutex<Inner<K, E>>>,
}

impl<K, E> Clone for EventRegistry<K, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, E> Default for EventRegistry<K, E>
where
    K: Eq + Hash + Copy + Send + Sync + 'static,
    E: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, E> EventRegistry<K, E>
where
    K: Eq + Hash + Copy + Send + Sync + 'static,
    E: 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 0,
                slots: HashMap::new(),
            })),
        }
    }

    /// Registers `callback` for events tagged `kind`.
    ///
    /// The listener lives until the returned [`Subscription`] is dropped or
    /// unsubscribed, or until [`EventRegistry::clear`].
    pub fn subscribe<F>(&self, kind: K, callback: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.slots.entry(kind).or_default().push(Slot {
                id,
                active: active.clone(),
                callback: Arc::new(callback),
            });
            id
        };

        let weak = Arc::downgrade(&self.inner);
        Subscription {
            active,
            prune: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let mut inner = inner.lock();
                    if let Some(slots) = inner.slots.get_mut(&kind) {
                        slots.retain(|s| s.id != id);
                        if slots.is_empty() {
                            inner.slots.remove(&kind);
                        }
                    }
                }
            })),
        }
    }

    /// Delivers `event` to the listeners of `kind` in registration order.
    /// Returns how many listeners were called.
    pub fn emit(&self, kind: K, event: &E) -> usize {
        let snapshot: Vec<Slot<E>> = {
            let inner = self.inner.lock();
            inner.slots.get(&kind).cloned().unwrap_or_default()
        };

        let mut called = 0;
        for slot in &snapshot {
            if slot.active.load(Ordering::Acquire) {
                (slot.callback)(event);
                called += 1;
            }
        }
        called
    }

    pub fn listener_count(&self, kind: K) -> usize {
        self.inner.lock().slots.get(&kind).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().slots.is_empty()
    }

    /// Drops every listener. Outstanding subscriptions become inert.
    pub fn clear(&self) {
        let drained: Vec<Slot<E>> = {
            let mut inner = self.inner.lock();
            inner.slots.drain().flat_map(|(_, v)| v).collect()
        };
        for slot in drained {
            slot.active.store(false, Ordering::Release);
        }
    }
}

/// Disposer returned by [`EventRegistry::subscribe`]. Dropping it removes
/// the listener.
pub struct Subscription {
    active: Arc<AtomicBool>,
    prune: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.release();
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Keeps the listener registered for the lifetime of the registry
    /// (until it is cleared).
    pub fn detach(mut self) {
        self.prune = None;
    }

    fn release(&mut self) {
        if let Some(prune) = self.prune.take() {
            self.active.store(false, Ordering::Release);
            prune();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Tag {
        A,
        B,
    }

    #[test]
    fn routes_only_to_matching_tag() {
        let reg: EventRegistry<Tag, u32> = EventRegistry::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));

        let a2 = a.clone();
        let _sa = reg.subscribe(Tag::A, move |v| {
            a2.fetch_add(*v as usize, Ordering::SeqCst);
        });
        let b2 = b.clone();
        let _sb = reg.subscribe(Tag::B, move |v| {
            b2.fetch_add(*v as usize, Ordering::SeqCst);
        });

        assert_eq!(reg.emit(Tag::A, &5), 1);
        assert_eq!(a.load(Ordering::SeqCst), 5);
        assert_eq!(b.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn preserves_registration_order() {
        let reg: EventRegistry<Tag, ()> = EventRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Vec::new();
        for i in 0..3 {
            let seen = seen.clone();
            subs.push(reg.subscribe(Tag::A, move |_| seen.lock().push(i)));
        }
        reg.emit(Tag::A, &());
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let reg: EventRegistry<Tag, ()> = EventRegistry::new();
        let sub = reg.subscribe(Tag::A, |_| {});
        assert_eq!(reg.listener_count(Tag::A), 1);
        drop(sub);
        assert_eq!(reg.listener_count(Tag::A), 0);
        assert_eq!(reg.emit(Tag::A, &()), 0);
    }

    #[test]
    fn detached_listener_survives_until_clear() {
        let reg: EventRegistry<Tag, ()> = EventRegistry::new();
        reg.subscribe(Tag::B, |_| {}).detach();
        assert_eq!(reg.emit(Tag::B, &()), 1);
        reg.clear();
        assert!(reg.is_empty());
        assert_eq!(reg.emit(Tag::B, &()), 0);
    }

    #[test]
    fn listener_may_unsubscribe_another_during_dispatch() {
        let reg: EventRegistry<Tag, ()> = EventRegistry::new();
        let victim_calls = Arc::new(AtomicUsize::new(0));
        let victim_slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let slot = victim_slot.clone();
        let _killer = reg.subscribe(Tag::A, move |_| {
            if let Some(s) = slot.lock().take() {
                s.unsubscribe();
            }
        });

        let calls = victim_calls.clone();
        *victim_slot.lock() = Some(reg.subscribe(Tag::A, move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(reg.emit(Tag::A, &()), 1);
        assert_eq!(victim_calls.load(Ordering::SeqCst), 0);
        assert_eq!(reg.listener_count(Tag::A), 1);
    }

    #[test]
    fn listener_may_subscribe_during_dispatch() {
        let reg: EventRegistry<Tag, ()> = EventRegistry::new();
        let added: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));

        let reg2 = reg.clone();
        let added2 = added.clone();
        let _s = reg.subscribe(Tag::A, move |_| {
            added2.lock().push(reg2.subscribe(Tag::A, |_| {}));
        });

        // The new listener is not part of the in-flight snapshot.
        assert_eq!(reg.emit(Tag::A, &()), 1);
        assert_eq!(reg.listener_count(Tag::A), 2);
    }

    #[test]
    fn clear_makes_outstanding_subscriptions_inert() {
        let reg: EventRegistry<Tag, ()> = EventRegistry::new();
        let sub = reg.subscribe(Tag::A, |_| {});
        reg.clear();
        assert!(!sub.is_active());
        drop(sub);
        assert!(reg.is_empty());
    }
}
