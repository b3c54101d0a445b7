//! Replay-1 value cell with ordered subscriber callbacks.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::channel::oneshot;
use slotmap::{SlotMap, new_key_type};

use crate::batch;

new_key_type! {
    /// Identifies one callback registered on an observable.
    pub struct SubscriberKey;
}

type Callback<T> = Rc<dyn Fn(&T)>;

// ---------------------------------------------------------------------------
// Shared cell
// ---------------------------------------------------------------------------

struct SubscriberEntry<T> {
    callback: Callback<T>,
    insertion_order: u64,
}

struct Inner<T> {
    value: RefCell<Option<T>>,
    version: Cell<u64>,
    subscribers: RefCell<SlotMap<SubscriberKey, SubscriberEntry<T>>>,
    next_insertion_order: Cell<u64>,
    /// Handles (upstream observables, subscriptions) kept alive as long as
    /// this cell is.
    retained: RefCell<Vec<Box<dyn Any>>>,
}

impl<T: Clone + 'static> Inner<T> {
    fn new(value: Option<T>) -> Self {
        Self {
            value: RefCell::new(value),
            version: Cell::new(0),
            subscribers: RefCell::new(SlotMap::with_key()),
            next_insertion_order: Cell::new(0),
            retained: RefCell::new(Vec::new()),
        }
    }

    fn notify(self: &Rc<Self>) {
        if batch::is_batching() {
            let weak = Rc::downgrade(self);
            let key = Rc::as_ptr(self).cast::<()>() as usize;
            batch::defer(key, move || {
                if let Some(inner) = weak.upgrade() {
                    inner.deliver();
                }
            });
        } else {
            self.deliver();
        }
    }

    /// Call every subscriber with the current value, in registration order.
    ///
    /// A subscriber that sets this cell again re-enters `deliver`; the outer
    /// pass stops as soon as it sees the version move, since the inner pass
    /// already handed the newer value to everyone.
    fn deliver(&self) {
        let Some(value) = self.value.borrow().clone() else {
            return;
        };
        let version = self.version.get();
        let mut targets: Vec<(u64, SubscriberKey, Callback<T>)> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(key, entry)| (entry.insertion_order, key, Rc::clone(&entry.callback)))
            .collect();
        targets.sort_by_key(|(order, _, _)| *order);

        for (_, key, callback) in targets {
            if self.version.get() != version {
                break;
            }
            if !self.subscribers.borrow().contains_key(key) {
                continue;
            }
            callback(&value);
        }
    }

    fn register(&self, callback: Callback<T>) -> SubscriberKey {
        let order = self.next_insertion_order.get();
        self.next_insertion_order.set(order + 1);
        self.subscribers.borrow_mut().insert(SubscriberEntry {
            callback,
            insertion_order: order,
        })
    }

    fn unregister(&self, key: SubscriberKey) {
        let removed = self.subscribers.borrow_mut().remove(key);
        drop(removed);
    }
}

// ---------------------------------------------------------------------------
// Observable
// ---------------------------------------------------------------------------

/// A shared, version-tracked value cell.
///
/// Cloning an `Observable` clones the handle, not the value. New subscribers
/// receive the current value immediately if one is present.
pub struct Observable<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Observable<T> {
    /// An observable with no value yet.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner::new(None)),
        }
    }

    pub fn with_value(value: T) -> Self {
        Self {
            inner: Rc::new(Inner::new(Some(value))),
        }
    }

    /// Number of writes so far.
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// True if both handles refer to the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakObservable<T> {
        WeakObservable {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Borrow the current value. `f` must not write to this observable.
    pub fn peek<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        f(self.inner.value.borrow().as_ref())
    }

    /// Clone of the current value.
    pub fn get(&self) -> Option<T> {
        self.inner.value.borrow().clone()
    }

    /// Store `value` and notify subscribers (deferred inside a batch scope).
    pub fn set(&self, value: T) {
        let previous = self.inner.value.replace(Some(value));
        self.inner.version.set(self.inner.version.get() + 1);
        drop(previous);
        self.inner.notify();
    }

    /// Mutate the current value in place. Returns false, without notifying,
    /// when there is no value yet.
    pub fn modify(&self, f: impl FnOnce(&mut T)) -> bool {
        let changed = match self.inner.value.borrow_mut().as_mut() {
            Some(value) => {
                f(value);
                true
            }
            None => false,
        };
        if changed {
            self.inner.version.set(self.inner.version.get() + 1);
            self.inner.notify();
        }
        changed
    }

    /// Register `callback`. It is called right away with the current value,
    /// if any, and then on every write until the subscription drops.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let callback: Callback<T> = Rc::new(callback);
        let key = self.inner.register(Rc::clone(&callback));
        if let Some(value) = self.get() {
            callback(&value);
        }
        self.unsubscribe_on_drop(key)
    }

    /// Call `f` with the first value this observable holds, then unsubscribe.
    pub fn take_first(&self, f: impl FnOnce(&T) + 'static) -> Subscription {
        if let Some(value) = self.get() {
            f(&value);
            return Subscription::empty();
        }

        let pending = RefCell::new(Some(f));
        let own_key: Rc<Cell<Option<SubscriberKey>>> = Rc::new(Cell::new(None));
        let weak = Rc::downgrade(&self.inner);
        let key_slot = Rc::clone(&own_key);
        let key = self.inner.register(Rc::new(move |value: &T| {
            let Some(f) = pending.borrow_mut().take() else {
                return;
            };
            if let (Some(inner), Some(key)) = (weak.upgrade(), key_slot.get()) {
                inner.unregister(key);
            }
            f(value);
        }));
        own_key.set(Some(key));
        self.unsubscribe_on_drop(key)
    }

    /// Resolves with the first value this observable holds, or `None` if the
    /// observable is dropped before it ever gets one.
    pub fn first_value(&self) -> impl Future<Output = Option<T>> + 'static {
        let (tx, rx) = oneshot::channel();
        let subscription = self.take_first(move |value: &T| {
            let _ = tx.send(value.clone());
        });
        async move {
            let value = rx.await.ok();
            drop(subscription);
            value
        }
    }

    /// Keep `handle` alive for as long as this observable lives. Derived
    /// observables use this to own their upstream chain.
    pub fn retain(&self, handle: impl Any) {
        self.inner.retained.borrow_mut().push(Box::new(handle));
    }

    fn unsubscribe_on_drop(&self, key: SubscriberKey) -> Subscription {
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.unregister(key);
            }
        })
    }
}

impl<T: Clone + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("version", &self.inner.version.get())
            .field("has_value", &self.inner.value.borrow().is_some())
            .field("subscribers", &self.inner.subscribers.borrow().len())
            .finish()
    }
}

/// Non-owning handle to an [`Observable`].
pub struct WeakObservable<T> {
    inner: Weak<Inner<T>>,
}

impl<T> Clone for WeakObservable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> WeakObservable<T> {
    pub fn upgrade(&self) -> Option<Observable<T>> {
        self.inner.upgrade().map(|inner| Observable { inner })
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// RAII handle for a registered callback. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    teardown: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(teardown: impl FnOnce() + 'static) -> Self {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    /// A subscription with nothing to tear down.
    pub fn empty() -> Self {
        Self { teardown: None }
    }

    /// Leave the callback registered for the lifetime of its source.
    pub fn detach(mut self) {
        self.teardown = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.teardown.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn recorder<T: Clone + 'static>(
        source: &Observable<T>,
    ) -> (Rc<RefCell<Vec<T>>>, Subscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let subscription = source.subscribe(move |v: &T| sink.borrow_mut().push(v.clone()));
        (seen, subscription)
    }

    // Test 1: subscribe replays the current value.
    #[test]
    fn subscribe_replays_current_value() {
        let source = Observable::with_value(7);
        let (seen, _sub) = recorder(&source);
        source.set(8);
        assert_eq!(*seen.borrow(), vec![7, 8]);
        assert_eq!(source.version(), 1);
    }

    // Test 2: an empty observable does not replay.
    #[test]
    fn empty_observable_waits_for_first_set() {
        let source: Observable<i32> = Observable::new();
        let (seen, _sub) = recorder(&source);
        assert!(seen.borrow().is_empty());
        source.set(1);
        assert_eq!(*seen.borrow(), vec![1]);
    }

    // Test 3: dropping the subscription unsubscribes.
    #[test]
    fn dropping_subscription_unsubscribes() {
        let source = Observable::with_value(0);
        let (seen, sub) = recorder(&source);
        assert_eq!(source.subscriber_count(), 1);
        drop(sub);
        assert_eq!(source.subscriber_count(), 0);
        source.set(1);
        assert_eq!(*seen.borrow(), vec![0]);
    }

    // Test 4: detached subscriptions keep receiving values.
    #[test]
    fn detached_subscription_stays_registered() {
        let source = Observable::with_value(0);
        let (seen, sub) = recorder(&source);
        sub.detach();
        source.set(1);
        assert_eq!(*seen.borrow(), vec![0, 1]);
    }

    // Test 5: callbacks run in registration order even after slot reuse.
    #[test]
    fn callbacks_run_in_registration_order() {
        let source = Observable::with_value(0);
        let order = Rc::new(RefCell::new(Vec::new()));
        let subscribe = |name: &'static str| {
            let order = Rc::clone(&order);
            source.subscribe(move |_| order.borrow_mut().push(name))
        };
        let first = subscribe("first");
        let second = subscribe("second");
        drop(first);
        let third = subscribe("third");
        order.borrow_mut().clear();
        source.set(1);
        assert_eq!(*order.borrow(), vec!["second", "third"]);
        drop((second, third));
    }

    // Test 6: take_first fires once and removes itself.
    #[test]
    fn take_first_fires_once() {
        let source: Observable<i32> = Observable::new();
        let seen = Rc::new(Cell::new(0));
        let sink = Rc::clone(&seen);
        let _sub = source.take_first(move |v| sink.set(sink.get() + *v));
        source.set(5);
        source.set(100);
        assert_eq!(seen.get(), 5);
        assert_eq!(source.subscriber_count(), 0);
    }

    // Test 7: take_first on a filled observable runs synchronously.
    #[test]
    fn take_first_with_value_is_immediate() {
        let source = Observable::with_value(3);
        let seen = Rc::new(Cell::new(0));
        let sink = Rc::clone(&seen);
        let _sub = source.take_first(move |v| sink.set(*v));
        assert_eq!(seen.get(), 3);
        assert_eq!(source.subscriber_count(), 0);
    }

    // Test 8: first_value resolves with the first write.
    #[test]
    fn first_value_resolves() {
        let source: Observable<&'static str> = Observable::new();
        let pending = source.first_value();
        source.set("ready");
        assert_eq!(block_on(pending), Some("ready"));
    }

    // Test 9: first_value resolves to None when the source is dropped.
    #[test]
    fn first_value_none_when_source_dropped() {
        let source: Observable<i32> = Observable::new();
        let pending = source.first_value();
        drop(source);
        assert_eq!(block_on(pending), None);
    }

    // Test 10: a subscriber that writes back re-enters cleanly.
    #[test]
    fn reentrant_set_delivers_latest() {
        let source = Observable::with_value(0);
        let weak = source.downgrade();
        let _clamp = source.subscribe(move |v| {
            if *v > 10
                && let Some(source) = weak.upgrade()
            {
                source.set(10);
            }
        });
        let (seen, _sub) = recorder(&source);
        source.set(50);
        assert_eq!(source.get(), Some(10));
        assert_eq!(seen.borrow().last(), Some(&10));
        assert!(!seen.borrow().contains(&50));
    }

    // Test 11: modify bumps the version only when a value exists.
    #[test]
    fn modify_requires_value() {
        let empty: Observable<Vec<i32>> = Observable::new();
        assert!(!empty.modify(|v| v.push(1)));
        assert_eq!(empty.version(), 0);

        let filled = Observable::with_value(vec![1]);
        assert!(filled.modify(|v| v.push(2)));
        assert_eq!(filled.get(), Some(vec![1, 2]));
        assert_eq!(filled.version(), 1);
    }
}
