//! Combinators over observable collections of identity-keyed items.
//!
//! Items are matched across emissions by [`Identity`], so a model that stays
//! in the list keeps its derived value (and any subscription behind it)
//! instead of having it rebuilt.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt::Display;
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::identity::{Identity, shallow_set_eq};
use crate::observable::{Observable, Subscription, WeakObservable};

// ---------------------------------------------------------------------------
// Per-item observation state
// ---------------------------------------------------------------------------

struct ObservedItem<T, U> {
    item: T,
    derived: Observable<U>,
    _subscription: Subscription,
}

struct ObserveState<T, U> {
    entries: RefCell<Vec<ObservedItem<T, U>>>,
    rebuilding: Cell<bool>,
}

impl<T: Identity + Clone + 'static, U: Clone + 'static> ObserveState<T, U> {
    /// Emit `(item, value)` pairs, unless some item has no value yet.
    fn emit(&self, out: &Observable<Vec<(T, U)>>) {
        if self.rebuilding.get() {
            return;
        }
        let values: Option<Vec<(T, U)>> = self
            .entries
            .borrow()
            .iter()
            .map(|entry| entry.derived.get().map(|value| (entry.item.clone(), value)))
            .collect();
        if let Some(values) = values {
            out.set(values);
        }
    }
}

fn emit_weak<T, U>(state: &Weak<ObserveState<T, U>>, out: &WeakObservable<Vec<(T, U)>>)
where
    T: Identity + Clone + 'static,
    U: Clone + 'static,
{
    if let (Some(state), Some(out)) = (state.upgrade(), out.upgrade()) {
        state.emit(&out);
    }
}

impl<T: Identity + Clone + 'static> Observable<Vec<T>> {
    /// Memoized per-item mapping. An item that survives into the next
    /// emission reuses its cached result; removed items are forgotten.
    pub fn map_items_cached<U: Clone + 'static>(
        &self,
        f: impl Fn(&T) -> U + 'static,
    ) -> Observable<Vec<U>> {
        self.try_map_items_cached(move |item| Ok::<_, Infallible>(f(item)))
    }

    /// Fallible [`map_items_cached`](Self::map_items_cached). Items whose
    /// mapping fails are left out of the output and retried next emission.
    pub fn try_map_items_cached<U, E>(
        &self,
        f: impl Fn(&T) -> Result<U, E> + 'static,
    ) -> Observable<Vec<U>>
    where
        U: Clone + 'static,
        E: Display,
    {
        let cache: RefCell<HashMap<usize, (T, U)>> = RefCell::new(HashMap::new());
        self.map(move |items| {
            let mut previous = std::mem::take(&mut *cache.borrow_mut());
            let mut next = HashMap::with_capacity(items.len());
            let mut mapped = Vec::with_capacity(items.len());
            for item in items {
                let key = item.identity();
                let value = match previous.remove(&key) {
                    Some((_, value)) => value,
                    None => match f(item) {
                        Ok(value) => value,
                        Err(err) => {
                            warn!(error = %err, "dropping item whose mapping failed");
                            continue;
                        }
                    },
                };
                mapped.push(value.clone());
                next.insert(key, (item.clone(), value));
            }
            drop(previous);
            *cache.borrow_mut() = next;
            mapped
        })
    }

    /// Observe one derived observable per item and emit `(item, value)`
    /// pairs whenever membership or any per-item value changes. Nothing is
    /// emitted while some item's observable has no value yet.
    pub fn observe_items<U: Clone + 'static>(
        &self,
        f: impl Fn(&T) -> Observable<U> + 'static,
    ) -> Observable<Vec<(T, U)>> {
        self.try_observe_items(move |item| Ok::<_, Infallible>(f(item)))
    }

    /// Fallible [`observe_items`](Self::observe_items). An item whose
    /// derivation fails is dropped from the output with a warning.
    pub fn try_observe_items<U, E>(
        &self,
        f: impl Fn(&T) -> Result<Observable<U>, E> + 'static,
    ) -> Observable<Vec<(T, U)>>
    where
        U: Clone + 'static,
        E: Display,
    {
        let out = Observable::new();
        let state = Rc::new(ObserveState::<T, U> {
            entries: RefCell::new(Vec::new()),
            rebuilding: Cell::new(false),
        });
        let weak_state = Rc::downgrade(&state);
        let weak_out = out.downgrade();

        let subscription = self.subscribe(move |items: &Vec<T>| {
            let Some(state) = weak_state.upgrade() else {
                return;
            };
            let mut previous: HashMap<usize, ObservedItem<T, U>> = std::mem::take(
                &mut *state.entries.borrow_mut(),
            )
            .into_iter()
            .map(|entry| (entry.item.identity(), entry))
            .collect();

            state.rebuilding.set(true);
            let mut entries = Vec::with_capacity(items.len());
            for item in items {
                if let Some(entry) = previous.remove(&item.identity()) {
                    entries.push(entry);
                    continue;
                }
                let derived = match f(item) {
                    Ok(derived) => derived,
                    Err(err) => {
                        warn!(error = %err, "dropping item whose derivation failed");
                        continue;
                    }
                };
                let (item_state, item_out) = (weak_state.clone(), weak_out.clone());
                let subscription = derived.subscribe(move |_| emit_weak(&item_state, &item_out));
                entries.push(ObservedItem {
                    item: item.clone(),
                    derived,
                    _subscription: subscription,
                });
            }
            *state.entries.borrow_mut() = entries;
            state.rebuilding.set(false);
            drop(previous);

            if let Some(out) = weak_out.upgrade() {
                state.emit(&out);
            }
        });
        out.retain((self.clone(), subscription, state));
        out
    }

    /// Keep the items whose per-item observable currently reports `true`.
    pub fn filter_item_observations(
        &self,
        predicate: impl Fn(&T) -> Observable<bool> + 'static,
    ) -> Observable<Vec<T>> {
        self.observe_items(predicate).map(|pairs| {
            pairs
                .iter()
                .filter(|(_, keep)| *keep)
                .map(|(item, _)| item.clone())
                .collect()
        })
    }

    /// Synchronous per-item filter and downcast.
    pub fn filter_items<U: Clone + 'static>(
        &self,
        f: impl Fn(&T) -> Option<U> + 'static,
    ) -> Observable<Vec<U>> {
        self.map(move |items| items.iter().filter_map(|item| f(item)).collect())
    }

    /// Suppress re-emission while the collection holds the same items, in
    /// any order.
    pub fn distinct_until_shallow_array_changed(&self) -> Observable<Vec<T>> {
        self.distinct_until_changed_by(|a, b| shallow_set_eq(a, b))
    }

    /// First item matching `predicate`, or `None`.
    pub fn first_or_default(
        &self,
        predicate: impl Fn(&T) -> bool + 'static,
    ) -> Observable<Option<T>> {
        self.map(move |items| items.iter().find(|item| predicate(item)).cloned())
    }
}

/// One-shot read of the latest collection value. Leaves no subscription.
pub fn first_match<T: Clone + 'static>(
    source: &Observable<Vec<T>>,
    predicate: impl Fn(&T) -> bool,
) -> Option<T> {
    source.peek(|items| items.and_then(|items| items.iter().find(|item| predicate(item)).cloned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::batch;

    #[derive(Debug)]
    struct Item {
        name: &'static str,
        flag: Observable<bool>,
    }

    fn item(name: &'static str, flag: bool) -> Rc<Item> {
        Rc::new(Item {
            name,
            flag: Observable::with_value(flag),
        })
    }

    fn names(items: &[Rc<Item>]) -> Vec<&'static str> {
        items.iter().map(|item| item.name).collect()
    }

    // Test 1: cached mapping runs once per surviving item.
    #[test]
    fn map_items_cached_reuses_surviving_items() {
        let a = item("a", true);
        let b = item("b", true);
        let source = Observable::with_value(vec![Rc::clone(&a)]);
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let mapped = source.map_items_cached(move |item: &Rc<Item>| {
            counter.set(counter.get() + 1);
            item.name.to_uppercase()
        });
        source.set(vec![Rc::clone(&a), Rc::clone(&b)]);
        source.set(vec![Rc::clone(&b), Rc::clone(&a)]);
        assert_eq!(calls.get(), 2);
        assert_eq!(mapped.get(), Some(vec!["B".to_string(), "A".to_string()]));
    }

    // Test 2: failing items are dropped and retried later.
    #[test]
    fn try_map_items_cached_drops_failures() {
        let a = item("a", true);
        let bad = item("bad", true);
        let source = Observable::with_value(vec![Rc::clone(&a), Rc::clone(&bad)]);
        let mapped = source.try_map_items_cached(|item: &Rc<Item>| {
            if item.name == "bad" {
                Err("unsupported")
            } else {
                Ok(item.name)
            }
        });
        assert_eq!(mapped.get(), Some(vec!["a"]));
    }

    // Test 3: per-item observations filter live.
    #[test]
    fn filter_item_observations_tracks_flags() {
        let a = item("a", true);
        let b = item("b", false);
        let source = Observable::with_value(vec![Rc::clone(&a), Rc::clone(&b)]);
        let visible = source.filter_item_observations(|item: &Rc<Item>| item.flag.clone());
        assert_eq!(names(&visible.get().unwrap()), vec!["a"]);

        b.flag.set(true);
        assert_eq!(names(&visible.get().unwrap()), vec!["a", "b"]);

        source.set(vec![Rc::clone(&b)]);
        assert_eq!(names(&visible.get().unwrap()), vec!["b"]);
        assert_eq!(a.flag.subscriber_count(), 0);
    }

    // Test 4: membership rebuild emits once, not once per item.
    #[test]
    fn observe_items_emits_once_per_rebuild() {
        let source: Observable<Vec<Rc<Item>>> = Observable::with_value(Vec::new());
        let pairs = source.observe_items(|item: &Rc<Item>| item.flag.clone());
        let before = pairs.version();
        source.set(vec![item("a", true), item("b", true), item("c", false)]);
        assert_eq!(pairs.version(), before + 1);
        assert_eq!(pairs.get().unwrap().len(), 3);
    }

    // Test 5: nothing is emitted until every item observable has a value.
    #[test]
    fn observe_items_waits_for_pending_items() {
        let pending: Observable<u32> = Observable::new();
        let slot = pending.clone();
        let a = item("a", true);
        let source = Observable::with_value(vec![Rc::clone(&a)]);
        let pairs = source.observe_items(move |_: &Rc<Item>| slot.clone());
        assert!(!pairs.has_value());
        pending.set(3);
        assert_eq!(pairs.get().unwrap()[0].1, 3);
    }

    // Test 6: shallow gate ignores reorderings.
    #[test]
    fn shallow_gate_ignores_reordering() {
        let a = item("a", true);
        let b = item("b", true);
        let source = Observable::with_value(vec![Rc::clone(&a), Rc::clone(&b)]);
        let gated = source.distinct_until_shallow_array_changed();
        let version = gated.version();
        source.set(vec![Rc::clone(&b), Rc::clone(&a)]);
        assert_eq!(gated.version(), version);
        source.set(vec![Rc::clone(&b)]);
        assert_eq!(gated.version(), version + 1);
    }

    // Test 7: first_or_default and first_match agree.
    #[test]
    fn first_lookups() {
        let a = item("a", false);
        let b = item("b", true);
        let source = Observable::with_value(vec![Rc::clone(&a), Rc::clone(&b)]);
        let first_flagged = source.first_or_default(|item| item.flag.get() == Some(true));
        assert!(first_flagged.get().unwrap().unwrap().same(&b));

        let found = first_match(&source, |item| item.name == "a");
        assert!(found.unwrap().same(&a));
        assert_eq!(source.subscriber_count(), 1);
        assert!(first_match(&source, |item| item.name == "z").is_none());
    }

    // Test 8: filter_items downcasts synchronously.
    #[test]
    fn filter_items_downcasts() {
        let source = Observable::with_value(vec![item("a", true), item("bb", false)]);
        let long_names = source.filter_items(|item| (item.name.len() > 1).then_some(item.name));
        assert_eq!(long_names.get(), Some(vec!["bb"]));
    }

    // Test 9: batched per-item changes produce a consistent final view.
    #[test]
    fn batched_item_changes_settle() {
        let a = item("a", false);
        let b = item("b", false);
        let source = Observable::with_value(vec![Rc::clone(&a), Rc::clone(&b)]);
        let visible = source.filter_item_observations(|item: &Rc<Item>| item.flag.clone());
        batch(|| {
            a.flag.set(true);
            b.flag.set(true);
            a.flag.set(false);
        });
        assert_eq!(names(&visible.get().unwrap()), vec!["b"]);
    }
}
