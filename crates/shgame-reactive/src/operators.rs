//! Derived observables.
//!
//! Every operator returns a fresh [`Observable`] that owns its upstream
//! handle and subscription. Callbacks only hold the derived cell weakly, so
//! dropping the last handle to a derived observable tears down its chain.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::observable::{Observable, Subscription};

impl<T: Clone + 'static> Observable<T> {
    pub fn map<U: Clone + 'static>(&self, f: impl Fn(&T) -> U + 'static) -> Observable<U> {
        let out = Observable::new();
        let weak = out.downgrade();
        let subscription = self.subscribe(move |value| {
            if let Some(out) = weak.upgrade() {
                out.set(f(value));
            }
        });
        out.retain((self.clone(), subscription));
        out
    }

    /// Like [`map`](Self::map), but values mapped to `None` are skipped.
    pub fn filter_map_value<U: Clone + 'static>(
        &self,
        f: impl Fn(&T) -> Option<U> + 'static,
    ) -> Observable<U> {
        let out = Observable::new();
        let weak = out.downgrade();
        let subscription = self.subscribe(move |value| {
            if let Some(out) = weak.upgrade()
                && let Some(mapped) = f(value)
            {
                out.set(mapped);
            }
        });
        out.retain((self.clone(), subscription));
        out
    }

    /// Re-emit only when `eq` reports the new value differs from the last
    /// emitted one.
    pub fn distinct_until_changed_by(
        &self,
        eq: impl Fn(&T, &T) -> bool + 'static,
    ) -> Observable<T> {
        let out = Observable::new();
        let weak = out.downgrade();
        let subscription = self.subscribe(move |value| {
            let Some(out) = weak.upgrade() else {
                return;
            };
            let unchanged = out.peek(|last| last.is_some_and(|last| eq(last, value)));
            if !unchanged {
                out.set(value.clone());
            }
        });
        out.retain((self.clone(), subscription));
        out
    }

    pub fn distinct_until_changed(&self) -> Observable<T>
    where
        T: PartialEq,
    {
        self.distinct_until_changed_by(|a, b| a == b)
    }

    /// Follow the observable produced by `f` for the latest upstream value,
    /// dropping the subscription to the previous one.
    pub fn switch_map<U: Clone + 'static>(
        &self,
        f: impl Fn(&T) -> Observable<U> + 'static,
    ) -> Observable<U> {
        let out = Observable::new();
        let weak = out.downgrade();
        let current: Rc<RefCell<Option<(Observable<U>, Subscription)>>> =
            Rc::new(RefCell::new(None));
        let generation = Rc::new(Cell::new(0u64));

        let slot = Rc::clone(&current);
        let subscription = self.subscribe(move |value| {
            if weak.upgrade().is_none() {
                return;
            }
            let next = f(value);
            let this_generation = generation.get() + 1;
            generation.set(this_generation);
            let previous = slot.borrow_mut().take();
            drop(previous);

            let out_weak = weak.clone();
            let live_generation = Rc::clone(&generation);
            let next_subscription = next.subscribe(move |inner_value| {
                if live_generation.get() != this_generation {
                    return;
                }
                if let Some(out) = out_weak.upgrade() {
                    out.set(inner_value.clone());
                }
            });
            // A reentrant upstream write during the replay above may already
            // have switched to a newer inner observable.
            if generation.get() == this_generation {
                *slot.borrow_mut() = Some((next, next_subscription));
            }
        });
        out.retain((self.clone(), subscription, current));
        out
    }
}

impl<T: Clone + 'static> Observable<Option<T>> {
    /// [`switch_map`](Observable::switch_map) that passes `None` straight
    /// through instead of calling `f`.
    pub fn switch_map_some<U: Clone + 'static>(
        &self,
        f: impl Fn(&T) -> Observable<U> + 'static,
    ) -> Observable<Option<U>> {
        self.switch_map(move |value| match value {
            Some(value) => f(value).map(|inner| Some(inner.clone())),
            None => Observable::with_value(None),
        })
    }
}

// ---------------------------------------------------------------------------
// Combination
// ---------------------------------------------------------------------------

/// Shared plumbing for the `combine_latest*` family: one output cell, a
/// recompute trigger linked to every source, and a gate that holds emission
/// back until all sources are linked.
struct Combiner<O> {
    out: Observable<O>,
    ready: Rc<Cell<bool>>,
    trigger: Rc<dyn Fn()>,
}

impl<O: Clone + 'static> Combiner<O> {
    fn new(compute: impl Fn() -> Option<O> + 'static) -> Self {
        let out = Observable::new();
        let weak = out.downgrade();
        let ready = Rc::new(Cell::new(false));
        let gate = Rc::clone(&ready);
        let trigger: Rc<dyn Fn()> = Rc::new(move || {
            if !gate.get() {
                return;
            }
            let Some(out) = weak.upgrade() else {
                return;
            };
            if let Some(value) = compute() {
                out.set(value);
            }
        });
        Self {
            out,
            ready,
            trigger,
        }
    }

    fn link<S: Clone + 'static>(&self, source: &Observable<S>) {
        let trigger = Rc::clone(&self.trigger);
        let subscription = source.subscribe(move |_| trigger());
        self.out.retain((source.clone(), subscription));
    }

    fn finish(self) -> Observable<O> {
        self.ready.set(true);
        (self.trigger)();
        self.out
    }
}

/// Emit the latest pair once both sources hold a value, then on every write
/// to either.
pub fn combine_latest2<A, B>(a: &Observable<A>, b: &Observable<B>) -> Observable<(A, B)>
where
    A: Clone + 'static,
    B: Clone + 'static,
{
    let (wa, wb) = (a.downgrade(), b.downgrade());
    let combiner = Combiner::new(move || Some((wa.upgrade()?.get()?, wb.upgrade()?.get()?)));
    combiner.link(a);
    combiner.link(b);
    combiner.finish()
}

pub fn combine_latest3<A, B, C>(
    a: &Observable<A>,
    b: &Observable<B>,
    c: &Observable<C>,
) -> Observable<(A, B, C)>
where
    A: Clone + 'static,
    B: Clone + 'static,
    C: Clone + 'static,
{
    let (wa, wb, wc) = (a.downgrade(), b.downgrade(), c.downgrade());
    let combiner = Combiner::new(move || {
        Some((
            wa.upgrade()?.get()?,
            wb.upgrade()?.get()?,
            wc.upgrade()?.get()?,
        ))
    });
    combiner.link(a);
    combiner.link(b);
    combiner.link(c);
    combiner.finish()
}

pub fn combine_latest4<A, B, C, D>(
    a: &Observable<A>,
    b: &Observable<B>,
    c: &Observable<C>,
    d: &Observable<D>,
) -> Observable<(A, B, C, D)>
where
    A: Clone + 'static,
    B: Clone + 'static,
    C: Clone + 'static,
    D: Clone + 'static,
{
    let (wa, wb, wc, wd) = (a.downgrade(), b.downgrade(), c.downgrade(), d.downgrade());
    let combiner = Combiner::new(move || {
        Some((
            wa.upgrade()?.get()?,
            wb.upgrade()?.get()?,
            wc.upgrade()?.get()?,
            wd.upgrade()?.get()?,
        ))
    });
    combiner.link(a);
    combiner.link(b);
    combiner.link(c);
    combiner.link(d);
    combiner.finish()
}

/// List of observables to observable of list. An empty list emits an empty
/// vector immediately.
pub fn observe_all<U: Clone + 'static>(sources: &[Observable<U>]) -> Observable<Vec<U>> {
    let weak: Vec<_> = sources.iter().map(Observable::downgrade).collect();
    let combiner = Combiner::new(move || {
        weak.iter()
            .map(|source| source.upgrade()?.get())
            .collect::<Option<Vec<U>>>()
    });
    for source in sources {
        combiner.link(source);
    }
    combiner.finish()
}
