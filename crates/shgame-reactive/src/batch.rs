//! Deferred notification scopes.
//!
//! While a [`BatchScope`] is alive, values written with
//! [`Observable::set`](crate::Observable::set) are stored immediately but
//! subscribers are not called. When the outermost scope drops, each touched
//! observable delivers its latest value once, in the order it was first
//! touched. Nested scopes only flush at the outermost exit.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::marker::PhantomData;

type Deferred = Box<dyn FnOnce()>;

#[derive(Default)]
struct BatchState {
    depth: usize,
    queued: HashSet<usize>,
    pending: VecDeque<(usize, Deferred)>,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// RAII guard that defers observable notifications until it drops.
#[must_use = "notifications flush as soon as the scope is dropped"]
pub struct BatchScope {
    _not_send: PhantomData<*const ()>,
}

impl BatchScope {
    pub fn new() -> Self {
        BATCH.with(|state| state.borrow_mut().depth += 1);
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Default for BatchScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        let outermost = BATCH.with(|state| {
            let mut state = state.borrow_mut();
            state.depth -= 1;
            state.depth == 0
        });
        if outermost {
            flush();
        }
    }
}

impl std::fmt::Debug for BatchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScope")
            .field("depth", &BATCH.with(|state| state.borrow().depth))
            .finish()
    }
}

/// Run `f` inside a batch scope and flush on return.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let scope = BatchScope::new();
    let result = f();
    drop(scope);
    result
}

/// True while at least one [`BatchScope`] is alive on this thread.
pub fn is_batching() -> bool {
    BATCH.with(|state| state.borrow().depth > 0)
}

/// Queue a delivery for the observable identified by `key`. A key already
/// queued is not queued twice; its delivery reads the latest value anyway.
pub(crate) fn defer(key: usize, deliver: impl FnOnce() + 'static) {
    BATCH.with(|state| {
        let mut state = state.borrow_mut();
        if state.queued.insert(key) {
            state.pending.push_back((key, Box::new(deliver)));
        }
    });
}

fn flush() {
    loop {
        let next = BATCH.with(|state| {
            let mut state = state.borrow_mut();
            let (key, deliver) = state.pending.pop_front()?;
            state.queued.remove(&key);
            Some(deliver)
        });
        match next {
            Some(deliver) => deliver(),
            None => break,
        }
    }
}
