//! shgame-reactive -- single-threaded push-based observables.
//!
//! These are the primitives the token model and orchestration layers are
//! built from. Everything here is `!Send`: state lives in `Rc`/`RefCell`
//! and notifications are delivered synchronously on the writing thread.
//!
//! # Semantics
//!
//! 1. Observables replay their latest value to each new subscriber.
//! 2. Subscribers are called in registration order.
//! 3. Derived observables own their upstream chain; callbacks hold the
//!    derived cell weakly, so dropping a derived observable unsubscribes it.
//! 4. Inside a [`BatchScope`] writes land immediately but notifications are
//!    deferred until the outermost scope drops.
//!
//! # Key Types
//!
//! - [`Observable`] -- replay-1 value cell.
//! - [`Subscription`] -- RAII handle that unsubscribes on drop.
//! - [`BatchScope`] -- deferred-notification guard.
//! - [`Identity`] -- reference identity used by the collection combinators.

pub mod batch;
pub mod collection;
pub mod identity;
pub mod observable;
pub mod operators;

pub use batch::{BatchScope, batch, is_batching};
pub use collection::first_match;
pub use identity::{Identity, same_option, shallow_set_eq};
pub use observable::{Observable, Subscription, WeakObservable};
pub use operators::{combine_latest2, combine_latest3, combine_latest4, observe_all};
