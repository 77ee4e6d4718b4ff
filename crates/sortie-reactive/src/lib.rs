#![forbid(unsafe_code)]

//! Observable cells for Sortie.
//!
//! This crate provides the change-tracking primitives commands publish their
//! state through:
//!
//! - [`Observable`]: A shared, version-tracked value wrapper with change
//!   notification via subscriber callbacks.
//! - [`Subscription`]: RAII guard that automatically unsubscribes on drop.
//! - [`Computed`]: An eagerly derived, read-only value that follows one or
//!   more `Observable` sources.
//!
//! # Architecture
//!
//! `Observable<T>` uses `Rc<RefCell<..>>` for single-threaded shared ownership.
//! Subscribers are stored as `Weak` function pointers and cleaned up lazily
//! during notification.
//!
//! `Computed<T>` subscribes to its sources via `Observable::subscribe()` and
//! republishes its derived value the moment a source notifies, so listeners
//! of the derived value run inside the source's notification cycle.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per published mutation.
//! 2. Subscribers are notified in registration order.
//! 3. In [`NotifyMode::OnChange`], setting a value equal to the current value
//!    is a no-op (no version bump, no notifications). In
//!    [`NotifyMode::Always`] every `set` notifies.
//! 4. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.
//! 5. No internal borrow is held while subscribers run, so callbacks may read
//!    and write any cell, including the one notifying them.

pub mod computed;
pub mod observable;

pub use computed::Computed;
pub use observable::{NotifyMode, Observable, Subscription};
