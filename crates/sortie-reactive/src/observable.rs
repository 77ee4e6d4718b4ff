#![forbid(unsafe_code)]

//! Shared, version-tracked value cells with synchronous change notification.
//!
//! # Design
//!
//! [`Observable<T>`] wraps its value, a version counter and a subscriber list
//! in `Rc<RefCell<..>>`. Cloning an `Observable` creates another handle to the
//! same cell.
//!
//! Each subscriber callback is owned by the [`Subscription`] returned from
//! [`subscribe()`](Observable::subscribe); the cell only keeps a `Weak`
//! pointer. Dropping the guard therefore unsubscribes, and dead entries are
//! pruned on the next notification.
//!
//! # Failure Modes
//!
//! - **Re-entrant write from `with()`**: calling `set()` inside a `with()`
//!   closure on the same cell panics (`RefCell` double borrow). Writes from
//!   inside subscriber callbacks are fine.
//! - **Write after dispose**: ignored. A disposed cell keeps its last value
//!   for readers but never notifies again.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type Callback<T> = dyn Fn(&T);

/// When a [`set()`](Observable::set) notifies subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyMode {
    /// Notify on every `set`, even if the value is unchanged.
    Always,
    /// Notify only when the new value differs from the current one.
    #[default]
    OnChange,
}

struct ObservableInner<T> {
    value: T,
    version: u64,
    mode: NotifyMode,
    /// Equality used by [`NotifyMode::OnChange`]. `None` for cells built with
    /// [`Observable::always`], which never compare.
    eq: Option<fn(&T, &T) -> bool>,
    subscribers: Vec<Weak<Callback<T>>>,
    disposed: bool,
}

/// A shared, observable value cell.
///
/// # Invariants
///
/// 1. `version` increments by 1 for every `set` that notifies.
/// 2. Subscribers run synchronously, in registration order, after the new
///    value is stored.
pub struct Observable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("mode", &inner.mode)
            .field("disposed", &inner.disposed)
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create a cell that notifies only when its value changes.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::with_mode(value, NotifyMode::OnChange)
    }

    /// Create a cell with an explicit notification mode.
    #[must_use]
    pub fn with_mode(value: T, mode: NotifyMode) -> Self {
        Self::build(value, mode, Some(<T as PartialEq>::eq))
    }
}

impl<T: Clone + 'static> Observable<T> {
    /// Create a cell that notifies on every `set`.
    ///
    /// Unlike [`new()`](Self::new) this does not require `T: PartialEq`.
    #[must_use]
    pub fn always(value: T) -> Self {
        Self::build(value, NotifyMode::Always, None)
    }

    fn build(value: T, mode: NotifyMode, eq: Option<fn(&T, &T) -> bool>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                value,
                version: 0,
                mode,
                eq,
                subscribers: Vec::new(),
                disposed: false,
            })),
        }
    }

    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Access the current value by reference.
    ///
    /// # Panics
    ///
    /// Panics if the closure writes to this same cell.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Store `value` and notify subscribers according to the cell's mode.
    pub fn set(&self, value: T) {
        let snapshot = {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed {
                tracing::trace!("set on disposed observable ignored");
                return;
            }
            if inner.mode == NotifyMode::OnChange
                && let Some(eq) = inner.eq
                && eq(&inner.value, &value)
            {
                return;
            }
            inner.value = value;
            inner.version += 1;
            inner.value.clone()
        };
        self.dispatch(&snapshot);
    }

    /// Store `value` without notifying anyone and without bumping the version.
    pub fn set_silently(&self, value: T) {
        let mut inner = self.inner.borrow_mut();
        if !inner.disposed {
            inner.value = value;
        }
    }

    /// Mutate the value in place, then publish it like [`set()`](Self::set).
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut next = self.get();
        f(&mut next);
        self.set(next);
    }

    /// Notify subscribers with the current value regardless of mode.
    pub fn notify(&self) {
        let snapshot = {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed {
                return;
            }
            inner.version += 1;
            inner.value.clone()
        };
        self.dispatch(&snapshot);
    }

    /// Register a callback invoked with the new value after every published
    /// change. The callback lives as long as the returned guard.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let callback: Rc<Callback<T>> = Rc::new(callback);
        let mut inner = self.inner.borrow_mut();
        if !inner.disposed {
            inner.subscribers.push(Rc::downgrade(&callback));
        }
        Subscription {
            _callback: Box::new(callback),
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .subscribers
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Whether at least one live subscriber is attached.
    #[must_use]
    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }

    /// Number of published mutations so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// The cell's notification mode.
    #[must_use]
    pub fn mode(&self) -> NotifyMode {
        self.inner.borrow().mode
    }

    /// Release all subscribers and stop publishing.
    pub fn dispose(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.disposed = true;
        inner.subscribers.clear();
    }

    /// Whether [`dispose()`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().disposed
    }

    fn dispatch(&self, value: &T) {
        // Collect strong handles first so no borrow is held while callbacks
        // run; callbacks are free to touch this cell again.
        let callbacks: Vec<Rc<Callback<T>>> = {
            let mut inner = self.inner.borrow_mut();
            inner.subscribers.retain(|w| w.strong_count() > 0);
            inner.subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        for callback in callbacks {
            callback(value);
        }
    }
}

/// RAII guard for an [`Observable`] subscription.
///
/// Holds the only strong reference to the callback. Dropping it unsubscribes.
pub struct Subscription {
    _callback: Box<dyn Any>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
