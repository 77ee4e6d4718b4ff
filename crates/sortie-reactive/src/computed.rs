#![forbid(unsafe_code)]

//! Eagerly derived values that follow [`Observable`] dependencies.
//!
//! # Design
//!
//! [`Computed<T>`] owns a private output [`Observable<T>`] plus the
//! subscriptions on its sources. Whenever a source publishes, the map function
//! runs immediately and the result is stored in the output cell, which
//! notifies its own subscribers only if the derived value changed.
//!
//! Because recomputation happens inside the source's notification cycle, a
//! listener that fires after a source listener registered *earlier* than the
//! `Computed` already sees the fresh derived value. Commands rely on this:
//! their `can_run` value is built before any external listener can attach.
//!
//! # Invariants
//!
//! 1. `get()` always returns `map(current sources)`.
//! 2. The output notifies only when the derived value differs
//!    ([`NotifyMode::OnChange`](super::NotifyMode::OnChange)).
//! 3. Version increments by exactly 1 per published change.
//!
//! # Failure Modes
//!
//! - **Source dropped**: the subscription becomes inert. The computed value
//!   keeps its last result.

use std::fmt;
use std::rc::Rc;

use super::observable::{Observable, Subscription};

/// A read-only value derived from one or more [`Observable`] sources.
///
/// Cloning a `Computed` creates a new handle to the **same** derived state.
pub struct Computed<T> {
    output: Observable<T>,
    /// Keeps the source callbacks alive. Never read.
    _subscriptions: Rc<Vec<Subscription>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            output: self.output.clone(),
            _subscriptions: Rc::clone(&self._subscriptions),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("output", &self.output)
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Computed<T> {
    /// Derive a value from a single observable.
    pub fn from_observable<S: Clone + 'static>(
        source: &Observable<S>,
        map: impl Fn(&S) -> T + 'static,
    ) -> Self {
        let output = Observable::new(source.with(&map));
        let out = output.clone();
        let sub = source.subscribe(move |v| out.set(map(v)));
        Self {
            output,
            _subscriptions: Rc::new(vec![sub]),
        }
    }

    /// Derive a value from two observables.
    pub fn from2<S1, S2>(
        s1: &Observable<S1>,
        s2: &Observable<S2>,
        map: impl Fn(&S1, &S2) -> T + 'static,
    ) -> Self
    where
        S1: Clone + 'static,
        S2: Clone + 'static,
    {
        let (a, b) = (s1.clone(), s2.clone());
        let compute: Rc<dyn Fn() -> T> = Rc::new(move || a.with(|v1| b.with(|v2| map(v1, v2))));
        Self::wire(compute, |recompute| {
            vec![
                s1.subscribe({
                    let r = Rc::clone(&recompute);
                    move |_| r()
                }),
                s2.subscribe(move |_| recompute()),
            ]
        })
    }

    /// Derive a value from three observables.
    pub fn from3<S1, S2, S3>(
        s1: &Observable<S1>,
        s2: &Observable<S2>,
        s3: &Observable<S3>,
        map: impl Fn(&S1, &S2, &S3) -> T + 'static,
    ) -> Self
    where
        S1: Clone + 'static,
        S2: Clone + 'static,
        S3: Clone + 'static,
    {
        let (a, b, c) = (s1.clone(), s2.clone(), s3.clone());
        let compute: Rc<dyn Fn() -> T> =
            Rc::new(move || a.with(|v1| b.with(|v2| c.with(|v3| map(v1, v2, v3)))));
        Self::wire(compute, |recompute| {
            vec![
                s1.subscribe({
                    let r = Rc::clone(&recompute);
                    move |_| r()
                }),
                s2.subscribe({
                    let r = Rc::clone(&recompute);
                    move |_| r()
                }),
                s3.subscribe(move |_| recompute()),
            ]
        })
    }

    fn wire(
        compute: Rc<dyn Fn() -> T>,
        subscribe: impl FnOnce(Rc<dyn Fn()>) -> Vec<Subscription>,
    ) -> Self {
        let output = Observable::new(compute());
        let out = output.clone();
        let recompute: Rc<dyn Fn()> = Rc::new(move || out.set(compute()));
        let subscriptions = subscribe(recompute);
        Self {
            output,
            _subscriptions: Rc::new(subscriptions),
        }
    }

    /// Current derived value.
    #[must_use]
    pub fn get(&self) -> T {
        self.output.get()
    }

    /// Access the derived value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.output.with(f)
    }

    /// Listen for changes of the derived value.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.output.subscribe(callback)
    }

    /// Number of live subscribers on the derived value.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.output.subscriber_count()
    }

    /// Number of published changes of the derived value.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.output.version()
    }

    /// Stop publishing. Source subscriptions stay alive until the last handle
    /// is dropped but no longer reach any listener.
    pub fn dispose(&self) {
        self.output.dispose();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[test]
    fn single_dep_computed() {
        let source = Observable::new(10);
        let computed = Computed::from_observable(&source, |v| v * 2);

        assert_eq!(computed.get(), 20);
        assert_eq!(computed.version(), 0);

        source.set(5);
        assert_eq!(computed.get(), 10);
        assert_eq!(computed.version(), 1);
    }

    #[test]
    fn multi_dep_computed() {
        let width = Observable::new(10);
        let height = Observable::new(20);
        let area = Computed::from2(&width, &height, |w, h| w * h);

        assert_eq!(area.get(), 200);

        width.set(5);
        assert_eq!(area.get(), 100);

        height.set(30);
        assert_eq!(area.get(), 150);
    }

    #[test]
    fn three_dep_computed() {
        let a = Observable::new(1);
        let b = Observable::new(2);
        let c = Observable::new(3);
        let sum = Computed::from3(&a, &b, &c, |x, y, z| x + y + z);

        assert_eq!(sum.get(), 6);

        a.set(10);
        assert_eq!(sum.get(), 15);

        c.set(100);
        assert_eq!(sum.get(), 112);
    }

    #[test]
    fn notifies_only_when_derived_value_changes() {
        let n = Observable::new(1);
        let parity = Computed::from_observable(&n, |v| v % 2 == 0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _sub = parity.subscribe(move |even| s.borrow_mut().push(*even));

        n.set(3);
        n.set(4);
        n.set(6);
        n.set(7);
        assert_eq!(*seen.borrow(), vec![true, false]);
        assert_eq!(parity.version(), 2);
    }

    #[test]
    fn derived_value_is_fresh_for_later_listeners() {
        let source = Observable::new(false);
        let negated = Computed::from_observable(&source, |v| !v);
        let observed = Rc::new(Cell::new(None));
        let o = Rc::clone(&observed);
        let n = negated.clone();
        let _sub = source.subscribe(move |_| o.set(Some(n.get())));

        source.set(true);
        assert_eq!(observed.get(), Some(false));
    }

    #[test]
    fn clone_shares_state() {
        let source = Observable::new(10);
        let c1 = Computed::from_observable(&source, |v| v + 1);
        let c2 = c1.clone();

        source.set(20);
        assert_eq!(c1.get(), 21);
        assert_eq!(c2.get(), 21);
    }

    #[test]
    fn computed_survives_source_drop() {
        let computed;
        {
            let source = Observable::new(42);
            computed = Computed::from_observable(&source, |v| *v);
        }
        assert_eq!(computed.get(), 42);
    }

    #[test]
    fn with_access() {
        let source = Observable::new(vec![1, 2, 3]);
        let computed = Computed::from_observable(&source, |v| v.iter().sum::<i32>());
        assert_eq!(computed.with(|sum| *sum), 6);
    }

    #[test]
    fn dispose_stops_publishing() {
        let source = Observable::new(1);
        let computed = Computed::from_observable(&source, |v| *v);
        let hits = Rc::new(Cell::new(0u32));
        let h = Rc::clone(&hits);
        let _sub = computed.subscribe(move |_| h.set(h.get() + 1));

        computed.dispose();
        source.set(2);
        assert_eq!(hits.get(), 0);
        assert_eq!(computed.subscriber_count(), 0);
    }

    #[test]
    fn string_computed() {
        let first = Observable::new("John".to_string());
        let last = Observable::new("Doe".to_string());
        let full_name = Computed::from2(&first, &last, |f, l| format!("{} {}", f, l));

        assert_eq!(full_name.get(), "John Doe");

        first.set("Jane".to_string());
        assert_eq!(full_name.get(), "Jane Doe");

        last.set("Smith".to_string());
        assert_eq!(full_name.get(), "Jane Smith");
    }
}
