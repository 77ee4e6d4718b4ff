//! Property-based invariant tests for observable cells.
//!
//! 1. `version` equals the number of notifications delivered
//! 2. OnChange cells notify exactly when the value changes
//! 3. Always cells notify on every `set`
//! 4. A computed value always equals `map(sources)`
//! 5. Subscribers see values in the order they were set

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use proptest::prelude::*;
use sortie_reactive::{Computed, NotifyMode, Observable};

// ═════════════════════════════════════════════════════════════════════════
// 1-2. OnChange bookkeeping
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn on_change_version_counts_changes(values in proptest::collection::vec(0u8..4, 0..=64)) {
        let cell = Observable::new(0u8);
        let hits = Rc::new(Cell::new(0u64));
        let h = Rc::clone(&hits);
        let _sub = cell.subscribe(move |_| h.set(h.get() + 1));

        let mut previous = 0u8;
        let mut changes = 0u64;
        for v in values {
            if v != previous {
                changes += 1;
            }
            previous = v;
            cell.set(v);
        }

        prop_assert_eq!(cell.version(), changes);
        prop_assert_eq!(hits.get(), changes);
        prop_assert_eq!(cell.get(), previous);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3, 5. Always mode and ordering
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn always_mode_sees_every_set(values in proptest::collection::vec(any::<i16>(), 0..=64)) {
        let cell = Observable::with_mode(0i16, NotifyMode::Always);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _sub = cell.subscribe(move |v| s.borrow_mut().push(*v));

        for v in &values {
            cell.set(*v);
        }

        prop_assert_eq!(&*seen.borrow(), &values);
        prop_assert_eq!(cell.version(), values.len() as u64);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Computed consistency
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn computed_tracks_sources(ops in proptest::collection::vec((any::<bool>(), any::<bool>()), 0..=64)) {
        let a = Observable::new(false);
        let b = Observable::new(false);
        let gate = Computed::from2(&a, &b, |x, y| !x && !y);

        for (first, value) in ops {
            if first { a.set(value) } else { b.set(value) }
            prop_assert_eq!(gate.get(), !a.get() && !b.get());
        }
    }
}
