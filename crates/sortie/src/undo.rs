//! Undo-stack extension.
//!
//! An [`UndoableCommand`] is a [`Command`] whose work receives an
//! [`UndoStack`] to push reversible snapshots onto. After a failure (when
//! [`undo_on_failure`](UndoableBuilder::undo_on_failure) is on, the default)
//! or on an explicit [`undo()`](UndoableCommand::undo), the undo function runs
//! through the same engine: it sets `is_running`, publishes a running record
//! and finally a record with `is_undo_value == true`.
//!
//! # Invariants
//!
//! 1. Every run starts with a fresh, empty stack.
//! 2. The stack is discarded once the paired undo completes or the command is
//!    disposed.
//! 3. An undo never overlaps another execution; a manual `undo()` while
//!    anything is in flight is a no-op.
//! 4. A failing undo is routed as [`SortieError::UndoFailed`], carrying the
//!    reason it was started for.

use std::cell::RefCell;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::rc::Rc;

use futures::FutureExt;
use sortie_reactive::Observable;

use crate::command::{Command, CommandBuilder};
use crate::error::{ErrorHandle, SortieError};
use crate::filter::ErrorFilter;
use crate::hub::CommandHub;
use crate::progress::Progress;
use crate::work::{AsyncWork, Outcome, SyncWork};

/// LIFO storage for reversible snapshots of one run.
///
/// Cheaply cloneable; clones share the same stack.
pub struct UndoStack<U> {
    items: Rc<RefCell<Vec<U>>>,
}

impl<U> Clone for UndoStack<U> {
    fn clone(&self) -> Self {
        Self {
            items: Rc::clone(&self.items),
        }
    }
}

impl<U> Default for UndoStack<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U: fmt::Debug> fmt::Debug for UndoStack<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.borrow().iter()).finish()
    }
}

impl<U> UndoStack<U> {
    /// An empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Push a snapshot.
    pub fn push(&self, item: U) {
        self.items.borrow_mut().push(item);
    }

    /// Pop the most recent snapshot.
    ///
    /// # Errors
    ///
    /// [`SortieError::EmptyUndoStack`] if nothing was pushed.
    pub fn pop(&self) -> Result<U, SortieError> {
        self.items
            .borrow_mut()
            .pop()
            .ok_or(SortieError::EmptyUndoStack)
    }

    /// Number of snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    /// Whether no snapshot was pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Drop every snapshot.
    pub fn clear(&self) {
        self.items.borrow_mut().clear();
    }
}

impl<U: Clone> UndoStack<U> {
    /// Clone of the most recent snapshot.
    #[must_use]
    pub fn peek(&self) -> Option<U> {
        self.items.borrow().last().cloned()
    }
}

/// Engine-side view of an undo function.
pub(crate) trait UndoHook<T> {
    /// A run is starting: replace the stack with a fresh one.
    fn begin_run(&self);
    /// Start the undo with `reason`.
    fn invoke(&self, reason: Option<ErrorHandle>) -> Outcome<T>;
    fn is_async(&self) -> bool;
    fn undo_on_failure(&self) -> bool;
    /// Drop the current stack.
    fn discard(&self);
}

type StackSlot<U> = Rc<RefCell<UndoStack<U>>>;
type UndoFn<U, T> = Box<dyn Fn(UndoStack<U>, Option<ErrorHandle>) -> Outcome<T>>;

struct StackUndo<U, T> {
    slot: StackSlot<U>,
    undo: UndoFn<U, T>,
    is_async: bool,
    undo_on_failure: bool,
}

impl<U, T> UndoHook<T> for StackUndo<U, T> {
    fn begin_run(&self) {
        *self.slot.borrow_mut() = UndoStack::new();
    }

    fn invoke(&self, reason: Option<ErrorHandle>) -> Outcome<T> {
        let stack = self.slot.borrow().clone();
        (self.undo)(stack, reason)
    }

    fn is_async(&self) -> bool {
        self.is_async
    }

    fn undo_on_failure(&self) -> bool {
        self.undo_on_failure
    }

    fn discard(&self) {
        *self.slot.borrow_mut() = UndoStack::new();
    }
}

/// A [`Command`] with an undo function.
///
/// Dereferences to the wrapped [`Command`] for running and observing.
pub struct UndoableCommand<P, T, U> {
    command: Command<P, T>,
    slot: StackSlot<U>,
}

impl<P, T, U> Clone for UndoableCommand<P, T, U> {
    fn clone(&self) -> Self {
        Self {
            command: self.command.clone(),
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<P, T, U> fmt::Debug for UndoableCommand<P, T, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoableCommand")
            .field("command", &self.command)
            .field("stack_len", &self.slot.borrow().len())
            .finish()
    }
}

impl<P, T, U> Deref for UndoableCommand<P, T, U> {
    type Target = Command<P, T>;

    fn deref(&self) -> &Self::Target {
        &self.command
    }
}

impl<P: Clone + 'static, T: Clone + 'static, U: 'static> UndoableCommand<P, T, U> {
    /// Synchronous work and undo.
    pub fn sync<E, E2>(
        hub: &CommandHub,
        initial: T,
        work: impl Fn(P, &UndoStack<U>) -> Result<T, E> + 'static,
        undo: impl Fn(&UndoStack<U>, Option<ErrorHandle>) -> Result<T, E2> + 'static,
    ) -> UndoableBuilder<P, T, U>
    where
        E: StdError + 'static,
        E2: StdError + 'static,
    {
        let slot: StackSlot<U> = Rc::default();
        let stack = Rc::clone(&slot);
        let command = CommandBuilder::new(
            hub,
            initial,
            SyncWork(move |param: P, _: &Progress| {
                let current = stack.borrow().clone();
                work(param, &current)
            }),
        );
        let undo: UndoFn<U, T> = Box::new(move |stack, reason| {
            Outcome::Ready(undo(&stack, reason).map_err(ErrorHandle::new))
        });
        UndoableBuilder::new(command, slot, undo, false)
    }

    /// Asynchronous work and undo. The hub must have a spawner.
    pub fn future<E, E2, Fut, UndoFut>(
        hub: &CommandHub,
        initial: T,
        work: impl Fn(P, UndoStack<U>) -> Fut + 'static,
        undo: impl Fn(UndoStack<U>, Option<ErrorHandle>) -> UndoFut + 'static,
    ) -> UndoableBuilder<P, T, U>
    where
        Fut: Future<Output = Result<T, E>> + 'static,
        UndoFut: Future<Output = Result<T, E2>> + 'static,
        E: StdError + 'static,
        E2: StdError + 'static,
    {
        let slot: StackSlot<U> = Rc::default();
        let stack = Rc::clone(&slot);
        let command = CommandBuilder::new(
            hub,
            initial,
            AsyncWork(move |param: P, _: Progress| {
                let current = stack.borrow().clone();
                work(param, current)
            }),
        );
        let undo: UndoFn<U, T> = Box::new(move |stack, reason| {
            Outcome::Pending(
                undo(stack, reason)
                    .map(|r| r.map_err(ErrorHandle::new))
                    .boxed_local(),
            )
        });
        UndoableBuilder::new(command, slot, undo, true)
    }

    /// Undo the last run. A no-op while any execution is in flight or after
    /// dispose.
    pub fn undo(&self) {
        self.command.start_undo(None);
    }

    /// The stack of the current (or last) run.
    #[must_use]
    pub fn stack(&self) -> UndoStack<U> {
        self.slot.borrow().clone()
    }

    /// The wrapped command.
    #[must_use]
    pub fn command(&self) -> &Command<P, T> {
        &self.command
    }
}

/// Configures an [`UndoableCommand`] before it is built.
pub struct UndoableBuilder<P, T, U> {
    command: CommandBuilder<P, T>,
    slot: StackSlot<U>,
    undo: UndoFn<U, T>,
    is_async: bool,
    undo_on_failure: bool,
}

impl<P: Clone + 'static, T: Clone + 'static, U: 'static> UndoableBuilder<P, T, U> {
    fn new(
        command: CommandBuilder<P, T>,
        slot: StackSlot<U>,
        undo: UndoFn<U, T>,
        is_async: bool,
    ) -> Self {
        Self {
            command,
            slot,
            undo,
            is_async,
            undo_on_failure: true,
        }
    }

    /// Whether a failed run triggers the undo automatically. On by default.
    #[must_use]
    pub fn undo_on_failure(mut self, enabled: bool) -> Self {
        self.undo_on_failure = enabled;
        self
    }

    /// See [`CommandBuilder::name`].
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.command = self.command.name(name);
        self
    }

    /// See [`CommandBuilder::restriction`].
    #[must_use]
    pub fn restriction(mut self, restriction: &Observable<bool>) -> Self {
        self.command = self.command.restriction(restriction);
        self
    }

    /// See [`CommandBuilder::run_instead`].
    #[must_use]
    pub fn run_instead(mut self, f: impl Fn(P) + 'static) -> Self {
        self.command = self.command.run_instead(f);
        self
    }

    /// See [`CommandBuilder::error_filter`].
    #[must_use]
    pub fn error_filter(mut self, filter: impl ErrorFilter + 'static) -> Self {
        self.command = self.command.error_filter(filter);
        self
    }

    /// See [`CommandBuilder::include_last_value_in_results`].
    #[must_use]
    pub fn include_last_value_in_results(mut self) -> Self {
        self.command = self.command.include_last_value_in_results();
        self
    }

    /// See [`CommandBuilder::build`].
    #[must_use]
    pub fn build(self) -> UndoableCommand<P, T, U> {
        let hook = StackUndo {
            slot: Rc::clone(&self.slot),
            undo: self.undo,
            is_async: self.is_async,
            undo_on_failure: self.undo_on_failure,
        };
        UndoableCommand {
            command: self.command.undo_hook(Box::new(hook)).build(),
            slot: self.slot,
        }
    }
}

impl<P: Clone + 'static, T: Clone + PartialEq + 'static, U: 'static> UndoableBuilder<P, T, U> {
    /// See [`CommandBuilder::notify_only_when_changed`].
    #[must_use]
    pub fn notify_only_when_changed(mut self) -> Self {
        self.command = self.command.notify_only_when_changed();
        self
    }
}
