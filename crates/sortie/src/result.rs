//! Records published by a command on every state transition.

use crate::error::{ErrorHandle, Trace};
use crate::filter::ErrorReaction;

/// Snapshot of a command's state, published through
/// [`Command::results`](crate::Command::results).
///
/// # Invariants
///
/// - `has_error()` iff `error.is_some() && !is_undo_value`.
/// - `is_success()` iff `!is_running && !has_error()`.
#[derive(Clone, Debug)]
pub struct CommandResult<P, T> {
    /// The parameter of the run (`None` for undo executions and the initial
    /// record).
    pub param: Option<P>,
    /// Result value on success; the previous value on a running record when
    /// the command includes it.
    pub data: Option<T>,
    /// The failure, or for undo records the reason of the undo.
    pub error: Option<ErrorHandle>,
    /// Whether an execution is in flight.
    pub is_running: bool,
    /// Whether `data` was produced by an undo.
    pub is_undo_value: bool,
    /// How the failure was classified.
    pub reaction: Option<ErrorReaction>,
    /// Backtrace captured at classification time.
    pub trace: Option<Trace>,
}

impl<P, T> CommandResult<P, T> {
    /// The record a command starts with.
    #[must_use]
    pub fn blank() -> Self {
        Self {
            param: None,
            data: None,
            error: None,
            is_running: false,
            is_undo_value: false,
            reaction: None,
            trace: None,
        }
    }

    /// An execution just started.
    #[must_use]
    pub fn running(param: Option<P>, previous: Option<T>) -> Self {
        Self {
            param,
            data: previous,
            is_running: true,
            ..Self::blank()
        }
    }

    /// An execution finished with `data`.
    #[must_use]
    pub fn success(param: Option<P>, data: T) -> Self {
        Self {
            param,
            data: Some(data),
            ..Self::blank()
        }
    }

    /// An execution failed.
    #[must_use]
    pub fn failure(
        param: Option<P>,
        previous: Option<T>,
        error: ErrorHandle,
        reaction: ErrorReaction,
        trace: Option<Trace>,
    ) -> Self {
        Self {
            param,
            data: previous,
            error: Some(error),
            reaction: Some(reaction),
            trace,
            ..Self::blank()
        }
    }

    /// An undo restored `data`. `reason` is the failure that triggered it.
    #[must_use]
    pub fn undone(data: T, reason: Option<ErrorHandle>) -> Self {
        Self {
            data: Some(data),
            error: reason,
            is_undo_value: true,
            ..Self::blank()
        }
    }

    /// Whether the record carries a real failure.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some() && !self.is_undo_value
    }

    /// Whether the record is a finished, error-free execution.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.is_running && !self.has_error()
    }
}

/// Backtraces are not compared.
impl<P: PartialEq, T: PartialEq> PartialEq for CommandResult<P, T> {
    fn eq(&self, other: &Self) -> bool {
        self.param == other.param
            && self.data == other.data
            && self.error == other.error
            && self.is_running == other.is_running
            && self.is_undo_value == other.is_undo_value
            && self.reaction == other.reaction
    }
}

/// A failure delivered to a command's local
/// [`errors`](crate::Command::errors) cell.
#[derive(Clone, Debug)]
pub struct CommandError<P> {
    /// Name of the command, if it has one.
    pub command: Option<String>,
    /// Parameter of the failed run (`None` for undo failures).
    pub param: Option<P>,
    /// The failure.
    pub error: ErrorHandle,
    /// How it was classified.
    pub reaction: ErrorReaction,
    /// Backtrace captured at classification time.
    pub trace: Option<Trace>,
}

/// Backtraces are not compared.
impl<P: PartialEq> PartialEq for CommandError<P> {
    fn eq(&self, other: &Self) -> bool {
        self.command == other.command
            && self.param == other.param
            && self.error == other.error
            && self.reaction == other.reaction
    }
}
