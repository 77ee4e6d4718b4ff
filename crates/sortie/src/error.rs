//! Error types shared by commands, filters and the hub.
//!
//! Work functions return their own error types. The engine erases them into
//! an [`ErrorHandle`] (cheap to clone, downcastable) so that one error can be
//! stored in result records, error cells and the global stream at once.

use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

/// Backtrace captured when a failure is classified.
pub type Trace = Rc<Backtrace>;

/// A shared, type-erased error produced by a command's work.
///
/// Two handles are equal only if they point at the same underlying error.
#[derive(Clone)]
pub struct ErrorHandle(Rc<dyn StdError + 'static>);

impl ErrorHandle {
    /// Erase `error` into a handle.
    #[must_use]
    pub fn new<E: StdError + 'static>(error: E) -> Self {
        Self(Rc::new(error))
    }

    /// Borrow the error as its concrete type.
    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    /// Whether the error is of type `E`.
    #[must_use]
    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.0.is::<E>()
    }

    /// The underlying error.
    #[must_use]
    pub fn as_error(&self) -> &(dyn StdError + 'static) {
        &*self.0
    }

    /// Whether both handles share the same error.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ErrorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for ErrorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl StdError for ErrorHandle {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl PartialEq for ErrorHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// Failures raised by the engine itself.
#[derive(Debug, Error)]
pub enum SortieError {
    /// The undo function failed. `reason` is the failure that triggered the
    /// undo (`None` for a manual undo).
    #[error("undo failed: {source}")]
    UndoFailed {
        reason: Option<ErrorHandle>,
        #[source]
        source: ErrorHandle,
    },

    /// A local error listener panicked while handling `original`.
    #[error("error listener panicked: {message}")]
    HandlerPanicked {
        message: String,
        #[source]
        original: ErrorHandle,
    },

    /// The work panicked and panics are configured to be routed.
    #[error("work panicked: {message}")]
    Panicked { message: String },

    /// `pop` on an empty undo stack.
    #[error("undo stack is empty")]
    EmptyUndoStack,
}

/// Why [`Command::run_and_await`](crate::Command::run_and_await) produced no
/// value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AwaitError {
    /// The work (or its undo) failed.
    #[error("command failed: {0}")]
    Failed(#[source] ErrorHandle),

    /// The run never started: the command was restricted or already running.
    #[error("command did not start: restricted or already running")]
    Rejected,

    /// The command was disposed before the run completed.
    #[error("command was disposed before completing")]
    Disposed,
}

/// Turn a panic payload into a readable message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
