//! Error classification.
//!
//! An [`ErrorFilter`] maps a failure to an [`ErrorReaction`]. Each command may
//! carry its own filter; whenever it has no opinion (returns
//! [`ErrorReaction::Defer`]) the hub's default filter decides. The default
//! filter must always decide.
//!
//! Filters compose from rules with [`FilterChain`]:
//!
//! ```
//! use sortie::{ErrorReaction, FilterChain};
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("offline")]
//! struct Offline;
//!
//! let filter = FilterChain::new()
//!     .on_type::<Offline>(ErrorReaction::LocalOnly)
//!     .otherwise(ErrorReaction::GlobalOnly);
//! # let _ = filter;
//! ```

use std::backtrace::Backtrace;
use std::fmt;

use crate::error::ErrorHandle;

/// What to do with a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorReaction {
    /// Drop the error. Nobody is notified.
    Swallow,
    /// Hand the error back to the caller: a pending `run_and_await` receives
    /// it, otherwise the engine panics.
    Rethrow,
    /// Global handler and broadcast stream only.
    GlobalOnly,
    /// The command's own `errors` and `results` cells only. A local listener
    /// must exist.
    LocalOnly,
    /// Local cells and the global handler. Both must exist.
    LocalAndGlobal,
    /// Local cells if anyone listens there, otherwise global.
    LocalThenGlobalFallback,
    /// Rethrow if there is neither a local listener nor a global handler,
    /// otherwise local if possible, else global.
    ThrowIfUnhandled,
    /// Rethrow unless a local listener exists, otherwise local.
    ThrowIfNoLocal,
    /// No opinion: ask the hub's default filter.
    Defer,
}

impl ErrorReaction {
    /// Every reaction, `Defer` included.
    pub const ALL: [ErrorReaction; 9] = [
        Self::Swallow,
        Self::Rethrow,
        Self::GlobalOnly,
        Self::LocalOnly,
        Self::LocalAndGlobal,
        Self::LocalThenGlobalFallback,
        Self::ThrowIfUnhandled,
        Self::ThrowIfNoLocal,
        Self::Defer,
    ];
}

/// Classifies a failure.
pub trait ErrorFilter {
    /// Decide how `error` is routed.
    fn filter(&self, error: &ErrorHandle, trace: Option<&Backtrace>) -> ErrorReaction;
}

impl<F> ErrorFilter for F
where
    F: Fn(&ErrorHandle, Option<&Backtrace>) -> ErrorReaction,
{
    fn filter(&self, error: &ErrorHandle, trace: Option<&Backtrace>) -> ErrorReaction {
        self(error, trace)
    }
}

/// A reaction is a filter that always answers with itself.
impl ErrorFilter for ErrorReaction {
    fn filter(&self, _error: &ErrorHandle, _trace: Option<&Backtrace>) -> ErrorReaction {
        *self
    }
}

type Rule = Box<dyn Fn(&ErrorHandle, Option<&Backtrace>) -> Option<ErrorReaction>>;

/// Ordered rules; the first rule with an opinion wins.
///
/// With no matching rule the chain answers [`ErrorReaction::Defer`].
#[derive(Default)]
pub struct FilterChain {
    rules: Vec<Rule>,
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl FilterChain {
    /// Empty chain (defers everything).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an arbitrary rule.
    #[must_use]
    pub fn rule(
        mut self,
        rule: impl Fn(&ErrorHandle, Option<&Backtrace>) -> Option<ErrorReaction> + 'static,
    ) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Errors of type `E` get `reaction`.
    #[must_use]
    pub fn on_type<E: std::error::Error + 'static>(self, reaction: ErrorReaction) -> Self {
        self.rule(move |error, _| error.is::<E>().then_some(reaction))
    }

    /// Errors of type `E` for which `predicate` holds get `reaction`.
    #[must_use]
    pub fn matching<E: std::error::Error + 'static>(
        self,
        predicate: impl Fn(&E) -> bool + 'static,
        reaction: ErrorReaction,
    ) -> Self {
        self.rule(move |error, _| {
            error
                .downcast_ref::<E>()
                .filter(|e| predicate(e))
                .map(|_| reaction)
        })
    }

    /// Catch-all answering `reaction`. Rules added after it never run.
    #[must_use]
    pub fn otherwise(self, reaction: ErrorReaction) -> Self {
        self.rule(move |_, _| Some(reaction))
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the chain has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl ErrorFilter for FilterChain {
    fn filter(&self, error: &ErrorHandle, trace: Option<&Backtrace>) -> ErrorReaction {
        self.rules
            .iter()
            .find_map(|rule| rule(error, trace))
            .unwrap_or(ErrorReaction::Defer)
    }
}

/// Resolve the reaction for `error`: the local filter first, the default
/// filter when the local one defers or is absent.
///
/// # Panics
///
/// Panics if the default filter answers [`ErrorReaction::Defer`].
pub fn classify(
    local: Option<&dyn ErrorFilter>,
    default: &dyn ErrorFilter,
    error: &ErrorHandle,
    trace: Option<&Backtrace>,
) -> ErrorReaction {
    let reaction = local.map_or(ErrorReaction::Defer, |f| f.filter(error, trace));
    if reaction != ErrorReaction::Defer {
        return reaction;
    }
    let fallback = default.filter(error, trace);
    if fallback == ErrorReaction::Defer {
        tracing::error!(%error, "default error filter returned Defer");
        panic!("the default error filter must not return ErrorReaction::Defer");
    }
    fallback
}
