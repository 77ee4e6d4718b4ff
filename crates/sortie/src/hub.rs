//! The explicit, process-wide context shared by commands.
//!
//! A [`CommandHub`] bundles everything that would otherwise be global state:
//! the [`HubConfig`] switches, the global error handler, the default error
//! filter, the broadcast stream of globally routed errors, and the local
//! executor asynchronous commands are spawned on.
//!
//! Commands keep a clone of the hub they were built with. Tests build a fresh
//! hub per case, which keeps them isolated.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::task::{LocalSpawn, LocalSpawnExt, SpawnError};

use crate::config::HubConfig;
use crate::error::{ErrorHandle, Trace};
use crate::filter::{ErrorFilter, ErrorReaction};

/// An error delivered to the global handler and the broadcast stream.
#[derive(Clone, Debug)]
pub struct GlobalError {
    /// Name of the failing command, if it has one.
    pub command: Option<String>,
    /// The failure.
    pub error: ErrorHandle,
    /// The reaction it was classified with.
    pub reaction: ErrorReaction,
    /// The run parameter, type-erased. Use [`param_as`](Self::param_as).
    pub param: Option<Rc<dyn Any>>,
    /// Backtrace captured at classification time.
    pub trace: Option<Trace>,
}

impl GlobalError {
    /// The run parameter as `P`, if it has that type.
    #[must_use]
    pub fn param_as<P: 'static>(&self) -> Option<&P> {
        self.param.as_deref().and_then(|p| p.downcast_ref::<P>())
    }
}

type GlobalHandler = Rc<dyn Fn(&GlobalError)>;

struct HubInner {
    config: RefCell<HubConfig>,
    handler: RefCell<Option<GlobalHandler>>,
    default_filter: RefCell<Rc<dyn ErrorFilter>>,
    listeners: RefCell<Vec<UnboundedSender<GlobalError>>>,
    spawner: Option<Rc<dyn LocalSpawn>>,
}

/// Shared configuration and global error sink for commands.
///
/// Cloning a hub creates another handle to the same state.
#[derive(Clone)]
pub struct CommandHub {
    inner: Rc<HubInner>,
}

impl fmt::Debug for CommandHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandHub")
            .field("config", &*self.inner.config.borrow())
            .field("has_global_handler", &self.has_global_handler())
            .field("has_spawner", &self.inner.spawner.is_some())
            .finish()
    }
}

impl Default for CommandHub {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandHub {
    /// A hub without an executor. Only synchronous commands can be built on
    /// it.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A hub that spawns asynchronous work on `spawner`, typically a
    /// `futures::executor::LocalSpawner`.
    #[must_use]
    pub fn with_spawner(spawner: impl LocalSpawn + 'static) -> Self {
        let spawner: Rc<dyn LocalSpawn> = Rc::new(spawner);
        Self::build(Some(spawner))
    }

    fn build(spawner: Option<Rc<dyn LocalSpawn>>) -> Self {
        let default_filter: Rc<dyn ErrorFilter> = Rc::new(ErrorReaction::LocalThenGlobalFallback);
        Self {
            inner: Rc::new(HubInner {
                config: RefCell::new(HubConfig::default()),
                handler: RefCell::new(None),
                default_filter: RefCell::new(default_filter),
                listeners: RefCell::new(Vec::new()),
                spawner,
            }),
        }
    }

    /// Replace the configuration (builder style).
    #[must_use]
    pub fn with_config(self, config: HubConfig) -> Self {
        self.set_config(config);
        self
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> HubConfig {
        *self.inner.config.borrow()
    }

    /// Replace the configuration.
    pub fn set_config(&self, config: HubConfig) {
        *self.inner.config.borrow_mut() = config;
    }

    /// Install the global error handler, replacing any previous one.
    pub fn set_global_handler(&self, handler: impl Fn(&GlobalError) + 'static) {
        let handler: GlobalHandler = Rc::new(handler);
        *self.inner.handler.borrow_mut() = Some(handler);
    }

    /// Remove the global error handler.
    pub fn clear_global_handler(&self) {
        *self.inner.handler.borrow_mut() = None;
    }

    /// Whether a global error handler is installed.
    #[must_use]
    pub fn has_global_handler(&self) -> bool {
        self.inner.handler.borrow().is_some()
    }

    /// Replace the default error filter.
    ///
    /// The default filter must never answer
    /// [`ErrorReaction::Defer`]; doing so panics at classification time.
    pub fn set_default_filter(&self, filter: impl ErrorFilter + 'static) {
        let filter: Rc<dyn ErrorFilter> = Rc::new(filter);
        *self.inner.default_filter.borrow_mut() = filter;
    }

    pub(crate) fn default_filter(&self) -> Rc<dyn ErrorFilter> {
        Rc::clone(&self.inner.default_filter.borrow())
    }

    /// A stream of every error routed globally from now on.
    ///
    /// Dropping the receiver unsubscribes.
    #[must_use]
    pub fn global_errors(&self) -> UnboundedReceiver<GlobalError> {
        let (tx, rx) = mpsc::unbounded();
        self.inner.listeners.borrow_mut().push(tx);
        rx
    }

    /// Whether asynchronous commands can run on this hub.
    #[must_use]
    pub fn can_spawn(&self) -> bool {
        self.inner.spawner.is_some()
    }

    /// Deliver `error` to the global handler and every stream listener.
    pub(crate) fn report(&self, error: GlobalError) {
        let handler = self.inner.handler.borrow().clone();
        match handler {
            Some(handler) => handler(&error),
            None => tracing::warn!(
                command = error.command.as_deref().unwrap_or("<unnamed>"),
                reaction = ?error.reaction,
                error = %error.error,
                "global error without a global handler"
            ),
        }
        self.inner
            .listeners
            .borrow_mut()
            .retain(|tx| tx.unbounded_send(error.clone()).is_ok());
    }

    pub(crate) fn spawn(&self, task: impl Future<Output = ()> + 'static) -> Result<(), SpawnError> {
        match &self.inner.spawner {
            Some(spawner) => spawner.spawn_local(task),
            None => Err(SpawnError::shutdown()),
        }
    }
}
