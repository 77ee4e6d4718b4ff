//! The execution engine.
//!
//! A [`Command`] wraps one [`WorkUnit`] and runs it under a single-flight
//! protocol:
//!
//! ```text
//!   Idle ──run()──▶ Running ──ok──▶ Succeeded ──▶ Idle
//!                      │
//!                      └──err──▶ Failed ──▶ Idle
//!                                  │
//!                                  └──undo on failure──▶ Undoing ──▶ Idle
//! ```
//!
//! Every transition is published synchronously through observable cells:
//! [`value`](Command::value), [`results`](Command::results),
//! [`errors`](Command::errors), [`is_running_sync`](Command::is_running_sync)
//! and the derived [`can_run`](Command::can_run).
//!
//! # Invariants
//!
//! 1. At most one execution (run or undo) is in flight. `run` while running
//!    is dropped, not queued.
//! 2. Results are published as `[running, terminal]` per execution.
//! 3. `is_running` turns `false` strictly before the terminal value, result or
//!    error notification, and `can_run` is already recomputed by then.
//! 4. `can_run == !restriction && !is_running` at every observable instant.
//! 5. Asynchronous work is invoked only after one executor yield, so the
//!    running pulse is always observed first.
//!
//! # Failure Modes
//!
//! - **Misrouted error**: a reaction demanding a local listener with none
//!   attached (or a global handler with none installed) panics with a
//!   descriptive message.
//! - **Work panics**: propagate unchanged unless
//!   [`HubConfig::panics_propagate`] is off, in which case they are routed as
//!   [`SortieError::Panicked`]. Before a propagated panic resumes, the
//!   command returns to idle and a pending awaiter sees
//!   [`AwaitError::Failed`].
//! - **Executor gone**: if the hub's executor refuses a task, the execution is
//!   abandoned, `is_running` is reset and a pending awaiter sees
//!   [`AwaitError::Disposed`].

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::rc::Rc;

use futures::FutureExt;
use futures::channel::oneshot;
use sortie_reactive::{Computed, NotifyMode, Observable, Subscription};
use tracing::Instrument;

use crate::config::HubConfig;
use crate::error::{AwaitError, ErrorHandle, SortieError, Trace, panic_message};
use crate::filter::{ErrorFilter, ErrorReaction, classify};
use crate::hub::{CommandHub, GlobalError};
use crate::progress::Progress;
use crate::result::{CommandError, CommandResult};
use crate::routing::{Presence, route};
use crate::undo::UndoHook;
use crate::work::{AsyncWork, Outcome, SyncWork, WorkUnit, yield_now};

/// One execution: a run with its parameter, or an undo with its reason.
enum Pass<P> {
    Run(P),
    Undo(Option<ErrorHandle>),
}

pub(crate) struct CommandInner<P, T> {
    name: Option<String>,
    hub: CommandHub,
    work: Box<dyn WorkUnit<P, T>>,
    undo: Option<Box<dyn UndoHook<T>>>,
    value: Observable<T>,
    results: Observable<CommandResult<P, T>>,
    errors: Observable<Option<CommandError<P>>>,
    running: Observable<bool>,
    /// Executor-delivered copy of `running`. `None` for synchronous commands.
    running_async: Option<Observable<bool>>,
    can_run: Computed<bool>,
    restriction: Option<Observable<bool>>,
    run_instead: Option<Box<dyn Fn(P)>>,
    filter: Option<Box<dyn ErrorFilter>>,
    include_last_value: bool,
    progress: Progress,
    completion: RefCell<Option<oneshot::Sender<Result<T, AwaitError>>>>,
    disposed: Cell<bool>,
    mirror: RefCell<Option<Subscription>>,
}

/// A single-flight, observable wrapper around a unit of work.
///
/// `P` is the run parameter (`()` for parameterless commands), `T` the
/// result. Cloning a `Command` creates another handle to the same engine.
pub struct Command<P, T> {
    pub(crate) inner: Rc<CommandInner<P, T>>,
}

impl<P, T> Clone for Command<P, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P, T> fmt::Debug for Command<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.inner.name)
            .field("asynchronous", &self.inner.running_async.is_some())
            .field("disposed", &self.inner.disposed.get())
            .finish_non_exhaustive()
    }
}

impl<P: Clone + 'static, T: Clone + 'static> Command<P, T> {
    // ── Constructors ─────────────────────────────────────────────────

    /// Wrap synchronous work.
    pub fn sync<E>(
        hub: &CommandHub,
        initial: T,
        work: impl Fn(P) -> Result<T, E> + 'static,
    ) -> CommandBuilder<P, T>
    where
        E: StdError + 'static,
    {
        CommandBuilder::new(
            hub,
            initial,
            SyncWork(move |param: P, _: &Progress| work(param)),
        )
    }

    /// Wrap synchronous work that reports progress.
    pub fn sync_with_progress<E>(
        hub: &CommandHub,
        initial: T,
        work: impl Fn(P, &Progress) -> Result<T, E> + 'static,
    ) -> CommandBuilder<P, T>
    where
        E: StdError + 'static,
    {
        CommandBuilder::new(hub, initial, SyncWork(work))
    }

    /// Wrap asynchronous work. The hub must have a spawner.
    pub fn future<E, Fut>(
        hub: &CommandHub,
        initial: T,
        work: impl Fn(P) -> Fut + 'static,
    ) -> CommandBuilder<P, T>
    where
        Fut: Future<Output = Result<T, E>> + 'static,
        E: StdError + 'static,
    {
        CommandBuilder::new(
            hub,
            initial,
            AsyncWork(move |param: P, _: Progress| work(param)),
        )
    }

    /// Wrap asynchronous work that reports progress and honors cancellation.
    pub fn future_with_progress<E, Fut>(
        hub: &CommandHub,
        initial: T,
        work: impl Fn(P, Progress) -> Fut + 'static,
    ) -> CommandBuilder<P, T>
    where
        Fut: Future<Output = Result<T, E>> + 'static,
        E: StdError + 'static,
    {
        CommandBuilder::new(hub, initial, AsyncWork(work))
    }

    // ── Execution ────────────────────────────────────────────────────

    /// Start an execution with `param`.
    ///
    /// A no-op if the command is disposed or already running. If the
    /// restriction is active, the `run_instead` callback receives `param`
    /// instead. Synchronous work completes before `run` returns; asynchronous
    /// work is spawned on the hub's executor.
    pub fn run(&self, param: P) {
        self.inner.run(param);
    }

    /// Run and wait for the outcome.
    ///
    /// # Errors
    ///
    /// [`AwaitError::Rejected`] if the run could not start,
    /// [`AwaitError::Failed`] if the work failed (whatever the routing),
    /// [`AwaitError::Disposed`] if the command was disposed first.
    pub async fn run_and_await(&self, param: P) -> Result<T, AwaitError> {
        let inner = &self.inner;
        if inner.disposed.get() {
            return Err(AwaitError::Disposed);
        }
        if !inner.can_run.get() {
            inner.run(param);
            return Err(AwaitError::Rejected);
        }
        let (tx, rx) = oneshot::channel();
        *inner.completion.borrow_mut() = Some(tx);
        inner.run(param);
        if !inner.running.get() && inner.completion.borrow_mut().take().is_some() {
            return Err(AwaitError::Rejected);
        }
        match rx.await {
            Ok(result) => result,
            Err(oneshot::Canceled) => Err(AwaitError::Rejected),
        }
    }

    /// Clear the local error with notification.
    pub fn clear_error(&self) {
        self.inner.errors.set(None);
    }

    /// Request cooperative cancellation of the current execution.
    pub fn cancel(&self) {
        self.inner.progress.cancel();
    }

    /// Reset progress, status and cancellation. `None` progress means zero.
    ///
    /// # Panics
    ///
    /// Panics if `progress` lies outside `[0.0, 1.0]`.
    pub fn reset_progress(&self, progress: Option<f64>, status: Option<String>) {
        self.inner.progress.reset(progress.unwrap_or(0.0), status);
    }

    /// Stop accepting runs, resolve a pending awaiter with
    /// [`AwaitError::Disposed`] and release all cells after one executor
    /// yield (immediately on a hub without an executor).
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub(crate) fn start_undo(&self, reason: Option<ErrorHandle>) {
        self.inner.undo(reason);
    }

    // ── Observation ──────────────────────────────────────────────────

    /// The command's name, used in logs and error records.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Last successful result (or the initial value).
    #[must_use]
    pub fn value(&self) -> &Observable<T> {
        &self.inner.value
    }

    /// Record of every state transition.
    #[must_use]
    pub fn results(&self) -> &Observable<CommandResult<P, T>> {
        &self.inner.results
    }

    /// Locally delivered errors. Cleared silently at the start of each run.
    #[must_use]
    pub fn errors(&self) -> &Observable<Option<CommandError<P>>> {
        &self.inner.errors
    }

    /// Running state, delivered through the executor for view layers.
    ///
    /// # Panics
    ///
    /// Panics for synchronous commands, whose running period can never be
    /// observed. Use [`is_running_now`](Self::is_running_now) or
    /// [`can_run`](Self::can_run) instead.
    #[must_use]
    pub fn is_running(&self) -> &Observable<bool> {
        match &self.inner.running_async {
            Some(cell) => cell,
            None => panic!(
                "command `{}` is synchronous: its running state is never observable, \
                 use is_running_now() or can_run()",
                self.inner.label()
            ),
        }
    }

    /// Running state, delivered synchronously. Meant for chaining logic such
    /// as restricting one command on another.
    #[must_use]
    pub fn is_running_sync(&self) -> &Observable<bool> {
        &self.inner.running
    }

    /// Whether an execution is in flight right now.
    #[must_use]
    pub fn is_running_now(&self) -> bool {
        self.inner.running.get()
    }

    /// `!restriction && !is_running`.
    #[must_use]
    pub fn can_run(&self) -> &Computed<bool> {
        &self.inner.can_run
    }

    /// Progress of the current execution.
    #[must_use]
    pub fn progress(&self) -> &Observable<f64> {
        self.inner.progress.progress_cell()
    }

    /// Status line of the current execution.
    #[must_use]
    pub fn status_message(&self) -> &Observable<Option<String>> {
        self.inner.progress.status_cell()
    }

    /// Whether cancellation was requested for the current execution.
    #[must_use]
    pub fn is_canceled(&self) -> &Observable<bool> {
        self.inner.progress.canceled_cell()
    }

    /// Whether the work is asynchronous.
    #[must_use]
    pub fn is_async(&self) -> bool {
        self.inner.running_async.is_some()
    }

    /// Whether [`dispose`](Self::dispose) was called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl<P: Clone + 'static, T: Clone + 'static> CommandInner<P, T> {
    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    fn is_restricted(&self) -> bool {
        self.restriction.as_ref().is_some_and(Observable::get)
    }

    fn has_local_listeners(&self) -> bool {
        self.errors.has_subscribers() || self.results.has_subscribers()
    }

    fn run(self: &Rc<Self>, param: P) {
        if self.disposed.get() {
            tracing::trace!(command = self.label(), "run ignored: disposed");
            return;
        }
        if self.is_restricted() {
            tracing::trace!(command = self.label(), "run restricted");
            if let Some(run_instead) = &self.run_instead {
                run_instead(param);
            }
            return;
        }
        if self.running.get() {
            tracing::trace!(command = self.label(), "run dropped: already running");
            return;
        }

        self.progress.reset(0.0, None);
        if let Some(undo) = &self.undo {
            undo.begin_run();
        }
        self.begin(Some(param.clone()));
        self.errors.set_silently(None);
        self.execute(Pass::Run(param));
    }

    fn undo(self: &Rc<Self>, reason: Option<ErrorHandle>) {
        if self.undo.is_none() {
            return;
        }
        if self.disposed.get() || self.running.get() {
            tracing::trace!(command = self.label(), "undo rejected: busy or disposed");
            return;
        }
        self.begin(None);
        if reason.is_none() {
            self.errors.set_silently(None);
        }
        self.execute(Pass::Undo(reason));
    }

    /// Publish the running pulse.
    fn begin(&self, param: Option<P>) {
        tracing::debug!(command = self.label(), "execution started");
        self.running.set(true);
        let previous = self.include_last_value.then(|| self.value.get());
        self.results.set(CommandResult::running(param, previous));
    }

    fn execute(self: &Rc<Self>, pass: Pass<P>) {
        let asynchronous = match &pass {
            Pass::Run(_) => self.work.is_async(),
            Pass::Undo(_) => self.undo.as_ref().is_some_and(|u| u.is_async()),
        };
        let this = Rc::clone(self);
        if asynchronous {
            self.spawn(async move {
                yield_now().await;
                let result = this.invoke(&pass).settle().await;
                this.complete(pass, result);
            });
            return;
        }
        match self.invoke(&pass) {
            Outcome::Ready(result) => self.complete(pass, result),
            Outcome::Pending(future) => self.spawn(async move {
                let result = future.await;
                this.complete(pass, result);
            }),
        }
    }

    fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        let span = tracing::debug_span!("command", name = self.label());
        if let Err(err) = self.hub.spawn(task.instrument(span)) {
            tracing::error!(command = self.label(), %err, "executor refused task");
            self.running.set(false);
            self.resolve(Err(AwaitError::Disposed));
        }
    }

    /// Invoke the work. Panics are always caught so the command can return
    /// to idle; see [`CommandInner::recover`].
    fn invoke(self: &Rc<Self>, pass: &Pass<P>) -> Outcome<T> {
        let call = || match pass {
            Pass::Run(param) => self.work.invoke(param.clone(), &self.progress),
            Pass::Undo(reason) => match &self.undo {
                Some(undo) => undo.invoke(reason.clone()),
                None => unreachable!("undo pass without an undo hook"),
            },
        };
        match catch_unwind(AssertUnwindSafe(call)) {
            Ok(Outcome::Pending(future)) => {
                let this = Rc::clone(self);
                Outcome::Pending(
                    AssertUnwindSafe(future)
                        .catch_unwind()
                        .map(move |caught| caught.unwrap_or_else(|payload| this.recover(payload)))
                        .boxed_local(),
                )
            }
            Ok(ready) => ready,
            Err(payload) => Outcome::Ready(self.recover(payload)),
        }
    }

    /// Turn a caught panic into a routed error, or, when panics propagate,
    /// return the command to idle and fail a pending awaiter before resuming
    /// the unwind.
    fn recover(&self, payload: Box<dyn Any + Send>) -> Result<T, ErrorHandle> {
        let error = panicked(&*payload);
        if !self.hub.config().panics_propagate {
            return Err(error);
        }
        tracing::debug!(command = self.label(), %error, "work panicked; resuming unwind");
        if !self.disposed.get() {
            self.running.set(false);
        }
        self.resolve(Err(AwaitError::Failed(error)));
        resume_unwind(payload)
    }

    fn complete(self: &Rc<Self>, pass: Pass<P>, result: Result<T, ErrorHandle>) {
        if self.disposed.get() {
            tracing::debug!(command = self.label(), "result discarded: disposed");
            return;
        }
        match (pass, result) {
            (Pass::Run(param), Ok(value)) => {
                self.running.set(false);
                self.value.set(value.clone());
                self.results
                    .set(CommandResult::success(Some(param), value.clone()));
                tracing::debug!(command = self.label(), "execution succeeded");
                self.resolve(Ok(value));
            }
            (Pass::Undo(reason), Ok(value)) => {
                self.discard_undo_stack();
                self.running.set(false);
                self.value.set(value.clone());
                self.results.set(CommandResult::undone(value, reason));
                tracing::debug!(command = self.label(), "undo succeeded");
            }
            (Pass::Run(param), Err(error)) => self.fail(Some(param), error, false),
            (Pass::Undo(reason), Err(source)) => {
                self.discard_undo_stack();
                let error = ErrorHandle::new(SortieError::UndoFailed { reason, source });
                self.fail(None, error, true);
            }
        }
    }

    fn fail(self: &Rc<Self>, param: Option<P>, error: ErrorHandle, from_undo: bool) {
        let awaiter = if from_undo {
            None
        } else {
            self.completion.borrow_mut().take()
        };
        self.running.set(false);

        let config = self.hub.config();
        let trace: Option<Trace> = config
            .capture_traces
            .then(|| Rc::new(Backtrace::capture()));
        let default_filter = self.hub.default_filter();
        let reaction = classify(
            self.filter.as_deref(),
            &*default_filter,
            &error,
            trace.as_deref(),
        );
        let presence = Presence {
            local: self.has_local_listeners(),
            global: self.hub.has_global_handler(),
        };
        let delivery = match route(reaction, presence, &config) {
            Ok(delivery) => delivery,
            Err(defect) => {
                tracing::error!(command = self.label(), %error, %defect, "unroutable error");
                panic!("command `{}`: {defect} (error: {error})", self.label());
            }
        };
        tracing::debug!(
            command = self.label(),
            ?reaction,
            ?delivery,
            %error,
            "execution failed"
        );

        if delivery.local {
            self.deliver_locally(param.clone(), &error, reaction, trace.clone(), &config);
        }
        if delivery.global {
            self.hub
                .report(self.global_error(param, error.clone(), reaction, trace));
        }
        if !from_undo
            && let Some(undo) = &self.undo
            && undo.undo_on_failure()
        {
            self.undo(Some(error.clone()));
        }

        if delivery.is_silent() {
            assert!(
                awaiter.is_none(),
                "command `{}`: a swallowed error cannot complete a pending run_and_await",
                self.label()
            );
            return;
        }
        match awaiter {
            Some(tx) => {
                let _ = tx.send(Err(AwaitError::Failed(error)));
            }
            None if delivery.rethrow => {
                panic!("command `{}` failed with an unhandled error: {error}", self.label())
            }
            None => {}
        }
    }

    fn deliver_locally(
        &self,
        param: Option<P>,
        error: &ErrorHandle,
        reaction: ErrorReaction,
        trace: Option<Trace>,
        config: &HubConfig,
    ) {
        let previous = self.include_last_value.then(|| self.value.get());
        let record = CommandResult::failure(
            param.clone(),
            previous,
            error.clone(),
            reaction,
            trace.clone(),
        );
        let local = CommandError {
            command: self.name.clone(),
            param: param.clone(),
            error: error.clone(),
            reaction,
            trace: trace.clone(),
        };
        let delivered = catch_unwind(AssertUnwindSafe(|| {
            self.results.set(record);
            self.errors.set(Some(local));
        }));
        if let Err(payload) = delivered {
            let message = panic_message(&*payload);
            tracing::warn!(command = self.label(), %message, "error listener panicked");
            if !config.report_handler_failures {
                resume_unwind(payload);
            }
            let wrapped = ErrorHandle::new(SortieError::HandlerPanicked {
                message,
                original: error.clone(),
            });
            self.hub
                .report(self.global_error(param, wrapped, reaction, trace));
        }
    }

    fn global_error(
        &self,
        param: Option<P>,
        error: ErrorHandle,
        reaction: ErrorReaction,
        trace: Option<Trace>,
    ) -> GlobalError {
        GlobalError {
            command: self.name.clone(),
            error,
            reaction,
            param: param.map(|p| Rc::new(p) as Rc<dyn Any>),
            trace,
        }
    }

    fn resolve(&self, result: Result<T, AwaitError>) {
        let awaiter = self.completion.borrow_mut().take();
        if let Some(tx) = awaiter {
            let _ = tx.send(result);
        }
    }

    fn discard_undo_stack(&self) {
        if let Some(undo) = &self.undo {
            undo.discard();
        }
    }

    fn dispose(self: &Rc<Self>) {
        if self.disposed.replace(true) {
            return;
        }
        tracing::debug!(command = self.label(), "disposing");
        self.resolve(Err(AwaitError::Disposed));
        self.discard_undo_stack();

        if !self.hub.can_spawn() {
            self.teardown();
            return;
        }
        let this = Rc::clone(self);
        let grace = async move {
            yield_now().await;
            this.teardown();
        };
        if self.hub.spawn(grace).is_err() {
            self.teardown();
        }
    }

    fn teardown(&self) {
        self.mirror.borrow_mut().take();
        self.can_run.dispose();
        self.value.dispose();
        self.results.dispose();
        self.errors.dispose();
        self.running.dispose();
        if let Some(cell) = &self.running_async {
            cell.dispose();
        }
        self.progress.dispose();
    }
}

fn panicked(payload: &(dyn Any + Send)) -> ErrorHandle {
    ErrorHandle::new(SortieError::Panicked {
        message: panic_message(payload),
    })
}

/// Configures a [`Command`] before it is built.
pub struct CommandBuilder<P, T> {
    hub: CommandHub,
    work: Box<dyn WorkUnit<P, T>>,
    value: Observable<T>,
    name: Option<String>,
    restriction: Option<Observable<bool>>,
    run_instead: Option<Box<dyn Fn(P)>>,
    filter: Option<Box<dyn ErrorFilter>>,
    include_last_value: bool,
    undo: Option<Box<dyn UndoHook<T>>>,
}

impl<P: Clone + 'static, T: Clone + 'static> CommandBuilder<P, T> {
    /// Start from an arbitrary [`WorkUnit`].
    pub fn new(hub: &CommandHub, initial: T, work: impl WorkUnit<P, T> + 'static) -> Self {
        Self {
            hub: hub.clone(),
            work: Box::new(work),
            value: Observable::always(initial),
            name: None,
            restriction: None,
            run_instead: None,
            filter: None,
            include_last_value: false,
            undo: None,
        }
    }

    /// Name used in logs and error records.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Disable the command while `restriction` is `true`.
    #[must_use]
    pub fn restriction(mut self, restriction: &Observable<bool>) -> Self {
        self.restriction = Some(restriction.clone());
        self
    }

    /// Called with the parameter when `run` hits an active restriction.
    #[must_use]
    pub fn run_instead(mut self, f: impl Fn(P) + 'static) -> Self {
        self.run_instead = Some(Box::new(f));
        self
    }

    /// Local error filter, consulted before the hub's default filter.
    #[must_use]
    pub fn error_filter(mut self, filter: impl ErrorFilter + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Carry the current value in running and failure records.
    #[must_use]
    pub fn include_last_value_in_results(mut self) -> Self {
        self.include_last_value = true;
        self
    }

    pub(crate) fn undo_hook(mut self, hook: Box<dyn UndoHook<T>>) -> Self {
        self.undo = Some(hook);
        self
    }

    /// Finish building.
    ///
    /// # Panics
    ///
    /// Panics if the work (or undo) is asynchronous and the hub has no
    /// spawner.
    #[must_use]
    pub fn build(self) -> Command<P, T> {
        let asynchronous =
            self.work.is_async() || self.undo.as_ref().is_some_and(|u| u.is_async());
        assert!(
            !asynchronous || self.hub.can_spawn(),
            "asynchronous commands need a CommandHub built with a spawner"
        );

        // `can_run` subscribes to `running` first so it is fresh for every
        // later listener.
        let running = Observable::new(false);
        let can_run = match &self.restriction {
            Some(restriction) => {
                Computed::from2(restriction, &running, |restricted, busy| !restricted && !busy)
            }
            None => Computed::from_observable(&running, |busy| !busy),
        };
        let running_async = asynchronous.then(|| Observable::new(false));
        let mirror = running_async.as_ref().map(|target| {
            let target = target.clone();
            let hub = self.hub.clone();
            running.subscribe(move |busy| {
                let target = target.clone();
                let busy = *busy;
                if hub.spawn(async move { target.set(busy) }).is_err() {
                    tracing::warn!("executor refused running-state delivery");
                }
            })
        });

        Command {
            inner: Rc::new(CommandInner {
                name: self.name,
                hub: self.hub,
                work: self.work,
                undo: self.undo,
                value: self.value,
                results: Observable::always(CommandResult::blank()),
                errors: Observable::always(None),
                running,
                running_async,
                can_run,
                restriction: self.restriction,
                run_instead: self.run_instead,
                filter: self.filter,
                include_last_value: self.include_last_value,
                progress: Progress::new(),
                completion: RefCell::new(None),
                disposed: Cell::new(false),
                mirror: RefCell::new(mirror),
            }),
        }
    }
}

impl<P: Clone + 'static, T: Clone + PartialEq + 'static> CommandBuilder<P, T> {
    /// Notify value listeners only when a result differs from the previous
    /// value. By default every completion notifies.
    #[must_use]
    pub fn notify_only_when_changed(mut self) -> Self {
        self.value = Observable::with_mode(self.value.get(), NotifyMode::OnChange);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use thiserror::Error;
    use tracing_test::traced_test;

    #[derive(Debug, Error)]
    #[error("bad input {0}")]
    struct BadInput(i32);

    fn doubler(hub: &CommandHub) -> Command<i32, i32> {
        Command::sync(hub, 0, |x: i32| Ok::<_, Infallible>(x * 2))
            .name("double")
            .build()
    }

    #[test]
    fn sync_run_publishes_value() {
        let hub = CommandHub::new();
        let cmd = doubler(&hub);
        cmd.run(21);
        assert_eq!(cmd.value().get(), 42);
        assert!(!cmd.is_running_now());
        assert!(cmd.can_run().get());
        assert_eq!(cmd.name(), Some("double"));
    }

    #[test]
    #[should_panic(expected = "is synchronous")]
    fn sync_command_hides_running_cell() {
        let hub = CommandHub::new();
        let cmd = doubler(&hub);
        let _ = cmd.is_running();
    }

    #[test]
    #[should_panic(expected = "need a CommandHub built with a spawner")]
    fn async_command_requires_spawner() {
        let hub = CommandHub::new();
        let _cmd: Command<(), ()> =
            Command::future(&hub, (), |_: ()| async { Ok::<_, Infallible>(()) }).build();
    }

    #[test]
    fn failure_with_local_listener_lands_in_errors() {
        let hub = CommandHub::new();
        let cmd: Command<i32, i32> = Command::sync(&hub, 0, |x: i32| Err::<i32, _>(BadInput(x)))
            .error_filter(ErrorReaction::LocalOnly)
            .build();
        let _sub = cmd.errors().subscribe(|_| {});

        cmd.run(3);
        let err = cmd.errors().get().expect("error delivered");
        assert_eq!(err.param, Some(3));
        assert!(err.error.is::<BadInput>());
        assert!(cmd.results().get().has_error());
    }

    #[test]
    fn errors_are_cleared_silently_on_next_run() {
        let hub = CommandHub::new();
        let fail = Rc::new(Cell::new(true));
        let f = Rc::clone(&fail);
        let cmd: Command<(), ()> = Command::sync(&hub, (), move |_: ()| {
            if f.get() { Err(BadInput(0)) } else { Ok(()) }
        })
        .error_filter(ErrorReaction::LocalOnly)
        .build();
        let notifications = Rc::new(Cell::new(0u32));
        let n = Rc::clone(&notifications);
        let _sub = cmd.errors().subscribe(move |_| n.set(n.get() + 1));

        cmd.run(());
        assert_eq!(notifications.get(), 1);
        fail.set(false);
        cmd.run(());
        assert!(cmd.errors().get().is_none());
        assert_eq!(notifications.get(), 1);

        fail.set(true);
        cmd.run(());
        cmd.clear_error();
        assert_eq!(notifications.get(), 3);
    }

    #[test]
    fn include_last_value_in_running_record() {
        let hub = CommandHub::new();
        let cmd: Command<i32, i32> = Command::sync(&hub, 7, |x: i32| Ok::<_, Infallible>(x))
            .include_last_value_in_results()
            .build();
        let records = Rc::new(RefCell::new(Vec::new()));
        let r = Rc::clone(&records);
        let _sub = cmd.results().subscribe(move |res| r.borrow_mut().push(res.clone()));

        cmd.run(1);
        let records = records.borrow();
        assert_eq!(records[0].data, Some(7));
        assert!(records[0].is_running);
        assert_eq!(records[1].data, Some(1));
    }

    #[test]
    fn notify_only_when_changed_skips_equal_results() {
        let hub = CommandHub::new();
        let cmd: Command<i32, i32> = Command::sync(&hub, 0, |x: i32| Ok::<_, Infallible>(x))
            .notify_only_when_changed()
            .build();
        let hits = Rc::new(Cell::new(0u32));
        let h = Rc::clone(&hits);
        let _sub = cmd.value().subscribe(move |_| h.set(h.get() + 1));

        cmd.run(5);
        cmd.run(5);
        cmd.run(6);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn default_value_cell_notifies_every_completion() {
        let hub = CommandHub::new();
        let cmd: Command<(), ()> = Command::sync(&hub, (), |_: ()| Ok::<_, Infallible>(())).build();
        let hits = Rc::new(Cell::new(0u32));
        let h = Rc::clone(&hits);
        let _sub = cmd.value().subscribe(move |_| h.set(h.get() + 1));

        cmd.run(());
        cmd.run(());
        assert_eq!(hits.get(), 2);
    }

    #[test]
    #[traced_test]
    fn dropped_and_restricted_runs_are_traced() {
        let hub = CommandHub::new();
        let restricted = Observable::new(true);
        let cmd = Command::sync(&hub, 0, |x: i32| Ok::<_, Infallible>(x))
            .name("gated")
            .restriction(&restricted)
            .build();

        cmd.run(1);
        assert!(logs_contain("run restricted"));
        assert!(logs_contain("gated"));

        restricted.set(false);
        cmd.run(2);
        assert!(logs_contain("execution started"));
        assert!(logs_contain("execution succeeded"));
    }

    #[test]
    #[traced_test]
    fn global_error_without_handler_warns() {
        let hub = CommandHub::new();
        let cmd: Command<(), ()> = Command::sync(&hub, (), |_: ()| Err::<(), _>(BadInput(1)))
            .error_filter(ErrorReaction::GlobalOnly)
            .build();

        cmd.run(());
        assert!(logs_contain("global error without a global handler"));
        assert!(!cmd.is_running_now());
    }

    #[test]
    fn dispose_without_executor_is_immediate() {
        let hub = CommandHub::new();
        let cmd = doubler(&hub);
        cmd.dispose();
        assert!(cmd.is_disposed());
        assert!(cmd.value().is_disposed());
        cmd.run(1);
        assert_eq!(cmd.value().get(), 0);
    }
}
