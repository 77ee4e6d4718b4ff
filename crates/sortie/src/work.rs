//! The unit of work a command wraps.
//!
//! The engine never knows whether work is synchronous or asynchronous: it
//! calls [`WorkUnit::invoke`] and receives either a finished result
//! ([`Outcome::Ready`]) or a future to await ([`Outcome::Pending`]).
//! [`SyncWork`] and [`AsyncWork`] adapt plain closures.

use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use crate::error::ErrorHandle;
use crate::progress::Progress;

/// Boxed future produced by asynchronous work.
pub type WorkFuture<T> = LocalBoxFuture<'static, Result<T, ErrorHandle>>;

/// What invoking a [`WorkUnit`] produced.
pub enum Outcome<T> {
    /// The work already finished.
    Ready(Result<T, ErrorHandle>),
    /// The work finishes when the future resolves.
    Pending(WorkFuture<T>),
}

impl<T> Outcome<T> {
    /// Resolve to the work's result, awaiting if necessary.
    pub async fn settle(self) -> Result<T, ErrorHandle> {
        match self {
            Self::Ready(result) => result,
            Self::Pending(future) => future.await,
        }
    }
}

/// Something a command can execute.
pub trait WorkUnit<P, T> {
    /// Start the work for `param`. `progress` is the command's handle for this
    /// run.
    fn invoke(&self, param: P, progress: &Progress) -> Outcome<T>;

    /// Whether `invoke` returns [`Outcome::Pending`]. Asynchronous work is
    /// spawned on the hub's executor; synchronous work runs inline.
    fn is_async(&self) -> bool;
}

/// Adapts `Fn(P, &Progress) -> Result<T, E>`.
pub struct SyncWork<F>(pub F);

impl<P, T, E, F> WorkUnit<P, T> for SyncWork<F>
where
    F: Fn(P, &Progress) -> Result<T, E>,
    E: StdError + 'static,
{
    fn invoke(&self, param: P, progress: &Progress) -> Outcome<T> {
        Outcome::Ready((self.0)(param, progress).map_err(ErrorHandle::new))
    }

    fn is_async(&self) -> bool {
        false
    }
}

/// Adapts `Fn(P, Progress) -> impl Future<Output = Result<T, E>>`.
pub struct AsyncWork<F>(pub F);

impl<P, T, E, F, Fut> WorkUnit<P, T> for AsyncWork<F>
where
    F: Fn(P, Progress) -> Fut,
    Fut: Future<Output = Result<T, E>> + 'static,
    E: StdError + 'static,
    T: 'static,
{
    fn invoke(&self, param: P, progress: &Progress) -> Outcome<T> {
        let future = (self.0)(param, progress.clone());
        Outcome::Pending(future.map(|r| r.map_err(ErrorHandle::new)).boxed_local())
    }

    fn is_async(&self) -> bool {
        true
    }
}

/// Completes on its second poll, handing control back to the executor once.
pub(crate) fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

pub(crate) struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
