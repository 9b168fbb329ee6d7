//! Single-assignment result cell for one RPC call.
//!
//! # How a call is resolved
//!
//! ```text
//! Connection::call()
//!        ↓ RpcFuture::pending()
//! (RpcFuture, Resolver)        ← future goes back to the caller right away
//!        ↓ Resolver moved into the dispatch task
//! middleware chain → transport
//!        ↓
//! resolver.resolve(outcome)    ← consumes the resolver: resolves exactly once
//!        ↓
//! continuations run, blocked threads and async waiters are released
//! ```
//!
//! Because `resolve` takes the [`Resolver`] by value there is no way to
//! resolve a future twice. A resolver dropped without resolving (a panicking
//! middleware, a runtime shut down mid-call) resolves the future with a
//! transport error so nobody waits forever.

use std::any::type_name;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::{Pin, pin};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;
use tracing::warn;

use crate::error::{DecodeError, Error};
use crate::message::{Message, downcast};

/// What a call produces: the decoded response or the reason it failed.
pub type Outcome = Result<Arc<dyn Message>, Error>;

/// A heap-allocated, type-erased future, `Send` so tokio can move it between
/// worker threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type Continuation = Box<dyn FnOnce(&Outcome) + Send + 'static>;

enum State {
    Pending(Vec<Continuation>),
    Resolved(Outcome),
}

struct Cell {
    state: Mutex<State>,
    // Blocking waiters park on the condvar, async waiters on the notify.
    ready: Condvar,
    notify: Notify,
}

impl Cell {
    fn complete(&self, outcome: Outcome) {
        let continuations = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, State::Resolved(outcome.clone())) {
                State::Pending(continuations) => continuations,
                State::Resolved(previous) => {
                    // Unreachable through `Resolver`; keep the first outcome.
                    *state = State::Resolved(previous);
                    return;
                }
            }
        };

        self.ready.notify_all();
        self.notify.notify_waiters();

        for continuation in continuations {
            continuation(&outcome);
        }
    }

    fn peek(&self) -> Option<Outcome> {
        match &*self.state.lock() {
            State::Pending(_) => None,
            State::Resolved(outcome) => Some(outcome.clone()),
        }
    }
}

/// The eventual outcome of exactly one RPC call.
///
/// Clones share the same cell, so any number of threads or tasks may wait on
/// one call. Cancellation is not supported: once dispatched, a call runs to
/// completion whether or not anyone is still waiting.
#[derive(Clone)]
pub struct RpcFuture {
    cell: Arc<Cell>,
}

impl RpcFuture {
    /// Creates an unresolved future together with the handle that resolves it.
    pub fn pending() -> (Self, Resolver) {
        let cell = Arc::new(Cell {
            state: Mutex::new(State::Pending(Vec::new())),
            ready: Condvar::new(),
            notify: Notify::new(),
        });
        (Self { cell: Arc::clone(&cell) }, Resolver { cell: Some(cell) })
    }

    /// Wraps an outcome that is already known.
    pub fn resolved(outcome: Outcome) -> Self {
        let (future, resolver) = Self::pending();
        resolver.resolve(outcome);
        future
    }

    /// Blocks the current thread until the call completes, then returns the
    /// response or the failure.
    ///
    /// Do not call this from inside an async task; use [`wait`](Self::wait)
    /// or `.await` there instead.
    pub fn value(&self) -> Outcome {
        let mut state = self.cell.state.lock();
        loop {
            if let State::Resolved(outcome) = &*state {
                return outcome.clone();
            }
            self.cell.ready.wait(&mut state);
        }
    }

    /// Like [`value`](Self::value), then downcasts the response to `T`.
    ///
    /// A response of another type is reported as a [`DecodeError`].
    pub fn value_as<T: Message>(&self) -> Result<Arc<T>, Error> {
        let message = self.value()?;
        downcast::<T>(message).ok_or_else(|| {
            DecodeError::new(format!("response is not a `{}`", type_name::<T>())).into()
        })
    }

    /// Waits asynchronously for the call to complete.
    pub async fn wait(&self) -> Outcome {
        loop {
            let mut notified = pin!(self.cell.notify.notified());
            // Register interest before checking, so a resolve in between is
            // not missed.
            notified.as_mut().enable();
            if let Some(outcome) = self.cell.peek() {
                return outcome;
            }
            notified.await;
        }
    }

    /// `true` once the call has completed, successfully or not.
    pub fn is_resolved(&self) -> bool {
        matches!(&*self.cell.state.lock(), State::Resolved(_))
    }

    /// `true` iff the call has completed with a failure. Always `false` while
    /// the call is still in flight.
    pub fn is_rejected(&self) -> bool {
        matches!(&*self.cell.state.lock(), State::Resolved(Err(_)))
    }

    /// Runs `f` with the outcome once the call completes.
    ///
    /// If the future is already resolved, `f` runs immediately on the calling
    /// thread; otherwise it runs on whichever thread resolves the future.
    pub fn on_complete<F>(&self, f: F)
    where
        F: FnOnce(&Outcome) + Send + 'static,
    {
        let outcome = {
            let mut state = self.cell.state.lock();
            match &mut *state {
                State::Pending(continuations) => {
                    continuations.push(Box::new(f));
                    return;
                }
                State::Resolved(outcome) => outcome.clone(),
            }
        };
        f(&outcome);
    }
}

impl IntoFuture for RpcFuture {
    type Output = Outcome;
    type IntoFuture = BoxFuture<'static, Outcome>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}

impl fmt::Debug for RpcFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.cell.state.lock() {
            State::Pending(_) => "pending",
            State::Resolved(Ok(_)) => "fulfilled",
            State::Resolved(Err(_)) => "rejected",
        };
        f.debug_struct("RpcFuture").field("state", &state).finish()
    }
}

/// The write side of an [`RpcFuture`]. Resolving consumes it.
pub struct Resolver {
    cell: Option<Arc<Cell>>,
}

impl Resolver {
    pub fn resolve(mut self, outcome: Outcome) {
        if let Some(cell) = self.cell.take() {
            cell.complete(outcome);
        }
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        if let Some(cell) = self.cell.take() {
            warn!("rpc dispatch ended without an outcome");
            cell.complete(Err(Error::transport("dispatch abandoned before completion")));
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}
