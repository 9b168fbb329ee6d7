//! Middleware layer.
//!
//! Middleware intercepts every call a [`Connection`](crate::Connection) makes
//! and is the right place for cross-cutting concerns: structured tracing,
//! caching, request rejection, retries, test doubles.
//!
//! # The chain
//!
//! Middleware compose like an onion. The first one registered is the
//! outermost: it sees the call first on the way in and the outcome last on
//! the way out. The innermost [`Next`] is the transport itself.
//!
//! ```text
//! caller
//!   ↓ CallEnvelope
//! trace ──→ auth ──→ transport.call(service, method, request)
//!   ↑ Outcome                        │
//! trace ←── auth ←───────────────────┘
//! ```
//!
//! A middleware that returns without calling [`Next::run`] short-circuits
//! the chain; the transport is never contacted.
//!
//! # Writing one
//!
//! Implement [`Middleware`] on a type, or wrap an async closure with
//! [`from_fn`]:
//!
//! ```rust
//! use elementary::middleware::{self, Next};
//! use elementary::CallEnvelope;
//!
//! let tag = middleware::from_fn(|mut envelope: CallEnvelope, next: Next| async move {
//!     envelope.metadata.insert("caller".into(), "docs".into());
//!     next.run(envelope).await
//! });
//! # let _ = tag;
//! ```
//!
//! A synchronous middleware simply returns an already-completed future,
//! e.g. `Box::pin(std::future::ready(outcome))`.
//!
//! Built-in middleware:
//! - [`trace`] — per-call span with service, method, outcome and latency
//! - [`dummy`] — pass-through that counts the calls it sees

use std::future::Future;
use std::sync::Arc;

use crate::envelope::CallEnvelope;
use crate::future::{BoxFuture, Outcome};
use crate::transport::Transport;

mod registry;

pub mod dummy;
pub mod trace;

pub use registry::{MiddlewareFactory, Registry};

/// An interceptor around every call.
pub trait Middleware: Send + Sync + 'static {
    /// Handles one call. Forward it with `next.run(envelope)` or produce an
    /// outcome directly.
    fn call<'a>(&'a self, envelope: CallEnvelope, next: Next) -> BoxFuture<'a, Outcome>;
}

/// The remainder of the chain after the current middleware.
///
/// Owned and `'static`, so it can be moved into spawned tasks. Running it
/// consumes it: each middleware forwards a call at most once.
pub struct Next {
    chain: Arc<Vec<Arc<dyn Middleware>>>,
    position: usize,
    transport: Arc<dyn Transport>,
}

impl Next {
    pub(crate) fn new(chain: Arc<Vec<Arc<dyn Middleware>>>, transport: Arc<dyn Transport>) -> Self {
        Self { chain, position: 0, transport }
    }

    /// Invokes the rest of the chain, ending in the transport.
    pub fn run(mut self, envelope: CallEnvelope) -> BoxFuture<'static, Outcome> {
        match self.chain.get(self.position).cloned() {
            Some(middleware) => {
                self.position += 1;
                Box::pin(async move { middleware.call(envelope, self).await })
            }
            None => {
                let transport = self.transport;
                Box::pin(async move {
                    transport
                        .call(&envelope.service, &envelope.method, envelope.request.as_ref())
                        .await
                })
            }
        }
    }

    /// How many middleware are still ahead of the transport.
    pub fn remaining(&self) -> usize {
        self.chain.len().saturating_sub(self.position)
    }
}

/// Wraps an async closure as a [`Middleware`].
pub fn from_fn<F, Fut>(f: F) -> FnMiddleware<F>
where
    F: Fn(CallEnvelope, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    FnMiddleware(f)
}

/// Middleware built by [`from_fn`].
pub struct FnMiddleware<F>(F);

impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(CallEnvelope, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    fn call<'a>(&'a self, envelope: CallEnvelope, next: Next) -> BoxFuture<'a, Outcome> {
        Box::pin((self.0)(envelope, next))
    }
}
