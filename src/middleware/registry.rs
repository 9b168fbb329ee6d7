//! Ordered middleware registry.
//!
//! The list lives behind an [`ArcSwap`] so dispatch never takes a lock: each
//! call loads a snapshot once and runs against it to completion, even if
//! middleware are registered or flushed while it is in flight. Registration
//! and flush replace the whole list atomically.
//!
//! Register at process or test setup and flush at quiescent points; a call
//! dispatched concurrently with a change sees either the old list or the new
//! one, never a mix.

use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;
use tracing::debug;

use crate::config::Options;
use crate::middleware::Middleware;

static GLOBAL: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Builds a middleware from its registration options.
///
/// Implemented for any `FnOnce(&Options) -> impl Middleware`, which covers
/// constructors such as [`Trace::new`](crate::middleware::trace::Trace::new).
pub trait MiddlewareFactory {
    type Middleware: Middleware;

    fn build(self, options: &Options) -> Self::Middleware;
}

impl<F, M> MiddlewareFactory for F
where
    F: FnOnce(&Options) -> M,
    M: Middleware,
{
    type Middleware = M;

    fn build(self, options: &Options) -> M {
        self(options)
    }
}

/// An ordered list of middleware. Earlier entries wrap later ones.
pub struct Registry {
    entries: ArcSwap<Vec<Arc<dyn Middleware>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self { entries: ArcSwap::from_pointee(Vec::new()) }
    }

    /// The process-wide registry that connections use unless given their own.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Builds a middleware from `factory` and `options` and appends it.
    pub fn use_middleware<F: MiddlewareFactory>(&self, factory: F, options: Options) {
        self.push(factory.build(&options));
    }

    /// Appends an already-built middleware.
    pub fn push(&self, middleware: impl Middleware) {
        let middleware: Arc<dyn Middleware> = Arc::new(middleware);
        self.entries.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&middleware));
            next
        });
        debug!(count = self.len(), "middleware registered");
    }

    /// Removes every middleware. Calls already dispatched keep their snapshot.
    pub fn flush(&self) {
        self.entries.store(Arc::new(Vec::new()));
        debug!("middleware flushed");
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }

    /// The chain to run one call against.
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<dyn Middleware>>> {
        self.entries.load_full()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
