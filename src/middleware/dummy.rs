//! Pass-through middleware for tests.
//!
//! Forwards every call untouched and counts how many it has seen. Grab the
//! counter before registering it:
//!
//! ```rust
//! use elementary::middleware::{Registry, dummy::Dummy};
//!
//! let registry = Registry::new();
//! let dummy = Dummy::new(&elementary::Options::new());
//! let calls = dummy.calls();
//! registry.push(dummy);
//! assert_eq!(calls.get(), 0);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::Options;
use crate::envelope::CallEnvelope;
use crate::future::{BoxFuture, Outcome};
use crate::middleware::{Middleware, Next};

#[derive(Debug, Default)]
pub struct Dummy {
    options: Options,
    calls: CallCounter,
}

impl Dummy {
    pub fn new(options: &Options) -> Self {
        Self { options: options.clone(), calls: CallCounter::default() }
    }

    /// The options it was registered with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// A handle that keeps counting after the middleware moves into a registry.
    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }
}

impl Middleware for Dummy {
    fn call<'a>(&'a self, envelope: CallEnvelope, next: Next) -> BoxFuture<'a, Outcome> {
        self.calls.0.fetch_add(1, Ordering::SeqCst);
        next.run(envelope)
    }
}

/// Shared count of calls seen by a [`Dummy`].
#[derive(Clone, Debug, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
