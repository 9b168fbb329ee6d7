//! Per-call tracing span.
//!
//! Every call gets an `rpc` span carrying the service and method name, and
//! one event when it finishes: `info` on success, `warn` on failure or when
//! the call took longer than the configured `slow_ms`.
//!
//! ```rust
//! use elementary::middleware::trace::Trace;
//! use serde_json::json;
//!
//! let mut options = elementary::Options::new();
//! options.insert("slow_ms".into(), json!(250));
//! elementary::use_middleware(Trace::new, options);
//! # elementary::flush_middleware();
//! ```

use std::time::{Duration, Instant};

use tracing::{Instrument, info, info_span, warn};

use crate::config::Options;
use crate::envelope::CallEnvelope;
use crate::future::{BoxFuture, Outcome};
use crate::middleware::{Middleware, Next};

/// Logs every call with its latency.
#[derive(Clone, Debug, Default)]
pub struct Trace {
    slow: Option<Duration>,
}

impl Trace {
    /// Reads `slow_ms` (integer milliseconds) from `options`; other keys are
    /// ignored.
    pub fn new(options: &Options) -> Self {
        let slow = options.get("slow_ms").and_then(|v| v.as_u64()).map(Duration::from_millis);
        Self { slow }
    }
}

impl Middleware for Trace {
    fn call<'a>(&'a self, envelope: CallEnvelope, next: Next) -> BoxFuture<'a, Outcome> {
        let span = info_span!(
            "rpc",
            service = %envelope.service.name(),
            method = %envelope.method.method()
        );

        Box::pin(
            async move {
                let started = Instant::now();
                let outcome = next.run(envelope).await;
                let elapsed = started.elapsed();

                match &outcome {
                    Err(e) => warn!(?elapsed, error = %e, "rpc failed"),
                    Ok(_) if self.slow.is_some_and(|slow| elapsed > slow) => {
                        warn!(?elapsed, "rpc slow")
                    }
                    Ok(_) => info!(?elapsed, "rpc ok"),
                }
                outcome
            }
            .instrument(span),
        )
    }
}
