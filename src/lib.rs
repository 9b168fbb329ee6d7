//! # elementary
//!
//! A small client-side RPC library. You describe a remote service, pick the
//! hosts it lives on, and call its methods; each call comes back as an
//! [`RpcFuture`] that resolves to the decoded response or to the reason the
//! call failed.
//!
//! ## The pipeline
//!
//! ```text
//! connection.call("echo", request)
//!        ↓ CallEnvelope
//! middleware (outer → inner)        ← process-wide, read on every call
//!        ↓
//! transport.call(service, method, request)
//!        ↓ POST /{prefix}/{service}/{method}
//! error headers? → RpcFailure       ← x-protobuf-error / -reason
//! otherwise      → decode body
//!        ↓
//! middleware (inner → outer)
//!        ↓
//! RpcFuture resolved
//! ```
//!
//! What elementary deliberately leaves to you: service discovery, load
//! balancing beyond "first host", TLS, auth, retries. Retries and the like
//! belong in [`middleware`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use elementary::{Connection, ConnectionConfig, HostSpec, ServiceDescriptor};
//!
//! #[derive(Clone, PartialEq, prost::Message)]
//! struct Text {
//!     #[prost(string, tag = "1")]
//!     data: String,
//! }
//!
//! fn main() -> Result<(), elementary::Error> {
//!     let simple = ServiceDescriptor::new("Simple")
//!         .method::<Text>("echo")
//!         .method::<Text>("error");
//!
//!     let connection = Connection::new(
//!         simple,
//!         ConnectionConfig::with_host(HostSpec::new("localhost", 80, "/rpc")),
//!     )?;
//!
//!     let reply = connection.call("echo", Text { data: "hello".into() })?;
//!     println!("{}", reply.value_as::<Text>()?.data);
//!
//!     let failed = connection.call("error", Text::default())?;
//!     if let Err(e) = failed.value() {
//!         eprintln!("{e}");  // "Error BAD_REQUEST: boom"
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Inside async code, `.await` the future instead of calling
//! [`value`](RpcFuture::value).

mod config;
mod connection;
mod envelope;
mod error;
mod future;
mod service;

pub mod message;
pub mod middleware;
pub mod transport;

pub use config::{ConnectionConfig, HostSpec, Options};
pub use connection::{Connection, ConnectionBuilder};
pub use envelope::CallEnvelope;
pub use error::{DecodeError, Error, RpcFailure};
pub use future::{BoxFuture, Outcome, Resolver, RpcFuture};
pub use message::{Decode, Message};
pub use service::{MethodDescriptor, ServiceDescriptor};
pub use transport::{HttpSelector, HttpTransport, SelectTransport, Transport};

/// Appends a middleware to the process-wide chain.
///
/// `factory` is called once, with `options`, to build the instance every
/// subsequent call runs through.
pub fn use_middleware<F: middleware::MiddlewareFactory>(factory: F, options: Options) {
    middleware::Registry::global().use_middleware(factory, options);
}

/// Clears the process-wide middleware chain.
pub fn flush_middleware() {
    middleware::Registry::global().flush();
}
