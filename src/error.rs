//! Unified error type.

use std::error::Error as StdError;
use std::sync::Arc;

/// The error type returned by elementary's fallible operations.
///
/// Three variants are raised synchronously, before anything is sent:
/// [`Error::InvalidArgument`] and [`Error::Runtime`] while building a
/// [`Connection`](crate::Connection), and [`Error::UnknownMethod`] when a call
/// names a method the service does not have. The remaining three describe a
/// failed call and only ever reach the caller through an
/// [`RpcFuture`](crate::RpcFuture).
///
/// `Error` is `Clone` because one resolved outcome may be read by any
/// number of waiters. Underlying I/O errors are kept behind an `Arc`.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// Malformed construction input: missing service, empty host list, ...
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The connection could not start its private dispatch runtime.
    #[error("cannot start dispatch runtime: {0}")]
    Runtime(#[source] Arc<std::io::Error>),

    /// The service has no descriptor for the requested method.
    #[error("unknown method `{method}` on service `{service}`")]
    UnknownMethod { service: String, method: String },

    /// Network-level failure: connection refused, timeout, broken pipe.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Arc<dyn StdError + Send + Sync>>,
    },

    /// Application-level failure reported by the remote side.
    #[error(transparent)]
    Rpc(#[from] RpcFailure),

    /// The response body could not be decoded as the expected type.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn runtime(source: std::io::Error) -> Self {
        Self::Runtime(Arc::new(source))
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into(), source: None }
    }

    pub(crate) fn transport_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Transport { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Returns the remote failure if this error carries one.
    pub fn as_rpc_failure(&self) -> Option<&RpcFailure> {
        match self {
            Self::Rpc(failure) => Some(failure),
            _ => None,
        }
    }
}

/// A failure explicitly signalled by the server through the
/// `x-protobuf-error` / `x-protobuf-error-reason` header pair.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RpcFailure {
    /// Value of `x-protobuf-error-reason`, verbatim.
    pub code: String,
    /// `"Error {code}: {x-protobuf-error}"`.
    pub message: String,
}

impl RpcFailure {
    /// Builds a failure from the raw header values.
    pub fn from_headers(code: impl Into<String>, error: &str) -> Self {
        let code = code.into();
        let message = format!("Error {code}: {error}");
        Self { code, message }
    }
}

/// Raised when bytes cannot be turned back into a message.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct DecodeError(String);

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[cfg(feature = "protobuf")]
impl From<prost::DecodeError> for DecodeError {
    fn from(e: prost::DecodeError) -> Self {
        Self(e.to_string())
    }
}
