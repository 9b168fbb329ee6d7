//! The message codec contract.
//!
//! elementary never looks inside a message. A request only has to turn itself
//! into bytes ([`Message::encode`]) and a response type only has to rebuild
//! itself from bytes ([`Decode::decode`]). With the `protobuf` feature every
//! `prost`-generated struct satisfies both traits automatically.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::DecodeError;

/// A value that can be sent over the wire.
///
/// Messages travel through the middleware chain and out of an
/// [`RpcFuture`](crate::RpcFuture) as `Arc<dyn Message>`. Use
/// [`downcast`] (or [`RpcFuture::value_as`](crate::RpcFuture::value_as)) to
/// get the concrete type back.
pub trait Message: AsAny + fmt::Debug + Send + Sync + 'static {
    fn encode(&self) -> Bytes;
}

/// A message type that can be rebuilt from raw bytes.
pub trait Decode: Sized {
    fn decode(buf: &[u8]) -> Result<Self, DecodeError>;
}

/// Upcast helper so a `dyn Message` can be turned back into its concrete type.
///
/// Implemented for every sized `Send + Sync + 'static` type; you never
/// implement it yourself.
#[doc(hidden)]
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Recovers the concrete type of a shared message, or returns `None` if the
/// message is something else.
pub fn downcast<T: Message>(message: Arc<dyn Message>) -> Option<Arc<T>> {
    message.into_any().downcast::<T>().ok()
}

#[cfg(feature = "protobuf")]
impl<M> Message for M
where
    M: prost::Message + 'static,
{
    fn encode(&self) -> Bytes {
        Bytes::from(prost::Message::encode_to_vec(self))
    }
}

#[cfg(feature = "protobuf")]
impl<M> Decode for M
where
    M: prost::Message + Default,
{
    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        <M as prost::Message>::decode(buf).map_err(DecodeError::from)
    }
}
