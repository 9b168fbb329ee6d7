//! Service and method descriptors.
//!
//! A [`ServiceDescriptor`] names a remote service and lists the methods that
//! may be called on it. Each [`MethodDescriptor`] knows how to decode the
//! response of its method, so the transport can hand back a typed message
//! without knowing anything about the type.
//!
//! ```rust
//! use elementary::ServiceDescriptor;
//! # #[derive(Clone, PartialEq, prost::Message)]
//! # struct Text { #[prost(string, tag = "1")] data: String }
//!
//! let simple = ServiceDescriptor::new("Simple")
//!     .method::<Text>("echo")
//!     .method::<Text>("error");
//!
//! assert!(simple.lookup("echo").is_ok());
//! assert!(simple.lookup("nope").is_err());
//! ```

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{DecodeError, Error};
use crate::message::{Decode, Message};

type DecodeFn = fn(&[u8]) -> Result<Arc<dyn Message>, DecodeError>;

/// One callable method of a service.
#[derive(Clone)]
pub struct MethodDescriptor {
    method: String,
    response_type: &'static str,
    decode: DecodeFn,
}

impl MethodDescriptor {
    /// Describes `method`, whose responses decode as `R`.
    pub fn new<R: Message + Decode>(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            response_type: type_name::<R>(),
            decode: decode_as::<R>,
        }
    }

    /// The method name as it appears in the request path.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Rust type name of the response, for logs.
    pub fn response_type(&self) -> &'static str {
        self.response_type
    }

    /// Decodes a response body as this method's response type.
    pub fn decode(&self, body: &[u8]) -> Result<Arc<dyn Message>, DecodeError> {
        (self.decode)(body)
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("method", &self.method)
            .field("response_type", &self.response_type)
            .finish()
    }
}

fn decode_as<R: Message + Decode>(body: &[u8]) -> Result<Arc<dyn Message>, DecodeError> {
    let message: Arc<dyn Message> = Arc::new(R::decode(body)?);
    Ok(message)
}

/// A remote service: its name plus the methods it exposes.
#[derive(Clone, Debug)]
pub struct ServiceDescriptor {
    name: String,
    methods: HashMap<String, MethodDescriptor>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), methods: HashMap::new() }
    }

    /// Registers a method whose responses decode as `R`. Returns `self` for
    /// chaining; registering the same name twice replaces the earlier entry.
    pub fn method<R: Message + Decode>(self, method: &str) -> Self {
        self.with(MethodDescriptor::new::<R>(method))
    }

    /// Registers a prebuilt descriptor.
    pub fn with(mut self, descriptor: MethodDescriptor) -> Self {
        self.methods.insert(descriptor.method.clone(), descriptor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolves a method by name.
    ///
    /// Fails with [`Error::UnknownMethod`] if the service has no such method.
    pub fn lookup(&self, method: &str) -> Result<&MethodDescriptor, Error> {
        self.methods.get(method).ok_or_else(|| Error::UnknownMethod {
            service: self.name.clone(),
            method: method.to_owned(),
        })
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.methods.values()
    }
}
