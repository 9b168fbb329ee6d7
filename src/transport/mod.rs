//! Transports and transport selection.
//!
//! A [`Transport`] performs one request/response exchange. Which transport a
//! [`Connection`](crate::Connection) uses is decided by its
//! [`SelectTransport`]; the default, [`HttpSelector`], builds an
//! [`HttpTransport`]. Supporting another wire protocol means providing another
//! selector. The dispatch path does not change.

use std::sync::Arc;

use crate::config::{HostSpec, Options};
use crate::future::{BoxFuture, Outcome};
use crate::message::{AsAny, Message};
use crate::service::{MethodDescriptor, ServiceDescriptor};

pub mod http;

pub use http::HttpTransport;

/// Performs the physical call for one (service, method, request) triple.
///
/// Implementations are shared by every in-flight call of a connection and
/// must tolerate concurrent use.
pub trait Transport: AsAny + Send + Sync + 'static {
    fn call<'a>(
        &'a self,
        service: &'a ServiceDescriptor,
        method: &'a MethodDescriptor,
        request: &'a dyn Message,
    ) -> BoxFuture<'a, Outcome>;
}

impl dyn Transport {
    /// Returns the concrete transport if it is a `T`.
    pub fn downcast_ref<T: Transport>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Chooses and builds the transport for a connection.
///
/// Implemented for closures `Fn(&[HostSpec], &Options) -> Arc<dyn Transport>`.
pub trait SelectTransport: Send + Sync + 'static {
    fn select(&self, hosts: &[HostSpec], options: &Options) -> Arc<dyn Transport>;
}

impl<F> SelectTransport for F
where
    F: Fn(&[HostSpec], &Options) -> Arc<dyn Transport> + Send + Sync + 'static,
{
    fn select(&self, hosts: &[HostSpec], options: &Options) -> Arc<dyn Transport> {
        self(hosts, options)
    }
}

/// The default selector: HTTP to the configured hosts.
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpSelector;

impl SelectTransport for HttpSelector {
    fn select(&self, hosts: &[HostSpec], options: &Options) -> Arc<dyn Transport> {
        Arc::new(HttpTransport::new(hosts.to_vec(), options.clone()))
    }
}
