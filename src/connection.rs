//! Connection: one service bound to one transport.
//!
//! # Dispatch
//!
//! [`Connection::call`] returns an [`RpcFuture`] immediately and runs the call
//! as a task:
//!
//! 1. the method name is resolved against the service; an unknown name fails
//!    right here, before anything is sent,
//! 2. a [`CallEnvelope`] is built with empty metadata,
//! 3. the current middleware list is snapshotted and run, innermost step
//!    being `transport.call(service, method, request)`,
//! 4. the outcome resolves the future.
//!
//! The middleware list is read per call, never cached, so registering or
//! flushing middleware takes effect on the next call without rebuilding the
//! connection.
//!
//! # Runtimes
//!
//! A connection built inside a multi-thread tokio runtime spawns its calls
//! there. Built inside a current-thread runtime, or outside any runtime, it
//! starts a small runtime of its own, so blocking on [`RpcFuture::value`]
//! never stalls the only thread its calls could run on.
//!
//! A handle given to [`ConnectionBuilder::runtime`] is used as is. That
//! runtime needs its time and I/O drivers enabled; a call that panics on it
//! rejects its future with the panic message.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::Value;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use tokio::task::JoinError;
use tracing::debug;

use crate::config::{ConnectionConfig, HostSpec};
use crate::envelope::CallEnvelope;
use crate::error::Error;
use crate::future::RpcFuture;
use crate::message::Message;
use crate::middleware::{Next, Registry};
use crate::service::ServiceDescriptor;
use crate::transport::{HttpSelector, SelectTransport, Transport};

const DISPATCH_THREADS: usize = 2;

/// A client for one remote service.
///
/// ```rust,no_run
/// use elementary::{Connection, HostSpec, ConnectionConfig, ServiceDescriptor};
/// # #[derive(Clone, PartialEq, prost::Message)]
/// # struct Text { #[prost(string, tag = "1")] data: String }
///
/// let service = ServiceDescriptor::new("Simple").method::<Text>("echo");
/// let config = ConnectionConfig::with_host(HostSpec::new("localhost", 80, "/rpc"));
/// let connection = Connection::new(service, config)?;
///
/// let reply = connection.call("echo", Text { data: "hi".into() })?;
/// assert_eq!(reply.value_as::<Text>()?.data, "hi");
/// # Ok::<(), elementary::Error>(())
/// ```
pub struct Connection {
    service: Arc<ServiceDescriptor>,
    config: ConnectionConfig,
    selector: Arc<dyn SelectTransport>,
    registry: Option<Arc<Registry>>,
    transport: OnceLock<Arc<dyn Transport>>,
    dispatcher: Dispatcher,
}

impl Connection {
    /// Binds `service` to the hosts in `config` using the default transport.
    pub fn new(
        service: impl Into<Arc<ServiceDescriptor>>,
        config: ConnectionConfig,
    ) -> Result<Self, Error> {
        Self::builder().service(service).config(config).build()
    }

    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::default()
    }

    pub fn service(&self) -> &ServiceDescriptor {
        &self.service
    }

    pub fn hosts(&self) -> &[HostSpec] {
        &self.config.hosts
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Builds a fresh transport from the configured hosts and
    /// `transport_options`, through this connection's selector.
    pub fn select_transport(&self) -> Arc<dyn Transport> {
        self.selector.select(&self.config.hosts, &self.config.transport_options)
    }

    /// The transport calls go through, selected on first use and then
    /// shared by every call.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        self.transport.get_or_init(|| self.select_transport())
    }

    /// Calls `method` with `request`.
    ///
    /// Fails synchronously only with [`Error::UnknownMethod`]. Every other
    /// failure is delivered through the returned future.
    pub fn call(&self, method: &str, request: impl Message) -> Result<RpcFuture, Error> {
        self.call_shared(method, Arc::new(request))
    }

    /// Like [`call`](Self::call) for a request that is already shared.
    pub fn call_shared(&self, method: &str, request: Arc<dyn Message>) -> Result<RpcFuture, Error> {
        let descriptor = self.service.lookup(method)?.clone();
        let envelope = CallEnvelope::new(Arc::clone(&self.service), descriptor, request);
        let next = Next::new(self.registry().snapshot(), Arc::clone(self.transport()));

        debug!(
            service = %self.service.name(),
            method,
            middleware = next.remaining(),
            "dispatching rpc"
        );

        let (future, resolver) = RpcFuture::pending();
        let handle = self.dispatcher.handle();
        let task = handle.spawn(next.run(envelope));
        handle.spawn(async move {
            resolver.resolve(task.await.unwrap_or_else(|e| Err(dispatch_failure(e))));
        });
        Ok(future)
    }

    fn registry(&self) -> &Registry {
        match self.registry.as_deref() {
            Some(registry) => registry,
            None => Registry::global(),
        }
    }
}

fn dispatch_failure(e: JoinError) -> Error {
    if !e.is_panic() {
        return Error::transport("dispatch cancelled");
    }
    let panic = e.into_panic();
    let reason = panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause");
    Error::transport(format!("dispatch panicked: {reason}"))
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("service", &self.service.name())
            .field("hosts", &self.config.hosts)
            .finish_non_exhaustive()
    }
}

// ── Builder ──────────────────────────────────────────────────────────────────

/// Step-by-step construction of a [`Connection`].
///
/// Obtain via [`Connection::builder()`]. Only the service is required.
#[derive(Default)]
pub struct ConnectionBuilder {
    service: Option<Arc<ServiceDescriptor>>,
    config: Option<ConnectionConfig>,
    options: Option<Value>,
    selector: Option<Arc<dyn SelectTransport>>,
    registry: Option<Arc<Registry>>,
    handle: Option<Handle>,
}

impl ConnectionBuilder {
    pub fn service(mut self, service: impl Into<Arc<ServiceDescriptor>>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Typed configuration. Mutually exclusive with
    /// [`options`](Self::options).
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Raw options mapping, parsed by [`ConnectionConfig::from_value`] at
    /// build time. Setting both this and [`config`](Self::config) is an
    /// [`Error::InvalidArgument`].
    pub fn options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    /// Replaces the default HTTP transport selection.
    pub fn selector(mut self, selector: impl SelectTransport) -> Self {
        self.selector = Some(Arc::new(selector));
        self
    }

    /// Dispatches against `registry` instead of the process-wide one.
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Spawns calls on `handle` instead of the ambient or a private runtime.
    ///
    /// The runtime must have time and I/O enabled. Blocking on
    /// [`RpcFuture::value`] from a current-thread runtime's own thread never
    /// completes; await the future there instead.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn build(self) -> Result<Connection, Error> {
        let service = self
            .service
            .ok_or_else(|| Error::invalid("a service descriptor is required"))?;
        if service.name().is_empty() {
            return Err(Error::invalid("service name must not be empty"));
        }

        let config = match (self.options, self.config) {
            (Some(_), Some(_)) => {
                return Err(Error::invalid("options and config are mutually exclusive"));
            }
            (Some(options), None) => ConnectionConfig::from_value(options)?,
            (None, config) => config.unwrap_or_default(),
        };
        config.validate()?;

        let dispatcher = match self.handle {
            Some(handle) => Dispatcher::Shared(handle),
            None => match Handle::try_current() {
                Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                    Dispatcher::Shared(handle)
                }
                _ => Dispatcher::owned()?,
            },
        };

        debug!(service = %service.name(), hosts = config.hosts.len(), "connection created");

        Ok(Connection {
            service,
            config,
            selector: self.selector.unwrap_or_else(|| Arc::new(HttpSelector)),
            registry: self.registry,
            transport: OnceLock::new(),
            dispatcher,
        })
    }
}

// ── Dispatch runtime ─────────────────────────────────────────────────────────

enum Dispatcher {
    Shared(Handle),
    Owned(OwnedRuntime),
}

impl Dispatcher {
    fn owned() -> Result<Self, Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(DISPATCH_THREADS)
            .thread_name("elementary-dispatch")
            .enable_all()
            .build()
            .map_err(Error::runtime)?;
        Ok(Self::Owned(OwnedRuntime { handle: runtime.handle().clone(), runtime: Some(runtime) }))
    }

    fn handle(&self) -> &Handle {
        match self {
            Self::Shared(handle) => handle,
            Self::Owned(owned) => &owned.handle,
        }
    }
}

/// A private runtime, shut down without blocking when the connection goes.
/// Calls still in flight are abandoned and their futures rejected.
struct OwnedRuntime {
    handle: Handle,
    runtime: Option<Runtime>,
}

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
