//! HTTP transport.
//!
//! # Wire contract
//!
//! ```text
//! POST http://{host}:{port}/{prefix}/{percent-encoded service}/{method}
//! content-type: application/x-protobuf
//!
//! <request.encode()>
//! ```
//!
//! The response is interpreted in two steps, in this order:
//!
//! 1. If `x-protobuf-error` is present and non-empty the call has failed.
//!    The failure carries `x-protobuf-error-reason` as its code and
//!    `"Error {code}: {x-protobuf-error}"` as its message. The body is not
//!    looked at and the HTTP status is irrelevant.
//! 2. Otherwise the body is decoded as the method's response type.
//!
//! Only the first configured host is contacted; there is no failover.
//!
//! # Connections
//!
//! Requests go through a pooled keep-alive client (hyper-util's legacy
//! client) created on first use. Connections are opened lazily and shared by
//! every concurrent call.

use std::sync::OnceLock;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{HostSpec, Options};
use crate::error::{Error, RpcFailure};
use crate::future::{BoxFuture, Outcome};
use crate::message::Message;
use crate::service::{MethodDescriptor, ServiceDescriptor};
use crate::transport::Transport;

/// Response header carrying the human-readable failure message.
pub const ERROR_HEADER_MSG: &str = "x-protobuf-error";
/// Response header carrying the failure code.
pub const ERROR_HEADER_CODE: &str = "x-protobuf-error-reason";

const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

/// Everything but RFC 3986 unreserved characters gets percent-encoded.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

type HttpClient = Client<HttpConnector, Full<Bytes>>;

/// Sends protobuf messages over HTTP/1.1 to the first configured host.
pub struct HttpTransport {
    hosts: Vec<HostSpec>,
    options: Options,
    settings: Settings,
    client: OnceLock<HttpClient>,
}

impl HttpTransport {
    /// Creates a transport for `hosts`.
    ///
    /// `options` is kept verbatim (see [`options`](Self::options)) and read
    /// for the client settings it recognises: `timeout` and `open_timeout`
    /// (seconds), `pool_idle_timeout` (seconds), `pool_max_idle_per_host`
    /// and `nodelay`. Anything else is ignored.
    pub fn new(hosts: Vec<HostSpec>, options: Options) -> Self {
        let settings = Settings::from_options(&options);
        if let Some(host) = hosts.first() {
            debug!(host = %host.host, port = host.port, prefix = %host.prefix, "http transport configured");
        }
        Self { hosts, options, settings, client: OnceLock::new() }
    }

    pub fn hosts(&self) -> &[HostSpec] {
        &self.hosts
    }

    /// The options this transport was created with, untouched.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Path of the RPC endpoint for `method`, relative to the host root.
    pub fn request_path(&self, service: &ServiceDescriptor, method: &MethodDescriptor) -> String {
        let prefix = self.hosts.first().map(|h| h.prefix.as_str()).unwrap_or_default();
        request_path(prefix, service.name(), method.method())
    }

    fn uri(&self, service: &ServiceDescriptor, method: &MethodDescriptor) -> Result<http::Uri, Error> {
        let host = self.hosts.first().ok_or_else(|| Error::transport("no hosts configured"))?;
        let path = request_path(&host.prefix, service.name(), method.method());
        let uri = format!("http://{}/{path}", authority(host));
        uri.parse::<http::Uri>()
            .map_err(|e| Error::transport_with(format!("invalid request uri `{uri}`"), e))
    }

    fn client(&self) -> &HttpClient {
        self.client.get_or_init(|| self.settings.build_client())
    }

    /// POSTs `body` to `uri` and returns the response headers and body.
    async fn exchange(&self, uri: http::Uri, body: Bytes) -> Result<(HeaderMap, Bytes), Error> {
        let request = http::Request::post(uri.clone())
            .header(CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)
            .body(Full::new(body))
            .map_err(|e| Error::transport_with("building request", e))?;

        let response = self
            .client()
            .request(request)
            .await
            .map_err(|e| Error::transport_with(format!("POST {uri}"), e))?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| Error::transport_with(format!("reading response from {uri}"), e))?
            .to_bytes();

        debug!(%uri, status = %parts.status, bytes = body.len(), "rpc response");
        Ok((parts.headers, body))
    }
}

impl Transport for HttpTransport {
    fn call<'a>(
        &'a self,
        service: &'a ServiceDescriptor,
        method: &'a MethodDescriptor,
        request: &'a dyn Message,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let uri = self.uri(service, method)?;
            let body = request.encode();
            debug!(%uri, bytes = body.len(), "rpc request");

            let exchange = self.exchange(uri, body);
            let (headers, body) = match self.settings.timeout {
                Some(limit) => tokio::time::timeout(limit, exchange)
                    .await
                    .map_err(|_| Error::transport(format!("request timed out after {limit:?}")))??,
                None => exchange.await?,
            };

            interpret(&headers, &body, method)
        })
    }
}

/// `prefix/service/method` with the prefix's slashes trimmed and the service
/// name percent-encoded as a path segment. An empty prefix is left out.
pub fn request_path(prefix: &str, service: &str, method: &str) -> String {
    let service = utf8_percent_encode(service, PATH_SEGMENT);
    match prefix.trim_matches('/') {
        "" => format!("{service}/{method}"),
        prefix => format!("{prefix}/{service}/{method}"),
    }
}

fn authority(host: &HostSpec) -> String {
    if host.host.contains(':') && !host.host.starts_with('[') {
        format!("[{}]:{}", host.host, host.port)
    } else {
        format!("{}:{}", host.host, host.port)
    }
}

/// Turns a raw response into an outcome. Error headers win over the body.
fn interpret(headers: &HeaderMap, body: &[u8], method: &MethodDescriptor) -> Outcome {
    let header = |name: &str| {
        headers.get(name).map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
    };

    if let Some(error) = header(ERROR_HEADER_MSG).filter(|e| !e.is_empty()) {
        let code = header(ERROR_HEADER_CODE).unwrap_or_default();
        let failure = RpcFailure::from_headers(code, &error);
        warn!(method = %method.method(), code = %failure.code, "rpc failure: {error}");
        return Err(failure.into());
    }

    Ok(method.decode(body)?)
}

// ── Client settings ──────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq)]
struct Settings {
    timeout: Option<Duration>,
    open_timeout: Option<Duration>,
    pool_idle_timeout: Option<Duration>,
    pool_max_idle_per_host: Option<usize>,
    nodelay: Option<bool>,
}

impl Settings {
    fn from_options(options: &Options) -> Self {
        let mut settings = Self::default();
        for (key, value) in options {
            let applied = match key.as_str() {
                "timeout" => seconds(value).map(|d| settings.timeout = Some(d)),
                "open_timeout" => seconds(value).map(|d| settings.open_timeout = Some(d)),
                "pool_idle_timeout" => seconds(value).map(|d| settings.pool_idle_timeout = Some(d)),
                "pool_max_idle_per_host" => value
                    .as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .map(|n| settings.pool_max_idle_per_host = Some(n)),
                "nodelay" => value.as_bool().map(|b| settings.nodelay = Some(b)),
                _ => {
                    debug!(option = %key, "ignoring unrecognised transport option");
                    continue;
                }
            };
            if applied.is_none() {
                warn!(option = %key, %value, "ignoring transport option with unusable value");
            }
        }
        settings
    }

    fn build_client(&self) -> HttpClient {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(self.open_timeout);
        if let Some(nodelay) = self.nodelay {
            connector.set_nodelay(nodelay);
        }

        let mut builder = Client::builder(TokioExecutor::new());
        builder.pool_timer(TokioTimer::new());
        if let Some(idle) = self.pool_idle_timeout {
            builder.pool_idle_timeout(idle);
        }
        if let Some(max) = self.pool_max_idle_per_host {
            builder.pool_max_idle_per_host(max);
        }
        builder.build(connector)
    }
}

fn seconds(value: &Value) -> Option<Duration> {
    value.as_f64().and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}
