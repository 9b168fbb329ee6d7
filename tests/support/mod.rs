//! In-process RPC server for integration tests.
//!
//! Serves `POST /{prefix}/{service}/{method}` for any service name with a
//! fixed set of methods:
//!
//! | method    | behaviour                                                   |
//! |-----------|-------------------------------------------------------------|
//! | `echo`    | 200, request body echoed back                               |
//! | `error`   | 200, body echoed, `x-protobuf-error: boom` / `BAD_REQUEST`  |
//! | `teapot`  | 418, body echoed, no error headers                          |
//! | `slow`    | echo after 500 ms                                           |
//! | `garbage` | 200, body that is not valid protobuf                        |
//!
//! Anything else answers 404 with `x-protobuf-error` set.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use elementary::{HostSpec, ServiceDescriptor};
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use matchit::Router;
use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};

pub const ERROR_HEADER_MSG: &str = "x-protobuf-error";
pub const ERROR_HEADER_CODE: &str = "x-protobuf-error-reason";

#[derive(Clone, PartialEq, prost::Message)]
pub struct Text {
    #[prost(string, tag = "1")]
    pub data: String,
}

impl Text {
    pub fn new(data: &str) -> Self {
        Self { data: data.to_owned() }
    }
}

pub fn simple_service(name: &str) -> ServiceDescriptor {
    ["echo", "error", "teapot", "slow", "garbage"]
        .into_iter()
        .fold(ServiceDescriptor::new(name), |service, method| service.method::<Text>(method))
}

/// One request as the server saw it.
#[derive(Clone, Debug)]
pub struct Seen {
    pub path: String,
    pub service: String,
    pub method: String,
    pub content_type: Option<String>,
}

pub struct RpcServer {
    addr: SocketAddr,
    seen: Arc<Mutex<Vec<Seen>>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RpcServer {
    /// Binds an ephemeral loopback port and starts serving on the current
    /// runtime.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = oneshot::channel();

        let task = tokio::spawn(serve(listener, Arc::new(routes()), Arc::clone(&seen), rx));
        Self { addr, seen, shutdown: Some(tx), task }
    }

    pub fn host(&self, prefix: &str) -> HostSpec {
        HostSpec::new("127.0.0.1", self.addr.port(), prefix)
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().clone()
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

fn routes() -> Router<()> {
    let mut router = Router::new();
    for pattern in ["/{service}/{method}", "/rpc/{service}/{method}", "/api/v1/{service}/{method}"] {
        router.insert(pattern, ()).expect("valid route");
    }
    router
}

async fn serve(
    listener: TcpListener,
    router: Arc<Router<()>>,
    seen: Arc<Mutex<Vec<Seen>>>,
    shutdown: oneshot::Receiver<()>,
) {
    let mut tasks = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,

            res = listener.accept() => {
                let Ok((stream, _)) = res else { continue };
                let io = TokioIo::new(stream);
                let router = Arc::clone(&router);
                let seen = Arc::clone(&seen);

                tasks.spawn(async move {
                    let svc = service_fn(move |req| {
                        let router = Arc::clone(&router);
                        let seen = Arc::clone(&seen);
                        async move { dispatch(&router, &seen, req).await }
                    });
                    let _ = ConnBuilder::new(TokioExecutor::new()).serve_connection(io, svc).await;
                });
            }

            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    tasks.abort_all();
}

async fn dispatch(
    router: &Router<()>,
    seen: &Mutex<Vec<Seen>>,
    req: hyper::Request<hyper::body::Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_owned();
    let Ok(matched) = router.at(&path) else {
        return Ok(failure(404, "no route", "NOT_FOUND"));
    };
    let service = matched.params.get("service").unwrap_or_default();
    let service = percent_decode_str(service).decode_utf8_lossy().into_owned();
    let method = matched.params.get("method").unwrap_or_default().to_owned();

    seen.lock().push(Seen {
        path: path.clone(),
        service,
        method: method.clone(),
        content_type: req
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
    });

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => return Ok(failure(400, "unreadable body", "BAD_REQUEST")),
    };

    let response = match method.as_str() {
        "echo" => reply(200, body),
        "error" => {
            let mut response = reply(200, body);
            let headers = response.headers_mut();
            headers.insert(ERROR_HEADER_MSG, http::HeaderValue::from_static("boom"));
            headers.insert(ERROR_HEADER_CODE, http::HeaderValue::from_static("BAD_REQUEST"));
            response
        }
        "teapot" => reply(418, body),
        "slow" => {
            tokio::time::sleep(Duration::from_millis(500)).await;
            reply(200, body)
        }
        "garbage" => reply(200, Bytes::from_static(&[0xff, 0xff, 0xff])),
        _ => failure(404, "no such method", "NOT_FOUND"),
    };
    Ok(response)
}

fn reply(status: u16, body: Bytes) -> http::Response<Full<Bytes>> {
    http::Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/x-protobuf")
        .body(Full::new(body))
        .expect("valid response")
}

fn failure(status: u16, message: &'static str, code: &'static str) -> http::Response<Full<Bytes>> {
    http::Response::builder()
        .status(status)
        .header(ERROR_HEADER_MSG, message)
        .header(ERROR_HEADER_CODE, code)
        .body(Full::new(Bytes::new()))
        .expect("valid response")
}
