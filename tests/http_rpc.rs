mod support;

use std::sync::Arc;

use elementary::message::downcast;
use elementary::middleware::Registry;
use elementary::middleware::dummy::Dummy;
use elementary::{Connection, ConnectionConfig, Error, HostSpec, Options};
use serde_json::json;

use support::{RpcServer, Text, simple_service};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A connection to `host` that dispatches against its own empty registry.
fn connect(host: HostSpec) -> Connection {
    Connection::builder()
        .service(simple_service("Simple"))
        .config(ConnectionConfig::with_host(host))
        .registry(Arc::new(Registry::new()))
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn echo_round_trips_the_message() {
    init_tracing();
    let server = RpcServer::start().await;
    let connection = connect(server.host("/rpc"));

    let future = connection.call("echo", Text::new("rspec")).unwrap();
    let reply = future.clone().await.unwrap();

    assert_eq!(downcast::<Text>(reply).unwrap().data, "rspec");
    assert!(!future.is_rejected());
    assert_eq!(future.value_as::<Text>().unwrap().data, "rspec");

    let seen = server.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].path, "/rpc/Simple/echo");
    assert_eq!(seen[0].content_type.as_deref(), Some("application/x-protobuf"));
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn error_headers_reject_the_future() {
    init_tracing();
    let server = RpcServer::start().await;
    let connection = connect(server.host("/rpc"));

    let future = connection.call("error", Text::new("rspec")).unwrap();
    let err = future.wait().await.unwrap_err();

    assert!(future.is_rejected());
    let failure = err.as_rpc_failure().expect("rpc failure");
    assert_eq!(failure.code, "BAD_REQUEST");
    let message = err.to_string();
    assert!(message.contains("BAD_REQUEST"));
    assert!(message.contains("boom"));
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn http_status_is_not_consulted() {
    let server = RpcServer::start().await;
    let connection = connect(server.host("/rpc"));

    let future = connection.call("teapot", Text::new("still fine")).unwrap();
    assert!(future.clone().await.is_ok());
    assert_eq!(future.value_as::<Text>().unwrap().data, "still fine");
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn undecodable_body_is_a_decode_error() {
    let server = RpcServer::start().await;
    let connection = connect(server.host("/rpc"));

    let future = connection.call("garbage", Text::new("x")).unwrap();
    assert!(matches!(future.wait().await, Err(Error::Decode(_))));
    assert!(future.is_rejected());
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn service_name_is_percent_encoded_in_the_path() {
    let server = RpcServer::start().await;
    let connection = Connection::builder()
        .service(simple_service("Elementary::Rspec::Simple"))
        .config(ConnectionConfig::with_host(server.host("/api/v1/")))
        .registry(Arc::new(Registry::new()))
        .build()
        .unwrap();

    connection.call("echo", Text::new("x")).unwrap().await.unwrap();

    let seen = server.seen();
    assert_eq!(seen[0].path, "/api/v1/Elementary%3A%3ARspec%3A%3ASimple/echo");
    assert_eq!(seen[0].service, "Elementary::Rspec::Simple");
    assert_eq!(seen[0].method, "echo");
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn only_the_first_host_is_contacted() {
    let server = RpcServer::start().await;
    let config = ConnectionConfig {
        hosts: vec![server.host(""), HostSpec::new("127.0.0.1", 9, "")],
        transport_options: Options::new(),
    };
    let connection = Connection::builder()
        .service(simple_service("Simple"))
        .config(config)
        .registry(Arc::new(Registry::new()))
        .build()
        .unwrap();

    for _ in 0..3 {
        connection.call("echo", Text::new("x")).unwrap().await.unwrap();
    }
    assert!(server.seen().iter().all(|s| s.path == "/Simple/echo"));
    assert_eq!(server.seen().len(), 3);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn refused_connection_rejects_with_a_transport_error() {
    let connection = connect(HostSpec::new("127.0.0.1", 9, "/rpc"));

    let future = connection.call("echo", Text::new("x")).unwrap();
    assert!(matches!(future.wait().await, Err(Error::Transport { .. })));
    assert!(future.is_rejected());
}

#[tokio::test(flavor = "multi_thread")]
async fn timeout_option_bounds_the_call() {
    let server = RpcServer::start().await;
    let mut options = Options::new();
    options.insert("timeout".into(), json!(0.1));
    let connection = Connection::builder()
        .service(simple_service("Simple"))
        .config(ConnectionConfig::with_host(server.host("/rpc")).transport_options(options))
        .registry(Arc::new(Registry::new()))
        .build()
        .unwrap();

    let future = connection.call("slow", Text::new("x")).unwrap();
    match future.wait().await {
        Err(Error::Transport { message, .. }) => assert!(message.contains("timed out")),
        other => panic!("expected a timeout, got {other:?}"),
    }
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_calls_share_the_transport() {
    let server = RpcServer::start().await;
    let connection = connect(server.host("/rpc"));

    let futures: Vec<_> = (0..32)
        .map(|i| connection.call("echo", Text::new(&i.to_string())).unwrap())
        .collect();

    for (i, future) in futures.into_iter().enumerate() {
        let reply = future.await.unwrap();
        assert_eq!(downcast::<Text>(reply).unwrap().data, i.to_string());
    }
    assert_eq!(server.seen().len(), 32);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn value_blocks_a_worker_thread_until_resolved() {
    let server = RpcServer::start().await;
    let connection = connect(server.host("/rpc"));

    let future = connection.call("slow", Text::new("patient")).unwrap();
    assert!(!future.is_resolved());

    let data = tokio::task::spawn_blocking(move || future.value_as::<Text>().map(|t| t.data.clone()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(data, "patient");
    server.stop().await;
}

#[test]
fn synchronous_caller_without_a_runtime() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let server = runtime.block_on(RpcServer::start());

    // Built outside the runtime, so the connection dispatches on its own.
    let connection = connect(server.host("/rpc"));
    let echo = connection.call("echo", Text::new("rspec")).unwrap();
    assert_eq!(echo.value_as::<Text>().unwrap().data, "rspec");
    assert!(!echo.is_rejected());

    let error = connection.call("error", Text::new("rspec")).unwrap();
    let err = error.value().unwrap_err();
    assert!(error.is_rejected());
    assert!(err.to_string().contains("BAD_REQUEST"));

    drop(connection);
    runtime.block_on(server.stop());
}

#[tokio::test(flavor = "multi_thread")]
async fn connection_level_registry_intercepts_calls() {
    let server = RpcServer::start().await;
    let registry = Arc::new(Registry::new());
    let connection = Connection::builder()
        .service(simple_service("Simple"))
        .config(ConnectionConfig::with_host(server.host("/rpc")))
        .registry(Arc::clone(&registry))
        .build()
        .unwrap();

    let dummy = Dummy::new(&Options::new());
    let calls = dummy.calls();
    registry.push(dummy);

    connection.call("echo", Text::new("a")).unwrap().await.unwrap();
    connection.call("error", Text::new("b")).unwrap().await.unwrap_err();
    assert_eq!(calls.get(), 2);

    registry.flush();
    connection.call("echo", Text::new("c")).unwrap().await.unwrap();
    assert_eq!(calls.get(), 2);
    server.stop().await;
}

#[test]
fn connection_and_future_are_thread_safe() {
    fn check<T: Send + Sync>() {}
    check::<Connection>();
    check::<elementary::RpcFuture>();
}
