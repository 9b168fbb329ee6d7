//! Minimal elementary client — calls `Simple.echo` and `Simple.error`.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example echo -- localhost 8000 /rpc
//!
//! Any server that speaks the protocol works: `POST /rpc/Simple/echo` with a
//! protobuf body, answering either the same bytes or an `x-protobuf-error`
//! header pair.

use clap::Parser;
use elementary::middleware::trace::Trace;
use elementary::{Connection, ConnectionConfig, HostSpec, Options, ServiceDescriptor};

#[derive(Clone, PartialEq, prost::Message)]
struct Text {
    #[prost(string, tag = "1")]
    data: String,
}

#[derive(Clone, Debug, Parser)]
#[command(about = "Call Simple.echo and Simple.error on an RPC server")]
struct Args {
    /// Server host name or address
    #[arg(default_value = "localhost")]
    host: String,

    /// Server port
    #[arg(default_value_t = 8000)]
    port: u16,

    /// Path prefix in front of `/{service}/{method}`
    #[arg(default_value = "/rpc")]
    prefix: String,
}

fn main() -> Result<(), elementary::Error> {
    tracing_subscriber::fmt::init();

    let Args { host, port, prefix } = Args::parse();

    elementary::use_middleware(Trace::new, Options::new());

    let simple = ServiceDescriptor::new("Simple")
        .method::<Text>("echo")
        .method::<Text>("error");
    let connection = Connection::new(simple, ConnectionConfig::with_host(HostSpec::new(host, port, prefix)))?;

    // Both calls are in flight before we wait on either.
    let echo = connection.call("echo", Text { data: "hello".into() })?;
    let error = connection.call("error", Text { data: "hello".into() })?;

    match echo.value_as::<Text>() {
        Ok(reply) => println!("echo  → {}", reply.data),
        Err(e) => println!("echo  ✗ {e}"),
    }
    match error.value() {
        Ok(reply) => println!("error → unexpectedly ok: {reply:?}"),
        Err(e) => println!("error ✗ {e}"),
    }

    Ok(())
}
