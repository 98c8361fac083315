//! Registers one sender and one receiver with trivial loopback selectors and serves the
//! connection management API over HTTP. Stands in for the concrete SDP-driver factory
//! and device registry publishing that a real device would provide.

use clap::Parser;
use core::clock::SystemClock;
use core::registry::{Registry, Transport};
use core::transceiver::{ReceiverState, SenderState};
use http::AppState;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser)]
struct Args {
    /// Address to bind the HTTP server to.
    #[arg(long, env = "LOOPBACK_DRIVER_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    tracing_log::LogTracer::init()?;

    let args = Args::parse();

    let registry = Arc::new(Registry::new(Arc::new(SystemClock::new())));
    registry.add_sender("s-1", Transport::Rtp, SenderState::new(1, false, false))?;
    registry.add_receiver("r-1", Transport::Rtp, ReceiverState::new(1, false, false))?;

    tracing::info!(%args.bind, "registered sender 's-1' and receiver 'r-1'");

    let app = http::router(AppState { registry });

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!("listening on {}", args.bind);
    axum::serve(listener, app).await?;

    Ok(())
}
