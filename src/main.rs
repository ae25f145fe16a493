use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use turnstile::api;
use turnstile::cli;
use turnstile::node::Node;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "turnstile=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse args and env vars
    let args = cli::Cli::parse();
    let settings = args.into_settings()?;

    // Socket server listen address setup
    let listen_address: IpAddr = settings.listen_address.parse()?;
    let socket_address = SocketAddr::from((listen_address, settings.listen_port));

    // Assemble the node and start supervision
    let node = Node::start(settings).await?;

    // Build Axum Router
    let api = api::api(node.clone()).await?;

    // Start server
    info!("Starting Turnstile on {}", socket_address);
    let listener = tokio::net::TcpListener::bind(socket_address).await?;
    axum::serve(listener, api.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Retire and unregister the singleton if this node owns it
    node.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
