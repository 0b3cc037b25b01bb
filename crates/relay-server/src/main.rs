use relay_server::config::RelayConfig;
use relay_server::{build_relay, observability, routes};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = RelayConfig::load();
    observability::init_observability();

    let relay = build_relay(&config).await?;
    let root = config.root_prefix();
    let router = routes::create_router(relay, &root);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!(
        event = "relay.listening",
        addr = %listener.local_addr()?,
        root_path = %root,
        cancel_on_disconnect = config.cancel_on_disconnect,
        "relay server listening"
    );
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!(event = "relay.stopped", "relay server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
