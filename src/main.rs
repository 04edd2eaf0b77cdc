use cinnabar::server::{CinnabarServer, ServerConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    info!("Cinnabar server starting...");

    let config = ServerConfig::default();

    info!("Server will bind to {}", config.addr());
    info!("AOF enabled: {}", config.aof_enabled);

    let server = CinnabarServer::bind(config).await?;
    server.run().await?;

    Ok(())
}
