use anyhow::Result;
use taskboard::{Server, ServerConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskboard=info".into()),
        )
        .init();

    info!("Taskboard starting...");

    let config = ServerConfig::load()?;
    info!(
        tcp = %config.tcp_bind_addr(),
        udp = %config.udp_bind_addr(),
        db = %config.storage.db_path,
        "Configuration loaded"
    );

    let server = Server::bind(&config).await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await
}
