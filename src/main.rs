use std::env;

use ferrodis::config::{ServerConfig, DEFAULT_CONFIG_FILE};
use ferrodis::server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    let config = ServerConfig::load(&config_path)?;

    info!("starting ferrodis on {}", config.addr());
    if config.append_only {
        info!("append-only persistence enabled ({})", config.append_filename);
    }

    let server = Server::bind(config).await?;
    server.run().await
}
