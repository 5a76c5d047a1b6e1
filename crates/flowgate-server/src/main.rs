use anyhow::{Context, Result};
use flowgate_server::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    let config = ServerConfig::load().context("Failed to load configuration")?;

    flowgate_monitoring::init(&config.monitoring_config()).context("Failed to initialize monitoring")?;

    flowgate_server::run(config).await.context("Server error")?;

    Ok(())
}
