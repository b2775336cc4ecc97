use anyhow::Context;
use bookinghse::{config::AppConfig, start_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    start_server(config).await.context("Server error")?;
    Ok(())
}
