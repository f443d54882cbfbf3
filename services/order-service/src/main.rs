use anyhow::Result;

use common::config::Config;
use common::telemetry::init_telemetry;

mod app;
mod error;
mod handlers;
mod routes;
mod state;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yml".to_string());
    let cfg = Config::load(&config_path)?;

    init_telemetry(cfg.log.mode);

    tracing::info!(config = %config_path, "starting order service");

    let app = app::App::new(cfg).await?;
    app.run().await
}
