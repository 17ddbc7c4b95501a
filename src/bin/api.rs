use retirement_advisor::{api::start_server, config::AdvisorConfig, session::SessionManager};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    let config = AdvisorConfig::from_env()?;
    info!(
        port = api_port,
        inflation_rate = config.inflation_rate,
        withdrawal_rule = config.withdrawal_rule,
        "Retirement advisor API starting"
    );

    let manager = Arc::new(SessionManager::from_env(config)?);

    start_server(manager, api_port).await?;

    Ok(())
}
