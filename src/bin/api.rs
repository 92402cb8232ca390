use investment_copilot::{agent::ReasoningAgent, api::start_server, config::CopilotConfig};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = CopilotConfig::from_env()?;

    if let Err(e) = config.require_reasoning_key() {
        warn!("{}; chat requests will be refused", e);
    }

    info!("Investment Copilot - API Server");
    info!("Port: {}", config.port);

    let agent = match ReasoningAgent::from_config(&config) {
        Ok(agent) => Arc::new(agent),
        Err(e) => {
            error!("Failed to initialize agent: {}", e);
            return Err(e.into());
        }
    };

    info!(tools = ?agent.registry().list(), "Agent initialized");

    // Start API server
    start_server(agent, &config).await?;

    Ok(())
}
