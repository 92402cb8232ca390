use investment_copilot::{
    agent::ReasoningAgent,
    config::CopilotConfig,
    session::{ConversationSession, GREETING, MISSING_KEY_PROMPT, SUGGESTED_QUESTIONS},
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = CopilotConfig::from_env()?;
    info!(model = %config.model, max_iterations = config.max_iterations, "Investment copilot starting");

    let agent = match ReasoningAgent::from_config(&config) {
        Ok(agent) => Arc::new(agent),
        Err(e) => {
            eprintln!("Failed to start: {}", e);
            return Err(e.into());
        }
    };

    let mut session = ConversationSession::new(agent).with_turn_timeout(config.turn_timeout);
    let mut stdout = tokio::io::stdout();

    println!("Investment Research Copilot");
    println!("Try asking:");
    for question in SUGGESTED_QUESTIONS {
        println!("  - {}", question);
    }
    println!("\nassistant> {}", GREETING);

    if config.require_reasoning_key().is_err() {
        println!("{}", MISSING_KEY_PROMPT);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        stdout.write_all(b"\nyou> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();

        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("exit") || query.eq_ignore_ascii_case("quit") {
            break;
        }

        let reply = session.respond(query).await;
        println!("assistant> {}", reply);
    }

    info!(turns = session.history().len(), "Session closed");
    Ok(())
}
