//! Investment Research Copilot
//!
//! A conversational assistant that answers financial questions by letting a
//! language model drive a fixed set of tools:
//! - Price history, period returns and CAGR computed from daily bars
//! - Company fundamentals (statements, profile, analyst views)
//! - Web search for news and commentary
//!
//! The model never computes figures itself; every number comes from a tool.
//!
//! TURN LOOP:
//! QUERY → REASON → (TOOL → OBSERVE → REASON)* → ANSWER

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod groq;
pub mod http;
pub mod market_data;
pub mod models;
pub mod reasoning;
pub mod session;
pub mod tools;
pub mod yahoo_auth;

#[cfg(test)]
mod testing;

pub use error::{CopilotError, Result};

// Re-export common types
pub use agent::{AgentConfig, AgentState, ReasoningAgent};
pub use config::CopilotConfig;
pub use models::*;
pub use session::{ConversationHistory, ConversationSession};
pub use tools::{ToolRegistry, ToolSpec};
