//! Reasoning engine seam
//!
//! The engine is the language model that decides what to do next. It sees
//! the conversation, the tool specs and every (call, observation) exchange
//! of the current turn, and answers with either a tool call or a final
//! answer. It never executes tools itself.

use crate::models::{ConversationTurn, ToolCall};
use crate::tools::ToolSpec;
use crate::Result;
use async_trait::async_trait;

pub mod groq;
pub use groq::GroqEngine;

/// One tool round of the current turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub call: ToolCall,
    pub observation: String,
}

/// Everything the engine may look at when choosing the next step.
#[derive(Debug, Clone, Copy)]
pub struct ReasoningContext<'a> {
    pub system_prompt: &'a str,
    pub history: &'a [ConversationTurn],
    pub query: &'a str,
    pub tools: &'a [ToolSpec],
    pub scratchpad: &'a [Exchange],
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReasoningStep {
    ToolCall(ToolCall),
    FinalAnswer(String),
}

/// Trait for next-step selection (LLM controlled)
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn next_step(&self, context: &ReasoningContext<'_>) -> Result<ReasoningStep>;
}
