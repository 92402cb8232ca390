//! Conversation sessions
//!
//! A session owns one conversation's history and drives the shared
//! [`ReasoningAgent`] one turn at a time. History is appended only after a
//! turn has produced its answer, so a failed, timed-out or cancelled turn
//! leaves it untouched.

use crate::agent::ReasoningAgent;
use crate::error::CopilotError;
use crate::models::{ConversationTurn, Role};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// First turn of every conversation history; distinct from the engine's
/// own instruction prompt.
pub const HISTORY_SYSTEM_PROMPT: &str = "You are a useful financial assistant.";
pub const GREETING: &str = "How can I help with your financial queries?";
pub const MISSING_KEY_PROMPT: &str = "Please add your Groq API key to continue.";

pub const SUGGESTED_QUESTIONS: &[&str] = &[
    "What are the analysts recommendations for Tesla?",
    "What did Uber's management team say about margins?",
    "What is the CAGR of Apple stock over the last 5 years?",
    "How did GOOGL perform from 2023-01-03 to 2023-01-04?",
];

/// Append-only list of turns, seeded with the system prompt and greeting.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn seeded(system_prompt: &str) -> Self {
        Self {
            turns: vec![
                ConversationTurn::system(system_prompt),
                ConversationTurn::assistant(GREETING),
            ],
        }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Turns a user should see (everything except system turns).
    pub fn visible(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter().filter(|t| t.role != Role::System)
    }

    fn record(&mut self, query: &str, answer: &str) {
        self.turns.push(ConversationTurn::user(query));
        self.turns.push(ConversationTurn::assistant(answer));
    }
}

pub struct ConversationSession {
    id: Uuid,
    history: ConversationHistory,
    agent: Arc<ReasoningAgent>,
    turn_timeout: Option<Duration>,
}

impl ConversationSession {
    pub fn new(agent: Arc<ReasoningAgent>) -> Self {
        Self::with_id(Uuid::new_v4(), agent)
    }

    pub fn with_id(id: Uuid, agent: Arc<ReasoningAgent>) -> Self {
        let history = ConversationHistory::seeded(HISTORY_SYSTEM_PROMPT);
        Self {
            id,
            history,
            agent,
            turn_timeout: None,
        }
    }

    pub fn with_turn_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.turn_timeout = timeout;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Run one turn and record it.
    pub async fn ask(&mut self, query: &str) -> Result<String> {
        let query = query.trim();
        let turn = self.agent.chat(query, self.history.turns());

        let answer = match self.turn_timeout {
            Some(limit) => tokio::time::timeout(limit, turn).await.map_err(|_| {
                CopilotError::AgentTermination(format!(
                    "the turn timed out after {}s",
                    limit.as_secs()
                ))
            })??,
            None => turn.await?,
        };

        self.history.record(query, &answer);
        info!(session_id = %self.id, turns = self.history.len(), "Turn recorded");

        Ok(answer)
    }

    /// Like [`ask`](Self::ask) but always yields text for the user.
    pub async fn respond(&mut self, query: &str) -> String {
        match self.ask(query).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Turn failed");
                user_message(&e)
            }
        }
    }
}

/// User-facing text for a failed turn.
pub fn user_message(error: &CopilotError) -> String {
    match error {
        CopilotError::CredentialMissing(crate::config::GROQ_API_KEY) => {
            MISSING_KEY_PROMPT.to_string()
        }
        CopilotError::AgentTermination(_) | CopilotError::Invocation(_) => error.to_string(),
        other => format!("Could not complete the request: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentConfig;
    use crate::market_data::MarketDataClient;
    use crate::reasoning::{ReasoningContext, ReasoningEngine, ReasoningStep};
    use crate::testing::{bar, tool_call, ScriptedEngine, StaticProvider};
    use crate::tools::{build_registry, FinancialToolset, FundamentalsClient, WebSearchTool};
    use async_trait::async_trait;
    use serde_json::json;

    fn agent_with(engine: Arc<dyn ReasoningEngine>, provider: StaticProvider) -> Arc<ReasoningAgent> {
        let toolset = FinancialToolset::new(MarketDataClient::new(Arc::new(provider)));
        let search = WebSearchTool::tavily("tvly-test", Duration::from_secs(1)).unwrap();
        let fundamentals = FundamentalsClient::yahoo(Duration::from_secs(1)).unwrap();
        Arc::new(ReasoningAgent::new(
            engine,
            Arc::new(build_registry(toolset, search, fundamentals)),
            AgentConfig::default(),
        ))
    }

    struct SlowEngine;

    #[async_trait]
    impl ReasoningEngine for SlowEngine {
        async fn next_step(&self, _context: &ReasoningContext<'_>) -> Result<ReasoningStep> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ReasoningStep::FinalAnswer("too late".to_string()))
        }
    }

    struct MissingKeyEngine;

    #[async_trait]
    impl ReasoningEngine for MissingKeyEngine {
        async fn next_step(&self, _context: &ReasoningContext<'_>) -> Result<ReasoningStep> {
            Err(CopilotError::CredentialMissing(crate::config::GROQ_API_KEY))
        }
    }

    #[test]
    fn test_new_session_is_seeded() {
        let engine = Arc::new(ScriptedEngine::new(vec![]));
        let session = ConversationSession::new(agent_with(engine, StaticProvider::empty()));

        let turns = session.history().turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], ConversationTurn::system("You are a useful financial assistant."));
        assert_eq!(turns[1], ConversationTurn::assistant(GREETING));
        // the engine's instruction is sent separately, never duplicated here
        assert_ne!(turns[0].content, session.agent.config().system_prompt);
        assert_eq!(session.history().visible().count(), 1);
    }

    #[tokio::test]
    async fn test_ask_appends_both_turns() {
        let engine = Arc::new(ScriptedEngine::new(vec![
            ReasoningStep::ToolCall(tool_call(
                "returns",
                json!({"ticker": "GOOGL", "start_date": "2023-01-03", "end_date": "2023-01-04"}),
            )),
            ReasoningStep::FinalAnswer("GOOGL returned 2.04%.".to_string()),
        ]));
        let mut session = ConversationSession::new(agent_with(
            engine,
            StaticProvider::with_bars(vec![bar("2023-01-03", 100.0, 98.0)]),
        ));

        let answer = session.ask("  GOOGL return on 2023-01-03?  ").await.unwrap();
        assert_eq!(answer, "GOOGL returned 2.04%.");

        let turns = session.history().turns();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[2], ConversationTurn::user("GOOGL return on 2023-01-03?"));
        assert_eq!(turns[3], ConversationTurn::assistant("GOOGL returned 2.04%."));
    }

    #[tokio::test]
    async fn test_no_data_turn_keeps_session_alive() {
        let engine = Arc::new(ScriptedEngine::new(vec![
            ReasoningStep::ToolCall(tool_call(
                "cagr",
                json!({"ticker": "MSFT", "start_date": "2040-01-01", "end_date": "2041-01-01"}),
            )),
            ReasoningStep::FinalAnswer("No data is available for that range.".to_string()),
            ReasoningStep::FinalAnswer("Anything else?".to_string()),
        ]));
        let mut session = ConversationSession::new(agent_with(engine.clone(), StaticProvider::empty()));

        session.ask("MSFT CAGR 2040?").await.unwrap();
        assert!(engine.last_observation().unwrap().contains("MSFT"));

        let next = session.ask("ok, thanks").await.unwrap();
        assert_eq!(next, "Anything else?");
        assert_eq!(session.history().len(), 6);
    }

    #[tokio::test]
    async fn test_failed_turn_leaves_history_untouched() {
        let mut session =
            ConversationSession::new(agent_with(Arc::new(MissingKeyEngine), StaticProvider::empty()));

        let reply = session.respond("What is Tesla's CAGR?").await;
        assert_eq!(reply, MISSING_KEY_PROMPT);
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_timeout() {
        let mut session =
            ConversationSession::new(agent_with(Arc::new(SlowEngine), StaticProvider::empty()))
                .with_turn_timeout(Some(Duration::from_secs(5)));

        let err = session.ask("slow question").await.unwrap_err();
        assert!(matches!(err, CopilotError::AgentTermination(_)));
        assert!(user_message(&err).starts_with("Could not complete the request"));
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            user_message(&CopilotError::CredentialMissing(crate::config::GROQ_API_KEY)),
            MISSING_KEY_PROMPT
        );
        assert!(user_message(&CopilotError::LlmError("boom".to_string()))
            .contains("boom"));
    }
}
