//! Reasoning agent - implements the tool loop
//!
//! AWAITING INPUT → REASON → (TOOL SELECTED → OBSERVE → REASON)* → ANSWER → DONE

use crate::config::CopilotConfig;
use crate::error::CopilotError;
use crate::groq::GroqClient;
use crate::models::{ConversationTurn, ToolOutcome};
use crate::reasoning::{Exchange, GroqEngine, ReasoningContext, ReasoningEngine, ReasoningStep};
use crate::tools::{create_default_registry, ToolRegistry, ToolSpec};
use crate::Result;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const PARTIAL_OBSERVATION_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    AwaitingInput,
    Reasoning,
    ToolSelected,
    Observing,
    Answering,
    Done,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentState::AwaitingInput => "AWAITING_INPUT",
            AgentState::Reasoning => "REASONING",
            AgentState::ToolSelected => "TOOL_SELECTED",
            AgentState::Observing => "OBSERVING",
            AgentState::Answering => "ANSWERING",
            AgentState::Done => "DONE",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Tool rounds allowed per query before a best-effort answer is given
    pub max_iterations: usize,
    pub system_prompt: String,
}

impl From<&CopilotConfig> for AgentConfig {
    fn from(config: &CopilotConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            system_prompt: config.system_prompt.clone(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig::from(&CopilotConfig::default())
    }
}

/// Outcome of one `chat` turn
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub answer: String,
    /// False when the loop bound cut the turn short
    pub complete: bool,
    pub exchanges: Vec<Exchange>,
    pub states: Vec<AgentState>,
    pub execution_time_ms: u64,
}

/// Runs the reasoning loop for one query at a time.
///
/// Holds no per-conversation state: the history is borrowed for the
/// duration of a turn, so one agent can serve any number of sessions.
pub struct ReasoningAgent {
    engine: Arc<dyn ReasoningEngine>,
    registry: Arc<ToolRegistry>,
    specs: Vec<ToolSpec>,
    config: AgentConfig,
}

struct StateTrace {
    states: Vec<AgentState>,
}

impl StateTrace {
    fn new() -> Self {
        Self {
            states: vec![AgentState::AwaitingInput],
        }
    }

    fn enter(&mut self, next: AgentState) {
        if let Some(current) = self.states.last() {
            debug!(from = %current, to = %next, "Agent state transition");
        }
        self.states.push(next);
    }
}

impl ReasoningAgent {
    pub fn new(
        engine: Arc<dyn ReasoningEngine>,
        registry: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        let specs = registry.specs();
        Self {
            engine,
            registry,
            specs,
            config,
        }
    }

    /// Production wiring: default registry plus the Groq engine.
    ///
    /// Fails when the search credential is missing; a missing reasoning key
    /// only fails individual turns.
    pub fn from_config(config: &CopilotConfig) -> Result<Self> {
        let registry = Arc::new(create_default_registry(config)?);
        let client = GroqClient::new(
            config.groq_api_key.clone(),
            &config.model,
            config.http_timeout,
        )?;

        if !client.has_api_key() {
            warn!("GROQ_API_KEY not set; queries will be refused until it is provided");
        }
        info!(model = client.model(), "Reasoning engine configured");

        Ok(Self::new(
            Arc::new(GroqEngine::new(client)),
            registry,
            AgentConfig::from(config),
        ))
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Answer `query` given the prior conversation.
    pub async fn chat(&self, query: &str, history: &[ConversationTurn]) -> Result<String> {
        self.run(query, history).await.map(|reply| reply.answer)
    }

    /// Like [`chat`](Self::chat) but returns the full trace of the turn.
    pub async fn run(&self, query: &str, history: &[ConversationTurn]) -> Result<AgentReply> {
        let start_time = Instant::now();
        let query = query.trim();
        if query.is_empty() {
            return Err(CopilotError::Invocation("query must not be empty".to_string()));
        }

        info!(
            history_turns = history.len(),
            max_iterations = self.config.max_iterations,
            "Agent: starting turn"
        );

        let mut trace = StateTrace::new();
        let mut exchanges: Vec<Exchange> = Vec::new();
        let mut outcomes: Vec<ToolOutcome> = Vec::new();

        loop {
            trace.enter(AgentState::Reasoning);

            let context = ReasoningContext {
                system_prompt: &self.config.system_prompt,
                history,
                query,
                tools: &self.specs,
                scratchpad: &exchanges,
            };

            let mut call = match self.engine.next_step(&context).await? {
                ReasoningStep::FinalAnswer(answer) => {
                    trace.enter(AgentState::Answering);
                    info!(
                        tool_rounds = exchanges.len(),
                        "Agent: final answer produced"
                    );
                    trace.enter(AgentState::Done);

                    return Ok(AgentReply {
                        answer,
                        complete: true,
                        exchanges,
                        states: trace.states,
                        execution_time_ms: start_time.elapsed().as_millis() as u64,
                    });
                }
                ReasoningStep::ToolCall(call) => call,
            };

            if exchanges.len() >= self.config.max_iterations {
                warn!(
                    max_iterations = self.config.max_iterations,
                    tool_name = %call.name,
                    "Agent: iteration limit reached, answering with partial results"
                );
                trace.enter(AgentState::Answering);
                let answer = self.partial_answer(&exchanges, &outcomes)?;
                trace.enter(AgentState::Done);

                return Ok(AgentReply {
                    answer,
                    complete: false,
                    exchanges,
                    states: trace.states,
                    execution_time_ms: start_time.elapsed().as_millis() as u64,
                });
            }

            trace.enter(AgentState::ToolSelected);
            if call.id.is_empty() {
                call.id = format!("call_{}", exchanges.len());
            }
            debug!(
                iteration = exchanges.len() + 1,
                tool_name = %call.name,
                arguments = %call.arguments,
                "Agent: invoking tool"
            );

            let outcome = self.registry.invoke(&call).await;

            trace.enter(AgentState::Observing);
            if let Some(kind) = outcome.failure_kind() {
                debug!(tool_name = %call.name, ?kind, "Agent: tool reported failure");
            }

            exchanges.push(Exchange {
                call,
                observation: outcome.observation(),
            });
            outcomes.push(outcome);
        }
    }

    /// Best-effort answer from the successful observations of a cut-short
    /// turn.
    fn partial_answer(&self, exchanges: &[Exchange], outcomes: &[ToolOutcome]) -> Result<String> {
        let findings: Vec<String> = exchanges
            .iter()
            .zip(outcomes)
            .filter(|(_, outcome)| outcome.is_success())
            .map(|(exchange, _)| {
                let observation: String = exchange
                    .observation
                    .chars()
                    .take(PARTIAL_OBSERVATION_CHARS)
                    .collect();
                format!(
                    "- {}({}): {}",
                    exchange.call.name, exchange.call.arguments, observation
                )
            })
            .collect();

        if findings.is_empty() {
            return Err(CopilotError::AgentTermination(format!(
                "no usable result after {} tool steps",
                self.config.max_iterations
            )));
        }

        Ok(format!(
            "Sorry, I could not finish researching this within {} tool steps. \
             Here is what I found so far:\n{}",
            self.config.max_iterations,
            findings.join("\n")
        ))
    }
}
