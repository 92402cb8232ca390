//! Groq-backed reasoning engine using native function calling

use super::{ReasoningContext, ReasoningEngine, ReasoningStep};
use crate::error::CopilotError;
use crate::groq::{ChatMessage, GroqClient, ToolDefinition, WireFunctionCall, WireToolCall};
use crate::models::{Role, ToolCall};
use crate::tools::ToolSpec;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

const TOOL_GUIDANCE: &str = "Use the available tools for any price, return, growth or \
company figure instead of guessing. Dates are YYYY-MM-DD and end dates are exclusive; \
call get_date when the question is relative to today. If a tool reports an error, \
adjust the arguments, try another tool, or explain the limitation in your answer.";

pub struct GroqEngine {
    client: GroqClient,
}

impl GroqEngine {
    pub fn new(client: GroqClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReasoningEngine for GroqEngine {
    async fn next_step(&self, context: &ReasoningContext<'_>) -> Result<ReasoningStep> {
        let messages = build_messages(context);
        let tools = tool_definitions(context.tools);

        debug!(
            messages = messages.len(),
            tools = tools.len(),
            exchanges = context.scratchpad.len(),
            "Requesting next step"
        );

        let reply = self.client.complete(messages, tools).await?;
        parse_step(reply)
    }
}

fn tool_definitions(specs: &[ToolSpec]) -> Vec<ToolDefinition> {
    specs
        .iter()
        .map(|spec| ToolDefinition::function(spec.name, spec.description, spec.input_schema()))
        .collect()
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn build_messages(context: &ReasoningContext<'_>) -> Vec<ChatMessage> {
    let mut messages =
        Vec::with_capacity(context.history.len() + context.scratchpad.len() * 2 + 2);

    messages.push(ChatMessage::text(
        "system",
        format!("{}\n\n{}", context.system_prompt, TOOL_GUIDANCE),
    ));

    for turn in context.history {
        messages.push(ChatMessage::text(role_name(turn.role), turn.content.clone()));
    }

    messages.push(ChatMessage::text("user", context.query));

    for exchange in context.scratchpad {
        messages.push(ChatMessage::assistant_tool_call(WireToolCall {
            id: exchange.call.id.clone(),
            kind: "function".to_string(),
            function: WireFunctionCall {
                name: exchange.call.name.clone(),
                arguments: exchange.call.arguments.to_string(),
            },
        }));
        messages.push(ChatMessage::tool_result(
            &exchange.call.id,
            exchange.observation.clone(),
        ));
    }

    messages
}

fn parse_step(reply: ChatMessage) -> Result<ReasoningStep> {
    let mut calls = reply.tool_calls.unwrap_or_default();

    if !calls.is_empty() {
        if calls.len() > 1 {
            warn!(
                requested = calls.len(),
                "Engine requested parallel tool calls, running the first only"
            );
        }
        let call = calls.swap_remove(0);

        // Malformed argument JSON is kept as a string so validation reports it.
        let arguments = if call.function.arguments.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&call.function.arguments)
                .unwrap_or(Value::String(call.function.arguments.clone()))
        };

        return Ok(ReasoningStep::ToolCall(ToolCall {
            id: call.id,
            name: call.function.name,
            arguments,
        }));
    }

    match reply.content {
        Some(text) if !text.trim().is_empty() => Ok(ReasoningStep::FinalAnswer(text.trim().to_string())),
        _ => Err(CopilotError::LlmError(
            "engine returned neither a tool call nor an answer".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConversationTurn;
    use crate::reasoning::Exchange;
    use serde_json::json;

    fn wire_call(id: &str, name: &str, arguments: &str) -> WireToolCall {
        WireToolCall {
            id: id.to_string(),
            kind: "function".to_string(),
            function: WireFunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }

    #[test]
    fn test_build_messages_layout() {
        let history = vec![
            ConversationTurn::system("You are a useful financial assistant."),
            ConversationTurn::assistant("How can I help with your financial queries?"),
        ];
        let scratchpad = vec![Exchange {
            call: ToolCall {
                id: "call_0".to_string(),
                name: "get_date".to_string(),
                arguments: json!({}),
            },
            observation: "2024-05-01".to_string(),
        }];
        let context = ReasoningContext {
            system_prompt: "You're a helpful assistant.",
            history: &history,
            query: "What is today's date?",
            tools: &[],
            scratchpad: &scratchpad,
        };

        let messages = build_messages(&context);
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "system", "assistant", "user", "assistant", "tool"]);
        assert!(messages[0]
            .content
            .as_deref()
            .unwrap()
            .starts_with("You're a helpful assistant."));
        assert_eq!(messages[4].tool_calls.as_ref().unwrap()[0].function.arguments, "{}");
        assert_eq!(messages[5].tool_call_id.as_deref(), Some("call_0"));
        assert_eq!(messages[5].content.as_deref(), Some("2024-05-01"));
    }

    #[test]
    fn test_parse_tool_call() {
        let reply = ChatMessage {
            role: "assistant".to_string(),
            content: None,
            tool_calls: Some(vec![
                wire_call("call_a", "returns", r#"{"ticker":"GOOGL","start_date":"2023-01-03","end_date":"2023-01-04"}"#),
                wire_call("call_b", "get_date", "{}"),
            ]),
            tool_call_id: None,
        };

        let ReasoningStep::ToolCall(call) = parse_step(reply).unwrap() else {
            panic!("expected a tool call");
        };
        assert_eq!(call.id, "call_a");
        assert_eq!(call.name, "returns");
        assert_eq!(call.arguments["ticker"], "GOOGL");
    }

    #[test]
    fn test_parse_malformed_arguments_kept_as_string() {
        let reply = ChatMessage {
            role: "assistant".to_string(),
            content: None,
            tool_calls: Some(vec![wire_call("call_a", "returns", "ticker=GOOGL")]),
            tool_call_id: None,
        };

        let ReasoningStep::ToolCall(call) = parse_step(reply).unwrap() else {
            panic!("expected a tool call");
        };
        assert_eq!(call.arguments, Value::String("ticker=GOOGL".to_string()));
    }

    #[test]
    fn test_parse_final_answer_and_empty_reply() {
        let answer = parse_step(ChatMessage::text("assistant", "  GOOGL returned 2.04%.  ")).unwrap();
        assert_eq!(answer, ReasoningStep::FinalAnswer("GOOGL returned 2.04%.".to_string()));

        let empty = parse_step(ChatMessage::text("assistant", "")).unwrap_err();
        assert!(matches!(empty, CopilotError::LlmError(_)));
    }

    #[test]
    fn test_tool_definitions_carry_schema() {
        use crate::tools::FinancialFunction;

        let defs = tool_definitions(&[FinancialFunction::Cagr.spec().clone()]);
        let value = serde_json::to_value(&defs).unwrap();
        assert_eq!(value[0]["function"]["name"], "cagr");
        assert_eq!(value[0]["function"]["parameters"]["required"][0], "ticker");
    }
}
