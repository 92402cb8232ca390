//! Tool trait and registry
//!
//! Every tool declares a typed parameter list. The registry validates the
//! engine's arguments against it before dispatching, so tools only ever see
//! well-formed [`ToolArgs`]. Tools never fail: errors come back as
//! [`ToolOutcome::Failure`].

use crate::config::CopilotConfig;
use crate::error::CopilotError;
use crate::market_data::{MarketDataClient, YahooChartProvider};
use crate::models::{FailureKind, ToolCall, ToolOutcome};
use crate::Result;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub mod financial;
pub mod fundamentals;
pub mod search;

pub use financial::{FinancialFunction, FinancialTool, FinancialToolset};
pub use fundamentals::{FundamentalsClient, FundamentalsSection, FundamentalsTool};
pub use search::WebSearchTool;

//
// ================= Specs =================
//

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub description: &'static str,
    pub required: bool,
}

impl ParamSpec {
    pub const fn string(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            param_type: ParamType::String,
            description,
            required: true,
        }
    }

    pub const fn optional_integer(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            param_type: ParamType::Integer,
            description,
            required: false,
        }
    }
}

/// What the reasoning engine is told about a tool.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Vec<ParamSpec>,
}

impl ToolSpec {
    /// JSON Schema of the parameter object.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.parameters {
            properties.insert(
                param.name.to_string(),
                json!({
                    "type": param.param_type,
                    "description": param.description,
                }),
            );
        }

        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

//
// ================= Arguments =================
//

/// Arguments that passed validation against a [`ToolSpec`].
#[derive(Debug, Clone, Default)]
pub struct ToolArgs {
    values: HashMap<String, Value>,
}

impl ToolArgs {
    pub fn validate(spec: &ToolSpec, arguments: &Value) -> Result<Self> {
        let empty = Map::new();
        let object = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(CopilotError::Invocation(format!(
                    "arguments for '{}' must be a JSON object, got {}",
                    spec.name, other
                )))
            }
        };

        let unexpected: Vec<&str> = object
            .keys()
            .filter(|key| !spec.parameters.iter().any(|p| p.name == key.as_str()))
            .map(String::as_str)
            .collect();
        if !unexpected.is_empty() {
            return Err(CopilotError::Invocation(format!(
                "unexpected argument(s) for '{}': {}",
                spec.name,
                unexpected.join(", ")
            )));
        }

        let mut values = HashMap::with_capacity(spec.parameters.len());

        for param in &spec.parameters {
            let value = match object.get(param.name) {
                None | Some(Value::Null) if param.required => {
                    return Err(CopilotError::Invocation(format!(
                        "missing required argument '{}' for '{}'",
                        param.name, spec.name
                    )))
                }
                None | Some(Value::Null) => continue,
                Some(value) => value,
            };

            let well_typed = match param.param_type {
                ParamType::String => value.is_string(),
                ParamType::Integer => value.is_i64() || value.is_u64(),
            };
            if !well_typed {
                return Err(CopilotError::Invocation(format!(
                    "argument '{}' for '{}' must be of type {:?}, got {}",
                    param.name, spec.name, param.param_type, value
                )));
            }

            values.insert(param.name.to_string(), value.clone());
        }

        Ok(Self { values })
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        self.values
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| CopilotError::Invocation(format!("missing string argument '{}'", name)))
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }
}

//
// ================= Tool trait =================
//

/// A callable tool exposed to the reasoning engine
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> &ToolSpec;

    fn name(&self) -> &'static str {
        self.spec().name
    }

    async fn execute(&self, args: &ToolArgs) -> ToolOutcome;
}

//
// ================= Registry =================
//

/// Dispatch table from tool name to tool, in registration order.
///
/// Built once at startup and shared read-only through an `Arc`.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool; a tool with the same name is replaced in place.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name();
        match self.index.get(name) {
            Some(&position) => self.tools[position] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| self.tools[i].clone())
    }

    pub fn list(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate and run one call. Unknown names and bad arguments come back
    /// as invocation failures.
    pub async fn invoke(&self, call: &ToolCall) -> ToolOutcome {
        let Some(tool) = self.get(&call.name) else {
            warn!(tool_name = %call.name, "Unknown tool requested");
            return ToolOutcome::failure(
                FailureKind::Invocation,
                format!(
                    "Error: unknown tool '{}'. Available tools: {}",
                    call.name,
                    self.list().join(", ")
                ),
            );
        };

        let args = match ToolArgs::validate(tool.spec(), &call.arguments) {
            Ok(args) => args,
            Err(e) => {
                warn!(tool_name = %call.name, error = %e, "Rejected tool arguments");
                return ToolOutcome::failure(FailureKind::Invocation, format!("Error: {}", e));
            }
        };

        let start = Instant::now();
        let outcome = tool.execute(&args).await;

        debug!(
            tool_name = %call.name,
            success = outcome.is_success(),
            execution_time_ms = start.elapsed().as_millis() as u64,
            "Tool executed"
        );

        outcome
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register the copilot's tools in their fixed order.
///
/// Provider sections that duplicate a custom tool are left out.
pub fn build_registry(
    toolset: FinancialToolset,
    search: WebSearchTool,
    fundamentals: FundamentalsClient,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(FinancialTool::new(
        FinancialFunction::PriceHistory,
        toolset.clone(),
    )));
    registry.register(Arc::new(FinancialTool::new(
        FinancialFunction::Today,
        toolset.clone(),
    )));
    registry.register(Arc::new(FinancialTool::new(
        FinancialFunction::Returns,
        toolset.clone(),
    )));
    registry.register(Arc::new(search));
    registry.register(Arc::new(FinancialTool::new(FinancialFunction::Cagr, toolset)));

    let fundamentals = Arc::new(fundamentals);
    for section in FundamentalsSection::ALL
        .iter()
        .copied()
        .filter(|s| !s.is_redundant())
    {
        registry.register(Arc::new(FundamentalsTool::new(section, fundamentals.clone())));
    }

    registry
}

/// Create the production registry: Yahoo Finance for prices and
/// fundamentals, Tavily for search.
///
/// Fails with `CredentialMissing` when no search key is configured.
pub fn create_default_registry(config: &CopilotConfig) -> Result<ToolRegistry> {
    let search_key = config.require_search_key()?;

    let provider = YahooChartProvider::new(config.http_timeout)?;
    let toolset = FinancialToolset::new(MarketDataClient::new(Arc::new(provider)));
    let search = WebSearchTool::tavily(search_key, config.http_timeout)?;
    let fundamentals = FundamentalsClient::yahoo(config.http_timeout)?;

    let registry = build_registry(toolset, search, fundamentals);
    info!(tools = ?registry.list(), "Tool registry initialized");

    Ok(registry)
}
