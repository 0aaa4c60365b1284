//! Tool invocation dispatcher.
//!
//! When the model finishes emitting arguments for a function call, the session
//! hands the request to [`ToolDispatcher::dispatch`]. The dispatcher resolves
//! the call against a registered [`ToolResolver`] and always produces exactly
//! one output payload: either the tool's JSON result or a `{"error": ...}`
//! fallback, so the conversation can continue in every case.

mod trip_price;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::realtime::{FunctionCallRequest, ToolDefinition};

pub use trip_price::{TRIP_PRICE_TOOL_NAME, TripPriceArguments, TripPriceTool};

/// Default time a resolver may take before a fallback result is sent.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_millis(5000);

/// Errors raised while resolving a tool call.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No resolver is registered under this name
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments do not match the tool's schema
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Resolver did not finish in time
    #[error("Tool timed out after {0}ms")]
    Timeout(u64),

    /// Resolver failed
    #[error("Tool failed: {0}")]
    ExecutionFailed(String),
}

/// Result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// A function the model can call mid-conversation.
#[async_trait]
pub trait ToolResolver: Send + Sync {
    /// Schema declared to the backend in the session configuration.
    fn definition(&self) -> ToolDefinition;

    /// Resolve raw JSON arguments to a JSON result.
    async fn resolve(&self, arguments: &str) -> ToolResult<serde_json::Value>;
}

/// One resolved function call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Call ID the output must reference
    pub call_id: String,
    /// Name of the tool that handled the call
    pub name: String,
    /// Arguments as sent by the model
    pub arguments: String,
    /// JSON text sent back as the function call output
    pub output: String,
    /// Whether `output` is a fallback error payload
    pub failed: bool,
}

/// Routes function calls to registered resolvers.
#[derive(Clone)]
pub struct ToolDispatcher {
    tools: HashMap<String, Arc<dyn ToolResolver>>,
    /// Used when the backend did not announce a function name
    default_tool: Option<String>,
    timeout: Duration,
}

impl ToolDispatcher {
    /// Create an empty dispatcher.
    pub fn new(timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            default_tool: None,
            timeout,
        }
    }

    /// Dispatcher with the built-in trip price tool registered as default.
    pub fn with_default_tools(timeout: Duration) -> Self {
        let mut dispatcher = Self::new(timeout);
        dispatcher.register(Arc::new(TripPriceTool));
        dispatcher
    }

    /// Register a resolver. The first one registered becomes the default.
    pub fn register(&mut self, resolver: Arc<dyn ToolResolver>) {
        let name = resolver.definition().function.name;
        if self.default_tool.is_none() {
            self.default_tool = Some(name.clone());
        }
        self.tools.insert(name, resolver);
    }

    /// Schemas of all registered tools, default tool first.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> =
            self.tools.values().map(|tool| tool.definition()).collect();
        definitions.sort_by(|a, b| {
            let a_default = Some(&a.function.name) == self.default_tool.as_ref();
            let b_default = Some(&b.function.name) == self.default_tool.as_ref();
            b_default
                .cmp(&a_default)
                .then_with(|| a.function.name.cmp(&b.function.name))
        });
        definitions
    }

    /// Resolve a function call. Never fails: errors become a fallback output.
    pub async fn dispatch(&self, request: &FunctionCallRequest) -> ToolInvocation {
        let name = if request.name.is_empty() {
            self.default_tool.clone().unwrap_or_default()
        } else {
            request.name.clone()
        };

        let (output, failed) = match self.resolve(&name, &request.arguments).await {
            Ok(result) => (result.to_string(), false),
            Err(e) => {
                warn!(
                    call_id = %request.call_id,
                    tool = %name,
                    error = %e,
                    "Tool call failed, sending fallback result"
                );
                (serde_json::json!({ "error": e.to_string() }).to_string(), true)
            }
        };

        info!(call_id = %request.call_id, tool = %name, output = %output, "Tool call resolved");

        ToolInvocation {
            call_id: request.call_id.clone(),
            name,
            arguments: request.arguments.clone(),
            output,
            failed,
        }
    }

    async fn resolve(&self, name: &str, arguments: &str) -> ToolResult<serde_json::Value> {
        let resolver = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        tokio::time::timeout(self.timeout, resolver.resolve(arguments))
            .await
            .map_err(|_| ToolError::Timeout(self.timeout.as_millis() as u64))?
    }
}

impl Default for ToolDispatcher {
    fn default() -> Self {
        Self::with_default_tools(DEFAULT_TOOL_TIMEOUT)
    }
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        f.debug_struct("ToolDispatcher")
            .field("tools", &names)
            .field("default_tool", &self.default_tool)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realtime::FunctionDefinition;

    struct SlowTool;

    #[async_trait]
    impl ToolResolver for SlowTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                tool_type: "function".to_string(),
                function: FunctionDefinition {
                    name: "slow".to_string(),
                    description: None,
                    parameters: None,
                },
            }
        }

        async fn resolve(&self, _arguments: &str) -> ToolResult<serde_json::Value> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(serde_json::json!({}))
        }
    }

    fn request(name: &str, arguments: &str) -> FunctionCallRequest {
        FunctionCallRequest {
            call_id: "call_1".to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
            item_id: None,
        }
    }

    fn error_message(output: &str) -> String {
        let value: serde_json::Value = serde_json::from_str(output).unwrap();
        value["error"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_trip_price_in_range() {
        let dispatcher = ToolDispatcher::default();
        let invocation = dispatcher
            .dispatch(&request(
                TRIP_PRICE_TOOL_NAME,
                r#"{"start":"Berlin","ziel":"Hamburg","verkehrsmittel":"Zug","dauer":20}"#,
            ))
            .await;

        assert_eq!(invocation.call_id, "call_1");
        assert!(!invocation.failed);
        let output: serde_json::Value = serde_json::from_str(&invocation.output).unwrap();
        let preis = output["preis"].as_u64().unwrap();
        assert!(preis <= 200);
    }

    #[tokio::test]
    async fn test_missing_name_uses_default_tool() {
        let dispatcher = ToolDispatcher::default();
        let invocation = dispatcher
            .dispatch(&request(
                "",
                r#"{"start":"A","ziel":"B","verkehrsmittel":"Bus","dauer":0}"#,
            ))
            .await;

        assert_eq!(invocation.name, TRIP_PRICE_TOOL_NAME);
        assert_eq!(invocation.output, r#"{"preis":0}"#);
    }

    #[tokio::test]
    async fn test_unknown_tool_yields_fallback() {
        let dispatcher = ToolDispatcher::default();
        let invocation = dispatcher.dispatch(&request("wetter", "{}")).await;

        assert!(invocation.failed);
        assert!(error_message(&invocation.output).contains("wetter"));
    }

    #[tokio::test]
    async fn test_invalid_arguments_yield_fallback() {
        let dispatcher = ToolDispatcher::default();
        let invocation = dispatcher
            .dispatch(&request(TRIP_PRICE_TOOL_NAME, r#"{"start":"A"}"#))
            .await;

        assert!(invocation.failed);
        assert!(error_message(&invocation.output).starts_with("Invalid arguments"));
    }

    #[tokio::test]
    async fn test_timeout_yields_fallback() {
        let mut dispatcher = ToolDispatcher::new(Duration::from_millis(20));
        dispatcher.register(Arc::new(SlowTool));

        let invocation = dispatcher.dispatch(&request("slow", "{}")).await;
        assert!(invocation.failed);
        assert_eq!(
            error_message(&invocation.output),
            "Tool timed out after 20ms"
        );
    }

    #[test]
    fn test_definitions_put_default_first() {
        let mut dispatcher = ToolDispatcher::with_default_tools(DEFAULT_TOOL_TIMEOUT);
        dispatcher.register(Arc::new(SlowTool));

        let names: Vec<String> = dispatcher
            .definitions()
            .into_iter()
            .map(|d| d.function.name)
            .collect();
        assert_eq!(names, vec![TRIP_PRICE_TOOL_NAME.to_string(), "slow".to_string()]);
    }
}
