use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use openai_realtime::types::tools::{FunctionTool, Tool};
use openai_realtime::ToolDispatch;

mod scheduling;
mod ticketing;

pub use scheduling::AppointmentScheduler;
pub use ticketing::TicketCreator;

/// How long a handler may run before its call is answered with an error
/// instead. The provider waits indefinitely for a function result, so a hung
/// backend must not hang the conversation with it.
const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("missing required argument: {0}")]
    MissingArgument(String),

    #[error("invalid argument {0}: {1}")]
    InvalidArgument(String, String),

    #[error("{0}")]
    Execution(String),
}

/// One named backend action. Handlers declare their schema and required
/// argument names up front so the registry can advertise and validate them
/// without knowing anything about the action itself.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn definition(&self) -> FunctionTool;

    fn required_arguments(&self) -> &'static [&'static str];

    async fn execute(&self, arguments: &serde_json::Value) -> Result<serde_json::Value, ToolError>;
}

/// Maps tool names to handlers. New tools plug in through `register`;
/// neither the bridge nor the session client changes when the table grows.
pub struct ToolRegistry {
    timeout: Duration,
    tools: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_HANDLER_TIMEOUT,
            tools: HashMap::new(),
        }
    }

    /// The registry with the built-in scheduling and ticketing actions.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AppointmentScheduler));
        registry.register(Arc::new(TicketCreator));
        registry
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.definition().name().to_string();
        if self.tools.insert(name.clone(), handler).is_some() {
            tracing::warn!("tool {} re-registered, previous handler replaced", name);
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolDispatch for ToolRegistry {
    fn catalog(&self) -> Vec<Tool> {
        self.tools
            .values()
            .map(|handler| Tool::Function(handler.definition()))
            .collect()
    }

    async fn dispatch(&self, name: &str, arguments: serde_json::Value) -> serde_json::Value {
        let Some(handler) = self.tools.get(name) else {
            tracing::warn!("unknown function: {}", name);
            return serde_json::json!({ "error": "Unknown function" });
        };

        for required in handler.required_arguments() {
            let missing = arguments
                .get(required)
                .map_or(true, serde_json::Value::is_null);
            if missing {
                let error = ToolError::MissingArgument(required.to_string());
                tracing::warn!("rejecting call to {}: {}", name, error);
                return serde_json::json!({ "error": error.to_string() });
            }
        }

        match tokio::time::timeout(self.timeout, handler.execute(&arguments)).await {
            Err(_) => {
                tracing::error!("tool {} timed out after {:?}", name, self.timeout);
                serde_json::json!({ "error": format!("{name} did not complete in time") })
            }
            Ok(Err(e)) => {
                tracing::warn!("tool {} failed: {}", name, e);
                serde_json::json!({ "error": e.to_string() })
            }
            Ok(Ok(result)) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowTool;

    #[async_trait]
    impl ToolHandler for SlowTool {
        fn definition(&self) -> FunctionTool {
            FunctionTool::new("slow_tool", "Never finishes", serde_json::json!({"type": "object"}))
        }

        fn required_arguments(&self) -> &'static [&'static str] {
            &[]
        }

        async fn execute(
            &self,
            _arguments: &serde_json::Value,
        ) -> Result<serde_json::Value, ToolError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(serde_json::json!({ "success": true }))
        }
    }

    #[tokio::test]
    async fn unknown_function_yields_structured_error() {
        let registry = ToolRegistry::builtin();
        let result = registry
            .dispatch("transfer_funds", serde_json::json!({}))
            .await;
        assert_eq!(result, serde_json::json!({ "error": "Unknown function" }));
    }

    #[tokio::test]
    async fn missing_required_argument_is_rejected_before_execution() {
        let registry = ToolRegistry::builtin();
        let result = registry
            .dispatch(
                "schedule_appointment",
                serde_json::json!({ "customer_name": "Lena" }),
            )
            .await;
        let error = result["error"].as_str().unwrap();
        assert!(error.contains("missing required argument"), "got: {error}");
    }

    #[tokio::test]
    async fn schedule_appointment_returns_confirmation() {
        let registry = ToolRegistry::builtin();
        let result = registry
            .dispatch(
                "schedule_appointment",
                serde_json::json!({
                    "customer_name": "Lena",
                    "date": "2025-01-10",
                    "time": "10:00",
                    "purpose": "demo"
                }),
            )
            .await;
        assert_eq!(result["success"], true);
        assert!(!result["appointment_id"].as_str().unwrap().is_empty());
        assert!(result["message"].as_str().unwrap().contains("Lena"));
    }

    #[tokio::test]
    async fn create_support_ticket_returns_confirmation() {
        let registry = ToolRegistry::builtin();
        let result = registry
            .dispatch(
                "create_support_ticket",
                serde_json::json!({
                    "customer_name": "Jordan",
                    "issue": "cannot log in",
                    "priority": "high"
                }),
            )
            .await;
        assert_eq!(result["success"], true);
        assert!(result["ticket_id"].as_str().unwrap().starts_with("TICKET-"));
        assert!(result["message"].as_str().unwrap().contains("Jordan"));
    }

    #[tokio::test]
    async fn wrongly_typed_argument_is_an_error_result() {
        let registry = ToolRegistry::builtin();
        let result = registry
            .dispatch(
                "create_support_ticket",
                serde_json::json!({ "customer_name": 7, "issue": "x" }),
            )
            .await;
        assert!(result["error"].as_str().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn handler_timeout_becomes_error_result() {
        let mut registry = ToolRegistry::new().with_timeout(Duration::from_millis(50));
        registry.register(Arc::new(SlowTool));
        let result = registry.dispatch("slow_tool", serde_json::json!({})).await;
        let error = result["error"].as_str().unwrap();
        assert!(error.contains("did not complete in time"), "got: {error}");
    }

    #[test]
    fn catalog_advertises_every_registered_tool() {
        let registry = ToolRegistry::builtin();
        let mut names: Vec<String> = registry
            .catalog()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["create_support_ticket", "schedule_appointment"]);
    }
}
