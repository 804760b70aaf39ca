use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use openai_realtime::types::tools::FunctionTool;

use super::{ToolError, ToolHandler};

/// Opens a ticket in the support backend and confirms it to the caller.
pub struct TicketCreator;

#[async_trait]
impl ToolHandler for TicketCreator {
    fn definition(&self) -> FunctionTool {
        FunctionTool::new(
            "create_support_ticket",
            "Creates a support ticket for the customer",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "customer_name": { "type": "string" },
                    "issue": { "type": "string" },
                    "priority": { "type": "string", "enum": ["low", "medium", "high"] }
                },
                "required": ["customer_name", "issue"]
            }),
        )
    }

    fn required_arguments(&self) -> &'static [&'static str] {
        &["customer_name", "issue"]
    }

    async fn execute(&self, arguments: &serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let customer = arguments
            .get("customer_name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ToolError::InvalidArgument("customer_name".into(), "expected a string".into())
            })?;
        let issue = arguments
            .get("issue")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArgument("issue".into(), "expected a string".into()))?;
        let priority = arguments
            .get("priority")
            .and_then(|v| v.as_str())
            .unwrap_or("medium");

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ToolError::Execution(e.to_string()))?
            .as_millis();
        let ticket_id = format!("TICKET-{millis}");
        tracing::info!(
            "created ticket {} for {} (priority {}): {}",
            ticket_id,
            customer,
            priority,
            issue
        );

        Ok(serde_json::json!({
            "success": true,
            "ticket_id": ticket_id,
            "message": format!("Support ticket for {customer} has been created.")
        }))
    }
}
