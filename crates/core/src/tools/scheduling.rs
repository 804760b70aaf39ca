use async_trait::async_trait;
use openai_realtime::types::tools::FunctionTool;

use super::{ToolError, ToolHandler};

/// Books an appointment in the scheduling backend. Currently issues a fresh
/// identifier and confirms; the handler is the integration point for a real
/// calendar system.
pub struct AppointmentScheduler;

fn str_arg<'a>(arguments: &'a serde_json::Value, name: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArgument(name.to_string(), "expected a string".into()))
}

#[async_trait]
impl ToolHandler for AppointmentScheduler {
    fn definition(&self) -> FunctionTool {
        FunctionTool::new(
            "schedule_appointment",
            "Books an appointment for the customer",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "customer_name": { "type": "string" },
                    "date": { "type": "string", "format": "date" },
                    "time": { "type": "string", "format": "time" },
                    "purpose": { "type": "string" }
                },
                "required": ["customer_name", "date", "time", "purpose"]
            }),
        )
    }

    fn required_arguments(&self) -> &'static [&'static str] {
        &["customer_name", "date", "time", "purpose"]
    }

    async fn execute(&self, arguments: &serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let customer = str_arg(arguments, "customer_name")?;
        let date = str_arg(arguments, "date")?;
        let time = str_arg(arguments, "time")?;
        let purpose = str_arg(arguments, "purpose")?;

        let appointment_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(
            "scheduled appointment {} for {} ({}, {} {})",
            appointment_id,
            customer,
            purpose,
            date,
            time
        );

        Ok(serde_json::json!({
            "success": true,
            "appointment_id": appointment_id,
            "message": format!("Appointment for {customer} on {date} at {time} has been booked.")
        }))
    }
}
