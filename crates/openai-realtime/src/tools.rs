use async_trait::async_trait;

use crate::types::tools::Tool;

/// Resolves named function calls emitted by the provider mid-conversation.
///
/// Implementations must never fail: whatever happens during execution, a
/// JSON result value comes back, `{"error": ...}` for anything that went
/// wrong. An unanswered function call stalls the provider's turn
/// indefinitely, so every dispatch path has to produce a payload.
#[async_trait]
pub trait ToolDispatch: Send + Sync {
    /// The schema catalog advertised to the provider in the session config.
    fn catalog(&self) -> Vec<Tool>;

    /// Execute the named tool against already-parsed arguments.
    async fn dispatch(&self, name: &str, arguments: serde_json::Value) -> serde_json::Value;
}
