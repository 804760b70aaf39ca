pub mod bridge;
pub mod registry;
pub mod tools;

pub use bridge::{AgentProfile, BridgeError, BridgeEvent, CallBridge, CallMetrics};
pub use registry::CallRegistry;
pub use tools::{ToolError, ToolHandler, ToolRegistry};
