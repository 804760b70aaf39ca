mod client;
mod error;
mod tools;

pub use openai_realtime_types as types;

pub use client::{connect, connect_with_capacity, Client, Config, RealtimeSession, ServerRx};
pub use error::ClientError;
pub use tools::ToolDispatch;
