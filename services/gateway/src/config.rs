use std::net::SocketAddr;

use openai_realtime::types::audio::Voice;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

const DEFAULT_INSTRUCTIONS: &str = "You are a professional call agent. \
You speak naturally and in a friendly tone. Your tasks: take customer \
requests, schedule appointments, give product information and create \
support tickets. Be helpful, professional and efficient.";

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Externally reachable host, used to build webhook and stream URLs.
    pub public_host: String,
    pub openai_api_key: String,
    pub realtime_model: String,
    pub agent_voice: Voice,
    pub agent_instructions: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_phone_number: String,
    pub log_level: Level,
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

impl Config {
    /// Loads configuration from environment variables, reading a `.env`
    /// file first if one is present.
    ///
    /// *   `BIND_ADDRESS`: address and port to bind (default "0.0.0.0:3000").
    /// *   `PUBLIC_HOST`: host Twilio can reach for webhooks and the media
    ///     stream (default: the bind address).
    /// *   `OPENAI_API_KEY`: secret key for the realtime provider. Required.
    /// *   `REALTIME_MODEL`: (optional) provider model name.
    /// *   `AGENT_VOICE`: (optional) voice the agent answers with.
    /// *   `AGENT_INSTRUCTIONS`: (optional) system instructions for the agent.
    /// *   `TWILIO_ACCOUNT_SID` / `TWILIO_AUTH_TOKEN` / `TWILIO_PHONE_NUMBER`:
    ///     carrier credentials and caller id. Required.
    /// *   `RUST_LOG`: (optional) logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let public_host = std::env::var("PUBLIC_HOST").unwrap_or_else(|_| bind_address_str.clone());

        let openai_api_key = required("OPENAI_API_KEY")?;
        let realtime_model = std::env::var("REALTIME_MODEL")
            .unwrap_or_else(|_| "gpt-4o-realtime-preview".to_string());

        let voice_str = std::env::var("AGENT_VOICE").unwrap_or_else(|_| "alloy".to_string());
        let Ok(agent_voice) = voice_str.parse::<Voice>();
        let agent_instructions = std::env::var("AGENT_INSTRUCTIONS")
            .unwrap_or_else(|_| DEFAULT_INSTRUCTIONS.to_string());

        let twilio_account_sid = required("TWILIO_ACCOUNT_SID")?;
        let twilio_auth_token = required("TWILIO_AUTH_TOKEN")?;
        let twilio_phone_number = required("TWILIO_PHONE_NUMBER")?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            public_host,
            openai_api_key,
            realtime_model,
            agent_voice,
            agent_instructions,
            twilio_account_sid,
            twilio_auth_token,
            twilio_phone_number,
            log_level,
        })
    }

    pub fn voice_webhook_url(&self) -> String {
        format!("https://{}/webhooks/voice", self.public_host)
    }

    pub fn media_stream_url(&self) -> String {
        format!("wss://{}/media-stream", self.public_host)
    }
}
