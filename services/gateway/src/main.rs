mod config;
mod media;
mod twilio;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use callbridge_core::{CallRegistry, ToolRegistry};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing_subscriber::fmt::time::ChronoLocal;

use crate::config::Config;
use crate::twilio::TwilioClient;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const GREETING: &str = "Welcome. Connecting you to our assistant now.";

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub twilio: Arc<TwilioClient>,
    pub tools: Arc<ToolRegistry>,
    pub registry: CallRegistry,
    pub started_at: Instant,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load application configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    tracing::info!("Configuration loaded successfully. Starting gateway...");

    let state = AppState {
        twilio: Arc::new(TwilioClient::new(
            &config.twilio_account_sid,
            &config.twilio_auth_token,
            &config.twilio_phone_number,
        )),
        tools: Arc::new(ToolRegistry::builtin()),
        registry: CallRegistry::new(),
        started_at: Instant::now(),
        config: Arc::new(config),
    };

    let registry = state.registry.clone();
    let bind_address = state.config.bind_address;

    let app = Router::new()
        .route("/health", get(health))
        .route("/webhooks/voice", post(voice_webhook))
        .route("/webhooks/status", post(status_webhook))
        .route("/api/calls/outbound", post(outbound_call))
        .route("/api/calls/{call_sid}", get(call_details).delete(hangup_call))
        .route("/media-stream", get(media::handle_media_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("Listening on {}", bind_address);
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .context("Failed to bind server address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await
        .context("Server error")?;

    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": VERSION,
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "active_calls": state.registry.len(),
    }))
}

/// Answers the carrier's voice webhook with call-control markup: a greeting,
/// then a bidirectional media stream back to this service.
async fn voice_webhook(
    State(state): State<AppState>,
    Form(params): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    tracing::info!(
        "incoming call: {}",
        params.get("CallSid").map(String::as_str).unwrap_or("unknown")
    );
    let twiml = twilio::voice_response(Some(GREETING), &state.config.media_stream_url());
    ([(header::CONTENT_TYPE, "text/xml")], twiml)
}

async fn status_webhook(Form(params): Form<HashMap<String, String>>) -> impl IntoResponse {
    tracing::info!(
        "call status update: {} -> {}",
        params.get("CallSid").map(String::as_str).unwrap_or("unknown"),
        params.get("CallStatus").map(String::as_str).unwrap_or("unknown"),
    );
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct OutboundCallRequest {
    phone_number: Option<String>,
}

/// Places an outbound call. Failures come back as explicit JSON errors so
/// the trigger always learns whether the call was accepted by the carrier.
async fn outbound_call(
    State(state): State<AppState>,
    Json(request): Json<OutboundCallRequest>,
) -> impl IntoResponse {
    let Some(phone_number) = request.phone_number else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "phone_number required" })),
        );
    };

    match state
        .twilio
        .make_outbound_call(&phone_number, &state.config.voice_webhook_url())
        .await
    {
        Ok(call) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "call_sid": call.sid,
                "status": call.status,
            })),
        ),
        Err(e) => {
            tracing::error!("outbound call to {} failed: {}", phone_number, e);
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        }
    }
}

async fn call_details(
    State(state): State<AppState>,
    axum::extract::Path(call_sid): axum::extract::Path<String>,
) -> impl IntoResponse {
    match state.twilio.get_call(&call_sid).await {
        Ok(call) => (
            StatusCode::OK,
            Json(serde_json::json!({ "call_sid": call.sid, "status": call.status })),
        ),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}

/// Hangs up a live call carrier-side. The carrier then signals stop on the
/// media stream, which tears the session down through the normal path.
async fn hangup_call(
    State(state): State<AppState>,
    axum::extract::Path(call_sid): axum::extract::Path<String>,
) -> impl IntoResponse {
    match state.twilio.complete_call(&call_sid).await {
        Ok(call) => (
            StatusCode::OK,
            Json(serde_json::json!({ "success": true, "call_sid": call.sid, "status": call.status })),
        ),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}

/// Resolves on ctrl-c or SIGTERM, then asks every live call to wind down
/// before the server stops accepting connections.
async fn shutdown_signal(registry: CallRegistry) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("failed to listen for SIGTERM: {}", e),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
    registry.shutdown_all();
}
