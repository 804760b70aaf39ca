use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use callbridge_core::{AgentProfile, BridgeEvent, CallBridge};
use openai_realtime::ToolDispatch;
use serde::Deserialize;
use std::sync::Arc;

use crate::AppState;

/// One message on the carrier's media-stream channel. The carrier declares
/// the order start -> media* -> stop, but the handler tolerates anything.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CarrierMessage {
    Connected,
    Start { start: StartMeta },
    Media { media: MediaPayload },
    Stop,
    Mark,
    Dtmf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartMeta {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "callSid")]
    pub call_sid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaPayload {
    /// Base64 audio in the carrier's native encoding. Passed upstream as-is.
    pub payload: String,
    pub timestamp: Option<String>,
}

/// The outbound counterpart: generated audio pushed back onto the stream.
pub fn outbound_media(stream_sid: &str, payload: &str) -> String {
    serde_json::json!({
        "event": "media",
        "streamSid": stream_sid,
        "media": { "payload": payload }
    })
    .to_string()
}

pub async fn handle_media_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    tracing::info!("media stream connection received");
    ws.on_upgrade(|socket| handle_media_stream(socket, state))
}

fn parse_message(text: &str) -> Option<CarrierMessage> {
    match serde_json::from_str::<CarrierMessage>(text) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::debug!("ignoring unparseable carrier message: {}", e);
            None
        }
    }
}

/// Drives one carrier connection. Waits for `start`, brings up the bridge,
/// then relays in both directions until stop, transport close or service
/// shutdown.
async fn handle_media_stream(mut socket: WebSocket, state: AppState) {
    // Nothing can be bridged before `start` names the call: early media is
    // dropped, per the carrier's own contract.
    let start = loop {
        match socket.recv().await {
            None | Some(Err(_)) => {
                tracing::info!("media stream closed before start");
                return;
            }
            Some(Ok(WsMessage::Text(text))) => match parse_message(&text) {
                Some(CarrierMessage::Start { start }) => break start,
                Some(CarrierMessage::Media { .. }) => {
                    tracing::debug!("dropping media frame before start");
                }
                Some(CarrierMessage::Stop) => {
                    tracing::info!("stop before start, closing stream");
                    return;
                }
                _ => {}
            },
            Some(Ok(WsMessage::Close(_))) => return,
            Some(Ok(_)) => {}
        }
    };

    let call_sid = start.call_sid.clone();
    let stream_sid = start.stream_sid.clone();
    tracing::info!("media stream started for call {} ({})", call_sid, stream_sid);

    let Some(shutdown) = state.registry.insert(&call_sid) else {
        tracing::warn!("call {} already has a live session, refusing", call_sid);
        return;
    };

    let profile = AgentProfile {
        instructions: state.config.agent_instructions.clone(),
        voice: state.config.agent_voice.clone(),
        ..AgentProfile::default()
    };
    let realtime_config = openai_realtime::Config::builder()
        .with_api_key(&state.config.openai_api_key)
        .with_model(&state.config.realtime_model)
        .build();
    let tools = state.tools.clone() as Arc<dyn ToolDispatch>;

    let (mut bridge, mut events) =
        match CallBridge::start(&call_sid, realtime_config, &profile, tools).await {
            Ok(started) => started,
            Err(e) => {
                tracing::error!("failed to start session for call {}: {}", call_sid, e);
                state.registry.remove(&call_sid);
                return;
            }
        };

    loop {
        tokio::select! {
            message = socket.recv() => match message {
                None | Some(Err(_)) => {
                    tracing::info!("media stream transport closed for call {}", call_sid);
                    bridge.end_call().await;
                    break;
                }
                Some(Ok(WsMessage::Text(text))) => match parse_message(&text) {
                    Some(CarrierMessage::Media { media }) => {
                        bridge.process_audio_input(media.payload).await;
                    }
                    Some(CarrierMessage::Stop) => {
                        tracing::info!("media stream stopped for call {}", call_sid);
                        bridge.end_call().await;
                        break;
                    }
                    Some(CarrierMessage::Start { .. }) => {
                        tracing::warn!("duplicate start on call {}, ignoring", call_sid);
                    }
                    _ => {}
                },
                Some(Ok(WsMessage::Close(_))) => {
                    bridge.end_call().await;
                    break;
                }
                Some(Ok(_)) => {}
            },
            event = events.recv() => match event {
                Some(BridgeEvent::Ready { session_id }) => {
                    tracing::info!("call {} session ready: {}", call_sid, session_id);
                }
                Some(BridgeEvent::AudioOutput(payload)) => {
                    // Only the bridge's owner writes to the carrier socket,
                    // and only while the call is live.
                    if bridge.is_active() {
                        let message = outbound_media(&stream_sid, &payload);
                        if socket.send(WsMessage::Text(message.into())).await.is_err() {
                            bridge.end_call().await;
                            break;
                        }
                    }
                }
                Some(BridgeEvent::TranscriptUpdate(text)) => {
                    tracing::info!("call {} transcript: {}", call_sid, text);
                }
                Some(BridgeEvent::Error(message)) => {
                    tracing::error!("call {} provider error: {}", call_sid, message);
                }
                Some(BridgeEvent::UpstreamClosed { reason }) => {
                    tracing::warn!("call {} upstream closed: {:?}", call_sid, reason);
                    bridge.end_call().await;
                    break;
                }
                Some(BridgeEvent::CallEnded) | None => break,
            },
            _ = shutdown.notified() => {
                tracing::info!("call {} ending for service shutdown", call_sid);
                bridge.end_call().await;
                break;
            }
        }
    }

    state.registry.remove(&call_sid);
    let metrics = bridge.metrics();
    tracing::info!(
        "call {} finished: {}ms, {} transcript chars, {} tool call(s)",
        call_sid,
        metrics.duration_ms,
        metrics.transcript_chars,
        metrics.tool_calls
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_message() {
        let text = r#"{"event":"start","sequenceNumber":"1","start":{"streamSid":"MZ1","callSid":"CA1","tracks":["inbound"]},"streamSid":"MZ1"}"#;
        match parse_message(text) {
            Some(CarrierMessage::Start { start }) => {
                assert_eq!(start.call_sid, "CA1");
                assert_eq!(start.stream_sid, "MZ1");
            }
            other => panic!("expected start, got {other:?}"),
        }
    }

    #[test]
    fn parses_media_message() {
        let text = r#"{"event":"media","media":{"track":"inbound","chunk":"2","timestamp":"5","payload":"QUJD"},"streamSid":"MZ1"}"#;
        match parse_message(text) {
            Some(CarrierMessage::Media { media }) => {
                assert_eq!(media.payload, "QUJD");
                assert_eq!(media.timestamp.as_deref(), Some("5"));
            }
            other => panic!("expected media, got {other:?}"),
        }
    }

    #[test]
    fn parses_stop_and_connected_messages() {
        assert!(matches!(
            parse_message(r#"{"event":"stop","stop":{"callSid":"CA1"},"streamSid":"MZ1"}"#),
            Some(CarrierMessage::Stop)
        ));
        assert!(matches!(
            parse_message(r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#),
            Some(CarrierMessage::Connected)
        ));
    }

    #[test]
    fn unknown_event_is_dropped_not_fatal() {
        assert!(parse_message(r#"{"event":"telemetry"}"#).is_none());
        assert!(parse_message("not json").is_none());
    }

    #[test]
    fn outbound_media_matches_carrier_shape() {
        let message = outbound_media("MZ1", "QUJD");
        let json: serde_json::Value = serde_json::from_str(&message).unwrap();
        assert_eq!(json["event"], "media");
        assert_eq!(json["streamSid"], "MZ1");
        assert_eq!(json["media"]["payload"], "QUJD");
    }
}
