pub mod client;
pub mod server;

use client::*;
use server::*;

/// Events this client sends upstream. Every variant carries an optional
/// `event_id`; the connection stamps a unique id on anything still unset
/// before serialization, so each outbound frame is individually correlatable.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate(SessionUpdateEvent),
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend(InputAudioBufferAppendEvent),
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit(InputAudioBufferCommitEvent),
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate(ConversationItemCreateEvent),
    #[serde(rename = "response.create")]
    ResponseCreate(ResponseCreateEvent),
}

impl ClientEvent {
    pub fn event_id(&self) -> Option<&str> {
        match self {
            ClientEvent::SessionUpdate(e) => e.event_id(),
            ClientEvent::InputAudioBufferAppend(e) => e.event_id(),
            ClientEvent::InputAudioBufferCommit(e) => e.event_id(),
            ClientEvent::ConversationItemCreate(e) => e.event_id(),
            ClientEvent::ResponseCreate(e) => e.event_id(),
        }
    }

    pub fn set_event_id(&mut self, event_id: &str) {
        match self {
            ClientEvent::SessionUpdate(e) => e.set_event_id(event_id),
            ClientEvent::InputAudioBufferAppend(e) => e.set_event_id(event_id),
            ClientEvent::InputAudioBufferCommit(e) => e.set_event_id(event_id),
            ClientEvent::ConversationItemCreate(e) => e.set_event_id(event_id),
            ClientEvent::ResponseCreate(e) => e.set_event_id(event_id),
        }
    }
}

/// Events received from the provider. `Close` is synthesized locally when the
/// transport shuts down; `Other` carries any type the enum does not model,
/// republished verbatim so downstream consumers can still observe it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "close")]
    Close { reason: Option<String> },
    #[serde(rename = "error")]
    Error(ErrorEvent),
    #[serde(rename = "session.created")]
    SessionCreated(SessionCreatedEvent),
    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated(ConversationItemCreatedEvent),
    #[serde(rename = "response.audio.delta")]
    ResponseAudioDelta(ResponseAudioDeltaEvent),
    #[serde(rename = "response.audio.done")]
    ResponseAudioDone(ResponseAudioDoneEvent),
    #[serde(rename = "response.text.delta")]
    ResponseTextDelta(ResponseTextDeltaEvent),
    #[serde(rename = "response.function_call_arguments.done")]
    ResponseFunctionCallArgumentsDone(ResponseFunctionCallArgumentsDoneEvent),
    #[serde(skip)]
    Other {
        kind: String,
        payload: serde_json::Value,
    },
}

impl ServerEvent {
    /// Parses an inbound frame. Types outside the modeled set come back as
    /// `Other` under their own name; only frames with no `type` at all (or
    /// that are not JSON objects) are an error for the caller to report.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        match serde_json::from_str::<ServerEvent>(text) {
            Ok(event) => Ok(event),
            Err(e) => {
                let payload = serde_json::from_str::<serde_json::Value>(text)?;
                match payload.get("type").and_then(|v| v.as_str()) {
                    Some(kind) => Ok(ServerEvent::Other {
                        kind: kind.to_string(),
                        payload,
                    }),
                    None => Err(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_client_event_tagging() {
        let event = ClientEvent::InputAudioBufferCommit(InputAudioBufferCommitEvent::new());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "input_audio_buffer.commit");
    }

    #[test]
    fn test_event_id_stamping() {
        let mut event = ClientEvent::ResponseCreate(ResponseCreateEvent::new());
        assert!(event.event_id().is_none());
        event.set_event_id("evt_1");
        assert_eq!(event.event_id(), Some("evt_1"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_id"], "evt_1");
    }

    #[test]
    fn test_parse_known_event() {
        let text = r#"{"type":"response.audio.delta","event_id":"e1","response_id":"r1","item_id":"i1","output_index":0,"content_index":0,"delta":"AAAA"}"#;
        match ServerEvent::parse(text).unwrap() {
            ServerEvent::ResponseAudioDelta(e) => assert_eq!(e.delta(), "AAAA"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_unrecognized_event_is_republished() {
        let text = r#"{"type":"rate_limits.updated","event_id":"e2","rate_limits":[]}"#;
        match ServerEvent::parse(text).unwrap() {
            ServerEvent::Other { kind, payload } => {
                assert_eq!(kind, "rate_limits.updated");
                assert_eq!(payload["event_id"], "e2");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_untyped_frame_is_an_error() {
        assert!(ServerEvent::parse(r#"{"event_id":"e3"}"#).is_err());
        assert!(ServerEvent::parse("not json").is_err());
    }
}
