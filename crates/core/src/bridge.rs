use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use openai_realtime::types::audio::{AudioFormat, Base64EncodedAudioBytes, TurnDetection, Voice};
use openai_realtime::types::{ServerEvent, Session};
use openai_realtime::{ClientError, Config, RealtimeSession, ToolDispatch};

/// What the agent sounds like and how it behaves on this call. The carrier's
/// audio passes through untranscoded, so both formats default to the
/// carrier-native mu-law encoding.
#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub instructions: String,
    pub voice: Voice,
    pub input_audio_format: AudioFormat,
    pub output_audio_format: AudioFormat,
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            instructions: String::new(),
            voice: Voice::Alloy,
            input_audio_format: AudioFormat::Mulaw,
            output_audio_format: AudioFormat::Mulaw,
        }
    }
}

/// Everything one call surfaces to its owner, in upstream receipt order.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// The provider confirmed the session.
    Ready { session_id: String },
    /// A chunk of generated audio for the carrier leg, still base64.
    AudioOutput(Base64EncodedAudioBytes),
    /// A partial transcript of the generated speech.
    TranscriptUpdate(String),
    /// A provider-reported error. Non-fatal; the session stays up.
    Error(String),
    /// The upstream transport went away.
    UpstreamClosed { reason: Option<String> },
    /// Terminal event, emitted exactly once per call.
    CallEnded,
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to start upstream session: {0}")]
    Connect(#[from] ClientError),
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CallMetrics {
    pub duration_ms: u64,
    pub transcript_chars: usize,
    pub tool_calls: u32,
}

#[derive(Default)]
struct MetricsInner {
    duration: Option<Duration>,
    transcript_chars: usize,
    tool_calls: u32,
}

/// Per-call orchestration: owns exactly one upstream session, forwards the
/// carrier's audio to it, and republishes its events as `BridgeEvent`s on a
/// single ordered channel.
pub struct CallBridge<S: RealtimeSession> {
    call_sid: String,
    active: Arc<AtomicBool>,
    session: S,
    metrics: Arc<Mutex<MetricsInner>>,
    events_tx: tokio::sync::mpsc::Sender<BridgeEvent>,
    started_at: Instant,
}

impl CallBridge<openai_realtime::Client> {
    /// Connects the upstream session for one call, configured from the agent
    /// profile and the dispatch table's catalog. A connect failure surfaces
    /// here and the bridge never comes up; retry policy belongs to whoever
    /// placed the call.
    pub async fn start(
        call_sid: &str,
        config: Config,
        profile: &AgentProfile,
        tools: Arc<dyn ToolDispatch>,
    ) -> Result<(Self, tokio::sync::mpsc::Receiver<BridgeEvent>), BridgeError> {
        let session = Session::new()
            .with_modalities_enable_audio()
            .with_instructions(&profile.instructions)
            .with_voice(profile.voice.clone())
            .with_input_audio_format(profile.input_audio_format.clone())
            .with_output_audio_format(profile.output_audio_format.clone())
            .with_turn_detection_enable(TurnDetection::default())
            .with_tools(tools.catalog())
            .build();
        let client = openai_realtime::connect(config, session, Some(tools)).await?;
        Self::attach(call_sid, client)
    }
}

impl<S: RealtimeSession + 'static> CallBridge<S> {
    /// Wires an already-established session into a bridge. Returns the
    /// bridge alongside the receiving end of its event channel.
    pub fn attach(
        call_sid: &str,
        mut session: S,
    ) -> Result<(Self, tokio::sync::mpsc::Receiver<BridgeEvent>), BridgeError> {
        let server_rx = session.server_events()?;
        let (events_tx, events_rx) = tokio::sync::mpsc::channel(256);

        let bridge = Self {
            call_sid: call_sid.to_string(),
            active: Arc::new(AtomicBool::new(true)),
            session,
            metrics: Arc::new(Mutex::new(MetricsInner::default())),
            events_tx: events_tx.clone(),
            started_at: Instant::now(),
        };

        let metrics = bridge.metrics.clone();
        let call_sid = bridge.call_sid.clone();
        tokio::spawn(forward_events(call_sid, server_rx, events_tx, metrics));

        Ok((bridge, events_rx))
    }

    pub fn call_sid(&self) -> &str {
        &self.call_sid
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Forwards one carrier media frame upstream. Frames arriving while the
    /// call is inactive are dropped: audio after end_call() must not
    /// resurrect a closed session.
    pub async fn process_audio_input(&self, payload: Base64EncodedAudioBytes) {
        if !self.is_active() {
            tracing::debug!("ignoring audio for inactive call {}", self.call_sid);
            return;
        }
        if let Err(e) = self.session.append_input_audio_buffer(payload).await {
            tracing::warn!("failed to forward audio for call {}: {}", self.call_sid, e);
        }
    }

    /// Manual turn-taking: closes the input buffer and asks for a response,
    /// for when the carrier's stop signal lands before the provider's
    /// voice-activity detector commits on its own.
    pub async fn commit_audio_and_respond(&self) {
        if !self.is_active() {
            return;
        }
        if let Err(e) = self.session.commit_input_audio_buffer().await {
            tracing::warn!("failed to commit audio for call {}: {}", self.call_sid, e);
            return;
        }
        if let Err(e) = self.session.create_response().await {
            tracing::warn!("failed to request response for call {}: {}", self.call_sid, e);
        }
    }

    /// Ends the call: marks it inactive, tears down the upstream session and
    /// emits the terminal event. Idempotent, since the carrier frequently
    /// signals stop and then closes the transport, and both paths land here.
    pub async fn end_call(&mut self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut m) = self.metrics.lock() {
            m.duration = Some(self.started_at.elapsed());
        }
        self.session.disconnect();
        if self.events_tx.send(BridgeEvent::CallEnded).await.is_err() {
            tracing::debug!("no listener for call-ended event on {}", self.call_sid);
        }
        tracing::info!("call {} ended", self.call_sid);
    }

    /// Read-only snapshot of the call's accumulated metrics.
    pub fn metrics(&self) -> CallMetrics {
        let guard = match self.metrics.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        CallMetrics {
            duration_ms: guard
                .duration
                .unwrap_or_else(|| self.started_at.elapsed())
                .as_millis() as u64,
            transcript_chars: guard.transcript_chars,
            tool_calls: guard.tool_calls,
        }
    }
}

async fn forward_events(
    call_sid: String,
    mut server_rx: openai_realtime::ServerRx,
    events_tx: tokio::sync::mpsc::Sender<BridgeEvent>,
    metrics: Arc<Mutex<MetricsInner>>,
) {
    loop {
        let event = match server_rx.recv().await {
            Ok(event) => event,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("call {} lagged {} upstream events", call_sid, n);
                continue;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        };

        let outward = match event {
            ServerEvent::SessionCreated(e) => Some(BridgeEvent::Ready {
                session_id: e.session().id().to_string(),
            }),
            ServerEvent::ResponseAudioDelta(e) => {
                Some(BridgeEvent::AudioOutput(e.delta().to_string()))
            }
            ServerEvent::ResponseAudioDone(_) => {
                tracing::debug!("call {} response audio complete", call_sid);
                None
            }
            ServerEvent::ResponseTextDelta(e) => {
                if let Ok(mut m) = metrics.lock() {
                    m.transcript_chars += e.delta().len();
                }
                Some(BridgeEvent::TranscriptUpdate(e.delta().to_string()))
            }
            ServerEvent::ResponseFunctionCallArgumentsDone(e) => {
                // Resolution happens inside the session client; the bridge
                // only accounts for it.
                if let Ok(mut m) = metrics.lock() {
                    m.tool_calls += 1;
                }
                tracing::info!("call {} invoked tool {}", call_sid, e.name());
                None
            }
            ServerEvent::Error(e) => Some(BridgeEvent::Error(e.error().message().to_string())),
            ServerEvent::ConversationItemCreated(e) => {
                tracing::debug!(
                    "call {} conversation item created: {:?}",
                    call_sid,
                    e.item().id
                );
                None
            }
            ServerEvent::Other { kind, .. } => {
                tracing::debug!("call {} ignoring upstream event {}", call_sid, kind);
                None
            }
            ServerEvent::Close { reason } => {
                let _ = events_tx
                    .send(BridgeEvent::UpstreamClosed { reason })
                    .await;
                break;
            }
        };

        if let Some(event) = outward {
            if events_tx.send(event).await.is_err() {
                break;
            }
        }
    }
}
