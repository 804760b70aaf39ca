use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use crate::error::ClientError;
use crate::tools::ToolDispatch;
use crate::types;
use crate::types::audio::Base64EncodedAudioBytes;
use crate::types::events::server::ResponseFunctionCallArgumentsDoneEvent;
use crate::types::session::Session;

mod config;
mod consts;
mod utils;

pub use config::Config;

pub type ClientTx = tokio::sync::mpsc::Sender<types::ClientEvent>;
type ClientWeakTx = tokio::sync::mpsc::WeakSender<types::ClientEvent>;
type ServerTx = tokio::sync::broadcast::Sender<types::ServerEvent>;
pub type ServerRx = tokio::sync::broadcast::Receiver<types::ServerEvent>;

/// One streaming session with the provider. Owns the WebSocket for its whole
/// lifetime: a send task drains the client-event channel onto the socket and
/// a receive task classifies inbound frames and republishes them, in receipt
/// order, on a broadcast channel.
pub struct Client {
    capacity: usize,
    config: Config,
    dispatch: Option<Arc<dyn ToolDispatch>>,
    c_tx: Option<ClientTx>,
    s_tx: Option<ServerTx>,
    initial_rx: Option<ServerRx>,
    connected: Arc<AtomicBool>,
    session_id: Arc<Mutex<Option<String>>>,
}

impl Client {
    fn new(capacity: usize, config: Config, dispatch: Option<Arc<dyn ToolDispatch>>) -> Self {
        Self {
            capacity,
            config,
            dispatch,
            c_tx: None,
            s_tx: None,
            initial_rx: None,
            connected: Arc::new(AtomicBool::new(false)),
            session_id: Arc::new(Mutex::new(None)),
        }
    }

    /// Opens the WebSocket and queues the `session.update` carrying the full
    /// session configuration as the first outbound event. Resolves once the
    /// transport is open; it does not wait for `session.created`.
    async fn connect(&mut self, session: Session) -> Result<(), ClientError> {
        if self.c_tx.is_some() {
            return Err(ClientError::AlreadyConnected);
        }

        let request = utils::build_request(&self.config)?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;

        let (mut write, mut read) = ws_stream.split();

        let (c_tx, mut c_rx) = tokio::sync::mpsc::channel(self.capacity);
        let (s_tx, s_rx) = tokio::sync::broadcast::channel(self.capacity);

        self.c_tx = Some(c_tx.clone());
        self.s_tx = Some(s_tx.clone());
        // Hand the first subscription out from here so no early event can
        // slip past a consumer that subscribes right after connect().
        self.initial_rx = Some(s_rx);
        self.connected.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            while let Some(mut event) = c_rx.recv().await {
                if event.event_id().is_none() {
                    event.set_event_id(&uuid::Uuid::new_v4().to_string());
                }
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("failed to send message: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to serialize event: {}", e);
                    }
                }
            }
            // All senders are gone or the socket died; either way the
            // session is over.
            if let Err(e) = write.close().await {
                tracing::debug!("error closing connection: {}", e);
            }
        });

        let connected = self.connected.clone();
        let session_id = self.session_id.clone();
        let dispatch = self.dispatch.clone();
        // The receive task must not keep the send channel alive on its own,
        // otherwise disconnect() could never end the send task. Tool results
        // upgrade this weak handle at completion time; a failed upgrade means
        // the call ended first and the result is discarded.
        let weak_tx = c_tx.downgrade();
        drop(c_tx);

        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        connected.store(false, Ordering::SeqCst);
                        let _ = s_tx.send(types::ServerEvent::Close {
                            reason: Some(e.to_string()),
                        });
                        break;
                    }
                    Ok(message) => message,
                };
                match message {
                    Message::Text(text) => {
                        let event = match types::ServerEvent::parse(&text) {
                            Ok(event) => event,
                            Err(e) => {
                                tracing::warn!("dropping malformed event: {}", e);
                                continue;
                            }
                        };

                        match &event {
                            types::ServerEvent::SessionCreated(data) => {
                                tracing::info!("session created: {}", data.session().id());
                                if let Ok(mut guard) = session_id.lock() {
                                    *guard = Some(data.session().id().to_string());
                                }
                            }
                            types::ServerEvent::ResponseFunctionCallArgumentsDone(data) => {
                                spawn_tool_dispatch(dispatch.clone(), weak_tx.clone(), data.clone());
                            }
                            types::ServerEvent::Error(data) => {
                                tracing::error!("provider error: {}", data.error().message());
                            }
                            types::ServerEvent::Other { kind, .. } => {
                                tracing::debug!("republishing unrecognized event: {}", kind);
                            }
                            _ => {}
                        }

                        if s_tx.send(event).is_err() {
                            tracing::debug!("no subscribers for server event");
                        }
                    }
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary message: {} bytes", bin.len());
                    }
                    Message::Close(reason) => {
                        tracing::info!("connection closed: {:?}", reason);
                        connected.store(false, Ordering::SeqCst);
                        let _ = s_tx.send(types::ServerEvent::Close {
                            reason: reason.map(|v| v.reason.to_string()),
                        });
                        break;
                    }
                    _ => {}
                }
            }
            connected.store(false, Ordering::SeqCst);
        });

        self.send_client_event(types::ClientEvent::SessionUpdate(
            types::events::client::SessionUpdateEvent::new(session),
        ))
        .await
    }

    /// Ordered stream of server events. The first call returns the
    /// subscription opened during connect(), so nothing received since then
    /// has been missed.
    pub fn server_events(&mut self) -> Result<ServerRx, ClientError> {
        if let Some(rx) = self.initial_rx.take() {
            return Ok(rx);
        }
        match self.s_tx {
            Some(ref tx) => Ok(tx.subscribe()),
            None => Err(ClientError::NotConnected),
        }
    }

    /// The provider-assigned session id, once `session.created` has arrived.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().ok().and_then(|guard| guard.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_client_event(&self, event: types::ClientEvent) -> Result<(), ClientError> {
        match self.c_tx {
            Some(ref tx) => tx
                .send(event)
                .await
                .map_err(|_| ClientError::ChannelClosed),
            None => Err(ClientError::NotConnected),
        }
    }

    pub async fn update_session(&self, config: Session) -> Result<(), ClientError> {
        let event = types::ClientEvent::SessionUpdate(
            types::events::client::SessionUpdateEvent::new(config),
        );
        self.send_client_event(event).await
    }

    /// Appends one audio frame to the provider's input buffer. Deliberately a
    /// no-op when the connection is down: the bridge may still be flushing a
    /// tail of frames while a disconnect races in, and that must not error.
    pub async fn append_input_audio_buffer(
        &self,
        audio: Base64EncodedAudioBytes,
    ) -> Result<(), ClientError> {
        if !self.is_connected() {
            tracing::debug!("dropping audio frame: not connected");
            return Ok(());
        }
        let Some(ref tx) = self.c_tx else {
            tracing::debug!("dropping audio frame: not connected");
            return Ok(());
        };
        let event = types::ClientEvent::InputAudioBufferAppend(
            types::events::client::InputAudioBufferAppendEvent::new(audio),
        );
        if tx.send(event).await.is_err() {
            tracing::debug!("dropping audio frame: connection closing");
        }
        Ok(())
    }

    /// Closes the current input buffer, for manual turn-taking when the
    /// carrier's stop signal lands before the provider's voice-activity
    /// detector commits on its own.
    pub async fn commit_input_audio_buffer(&self) -> Result<(), ClientError> {
        let event = types::ClientEvent::InputAudioBufferCommit(
            types::events::client::InputAudioBufferCommitEvent::new(),
        );
        self.send_client_event(event).await
    }

    pub async fn create_response(&self) -> Result<(), ClientError> {
        let event =
            types::ClientEvent::ResponseCreate(types::events::client::ResponseCreateEvent::new());
        self.send_client_event(event).await
    }

    pub async fn create_conversation_item(&self, item: types::Item) -> Result<(), ClientError> {
        let event = types::ClientEvent::ConversationItemCreate(
            types::events::client::ConversationItemCreateEvent::new(item),
        );
        self.send_client_event(event).await
    }

    /// Drops the send channel, which ends the send task and closes the
    /// socket. Safe to call repeatedly or before ever connecting.
    pub fn disconnect(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        if self.c_tx.take().is_some() {
            tracing::info!("disconnected from provider session");
        }
    }
}

/// The session surface the call bridge drives. Extracted as a trait so the
/// bridge can be exercised against a mock session in tests.
#[async_trait::async_trait]
pub trait RealtimeSession: Send {
    fn server_events(&mut self) -> Result<ServerRx, ClientError>;
    async fn append_input_audio_buffer(
        &self,
        audio: Base64EncodedAudioBytes,
    ) -> Result<(), ClientError>;
    async fn commit_input_audio_buffer(&self) -> Result<(), ClientError>;
    async fn create_response(&self) -> Result<(), ClientError>;
    fn disconnect(&mut self);
}

#[async_trait::async_trait]
impl RealtimeSession for Client {
    fn server_events(&mut self) -> Result<ServerRx, ClientError> {
        Client::server_events(self)
    }

    async fn append_input_audio_buffer(
        &self,
        audio: Base64EncodedAudioBytes,
    ) -> Result<(), ClientError> {
        Client::append_input_audio_buffer(self, audio).await
    }

    async fn commit_input_audio_buffer(&self) -> Result<(), ClientError> {
        Client::commit_input_audio_buffer(self).await
    }

    async fn create_response(&self) -> Result<(), ClientError> {
        Client::create_response(self).await
    }

    fn disconnect(&mut self) {
        Client::disconnect(self)
    }
}

/// Resolves one completed function call off the receive loop, so a slow
/// handler never stalls audio ingestion. Whether the arguments fail to
/// parse, the name is unknown or the handler errors, a `function_call_output`
/// item goes back on the same connection; the provider has no notion of a
/// call that never returns.
fn spawn_tool_dispatch(
    dispatch: Option<Arc<dyn ToolDispatch>>,
    weak_tx: ClientWeakTx,
    event: ResponseFunctionCallArgumentsDoneEvent,
) {
    tokio::spawn(async move {
        let name = event.name().to_string();
        let call_id = event.call_id().to_string();
        tracing::info!("function call: {} (call_id={})", name, call_id);

        let result = match serde_json::from_str::<serde_json::Value>(event.arguments()) {
            Err(e) => {
                tracing::warn!("function call {} has malformed arguments: {}", name, e);
                serde_json::json!({ "error": format!("invalid arguments: {e}") })
            }
            Ok(arguments) => match dispatch {
                Some(dispatch) => dispatch.dispatch(&name, arguments).await,
                None => serde_json::json!({ "error": "Unknown function" }),
            },
        };

        let output = result.to_string();
        let item = types::Item::FunctionCallOutput(types::FunctionCallOutputItem::new(
            &call_id, &output,
        ));
        let event = types::ClientEvent::ConversationItemCreate(
            types::events::client::ConversationItemCreateEvent::new(item),
        );

        let Some(tx) = weak_tx.upgrade() else {
            tracing::info!("discarding result for call {}: session ended", call_id);
            return;
        };
        if tx.send(event).await.is_err() {
            tracing::info!("discarding result for call {}: session ended", call_id);
        }
    });
}

/// Connects with an explicit channel capacity.
pub async fn connect_with_capacity(
    capacity: usize,
    config: Config,
    session: Session,
    dispatch: Option<Arc<dyn ToolDispatch>>,
) -> Result<Client, ClientError> {
    let mut client = Client::new(capacity, config, dispatch);
    client.connect(session).await?;
    Ok(client)
}

/// Connects and configures one provider session.
pub async fn connect(
    config: Config,
    session: Session,
    dispatch: Option<Arc<dyn ToolDispatch>>,
) -> Result<Client, ClientError> {
    connect_with_capacity(1024, config, session, dispatch).await
}
