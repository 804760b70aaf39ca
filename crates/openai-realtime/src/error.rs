/// Failures surfaced by the session client. Provider-reported errors are not
/// represented here: they arrive as `ServerEvent::Error` on the event stream
/// and leave the connection up.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("already connected")]
    AlreadyConnected,

    #[error("not connected yet")]
    NotConnected,

    /// Transport handshake or socket failure. Fatal to this session.
    #[error("connection failed: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    /// The send half shut down while an event was queued.
    #[error("connection closed while sending")]
    ChannelClosed,
}
