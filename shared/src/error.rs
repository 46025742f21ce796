use crate::protocol::MessageKind;

/// Errors raised by the codec, the pool and the connection layer.
///
/// `MalformedMessage` blames the peer, `MessageKindUnhandled` blames the
/// local wiring; callers are expected to tell the two apart.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {message:?}")]
    MalformedMessage { message: String },

    #[error("no consumer registered for {kind:?} message: {message:?}")]
    MessageKindUnhandled { kind: MessageKind, message: String },

    #[error("invalid ID {0}")]
    InvalidId(i32),

    #[error("unsupported address family: {0}")]
    UnsupportedAddressFamily(String),

    #[error("disconnected from peer")]
    Disconnected,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub(crate) fn malformed(message: &str) -> Self {
        ProtocolError::MalformedMessage {
            message: message.to_string(),
        }
    }

    /// True when the peer sent something we could not decode.
    pub fn is_malformed(&self) -> bool {
        matches!(self, ProtocolError::MalformedMessage { .. })
    }
}
