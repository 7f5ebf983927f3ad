//! Error types.

use crate::transport::{ErrorCode, TooMuchConcurrency};

/// A response message could not be turned into a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The compressed-flag byte was not zero. No compression is supported.
    #[error("unsupported compression flag: {0}")]
    Compressed(u8),
    /// The declared length is larger than the decoder accepts.
    #[error("message too large: {length} bytes (limit {limit})")]
    MessageTooLarge { length: usize, limit: usize },
    /// The frame was intact but the payload did not deserialize.
    #[error("codec error: {0}")]
    Codec(String),
    /// Input ended before a complete frame was available.
    #[error("not enough data: {buffered} byte(s) buffered")]
    Incomplete { buffered: usize },
}

impl DecodeError {
    /// Whether the frame boundaries themselves are broken, as opposed to a
    /// payload that failed to deserialize.
    pub fn is_framing(&self) -> bool {
        !matches!(self, DecodeError::Codec(_))
    }
}

/// Errors that end a call.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// No stream could be opened on the connection.
    #[error(transparent)]
    TooMuchConcurrency(#[from] TooMuchConcurrency),
    /// The transport failed to send headers or data.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The peer tried to push a stream in reply to a call.
    #[error("push promise received for stream {promised_stream_id}")]
    PushPromise { promised_stream_id: u32 },
    /// The stream failed while messages were expected.
    #[error("stream error: {0}")]
    StreamError(ErrorCode),
    /// An event arrived that the current call state does not allow.
    #[error("unexpected {event} event while {state}")]
    UnexpectedEvent {
        state: &'static str,
        event: &'static str,
    },
    /// A streamed reply could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    /// The call options cannot produce a valid request.
    #[error("invalid call options: {0}")]
    Options(#[from] ConfigError),
}

impl CallError {
    pub(crate) fn transport<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CallError::Transport(Box::new(e))
    }

    /// Whether this is a protocol violation by the peer.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            CallError::PushPromise { .. }
                | CallError::StreamError(_)
                | CallError::UnexpectedEvent { .. }
        )
    }
}

/// Configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(String),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}
