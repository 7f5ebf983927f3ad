//! The HTTP/2 transport the engine drives.
//!
//! Connection setup, stream multiplexing, HPACK and the credit ledger live
//! behind these traits. The engine only ever touches one stream per call.

use crate::flow::{IncomingFlowControl, OutgoingFlowControl};
use crate::headers::{HeaderField, HeaderList};

use bytes::Bytes;
use std::fmt;
use std::future::Future;

/// HTTP/2 error codes (RFC 7540 Section 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    NoError = 0x0,
    ProtocolError = 0x1,
    InternalError = 0x2,
    FlowControlError = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSizeError = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    CompressionError = 0x9,
    ConnectError = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

impl ErrorCode {
    /// Unknown codes map to `InternalError` (RFC 7540 Section 7).
    pub fn from_u32(code: u32) -> Self {
        match code {
            0x0 => ErrorCode::NoError,
            0x1 => ErrorCode::ProtocolError,
            0x2 => ErrorCode::InternalError,
            0x3 => ErrorCode::FlowControlError,
            0x4 => ErrorCode::SettingsTimeout,
            0x5 => ErrorCode::StreamClosed,
            0x6 => ErrorCode::FrameSizeError,
            0x7 => ErrorCode::RefusedStream,
            0x8 => ErrorCode::Cancel,
            0x9 => ErrorCode::CompressionError,
            0xa => ErrorCode::ConnectError,
            0xb => ErrorCode::EnhanceYourCalm,
            0xc => ErrorCode::InadequateSecurity,
            0xd => ErrorCode::Http11Required,
            _ => ErrorCode::InternalError,
        }
    }

    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::NoError => "NO_ERROR",
            ErrorCode::ProtocolError => "PROTOCOL_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::FlowControlError => "FLOW_CONTROL_ERROR",
            ErrorCode::SettingsTimeout => "SETTINGS_TIMEOUT",
            ErrorCode::StreamClosed => "STREAM_CLOSED",
            ErrorCode::FrameSizeError => "FRAME_SIZE_ERROR",
            ErrorCode::RefusedStream => "REFUSED_STREAM",
            ErrorCode::Cancel => "CANCEL",
            ErrorCode::CompressionError => "COMPRESSION_ERROR",
            ErrorCode::ConnectError => "CONNECT_ERROR",
            ErrorCode::EnhanceYourCalm => "ENHANCE_YOUR_CALM",
            ErrorCode::InadequateSecurity => "INADEQUATE_SECURITY",
            ErrorCode::Http11Required => "HTTP_1_1_REQUIRED",
        };
        f.write_str(name)
    }
}

/// The connection has no room for another concurrent stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("too much concurrency: {room_needed} more stream(s) needed")]
pub struct TooMuchConcurrency {
    /// How many streams would have to close before one can be opened.
    pub room_needed: usize,
}

/// An inbound event on a single stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A complete header block. The first one on a stream carries the
    /// response headers; a later one carries the trailers.
    Headers {
        headers: HeaderList,
        end_stream: bool,
    },
    /// A DATA frame payload.
    Data { data: Bytes, end_stream: bool },
    /// The peer promised a pushed stream.
    PushPromise {
        promised_stream_id: u32,
        headers: HeaderList,
    },
    /// The stream was reset or failed at the HTTP/2 level.
    Error(ErrorCode),
}

impl StreamEvent {
    /// Short event name for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Headers { .. } => "headers",
            StreamEvent::Data { .. } => "data",
            StreamEvent::PushPromise { .. } => "push_promise",
            StreamEvent::Error(_) => "stream_error",
        }
    }
}

/// An established HTTP/2 client connection.
pub trait Http2Connection {
    type Stream: Http2Stream;
    type Outgoing: OutgoingFlowControl;
    type Incoming: IncomingFlowControl;

    /// Reserve a fresh stream, or report that the concurrency budget is spent.
    fn open_stream(&self)
    -> impl Future<Output = Result<Self::Stream, TooMuchConcurrency>> + Send;

    /// Connection-scoped window for data we send.
    fn outgoing_flow_control(&self) -> &Self::Outgoing;

    /// Connection-scoped window for data we receive.
    fn incoming_flow_control(&self) -> &Self::Incoming;
}

/// One HTTP/2 stream owned by a call.
pub trait Http2Stream {
    type Outgoing: OutgoingFlowControl;
    type Incoming: IncomingFlowControl;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Stream identifier, for logging.
    fn id(&self) -> u32;

    /// Send a complete header block (END_HEADERS is always set).
    fn send_headers(
        &self,
        headers: &[HeaderField],
        end_stream: bool,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Send `data` as DATA, split into frames as the peer's maximum frame
    /// size requires. The caller has already withdrawn the credit.
    fn send_data(
        &self,
        data: Bytes,
        end_stream: bool,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Wait for the next inbound event on this stream.
    fn next_event(&self) -> impl Future<Output = StreamEvent> + Send;

    /// Stream-scoped window for data we send.
    fn outgoing_flow_control(&self) -> &Self::Outgoing;

    /// Stream-scoped window for data we receive.
    fn incoming_flow_control(&self) -> &Self::Incoming;
}
