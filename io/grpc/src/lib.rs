//! grpc-client - gRPC call execution over an established HTTP/2 connection.
//!
//! This crate drives individual gRPC calls on streams of an HTTP/2
//! connection it does not own. The connection, its streams and the
//! flow-control ledgers are reached through the traits in [`transport`]
//! and [`flow`]; message payloads are protobuf, encoded with `prost`.
//!
//! # Calls
//!
//! A method is described by a type implementing [`Rpc`], usually declared
//! with the [`rpc!`] macro. A call is made by passing one of the call
//! shapes to [`open`]:
//!
//! - [`single_request`] for unary methods
//! - [`stream_request`] for client-streaming methods
//! - [`stream_reply`] for server-streaming methods
//!
//! # Framing
//!
//! gRPC messages are framed as:
//! - 1 byte: compressed flag (always 0)
//! - 4 bytes: message length (big-endian u32)
//! - N bytes: message payload (protobuf)
//!
//! Compression is not supported. A non-zero flag in a reply is a decode
//! error.
//!
//! # Flow control
//!
//! Request data is only sent against credit withdrawn from both the
//! stream and the connection window. Reply data is accounted against the
//! stream's inbound window as it arrives.

pub mod call;
pub mod config;
pub mod error;
pub mod flow;
pub mod frame;
pub mod headers;
pub mod metrics;
pub mod reply;
pub mod rpc;
pub mod send;
pub mod status;
pub mod transport;

pub use call::{
    CallContext, RpcCall, SingleRequest, StreamReply, StreamRequest, open, single_request,
    stream_reply, stream_request,
};
pub use config::{CallOptions, Scheme};
pub use error::{CallError, ConfigError, DecodeError};
pub use flow::{CreditWindow, IncomingFlowControl, OutgoingFlowControl};
pub use frame::{Decoded, MessageDecoder, decode_message, encode_message};
pub use headers::{HeaderField, HeaderList, Timeout};
pub use reply::{RawReply, Reply, StreamTrailers};
pub use rpc::{ClientStreaming, Rpc, ServerStreaming};
pub use status::{Code, Status};
pub use transport::{ErrorCode, Http2Connection, Http2Stream, StreamEvent, TooMuchConcurrency};
