//! Call engine metrics.

use metriken::{Counter, metric};

/// Calls that obtained a stream and sent request headers.
#[metric(name = "grpc_calls")]
pub static CALLS: Counter = Counter::new();

/// Calls refused because the connection had no room for another stream.
#[metric(name = "grpc_calls_refused")]
pub static CALLS_REFUSED: Counter = Counter::new();

/// Request messages sent.
#[metric(name = "grpc_messages_sent")]
pub static MESSAGES_SENT: Counter = Counter::new();

/// Response messages decoded, including ones the codec rejected.
#[metric(name = "grpc_messages_received")]
pub static MESSAGES_RECEIVED: Counter = Counter::new();

/// Request bytes written as DATA, including gRPC framing.
#[metric(name = "grpc_bytes_sent")]
pub static BYTES_SENT: Counter = Counter::new();

/// Response bytes received as DATA.
#[metric(name = "grpc_bytes_received")]
pub static BYTES_RECEIVED: Counter = Counter::new();

/// Response messages that failed framing or decoding.
#[metric(name = "grpc_decode_errors")]
pub static DECODE_ERRORS: Counter = Counter::new();

/// Calls aborted by a push promise, stream error or out-of-order event.
#[metric(name = "grpc_protocol_errors")]
pub static PROTOCOL_ERRORS: Counter = Counter::new();
