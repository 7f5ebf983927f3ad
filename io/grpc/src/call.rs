//! Opening calls and the three call shapes.
//!
//! [`open`] takes a stream from the connection, sends the request headers
//! and runs a call handle on it. The handle decides the shape:
//!
//! - [`single_request`]: one request, one reply.
//! - [`stream_request`]: a stream of requests, one reply.
//! - [`stream_reply`]: one request, a stream of replies.

use crate::config::CallOptions;
use crate::error::{CallError, DecodeError};
use crate::headers::{HeaderField, HeaderList};
use crate::metrics;
use crate::reply::{RawReply, StreamTrailers, read_stream, wait_reply};
use crate::rpc::{ClientStreaming, Rpc, ServerStreaming};
use crate::send::{send_bytes, send_message};
use crate::transport::{Http2Connection, Http2Stream};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::future::Future;
use std::marker::PhantomData;
use tracing::debug;

/// Content type for protobuf-encoded gRPC.
pub const CONTENT_TYPE: &str = "application/grpc+proto";

/// Incoming window of the call's stream.
pub type StreamIncoming<C> = <<C as Http2Connection>::Stream as Http2Stream>::Incoming;

/// Outgoing window of the call's stream.
pub type StreamOutgoing<C> = <<C as Http2Connection>::Stream as Http2Stream>::Outgoing;

/// Everything a call handle works with once headers are sent.
///
/// The connection-scoped windows are reached through `conn`.
pub struct CallContext<'a, C: Http2Connection> {
    pub conn: &'a C,
    pub stream: &'a C::Stream,
    pub incoming: &'a StreamIncoming<C>,
    pub outgoing: &'a StreamOutgoing<C>,
    /// Largest response message to accept.
    pub max_message_size: usize,
}

/// A call shape, run once on a freshly opened stream.
pub trait RpcCall {
    type Rpc: Rpc;
    type Output;

    fn run<C: Http2Connection>(
        self,
        ctx: CallContext<'_, C>,
    ) -> impl Future<Output = Result<Self::Output, CallError>>;
}

/// Build the request header block for a call to `path`.
///
/// Required headers come first in a fixed order, followed by the
/// caller's metadata.
pub fn request_headers(path: &str, options: &CallOptions) -> HeaderList {
    let timeout = options.grpc_timeout().to_grpc_format();
    let mut headers = vec![
        HeaderField::new(&b":method"[..], &b"POST"[..]),
        HeaderField::new(&b":scheme"[..], options.scheme.as_str().as_bytes()),
        HeaderField::from_slices(b":path", path.as_bytes()),
        HeaderField::from_slices(b":authority", options.authority.as_bytes()),
        HeaderField::from_slices(b"grpc-timeout", timeout.as_bytes()),
        HeaderField::new(&b"content-type"[..], CONTENT_TYPE.as_bytes()),
        HeaderField::new(&b"te"[..], &b"trailers"[..]),
    ];
    headers.extend(options.extra_headers());
    headers
}

/// Open a stream on `conn`, send the request headers and run `call`.
///
/// Options are validated first; invalid options fail with
/// [`CallError::Options`] before a stream is taken. Fails with
/// [`CallError::TooMuchConcurrency`] if no stream is available.
pub async fn open<C, H>(conn: &C, options: &CallOptions, call: H) -> Result<H::Output, CallError>
where
    C: Http2Connection,
    H: RpcCall,
{
    let path = <H::Rpc as Rpc>::PATH;
    options.validate()?;

    let stream = match conn.open_stream().await {
        Ok(stream) => stream,
        Err(e) => {
            metrics::CALLS_REFUSED.increment();
            debug!(path, room_needed = e.room_needed, "call refused");
            return Err(e.into());
        }
    };

    debug!(
        path,
        stream_id = stream.id(),
        authority = %options.authority,
        "opening call"
    );
    metrics::CALLS.increment();

    let headers = request_headers(path, options);
    stream
        .send_headers(&headers, false)
        .await
        .map_err(CallError::transport)?;

    let ctx = CallContext {
        conn,
        stream: &stream,
        incoming: stream.incoming_flow_control(),
        outgoing: stream.outgoing_flow_control(),
        max_message_size: options.max_message_size,
    };
    let result = call.run(ctx).await;

    if let Err(e) = &result {
        debug!(path, stream_id = stream.id(), error = %e, "call failed");
    }
    result
}

/// One request message, one reply.
pub struct SingleRequest<R: Rpc> {
    input: R::Input,
    _rpc: PhantomData<fn() -> R>,
}

/// Unary call handle.
pub fn single_request<R: Rpc>(input: R::Input) -> SingleRequest<R> {
    SingleRequest {
        input,
        _rpc: PhantomData,
    }
}

impl<R: Rpc> RpcCall for SingleRequest<R> {
    type Rpc = R;
    type Output = RawReply<R::Output>;

    async fn run<C: Http2Connection>(
        self,
        ctx: CallContext<'_, C>,
    ) -> Result<Self::Output, CallError> {
        send_message(
            ctx.conn.outgoing_flow_control(),
            ctx.stream,
            ctx.outgoing,
            &self.input,
            true,
        )
        .await?;
        wait_reply(ctx.stream, ctx.incoming, ctx.max_message_size).await
    }
}

/// A stream of request messages, one reply.
pub struct StreamRequest<R: Rpc, P> {
    producer: P,
    _rpc: PhantomData<fn() -> R>,
}

/// Client-streaming call handle.
///
/// Every item `producer` yields is sent as one message. When it is
/// exhausted the request side of the stream is closed.
pub fn stream_request<R, P>(producer: P) -> StreamRequest<R, P>
where
    R: ClientStreaming,
    P: Stream<Item = R::Input>,
{
    StreamRequest {
        producer,
        _rpc: PhantomData,
    }
}

impl<R, P> RpcCall for StreamRequest<R, P>
where
    R: ClientStreaming,
    P: Stream<Item = R::Input>,
{
    type Rpc = R;
    type Output = RawReply<R::Output>;

    async fn run<C: Http2Connection>(
        self,
        ctx: CallContext<'_, C>,
    ) -> Result<Self::Output, CallError> {
        let conn_out = ctx.conn.outgoing_flow_control();
        let mut producer = std::pin::pin!(self.producer);
        let mut sent = 0usize;

        while let Some(input) = producer.next().await {
            send_message(conn_out, ctx.stream, ctx.outgoing, &input, false).await?;
            sent += 1;
        }

        debug!(stream_id = ctx.stream.id(), messages = sent, "request stream done");
        send_bytes(conn_out, ctx.stream, ctx.outgoing, Bytes::new(), true).await?;
        wait_reply(ctx.stream, ctx.incoming, ctx.max_message_size).await
    }
}

/// One request message, a stream of replies.
pub struct StreamReply<R: Rpc, F> {
    input: R::Input,
    handler: F,
    _rpc: PhantomData<fn() -> R>,
}

/// Server-streaming call handle.
///
/// `handler` sees the initial response headers and each reply message as
/// soon as it is decoded. The call returns the headers and trailers.
pub fn stream_reply<R, F>(input: R::Input, handler: F) -> StreamReply<R, F>
where
    R: ServerStreaming,
    F: FnMut(&[HeaderField], Result<R::Output, DecodeError>),
{
    StreamReply {
        input,
        handler,
        _rpc: PhantomData,
    }
}

impl<R, F> RpcCall for StreamReply<R, F>
where
    R: ServerStreaming,
    F: FnMut(&[HeaderField], Result<R::Output, DecodeError>),
{
    type Rpc = R;
    type Output = StreamTrailers;

    async fn run<C: Http2Connection>(
        self,
        ctx: CallContext<'_, C>,
    ) -> Result<Self::Output, CallError> {
        send_message(
            ctx.conn.outgoing_flow_control(),
            ctx.stream,
            ctx.outgoing,
            &self.input,
            true,
        )
        .await?;
        read_stream(ctx.stream, ctx.incoming, ctx.max_message_size, self.handler).await
    }
}
