//! Reading replies off a call's stream.
//!
//! A reply is an initial header block, zero or more DATA frames carrying
//! gRPC-framed messages, and a trailing header block. Every DATA payload is
//! accounted against the stream's inbound window before it is decoded.

use crate::error::{CallError, DecodeError};
use crate::flow::IncomingFlowControl;
use crate::frame::{Decoded, MessageDecoder};
use crate::headers::{HeaderField, HeaderList};
use crate::metrics;
use crate::status::Status;
use crate::transport::{ErrorCode, Http2Stream, StreamEvent};

use bytes::Bytes;
use prost::Message;
use tracing::{debug, trace, warn};

/// A completed unary or client-streaming reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<O> {
    /// Initial response headers.
    pub headers: HeaderList,
    /// Trailing headers, absent if the peer ended the stream with DATA.
    pub trailers: Option<HeaderList>,
    /// The response message, or why there is none.
    pub output: Result<O, DecodeError>,
}

impl<O> Reply<O> {
    /// The gRPC status from the trailers.
    pub fn status(&self) -> Option<Status> {
        self.trailers.as_deref().map(Status::from_trailers)
    }
}

/// A reply, or the HTTP/2 error that ended the stream.
pub type RawReply<O> = Result<Reply<O>, ErrorCode>;

/// Headers and trailers of a server-streaming reply.
pub type StreamTrailers = (HeaderList, Option<HeaderList>);

fn protocol_error(stream_id: u32, err: CallError) -> CallError {
    metrics::PROTOCOL_ERRORS.increment();
    warn!(stream_id, error = %err, "call aborted");
    err
}

/// Reconcile a received DATA payload against the inbound window.
async fn account<I: IncomingFlowControl>(stream_id: u32, incoming: &I, len: usize) {
    if len == 0 {
        return;
    }
    metrics::BYTES_RECEIVED.add(len as u64);
    incoming.add_credit(len);
    let window = incoming.consume_credit(len);
    if window < 0 {
        warn!(stream_id, window, "peer exceeded inbound window");
    }
    if incoming.update_window().await {
        trace!(stream_id, "window update sent");
    }
}

/// First event of a reply: the initial headers.
enum Opening {
    Headers {
        headers: HeaderList,
        end_stream: bool,
    },
    Reset(ErrorCode),
}

async fn await_headers<S: Http2Stream>(stream: &S) -> Result<Opening, CallError> {
    match stream.next_event().await {
        StreamEvent::Headers {
            headers,
            end_stream,
        } => Ok(Opening::Headers {
            headers,
            end_stream,
        }),
        StreamEvent::Error(code) => Ok(Opening::Reset(code)),
        StreamEvent::PushPromise {
            promised_stream_id,
            ..
        } => Err(protocol_error(
            stream.id(),
            CallError::PushPromise { promised_stream_id },
        )),
        event @ StreamEvent::Data { .. } => Err(protocol_error(
            stream.id(),
            CallError::UnexpectedEvent {
                state: "awaiting headers",
                event: event.kind(),
            },
        )),
    }
}

/// Wait for a reply carrying at most one message.
///
/// The first complete message becomes the output. Anything after it is
/// accounted for and dropped. A malformed frame or a reply without a
/// message is reported in `output`, not as a call error. A stream error
/// from the transport is returned as `Err(code)` inside `Ok`.
pub async fn wait_reply<S, M>(
    stream: &S,
    incoming: &S::Incoming,
    max_message_size: usize,
) -> Result<RawReply<M>, CallError>
where
    S: Http2Stream,
    M: Message + Default,
{
    let stream_id = stream.id();
    let headers = match await_headers(stream).await? {
        Opening::Headers {
            headers,
            end_stream: true,
        } => {
            debug!(stream_id, "trailers-only reply");
            return Ok(Ok(Reply {
                trailers: Some(headers.clone()),
                headers,
                output: Err(DecodeError::Incomplete { buffered: 0 }),
            }));
        }
        Opening::Headers { headers, .. } => headers,
        Opening::Reset(code) => {
            debug!(stream_id, %code, "stream reset before headers");
            return Ok(Err(code));
        }
    };

    let mut decoder = Some(MessageDecoder::<M>::with_max_message_size(max_message_size));
    let mut output: Option<Result<M, DecodeError>> = None;

    let trailers = loop {
        match stream.next_event().await {
            StreamEvent::Headers { headers, .. } => break Some(headers),
            StreamEvent::Data { data, end_stream } => {
                let len = data.len();
                account(stream_id, incoming, len).await;

                if let Some(d) = decoder.take() {
                    match d.feed_bytes(data) {
                        Decoded::Partial(d) => decoder = Some(d),
                        Decoded::Done {
                            output: value,
                            remaining,
                        } => {
                            metrics::MESSAGES_RECEIVED.increment();
                            if value.is_err() {
                                metrics::DECODE_ERRORS.increment();
                            }
                            if !remaining.is_empty() {
                                warn!(stream_id, extra = remaining.len(), "ignoring data after reply");
                            }
                            output = Some(value);
                        }
                        Decoded::Fail { error, .. } => {
                            metrics::DECODE_ERRORS.increment();
                            debug!(stream_id, %error, "malformed reply");
                            output = Some(Err(error));
                        }
                    }
                } else if len > 0 {
                    warn!(stream_id, extra = len, "ignoring data after reply");
                }

                if end_stream {
                    break None;
                }
            }
            StreamEvent::Error(code) => {
                debug!(stream_id, %code, "stream reset");
                return Ok(Err(code));
            }
            StreamEvent::PushPromise {
                promised_stream_id,
                ..
            } => {
                return Err(protocol_error(
                    stream_id,
                    CallError::PushPromise { promised_stream_id },
                ));
            }
        }
    };

    let output = match (output, decoder) {
        (Some(output), _) => output,
        (None, Some(d)) => Err(d.incomplete()),
        (None, None) => Err(DecodeError::Incomplete { buffered: 0 }),
    };

    Ok(Ok(Reply {
        headers,
        trailers,
        output,
    }))
}

/// Decode loop state between DATA events.
struct DecodeLoop<M> {
    headers: HeaderList,
    decoder: MessageDecoder<M>,
}

impl<M: Message + Default> DecodeLoop<M> {
    fn new(headers: HeaderList, max_message_size: usize) -> Self {
        Self {
            headers,
            decoder: MessageDecoder::with_max_message_size(max_message_size),
        }
    }

    /// Feed one DATA payload, delivering every message it completes.
    ///
    /// A frame that cannot be delimited is delivered and then ends the call.
    fn feed<F>(self, mut chunk: Bytes, handler: &mut F) -> Result<Self, CallError>
    where
        F: FnMut(&[HeaderField], Result<M, DecodeError>),
    {
        let DecodeLoop {
            headers,
            mut decoder,
        } = self;

        loop {
            let fresh = decoder.reset();
            match decoder.feed_bytes(chunk) {
                Decoded::Partial(d) => {
                    return Ok(DecodeLoop {
                        headers,
                        decoder: d,
                    });
                }
                Decoded::Done { output, remaining } => {
                    metrics::MESSAGES_RECEIVED.increment();
                    if output.is_err() {
                        metrics::DECODE_ERRORS.increment();
                    }
                    handler(&headers, output);

                    decoder = fresh;
                    chunk = remaining;
                    if chunk.is_empty() {
                        return Ok(DecodeLoop { headers, decoder });
                    }
                }
                Decoded::Fail { error, .. } => {
                    metrics::DECODE_ERRORS.increment();
                    handler(&headers, Err(error.clone()));
                    return Err(CallError::Decode(error));
                }
            }
        }
    }

    /// End of input. A buffered partial frame is a truncation.
    fn finish<F>(self, handler: &mut F) -> Result<HeaderList, CallError>
    where
        F: FnMut(&[HeaderField], Result<M, DecodeError>),
    {
        if self.decoder.has_buffered_data() {
            let error = self.decoder.incomplete();
            metrics::DECODE_ERRORS.increment();
            handler(&self.headers, Err(error.clone()));
            return Err(CallError::Decode(error));
        }
        Ok(self.headers)
    }
}

/// Read a streamed reply, calling `handler` for every message as soon as
/// its frame completes.
///
/// Returns the initial headers and the trailers. Any stream error, push
/// promise or malformed frame ends the call with an error; a malformed
/// frame is delivered to `handler` first.
pub async fn read_stream<S, M, F>(
    stream: &S,
    incoming: &S::Incoming,
    max_message_size: usize,
    mut handler: F,
) -> Result<StreamTrailers, CallError>
where
    S: Http2Stream,
    M: Message + Default,
    F: FnMut(&[HeaderField], Result<M, DecodeError>),
{
    let stream_id = stream.id();
    let mut state = match await_headers(stream).await? {
        Opening::Headers {
            headers,
            end_stream: true,
        } => {
            debug!(stream_id, "trailers-only reply");
            return Ok((headers.clone(), Some(headers)));
        }
        Opening::Headers { headers, .. } => DecodeLoop::<M>::new(headers, max_message_size),
        Opening::Reset(code) => {
            return Err(protocol_error(stream_id, CallError::StreamError(code)));
        }
    };

    loop {
        match stream.next_event().await {
            StreamEvent::Headers { headers, .. } => {
                let initial = state.finish(&mut handler)?;
                return Ok((initial, Some(headers)));
            }
            StreamEvent::Data { data, end_stream } => {
                account(stream_id, incoming, data.len()).await;
                state = state.feed(data, &mut handler)?;
                if end_stream {
                    debug!(stream_id, "reply ended without trailers");
                    return Ok((state.finish(&mut handler)?, None));
                }
            }
            StreamEvent::Error(code) => {
                return Err(protocol_error(stream_id, CallError::StreamError(code)));
            }
            StreamEvent::PushPromise {
                promised_stream_id,
                ..
            } => {
                return Err(protocol_error(
                    stream_id,
                    CallError::PushPromise { promised_stream_id },
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{DEFAULT_MAX_MESSAGE_SIZE, encode_message};
    use crate::headers;
    use crate::status::Code;

    type Seen = Vec<Result<String, DecodeError>>;

    fn collect(seen: &mut Seen) -> impl FnMut(&[HeaderField], Result<String, DecodeError>) + '_ {
        move |h: &[HeaderField], value: Result<String, DecodeError>| {
            assert_eq!(headers::find(h, b":status"), Some(&b"200"[..]));
            seen.push(value);
        }
    }

    fn initial() -> HeaderList {
        vec![HeaderField::from_slices(b":status", b"200")]
    }

    fn frames(messages: &[&str]) -> Vec<u8> {
        messages
            .iter()
            .flat_map(|m| encode_message(&m.to_string()).to_vec())
            .collect()
    }

    #[test]
    fn test_decode_loop_delivers_in_order_across_chunks() {
        let wire = frames(&["one", "two", "three", "four"]);

        for chunk_size in 1..=wire.len() {
            let mut seen = Seen::new();
            let mut handler = collect(&mut seen);
            let mut state = DecodeLoop::<String>::new(initial(), DEFAULT_MAX_MESSAGE_SIZE);
            for chunk in wire.chunks(chunk_size) {
                state = state
                    .feed(Bytes::copy_from_slice(chunk), &mut handler)
                    .unwrap();
            }
            assert!(state.finish(&mut handler).is_ok());
            drop(handler);

            let values: Vec<_> = seen.into_iter().map(Result::unwrap).collect();
            assert_eq!(values, vec!["one", "two", "three", "four"], "chunk size {chunk_size}");
        }
    }

    #[test]
    fn test_decode_loop_fail_is_delivered_then_aborts() {
        let mut wire = frames(&["ok"]);
        wire.extend_from_slice(&[1, 0, 0, 0, 1, 0]);

        let mut seen = Seen::new();
        let mut handler = collect(&mut seen);
        let state = DecodeLoop::<String>::new(initial(), DEFAULT_MAX_MESSAGE_SIZE);
        let err = state.feed(Bytes::from(wire), &mut handler).err().unwrap();
        drop(handler);

        assert!(matches!(err, CallError::Decode(DecodeError::Compressed(1))));
        assert_eq!(
            seen,
            vec![Ok("ok".to_string()), Err(DecodeError::Compressed(1))]
        );
    }

    #[test]
    fn test_decode_loop_truncation_on_finish() {
        let wire = frames(&["whole", "cut"]);
        let cut = wire.len() - 2;

        let mut seen = Seen::new();
        let mut handler = collect(&mut seen);
        let state = DecodeLoop::<String>::new(initial(), DEFAULT_MAX_MESSAGE_SIZE)
            .feed(Bytes::copy_from_slice(&wire[..cut]), &mut handler)
            .unwrap();
        let err = state.finish(&mut handler).unwrap_err();
        drop(handler);

        assert!(matches!(
            err,
            CallError::Decode(DecodeError::Incomplete { buffered: 8 })
        ));
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Ok("whole".to_string()));
        assert!(seen[1].is_err());
    }

    #[test]
    fn test_decode_loop_codec_error_continues() {
        // A string field holding invalid UTF-8, then a valid frame.
        let mut wire = vec![0, 0, 0, 0, 3, 0x0a, 1, 0xff];
        wire.extend(frames(&["after"]));

        let mut seen = Seen::new();
        let mut handler = collect(&mut seen);
        let state = DecodeLoop::<String>::new(initial(), DEFAULT_MAX_MESSAGE_SIZE)
            .feed(Bytes::from(wire), &mut handler)
            .unwrap();
        assert!(state.finish(&mut handler).is_ok());
        drop(handler);

        assert!(matches!(seen[0], Err(DecodeError::Codec(_))));
        assert_eq!(seen[1], Ok("after".to_string()));
    }

    #[test]
    fn test_decode_loop_respects_limit() {
        let wire = frames(&["this is too long"]);
        let mut seen = Seen::new();
        let mut handler = collect(&mut seen);
        let err = DecodeLoop::<String>::new(initial(), 4)
            .feed(Bytes::from(wire), &mut handler)
            .err()
            .unwrap();
        drop(handler);

        assert!(matches!(
            err,
            CallError::Decode(DecodeError::MessageTooLarge { limit: 4, .. })
        ));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_decode_loop_large_chunk_of_small_frames() {
        let count = 50_000;
        let wire = frames(&vec![""; count]);
        assert_eq!(wire.len(), count * 5);

        let mut seen = Seen::new();
        let mut handler = collect(&mut seen);
        let state = DecodeLoop::<String>::new(initial(), DEFAULT_MAX_MESSAGE_SIZE)
            .feed(Bytes::from(wire), &mut handler)
            .unwrap();
        assert!(state.finish(&mut handler).is_ok());
        drop(handler);

        assert_eq!(seen.len(), count);
        assert!(seen.iter().all(|v| v.as_deref() == Ok("")));
    }

    #[test]
    fn test_reply_status() {
        let reply: Reply<String> = Reply {
            headers: initial(),
            trailers: Some(vec![
                HeaderField::from_slices(b"grpc-status", b"7"),
                HeaderField::from_slices(b"grpc-message", b"denied"),
            ]),
            output: Err(DecodeError::Incomplete { buffered: 0 }),
        };
        let status = reply.status().unwrap();
        assert_eq!(status.code(), Code::PermissionDenied);
        assert_eq!(status.message(), Some("denied"));

        let reply = Reply {
            trailers: None,
            ..reply
        };
        assert!(reply.status().is_none());
    }
}
