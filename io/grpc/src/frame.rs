//! gRPC message framing.
//!
//! gRPC messages are length-prefixed with the following format:
//! - 1 byte: compressed flag (always 0, compression is not supported)
//! - 4 bytes: message length (big-endian u32)
//! - N bytes: message payload (protobuf)
//!
//! Decoding is incremental. A [`MessageDecoder`] is fed chunks by value and
//! hands back a [`Decoded`] state; once a frame completes, the unconsumed
//! bytes are returned so the caller can start a fresh decoder on them.

use crate::error::DecodeError;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use std::fmt;
use std::marker::PhantomData;

/// Size of the gRPC message header (1 byte flag + 4 bytes length).
pub const HEADER_SIZE: usize = 5;

/// Maximum accepted message size (4MB default, matches gRPC default).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Serialize `message` and wrap it in a gRPC frame.
pub fn encode_message<M: Message>(message: &M) -> Bytes {
    let len = message.encoded_len();
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + len);

    // Compressed flag
    buf.put_u8(0);
    buf.put_u32(len as u32);
    // BytesMut grows on demand, so there is always room.
    let _ = message.encode(&mut buf);

    buf.freeze()
}

/// Decode exactly one message from a complete input.
///
/// Bytes after the first frame are ignored.
pub fn decode_message<M: Message + Default>(input: &[u8]) -> Result<M, DecodeError> {
    MessageDecoder::new().feed(input).finish()
}

/// Incremental decoder for a single gRPC frame.
pub struct MessageDecoder<M> {
    /// Bytes of the frame seen so far.
    buffer: BytesMut,
    max_message_size: usize,
    _message: PhantomData<fn() -> M>,
}

/// Decoder state after a chunk has been fed.
#[derive(Debug)]
pub enum Decoded<M> {
    /// More input is needed.
    Partial(MessageDecoder<M>),
    /// A whole frame was read. `output` holds the codec result; `remaining`
    /// the bytes that followed the frame.
    Done {
        output: Result<M, DecodeError>,
        remaining: Bytes,
    },
    /// The frame header is malformed. Nothing after it can be trusted.
    Fail { error: DecodeError, remaining: Bytes },
}

impl<M> Decoded<M> {
    /// Collapse to a result as if input ended here.
    pub fn finish(self) -> Result<M, DecodeError> {
        match self {
            Decoded::Partial(decoder) => Err(decoder.incomplete()),
            Decoded::Done { output, .. } => output,
            Decoded::Fail { error, .. } => Err(error),
        }
    }
}

impl<M> MessageDecoder<M> {
    /// Create a decoder with the default size limit.
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a decoder that rejects frames longer than `max_message_size`.
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_message_size,
            _message: PhantomData,
        }
    }

    /// The size limit this decoder enforces.
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Check if there's any buffered data.
    pub fn has_buffered_data(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Get the amount of buffered data.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// The error to report when input ends now.
    pub fn incomplete(&self) -> DecodeError {
        DecodeError::Incomplete {
            buffered: self.buffer.len(),
        }
    }

    /// A fresh decoder with the same limit.
    pub fn reset(&self) -> Self {
        Self::with_max_message_size(self.max_message_size)
    }
}

impl<M: Message + Default> MessageDecoder<M> {
    /// Append a chunk and advance.
    pub fn feed(mut self, chunk: &[u8]) -> Decoded<M> {
        self.buffer.extend_from_slice(chunk);
        self.advance()
    }

    /// Advance on an owned chunk.
    ///
    /// With nothing buffered, a whole frame is sliced out of `chunk` and
    /// `remaining` shares its storage. Only a partial frame is copied.
    pub fn feed_bytes(mut self, chunk: Bytes) -> Decoded<M> {
        if !self.buffer.is_empty() {
            self.buffer.extend_from_slice(&chunk);
            return self.advance();
        }

        match frame_length(&chunk, self.max_message_size) {
            Ok(Some(length)) if chunk.len() >= HEADER_SIZE + length => Decoded::Done {
                output: decode_payload(chunk.slice(HEADER_SIZE..HEADER_SIZE + length)),
                remaining: chunk.slice(HEADER_SIZE + length..),
            },
            Ok(_) => {
                self.buffer.extend_from_slice(&chunk);
                Decoded::Partial(self)
            }
            Err(error) => Decoded::Fail {
                error,
                remaining: chunk,
            },
        }
    }

    fn advance(mut self) -> Decoded<M> {
        let length = match frame_length(&self.buffer, self.max_message_size) {
            Ok(Some(length)) if self.buffer.len() >= HEADER_SIZE + length => length,
            Ok(_) => return Decoded::Partial(self),
            Err(error) => {
                return Decoded::Fail {
                    error,
                    remaining: self.buffer.freeze(),
                };
            }
        };

        self.buffer.advance(HEADER_SIZE);
        let payload = self.buffer.split_to(length).freeze();

        Decoded::Done {
            output: decode_payload(payload),
            remaining: self.buffer.freeze(),
        }
    }
}

/// Payload length from a frame header, `None` if the header is not all
/// there yet.
fn frame_length(buf: &[u8], max_message_size: usize) -> Result<Option<usize>, DecodeError> {
    if buf.len() < HEADER_SIZE {
        return Ok(None);
    }

    let flag = buf[0];
    if flag != 0 {
        return Err(DecodeError::Compressed(flag));
    }

    let length = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
    if length > max_message_size {
        return Err(DecodeError::MessageTooLarge {
            length,
            limit: max_message_size,
        });
    }

    Ok(Some(length))
}

fn decode_payload<M: Message + Default>(payload: Bytes) -> Result<M, DecodeError> {
    M::decode(payload).map_err(|e| DecodeError::Codec(e.to_string()))
}

impl<M> Default for MessageDecoder<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for MessageDecoder<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDecoder")
            .field("buffered", &self.buffer.len())
            .field("max_message_size", &self.max_message_size)
            .finish()
    }
}
