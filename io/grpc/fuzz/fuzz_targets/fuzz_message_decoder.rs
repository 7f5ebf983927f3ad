#![no_main]

use bytes::Bytes;
use grpc_client::frame::HEADER_SIZE;
use grpc_client::{Decoded, MessageDecoder};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Feed data in chunks to test incremental decoding
    let chunk_size = if data.len() > 10 { data.len() / 3 } else { 1 };

    let mut decoder = MessageDecoder::<String>::with_max_message_size(64 * 1024);
    let mut consumed = 0;

    for chunk in data.chunks(chunk_size.max(1)) {
        let mut input = Bytes::copy_from_slice(chunk);
        loop {
            let before = decoder.buffered_len() + input.len();
            match decoder.feed_bytes(input) {
                Decoded::Partial(d) => {
                    decoder = d;
                    break;
                }
                Decoded::Done { output, remaining } => {
                    let _ = output;
                    let frame_len = before - remaining.len();
                    assert!(frame_len >= HEADER_SIZE);
                    consumed += frame_len;
                    decoder = MessageDecoder::with_max_message_size(64 * 1024);
                    if remaining.is_empty() {
                        break;
                    }
                    input = remaining;
                }
                Decoded::Fail { .. } => return,
            }
        }
    }

    // Verify buffer state is consistent
    assert_eq!(consumed + decoder.buffered_len(), data.len());
    assert_eq!(decoder.has_buffered_data(), decoder.buffered_len() > 0);
});
