#![no_main]

use grpc_client::{DecodeError, decode_message, encode_message};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    match decode_message::<Vec<u8>>(data) {
        Ok(message) => {
            // Roundtrip: the re-encoded frame decodes to the same payload
            let reencoded = encode_message(&message);
            assert!(reencoded.len() >= 5);
            assert_eq!(decode_message::<Vec<u8>>(&reencoded), Ok(message));
        }
        Err(DecodeError::Incomplete { buffered }) => {
            assert!(buffered <= data.len());
        }
        Err(_) => {
            // Malformed input
        }
    }
});
