//! gRPC status carried in response trailers.

use crate::headers::{self, HeaderField};

use std::fmt;

/// Trailer carrying the numeric status code.
pub const GRPC_STATUS: &[u8] = b"grpc-status";

/// Trailer carrying the percent-encoded status message.
pub const GRPC_MESSAGE: &[u8] = b"grpc-message";

/// gRPC status codes (different from HTTP status codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Code {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Create a Code from its numeric value. Unknown values map to `Unknown`.
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Code::Ok,
            1 => Code::Cancelled,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn is_ok(self) -> bool {
        self == Code::Ok
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Code::Ok => "OK",
            Code::Cancelled => "CANCELLED",
            Code::Unknown => "UNKNOWN",
            Code::InvalidArgument => "INVALID_ARGUMENT",
            Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Code::NotFound => "NOT_FOUND",
            Code::AlreadyExists => "ALREADY_EXISTS",
            Code::PermissionDenied => "PERMISSION_DENIED",
            Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Code::FailedPrecondition => "FAILED_PRECONDITION",
            Code::Aborted => "ABORTED",
            Code::OutOfRange => "OUT_OF_RANGE",
            Code::Unimplemented => "UNIMPLEMENTED",
            Code::Internal => "INTERNAL",
            Code::Unavailable => "UNAVAILABLE",
            Code::DataLoss => "DATA_LOSS",
            Code::Unauthenticated => "UNAUTHENTICATED",
        };
        f.write_str(name)
    }
}

/// gRPC status returned from an RPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: Code,
    message: Option<String>,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    pub fn from_code(code: Code) -> Self {
        Self {
            code,
            message: None,
        }
    }

    /// Read `grpc-status` and `grpc-message` from a trailer block.
    ///
    /// A missing or unparsable `grpc-status` is `Unknown`.
    pub fn from_trailers(trailers: &[HeaderField]) -> Self {
        let code = headers::find(trailers, GRPC_STATUS)
            .and_then(|v| std::str::from_utf8(v).ok())
            .and_then(|s| s.trim().parse::<u32>().ok())
            .map(Code::from_u32)
            .unwrap_or(Code::Unknown);

        let message = headers::find(trailers, GRPC_MESSAGE)
            .map(percent_decode)
            .filter(|m| !m.is_empty());

        Self { code, message }
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(msg) = &self.message {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for Status {}

/// Undo `grpc-message` percent-encoding. Malformed escapes pass through.
fn percent_decode(value: &[u8]) -> String {
    let mut out = Vec::with_capacity(value.len());
    let mut i = 0;
    while i < value.len() {
        if value[i] == b'%'
            && i + 2 < value.len()
            && let (Some(hi), Some(lo)) = (hex(value[i + 1]), hex(value[i + 2]))
        {
            out.push(hi << 4 | lo);
            i += 3;
            continue;
        }
        out.push(value[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trailers(pairs: &[(&'static str, &'static str)]) -> Vec<HeaderField> {
        pairs
            .iter()
            .map(|(k, v)| HeaderField::new(*k, *v))
            .collect()
    }

    #[test]
    fn test_code_roundtrip() {
        for i in 0..=16 {
            assert_eq!(Code::from_u32(i).as_u32(), i);
        }
    }

    #[test]
    fn test_code_from_u32_unknown() {
        assert_eq!(Code::from_u32(17), Code::Unknown);
        assert_eq!(Code::from_u32(u32::MAX), Code::Unknown);
    }

    #[test]
    fn test_code_display() {
        assert_eq!(Code::Ok.to_string(), "OK");
        assert_eq!(Code::DeadlineExceeded.to_string(), "DEADLINE_EXCEEDED");
        assert_eq!(Code::Unauthenticated.to_string(), "UNAUTHENTICATED");
    }

    #[test]
    fn test_status_from_trailers_ok() {
        let status = Status::from_trailers(&trailers(&[("grpc-status", "0")]));
        assert_eq!(status.code(), Code::Ok);
        assert!(status.is_ok());
        assert!(status.message().is_none());
    }

    #[test]
    fn test_status_from_trailers_with_message() {
        let status = Status::from_trailers(&trailers(&[
            ("grpc-status", "5"),
            ("grpc-message", "resource not found"),
        ]));
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), Some("resource not found"));
        assert_eq!(status.to_string(), "NOT_FOUND: resource not found");
    }

    #[test]
    fn test_status_from_trailers_percent_encoded() {
        let status = Status::from_trailers(&trailers(&[
            ("grpc-status", "13"),
            ("grpc-message", "bad%20thing%3A%20%E2%9C%93"),
        ]));
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(status.message(), Some("bad thing: \u{2713}"));
    }

    #[test]
    fn test_status_from_trailers_missing() {
        let status = Status::from_trailers(&[]);
        assert_eq!(status.code(), Code::Unknown);
    }

    #[test]
    fn test_status_from_trailers_invalid_code() {
        let status = Status::from_trailers(&trailers(&[("grpc-status", "not-a-number")]));
        assert_eq!(status.code(), Code::Unknown);
    }

    #[test]
    fn test_percent_decode_malformed() {
        assert_eq!(percent_decode(b"100%"), "100%");
        assert_eq!(percent_decode(b"%zz"), "%zz");
        assert_eq!(percent_decode(b"%41"), "A");
    }

    #[test]
    fn test_status_display_code_only() {
        assert_eq!(Status::from_code(Code::Aborted).to_string(), "ABORTED");
        assert_eq!(
            Status::new(Code::Unavailable, "down").to_string(),
            "UNAVAILABLE: down"
        );
    }
}
