//! Header lists and the `grpc-timeout` value.

use bytes::Bytes;
use std::fmt;
use std::time::Duration;

/// A single header (name, value) pair.
///
/// Names and values are raw byte strings; no case normalization is applied.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HeaderField {
    pub name: Bytes,
    pub value: Bytes,
}

impl HeaderField {
    /// Create a header field.
    pub fn new(name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Create a header field by copying from borrowed slices.
    pub fn from_slices(name: &[u8], value: &[u8]) -> Self {
        Self {
            name: Bytes::copy_from_slice(name),
            value: Bytes::copy_from_slice(value),
        }
    }
}

impl fmt::Debug for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            String::from_utf8_lossy(&self.name),
            String::from_utf8_lossy(&self.value)
        )
    }
}

/// An ordered list of headers, as sent or received on a stream.
pub type HeaderList = Vec<HeaderField>;

/// Find the first value for `name` in a header list.
pub fn find<'a>(headers: &'a [HeaderField], name: &[u8]) -> Option<&'a [u8]> {
    headers
        .iter()
        .find(|h| h.name.as_ref() == name)
        .map(|h| h.value.as_ref())
}

/// Largest value `grpc-timeout` can carry: eight ASCII digits.
pub const MAX_TIMEOUT_SECS: u64 = 99_999_999;

/// Advisory call deadline sent to the peer as `grpc-timeout`.
///
/// Whole seconds only. Nothing in this crate enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timeout {
    secs: u64,
}

impl Timeout {
    /// Create a timeout from seconds.
    pub const fn from_secs(secs: u64) -> Self {
        Self { secs }
    }

    /// Create a timeout from a duration, rounding any fraction up.
    pub fn from_duration(duration: Duration) -> Self {
        let mut secs = duration.as_secs();
        if duration.subsec_nanos() > 0 {
            secs = secs.saturating_add(1);
        }
        Self { secs }
    }

    /// Number of whole seconds.
    pub fn as_secs(&self) -> u64 {
        self.secs
    }

    /// Get the timeout as a duration.
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.secs)
    }

    /// Format as the `grpc-timeout` header value, e.g. `30S`.
    ///
    /// Values past [`MAX_TIMEOUT_SECS`] are clamped to it.
    pub fn to_grpc_format(self) -> String {
        format!("{}S", self.secs.min(MAX_TIMEOUT_SECS))
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Self::from_secs(10)
    }
}
