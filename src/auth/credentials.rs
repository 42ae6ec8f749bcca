//! Streaming credential
//!
//! The configured secret a publisher must present to be admitted.

use std::fmt;

/// Immutable shared secret, compared verbatim against the presented stream key.
#[derive(Clone, PartialEq, Eq)]
pub struct StreamingCredential(String);

impl StreamingCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Byte-for-byte comparison with a candidate key.
    pub fn matches(&self, candidate: &str) -> bool {
        self.0.as_bytes() == candidate.as_bytes()
    }
}

// Keep the secret out of logs
impl fmt::Debug for StreamingCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamingCredential(***)")
    }
}
