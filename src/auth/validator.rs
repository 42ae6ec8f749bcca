//! Stream key validator
//!
//! Extracts the stream key from a connect path and checks it against
//! the configured credential.

use super::credentials::StreamingCredential;
use crate::error::AuthError;

/// Returns the final `/`-separated segment of a connect path.
///
/// `"/live/abc123"` yields `"abc123"`; a trailing slash yields an empty key.
/// A query string is not part of the path: `"/live/abc123?token=x"` also
/// yields `"abc123"`.
pub fn stream_key_from_path(path: &str) -> &str {
    let path = path.split_once('?').map_or(path, |(path, _query)| path);
    path.rsplit('/').next().unwrap_or(path)
}

/// Validates the key presented in `path` against `credential`.
pub fn validate_stream_key(path: &str, credential: &StreamingCredential) -> Result<(), AuthError> {
    if credential.matches(stream_key_from_path(path)) {
        Ok(())
    } else {
        Err(AuthError::InvalidStreamKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_final_segment() {
        assert_eq!(stream_key_from_path("/live/abc123"), "abc123");
        assert_eq!(stream_key_from_path("rtmp://host:1935/live/abc123"), "abc123");
        assert_eq!(stream_key_from_path("abc123"), "abc123");
        assert_eq!(stream_key_from_path("/live/"), "");
    }

    #[test]
    fn query_string_is_not_part_of_the_key() {
        assert_eq!(stream_key_from_path("/live/abc123?token=x"), "abc123");
        assert_eq!(stream_key_from_path("/live/abc123?"), "abc123");
        assert_eq!(stream_key_from_path("/live/?key=abc123"), "");

        let credential = StreamingCredential::new("abc123");
        assert!(validate_stream_key("/live/abc123?token=x", &credential).is_ok());
        assert!(validate_stream_key("/live/wrong?abc123", &credential).is_err());
    }

    #[test]
    fn accepts_matching_key() {
        let credential = StreamingCredential::new("abc123");
        assert!(validate_stream_key("/live/abc123", &credential).is_ok());
    }

    #[test]
    fn rejects_wrong_key() {
        let credential = StreamingCredential::new("abc123");
        assert_eq!(
            validate_stream_key("/live/wrong", &credential),
            Err(AuthError::InvalidStreamKey)
        );
    }

    #[test]
    fn comparison_is_verbatim() {
        let credential = StreamingCredential::new("abc123");
        for path in ["/live/ABC123", "/live/abc123 ", "/live/abc12", "/abc123/live", "/live/"] {
            assert!(validate_stream_key(path, &credential).is_err(), "{path}");
        }
    }

    #[test]
    fn debug_hides_secret() {
        let credential = StreamingCredential::new("abc123");
        assert!(!format!("{credential:?}").contains("abc123"));
    }
}
