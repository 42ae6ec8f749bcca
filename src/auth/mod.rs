//! Publisher authentication
//!
//! Handles the streaming credential and stream key validation.

pub mod credentials;
pub mod validator;

pub use credentials::StreamingCredential;
pub use validator::{stream_key_from_path, validate_stream_key};
