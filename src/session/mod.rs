//! Ingest session management
//!
//! Admission, exclusivity and teardown of the single publisher session,
//! plus the notifications fired to the rest of the system.

pub mod gate;
pub mod handler;
pub mod state;

pub use gate::{Admission, SessionGate};
pub use handler::{BroadcasterInfo, IngestHandler, StreamDetails};
pub use state::{ActiveSession, Disconnect, SessionId};
