//! Tandem Protocol - Wire protocol for peer connections
//!
//! This crate provides the request and reply types exchanged between a
//! session controller and its peers, the protocol version handshake, and
//! the coercion of JSON values into typed settings. Messages travel as one
//! JSON object per line.

pub mod coerce;
pub mod message;
pub mod version;

pub use coerce::{from_wire, integer_text, to_wire, WireValue};
pub use message::{ErrorKind, PeerReply, PeerRequest, RequestEnvelope};
pub use version::{ProtocolVersion, VersionError};
