//! Tandem Session - connections, broadcast and the peer server
//!
//! This crate ties the per-process setting registry to the other processes
//! of a backup session:
//! - `connection` - the `Connection` contract and the in-process connection
//! - `pipe` - connections to peer processes over a byte stream
//! - `frame` - newline-delimited JSON framing
//! - `connections` - the ordered `ConnectionRegistry`, local first
//! - `installer` - `PatternInstaller`, broadcasting compiled matchers
//! - `dispatch` - name-driven application of requests to a registry
//! - `server` - the peer side of a stream connection
//! - `session` - the `Session` context object owning all of the above
//! - `config` - TOML session configuration
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────── controller ────────────────────────┐
//! │                                                            │
//! │  Session ──▶ PatternInstaller ──▶ ConnectionRegistry       │
//! │     │                              │ 0: LocalConnection ───┼──▶ Dispatcher ──▶ SettingRegistry
//! │     │                              │ 1: PipeConnection ────┼──┐
//! │     ▼                              │ 2: PipeConnection ────┼─┐│
//! │  SettingsHandle                                            │ ││
//! └────────────────────────────────────────────────────────────┘ ││
//!                                        peer: serve() ◀─────────┘│
//!                                        peer: serve() ◀──────────┘
//! ```
//!
//! Broadcasts are sequential and blocking: one connection at a time, in
//! registry order, local first.
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`

pub mod config;
pub mod connection;
pub mod connections;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod installer;
pub mod pipe;
pub mod server;
pub mod session;

pub use config::{ConfigError, PatternEntry, PeerCommand, SessionConfig};
pub use connection::{Connection, ConnectionId, ConnectionKind, LocalConnection};
pub use connections::ConnectionRegistry;
pub use dispatch::{Dispatcher, SharedRuleParser};
pub use error::{SessionError, SessionResult, TransportError};
pub use installer::PatternInstaller;
pub use pipe::{PipeConnection, StreamConnection};
pub use server::{serve, serve_with, ServeSummary};
pub use session::Session;
