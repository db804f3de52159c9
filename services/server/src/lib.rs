//! Companion Server Library Crate
//!
//! This library contains the network side of the character chat service:
//! configuration, the framed wire protocol, the session registry, the
//! per-connection state machine, and the accept loop. The `server` binary is a
//! thin wrapper around this library.

pub mod config;
pub mod connection;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod state;
