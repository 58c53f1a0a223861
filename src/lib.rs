//! varsvr: a shared in-memory variable server
//!
//! The server holds named, type-tagged values and exposes them to many
//! concurrent clients over TCP.
//!
//! # Architecture
//!
//! - Single-threaded mio event loop; every socket is non-blocking
//! - Closed type system with capability-flagged descriptors
//! - Name index built on an unbalanced binary search tree
//! - Client input handled by a pluggable [`protocol::Service`] (echo by default)

/// Configuration management for the server
pub mod config;

/// Error types and result aliases
pub mod error;

/// Keyed index mapping names to value handles
pub mod index;

/// Network layer for listener setup and client connections
pub mod network;

/// Service seam between the event loop and client protocols
pub mod protocol;

/// Core server implementation
pub mod server;

/// Named variable storage
pub mod store;

/// Type registry and value containers
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use server::{Server, ShutdownHandle};
pub use store::{ValueHandle, VarStore};
pub use types::Value;
