//! # Transport
//!
//! One TCP socket per protocol exchange. See `connection.rs`.

/// A single-exchange TCP connection with short-write-safe sends.
pub mod connection;

pub use connection::{Connection, ConnectionOptions, MAX_RESPONSE_SIZE};
