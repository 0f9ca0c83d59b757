//! # Error Taxonomy
//!
//! One `thiserror` enum per layer. Lower layers never know about phases; the
//! session wraps them with the phase and agency they happened in, so a single
//! log line is enough to tell where a run died.

use std::io;

use thiserror::Error;

use crate::session::Phase;

#[derive(Debug, Error, PartialEq, Eq)]
/// # Protocol Error
///
/// Shape violations detected while decoding wire text.
pub enum ProtocolError {
    /// A `WINNERS` line that does not follow `WINNERS<D><count>[<D><doc>]*`.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A request frame that does not match any known tag or arity.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}

#[derive(Debug, Error)]
/// # Transport Error
///
/// Failures of a single `Connection`. All of them are fatal to the exchange
/// in progress; the connection must be closed afterwards.
pub enum TransportError {
    /// Refused, timed out, or the address did not resolve.
    #[error("connect to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The socket reported an error before the whole buffer was written.
    #[error("send to {address} failed after {written} of {total} bytes: {source}")]
    Send {
        address: String,
        written: usize,
        total: usize,
        #[source]
        source: io::Error,
    },

    /// I/O failure or end-of-stream before any response byte arrived.
    #[error("receive from {address} failed: {source}")]
    Receive {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The connection was closed or poisoned by an earlier failure.
    #[error("connection to {0} is closed")]
    Closed(String),

    /// Shutdown was requested while the operation was pending.
    #[error("operation on {0} cancelled by shutdown")]
    Cancelled(String),
}

impl TransportError {
    /// True when the failure was caused by a shutdown request rather than the peer.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled(_))
    }
}

#[derive(Debug, Error)]
/// # Source Error
///
/// A `RecordSource` could not produce its sequence at all.
pub enum SourceError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("environment variable {0} is not present")]
    MissingEnvVar(String),
}

#[derive(Debug, Error)]
/// # Session Error
///
/// Every way a session can end in `FAILED`. Each variant carries enough
/// identifiers to be reported without further context.
pub enum SessionError {
    #[error("agency {agency}: {phase} transport failure: {source}")]
    Transport {
        agency: String,
        phase: Phase,
        #[source]
        source: TransportError,
    },

    #[error("agency {agency}: {phase} got a malformed response: {source}")]
    MalformedResponse {
        agency: String,
        phase: Phase,
        #[source]
        source: ProtocolError,
    },

    #[error("agency {agency}: batch {batch} rejected by aggregator: {reply}")]
    BatchRejected {
        agency: String,
        batch: usize,
        reply: String,
    },

    #[error("agency {agency}: finish notification rejected: {reply}")]
    FinishRejected { agency: String, reply: String },

    #[error("agency {agency}: winners query rejected: {reply}")]
    QueryRejected { agency: String, reply: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("agency {agency}: no records available: {reason}")]
    SourceUnavailable { agency: String, reason: String },
}

impl SessionError {
    /// The phase the session was in when the error surfaced.
    pub fn phase(&self) -> Phase {
        match self {
            SessionError::Transport { phase, .. } => *phase,
            SessionError::MalformedResponse { phase, .. } => *phase,
            SessionError::BatchRejected { .. } => Phase::SendingBatches,
            SessionError::FinishRejected { .. } => Phase::NotifyingFinish,
            SessionError::QueryRejected { .. } => Phase::QueryingWinners,
            SessionError::InvalidConfig(_) | SessionError::SourceUnavailable { .. } => Phase::Init,
        }
    }

    /// True when a shutdown request, not the peer, ended the exchange.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionError::Transport { source, .. } if source.is_cancelled())
    }
}
