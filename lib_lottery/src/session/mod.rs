//! # Session
//!
//! The per-agency state machine:
//!
//! `INIT → SENDING_BATCHES → NOTIFYING_FINISH → QUERYING_WINNERS → DONE`
//!
//! with `FAILED` reachable from every non-terminal phase. Every exchange runs
//! on its own `Connection` and is awaited to completion before the next one
//! starts. A shutdown request stops the session at the next await point, moves
//! it to `INTERRUPTED` and is reported as `SessionOutcome::Interrupted`, not as
//! a failure. The phase that was cut short is kept in
//! `SessionReport::interrupted_in`.

pub mod orchestrator;

pub use orchestrator::Session;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::SessionError;
use crate::protocol::Delimiter;
use crate::transport::ConnectionOptions;

/// Protocol phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Init,
    SendingBatches,
    NotifyingFinish,
    QueryingWinners,
    Done,
    Failed,
    Interrupted,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Init => "INIT",
            Phase::SendingBatches => "SENDING_BATCHES",
            Phase::NotifyingFinish => "NOTIFYING_FINISH",
            Phase::QueryingWinners => "QUERYING_WINNERS",
            Phase::Done => "DONE",
            Phase::Failed => "FAILED",
            Phase::Interrupted => "INTERRUPTED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Failed | Phase::Interrupted)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether each batch waits for the aggregator's acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AckPolicy {
    /// Read one reply per batch; anything but `OK` fails the session.
    #[default]
    Await,
    /// Send the batch and close without reading.
    FireAndForget,
}

impl AckPolicy {
    pub fn awaits_reply(self) -> bool {
        matches!(self, AckPolicy::Await)
    }
}

impl fmt::Display for AckPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckPolicy::Await => f.write_str("await"),
            AckPolicy::FireAndForget => f.write_str("fire-and-forget"),
        }
    }
}

impl FromStr for AckPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "await" | "ack" => Ok(AckPolicy::Await),
            "fire-and-forget" | "fire_and_forget" | "none" => Ok(AckPolicy::FireAndForget),
            other => Err(format!(
                "unsupported ack policy '{}' (expected 'await' or 'fire-and-forget')",
                other
            )),
        }
    }
}

/// # SessionConfig
///
/// Everything a session needs besides its record source, its cancellation
/// token and its logger.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub agency: String,
    /// `host:port` of the aggregator.
    pub server_address: String,
    pub batch_max_amount: usize,
    /// Pause between envelopes.
    pub loop_period: Duration,
    pub ack_policy: AckPolicy,
    pub delimiter: Delimiter,
    pub connection: ConnectionOptions,
}

impl SessionConfig {
    pub fn new(agency: impl Into<String>, server_address: impl Into<String>) -> Self {
        Self {
            agency: agency.into(),
            server_address: server_address.into(),
            batch_max_amount: 100,
            loop_period: Duration::ZERO,
            ack_policy: AckPolicy::default(),
            delimiter: Delimiter::default(),
            connection: ConnectionOptions::default(),
        }
    }

    /// Rejects configurations that cannot run before any socket is opened.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.agency.trim().is_empty() {
            return Err(SessionError::InvalidConfig("agency id is empty".to_string()));
        }
        if self.server_address.trim().is_empty() {
            return Err(SessionError::InvalidConfig("server address is empty".to_string()));
        }
        if self.batch_max_amount == 0 {
            return Err(SessionError::InvalidConfig(
                "batch_max_amount must be greater than zero".to_string(),
            ));
        }
        if self.connection.connect_timeout.is_zero() {
            return Err(SessionError::InvalidConfig(
                "connect timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// What a session achieved, whatever way it ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub agency: String,
    /// Envelopes handed to the aggregator (acknowledged under `AckPolicy::Await`).
    pub batches_delivered: usize,
    pub bets_delivered: usize,
    /// Source tuples dropped for having the wrong arity.
    pub records_skipped: usize,
    pub pacing_pauses: usize,
    pub finish_acknowledged: bool,
    /// Winner count announced by the aggregator.
    pub winners: Option<usize>,
    pub winner_documents: Vec<String>,
    /// Phase in which a shutdown request stopped the session.
    pub interrupted_in: Option<Phase>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Reached `DONE`.
    Completed(SessionReport),
    /// Stopped by a shutdown request; the process exits successfully.
    Interrupted(SessionReport),
}

impl SessionOutcome {
    pub fn report(&self) -> &SessionReport {
        match self {
            SessionOutcome::Completed(report) | SessionOutcome::Interrupted(report) => report,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, SessionOutcome::Completed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_names_match_wire_log_format() {
        assert_eq!(Phase::SendingBatches.to_string(), "SENDING_BATCHES");
        assert_eq!(
            serde_json::to_value(Phase::QueryingWinners).unwrap(),
            serde_json::json!("QUERYING_WINNERS")
        );
        assert!(Phase::Failed.is_terminal());
        assert!(Phase::Interrupted.is_terminal());
        assert_eq!(Phase::Interrupted.to_string(), "INTERRUPTED");
        assert!(!Phase::NotifyingFinish.is_terminal());
    }

    #[test]
    fn test_ack_policy_parsing() {
        assert_eq!("await".parse::<AckPolicy>().unwrap(), AckPolicy::Await);
        assert_eq!("Fire-And-Forget".parse::<AckPolicy>().unwrap(), AckPolicy::FireAndForget);
        assert!("sometimes".parse::<AckPolicy>().is_err());
        assert_eq!(AckPolicy::FireAndForget.to_string(), "fire-and-forget");
    }

    #[test]
    fn test_config_validation() {
        let config = SessionConfig::new("1", "127.0.0.1:12345");
        assert!(config.validate().is_ok());

        let mut bad = config.clone();
        bad.batch_max_amount = 0;
        assert!(matches!(bad.validate(), Err(SessionError::InvalidConfig(_))));

        let mut bad = config;
        bad.agency = "  ".to_string();
        assert!(matches!(bad.validate(), Err(SessionError::InvalidConfig(_))));
    }
}
