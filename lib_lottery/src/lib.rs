//! # lib_lottery
//!
//! The agency side of the lottery submission protocol. An agency process reads
//! its bets from a `RecordSource`, ships them to the aggregator in bounded
//! batches, announces that it has finished, and finally asks the aggregator
//! for the documents of its winners.
//!
//! ## Modules:
//!
//! - **`protocol`**: The line-oriented, delimiter-escaped wire codec. Pure and
//!   stateless; the only place that knows the `OK` / `WINNERS` tokens.
//! - **`transport`**: `Connection`, one TCP socket per exchange, with
//!   short-write-safe sends and single-line reads.
//! - **`batch`**: `BatchScheduler`, which partitions bets into envelopes and
//!   paces their transmission.
//! - **`session`**: The three-phase state machine that drives everything else.
//! - **`shutdown`**: `ShutdownSupervisor`, which turns SIGINT/SIGTERM into a
//!   cancellation token observed by every await point of the session.
//! - **`source`**: `RecordSource` and its in-memory, environment and CSV
//!   implementations.
//! - **`loggers`**: `LoggerLocal`, the observability sink injected into every
//!   component, and the `Logrecord` events it renders.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod batch;
pub mod errors;
pub mod loggers;
pub mod protocol;
pub mod session;
pub mod shutdown;
pub mod source;
pub mod transport;

pub use batch::{BatchEnvelope, BatchScheduler};
pub use errors::{ProtocolError, SessionError, SourceError, TransportError};
pub use loggers::loggerlocal::{LoggerLocal, LoggerLocalOptions};
pub use loggers::logrecord::Logrecord;
pub use protocol::{BetRecord, Delimiter, Frame, FrameCodec, Response, Tag, WireMessage};
pub use session::{AckPolicy, Phase, Session, SessionConfig, SessionOutcome, SessionReport};
pub use shutdown::ShutdownSupervisor;
pub use source::{CsvRecordSource, EnvRecordSource, MemoryRecordSource, RawFields, RecordSource};
pub use transport::{Connection, ConnectionOptions};
