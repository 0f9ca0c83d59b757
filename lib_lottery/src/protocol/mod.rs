//! # Wire Protocol
//!
//! Text frames exchanged with the aggregator. Every request is one or more
//! `\n`-terminated lines whose fields are joined by a single delimiter byte
//! (`#` or `|`, fixed per deployment). Field values are escaped so that the
//! delimiter can never be mistaken for content.
//!
//! ```text
//! BET#agency#first#last#document#birthdate#number
//! BATCH#<n>            (followed by n BET lines)
//! FINISH_BETS#<agency>
//! QUERY_WINNERS#<agency>
//! ```
//!
//! Responses are a single line: `OK`, `WINNERS#<count>#<doc>*`, or any other
//! text, which is an application-level rejection.

/// The bet record carried by `BET` lines.
pub mod bet;
/// Encoding and decoding of frames and responses.
pub mod codec;

pub use bet::BetRecord;
pub use codec::{Delimiter, Frame, FrameCodec, Response, Tag, WireMessage, ESCAPE};
