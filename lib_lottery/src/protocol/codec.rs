//! # Frame Codec
//!
//! Stateless transformation between domain values and wire text. The codec
//! is the only component that knows the literal response tokens (`OK`,
//! `WINNERS`); the session matches on `Response` variants instead.
//!
//! Escaping inserts `ESCAPE` before every occurrence of `ESCAPE` itself and of
//! the delimiter. Encoding is total over any string, so no `encode_*` call can
//! fail. Decoding splits only on delimiters that are not escaped.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::bet::BetRecord;
use crate::errors::ProtocolError;

/// The escape-prefix byte.
pub const ESCAPE: char = '\\';

const OK_TOKEN: &str = "OK";
const WINNERS_TOKEN: &str = "WINNERS";

/// Field delimiter, fixed per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Delimiter {
    #[default]
    #[serde(rename = "#")]
    Hash,
    #[serde(rename = "|")]
    Pipe,
}

impl Delimiter {
    pub fn as_char(self) -> char {
        match self {
            Delimiter::Hash => '#',
            Delimiter::Pipe => '|',
        }
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for Delimiter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "#" | "hash" => Ok(Delimiter::Hash),
            "|" | "pipe" => Ok(Delimiter::Pipe),
            other => Err(format!("unsupported delimiter '{}' (expected '#' or '|')", other)),
        }
    }
}

/// Message tags understood by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Bet,
    Batch,
    FinishBets,
    QueryWinners,
}

impl Tag {
    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Bet => "BET",
            Tag::Batch => "BATCH",
            Tag::FinishBets => "FINISH_BETS",
            Tag::QueryWinners => "QUERY_WINNERS",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Wire Message
///
/// Encoded, newline-terminated text ready for `Connection::send_all`. An
/// empty message (from `encode_batch(&[])`) must never be transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    tag: Tag,
    text: String,
}

impl WireMessage {
    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    /// True when there is nothing to transmit.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }
}

impl fmt::Display for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A decoded aggregator reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The literal `OK`.
    Ok,
    /// `WINNERS<D><count>[<D><doc>]*`.
    Winners { count: usize, documents: Vec<String> },
    /// Any other text: an application-level "no", carrying the raw line.
    Rejected(String),
}

impl Response {
    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok)
    }
}

/// A decoded request line, as the aggregator sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Bet(BetRecord),
    BatchHeader(usize),
    FinishBets(String),
    QueryWinners(String),
}

/// # Frame Codec
///
/// Encodes requests and decodes responses for one delimiter.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec {
    delimiter: Delimiter,
}

impl FrameCodec {
    pub fn new(delimiter: Delimiter) -> Self {
        Self { delimiter }
    }

    pub fn delimiter(&self) -> Delimiter {
        self.delimiter
    }

    /// Prefixes every escape byte and delimiter byte with the escape byte.
    pub fn escape(&self, field: &str) -> String {
        let delim = self.delimiter.as_char();
        let mut out = String::with_capacity(field.len());
        for ch in field.chars() {
            if ch == ESCAPE || ch == delim {
                out.push(ESCAPE);
            }
            out.push(ch);
        }
        out
    }

    /// Left inverse of `escape`. A dangling trailing escape byte is kept
    /// literally.
    pub fn unescape(&self, field: &str) -> String {
        let mut out = String::with_capacity(field.len());
        let mut escaped = false;
        for ch in field.chars() {
            if escaped {
                out.push(ch);
                escaped = false;
            } else if ch == ESCAPE {
                escaped = true;
            } else {
                out.push(ch);
            }
        }
        if escaped {
            out.push(ESCAPE);
        }
        out
    }

    /// Splits `line` on unescaped delimiters and unescapes every part.
    pub fn split_fields(&self, line: &str) -> Vec<String> {
        let delim = self.delimiter.as_char();
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut escaped = false;
        for ch in line.chars() {
            if escaped {
                current.push(ch);
                escaped = false;
            } else if ch == ESCAPE {
                escaped = true;
            } else if ch == delim {
                parts.push(std::mem::take(&mut current));
            } else {
                current.push(ch);
            }
        }
        if escaped {
            current.push(ESCAPE);
        }
        parts.push(current);
        parts
    }

    fn bet_line(&self, record: &BetRecord) -> String {
        let d = self.delimiter.as_char();
        let mut line = String::from(Tag::Bet.as_str());
        for field in record.fields() {
            line.push(d);
            line.push_str(&self.escape(field));
        }
        line.push('\n');
        line
    }

    /// `BET<D>agency<D>first<D>last<D>document<D>birthdate<D>number\n`
    pub fn encode_bet(&self, record: &BetRecord) -> WireMessage {
        WireMessage {
            tag: Tag::Bet,
            text: self.bet_line(record),
        }
    }

    /// `BATCH<D><n>\n` followed by one BET line per record, in order.
    /// An empty slice yields an empty message.
    pub fn encode_batch(&self, records: &[BetRecord]) -> WireMessage {
        if records.is_empty() {
            return WireMessage {
                tag: Tag::Batch,
                text: String::new(),
            };
        }
        let mut text = format!(
            "{}{}{}\n",
            Tag::Batch.as_str(),
            self.delimiter.as_char(),
            records.len()
        );
        for record in records {
            text.push_str(&self.bet_line(record));
        }
        WireMessage {
            tag: Tag::Batch,
            text,
        }
    }

    /// `FINISH_BETS<D><agency>\n`
    pub fn encode_finish(&self, agency: &str) -> WireMessage {
        self.single_field(Tag::FinishBets, agency)
    }

    /// `QUERY_WINNERS<D><agency>\n`
    pub fn encode_query(&self, agency: &str) -> WireMessage {
        self.single_field(Tag::QueryWinners, agency)
    }

    fn single_field(&self, tag: Tag, value: &str) -> WireMessage {
        WireMessage {
            tag,
            text: format!(
                "{}{}{}\n",
                tag.as_str(),
                self.delimiter.as_char(),
                self.escape(value)
            ),
        }
    }

    /// The acknowledgment line an aggregator sends.
    pub fn encode_ok(&self) -> String {
        format!("{}\n", OK_TOKEN)
    }

    /// The winners line an aggregator sends for `documents`.
    pub fn encode_winners(&self, documents: &[String]) -> String {
        let d = self.delimiter.as_char();
        let mut line = format!("{}{}{}", WINNERS_TOKEN, d, documents.len());
        for doc in documents {
            line.push(d);
            line.push_str(&self.escape(doc));
        }
        line.push('\n');
        line
    }

    /// Interprets one response line.
    ///
    /// Only WINNERS-shaped lines can fail; any other non-`OK` text is a
    /// rejection, not a decoding error.
    pub fn decode_response(&self, line: &str) -> Result<Response, ProtocolError> {
        let trimmed = line.trim();
        if trimmed == OK_TOKEN {
            return Ok(Response::Ok);
        }
        if !self.is_winners_shaped(trimmed) {
            return Ok(Response::Rejected(trimmed.to_string()));
        }

        let parts = self.split_fields(trimmed);
        if parts.len() < 2 || parts[0] != WINNERS_TOKEN {
            return Err(ProtocolError::MalformedResponse(trimmed.to_string()));
        }
        let count = parts[1]
            .trim()
            .parse::<usize>()
            .map_err(|_| ProtocolError::MalformedResponse(trimmed.to_string()))?;
        let documents = parts[2..]
            .iter()
            .filter(|doc| !doc.is_empty())
            .cloned()
            .collect();
        Ok(Response::Winners { count, documents })
    }

    fn is_winners_shaped(&self, line: &str) -> bool {
        match line.strip_prefix(WINNERS_TOKEN) {
            Some(rest) => rest.is_empty() || rest.starts_with(self.delimiter.as_char()),
            None => false,
        }
    }

    /// Parses a single `BET` line back into a record.
    pub fn decode_bet(&self, line: &str) -> Result<BetRecord, ProtocolError> {
        let line = line.trim_end_matches(&['\n', '\r'][..]);
        let parts = self.split_fields(line);
        match parts.as_slice() {
            [tag, agency, first, last, document, birthdate, number] if tag == Tag::Bet.as_str() => {
                Ok(BetRecord::new(
                    agency.as_str(),
                    first.as_str(),
                    last.as_str(),
                    document.as_str(),
                    birthdate.as_str(),
                    number.as_str(),
                ))
            }
            _ => Err(ProtocolError::MalformedFrame(line.to_string())),
        }
    }

    /// Parses any request line.
    pub fn decode_frame(&self, line: &str) -> Result<Frame, ProtocolError> {
        let line = line.trim_end_matches(&['\n', '\r'][..]);
        let parts = self.split_fields(line);
        let malformed = || ProtocolError::MalformedFrame(line.to_string());
        match parts.first().map(String::as_str) {
            Some("BET") => self.decode_bet(line).map(Frame::Bet),
            Some("BATCH") if parts.len() == 2 => parts[1]
                .parse::<usize>()
                .map(Frame::BatchHeader)
                .map_err(|_| malformed()),
            Some("FINISH_BETS") if parts.len() == 2 => Ok(Frame::FinishBets(parts[1].clone())),
            Some("QUERY_WINNERS") if parts.len() == 2 => Ok(Frame::QueryWinners(parts[1].clone())),
            _ => Err(malformed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bet(agency: &str, first: &str) -> BetRecord {
        BetRecord::new(agency, first, "Perez", "30904465", "1999-03-17", "7574")
    }

    #[test]
    fn test_escape_prefixes_delimiter_and_escape() {
        let hash = FrameCodec::new(Delimiter::Hash);
        assert_eq!(hash.escape("a#b"), "a\\#b");
        assert_eq!(hash.escape("a\\b"), "a\\\\b");
        assert_eq!(hash.escape("a|b"), "a|b");

        let pipe = FrameCodec::new(Delimiter::Pipe);
        assert_eq!(pipe.escape("a|b"), "a\\|b");
        assert_eq!(pipe.escape("a#b"), "a#b");
    }

    #[test]
    fn test_unescape_keeps_dangling_escape() {
        let codec = FrameCodec::default();
        assert_eq!(codec.unescape("abc\\"), "abc\\");
        assert_eq!(codec.unescape("\\#x"), "#x");
    }

    #[test]
    fn test_encode_bet_layout() {
        let codec = FrameCodec::default();
        let msg = codec.encode_bet(&bet("1", "Santiago Lionel"));
        assert_eq!(msg.tag(), Tag::Bet);
        assert_eq!(
            msg.as_str(),
            "BET#1#Santiago Lionel#Perez#30904465#1999-03-17#7574\n"
        );
    }

    #[test]
    fn test_encode_bet_escapes_fields() {
        let codec = FrameCodec::default();
        let record = BetRecord::new("1", "A#na", "O\\Neil", "1", "2000-01-01", "2");
        assert_eq!(
            codec.encode_bet(&record).as_str(),
            "BET#1#A\\#na#O\\\\Neil#1#2000-01-01#2\n"
        );
    }

    #[test]
    fn test_encode_batch_header_and_order() {
        let codec = FrameCodec::new(Delimiter::Pipe);
        let msg = codec.encode_batch(&[bet("1", "Ana"), bet("1", "Beto")]);
        let lines: Vec<&str> = msg.as_str().lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "BATCH|2");
        assert!(lines[1].contains("|Ana|"));
        assert!(lines[2].contains("|Beto|"));
        assert!(msg.as_str().ends_with('\n'));
    }

    #[test]
    fn test_encode_empty_batch_is_not_transmittable() {
        let codec = FrameCodec::default();
        let msg = codec.encode_batch(&[]);
        assert!(msg.is_empty());
        assert_eq!(msg.len(), 0);
    }

    #[test]
    fn test_encode_finish_and_query() {
        let codec = FrameCodec::default();
        assert_eq!(codec.encode_finish("3").as_str(), "FINISH_BETS#3\n");
        assert_eq!(codec.encode_query("3").as_str(), "QUERY_WINNERS#3\n");
        assert_eq!(codec.encode_finish("a#b").as_str(), "FINISH_BETS#a\\#b\n");
    }

    #[test]
    fn test_decode_ok_trims_whitespace() {
        let codec = FrameCodec::default();
        assert_eq!(codec.decode_response("  OK\r\n").unwrap(), Response::Ok);
    }

    #[test]
    fn test_decode_winners() {
        let codec = FrameCodec::default();
        assert_eq!(
            codec.decode_response("WINNERS#2#111#222\n").unwrap(),
            Response::Winners {
                count: 2,
                documents: vec!["111".to_string(), "222".to_string()],
            }
        );
        assert_eq!(
            codec.decode_response("WINNERS#0").unwrap(),
            Response::Winners {
                count: 0,
                documents: vec![],
            }
        );
    }

    #[test]
    fn test_decode_winners_with_pipe_delimiter() {
        let codec = FrameCodec::new(Delimiter::Pipe);
        assert_eq!(
            codec.decode_response("WINNERS|1|555").unwrap(),
            Response::Winners {
                count: 1,
                documents: vec!["555".to_string()],
            }
        );
    }

    #[test]
    fn test_decode_bare_winners_is_malformed() {
        let codec = FrameCodec::default();
        assert!(matches!(
            codec.decode_response("WINNERS"),
            Err(ProtocolError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_decode_winners_with_bad_count_is_malformed() {
        let codec = FrameCodec::default();
        assert!(matches!(
            codec.decode_response("WINNERS#two#111"),
            Err(ProtocolError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_decode_other_text_is_rejection() {
        let codec = FrameCodec::default();
        assert_eq!(
            codec.decode_response("REJECTED:bad_document\n").unwrap(),
            Response::Rejected("REJECTED:bad_document".to_string())
        );
        // Shares the prefix but is not WINNERS-shaped.
        assert_eq!(
            codec.decode_response("WINNERSX").unwrap(),
            Response::Rejected("WINNERSX".to_string())
        );
    }

    #[test]
    fn test_decode_frame_variants() {
        let codec = FrameCodec::default();
        assert_eq!(codec.decode_frame("BATCH#3\n").unwrap(), Frame::BatchHeader(3));
        assert_eq!(
            codec.decode_frame("FINISH_BETS#7").unwrap(),
            Frame::FinishBets("7".to_string())
        );
        assert_eq!(
            codec.decode_frame("QUERY_WINNERS#7").unwrap(),
            Frame::QueryWinners("7".to_string())
        );
        assert!(codec.decode_frame("HELLO#7").is_err());
        assert!(codec.decode_frame("BET#1#2").is_err());
        assert!(codec.decode_frame("BATCH#x").is_err());
    }

    #[test]
    fn test_decode_batch_line_by_line() {
        let codec = FrameCodec::default();
        let records = vec![bet("1", "A#"), bet("1", "\\B"), bet("1", "C")];
        let msg = codec.encode_batch(&records);
        let mut lines = msg.as_str().lines();
        assert_eq!(
            codec.decode_frame(lines.next().unwrap()).unwrap(),
            Frame::BatchHeader(3)
        );
        let decoded: Vec<BetRecord> = lines.map(|l| codec.decode_bet(l).unwrap()).collect();
        assert_eq!(decoded, records);
    }

    #[test]
    fn test_delimiter_from_str() {
        assert_eq!("#".parse::<Delimiter>().unwrap(), Delimiter::Hash);
        assert_eq!("pipe".parse::<Delimiter>().unwrap(), Delimiter::Pipe);
        assert!(",".parse::<Delimiter>().is_err());
    }

    fn any_delimiter() -> impl Strategy<Value = Delimiter> {
        prop_oneof![Just(Delimiter::Hash), Just(Delimiter::Pipe)]
    }

    fn tricky_field() -> impl Strategy<Value = String> {
        // Biased towards the bytes the codec has to protect.
        proptest::collection::vec(
            prop_oneof![
                Just('#'),
                Just('|'),
                Just('\\'),
                Just(' '),
                proptest::char::range('a', 'z'),
                any::<char>().prop_filter("no line breaks", |c| *c != '\n' && *c != '\r'),
            ],
            0..24,
        )
        .prop_map(|chars| chars.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_unescape_inverts_escape(delimiter in any_delimiter(), s in any::<String>()) {
            let codec = FrameCodec::new(delimiter);
            prop_assert_eq!(codec.unescape(&codec.escape(&s)), s);
        }

        #[test]
        fn prop_bet_round_trips(
            delimiter in any_delimiter(),
            fields in proptest::collection::vec(tricky_field(), 6),
        ) {
            let codec = FrameCodec::new(delimiter);
            let record = BetRecord::new(
                fields[0].as_str(),
                fields[1].as_str(),
                fields[2].as_str(),
                fields[3].as_str(),
                fields[4].as_str(),
                fields[5].as_str(),
            );
            let msg = codec.encode_bet(&record);
            prop_assert_eq!(codec.decode_bet(msg.as_str()).unwrap(), record);
        }
    }
}
