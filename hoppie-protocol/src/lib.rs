//! Codec between HoppieBridge dataref strings and Hoppie's ACARS wire format.
//!
//! Requests are plain form posts to `connect.html`; every reply is a text
//! body. The replies this crate understands:
//!
//! ```text
//! ok                              bare acknowledgement
//! ok {SOURCE TYPE {PACKET}}       structured reply (PACKET may span lines)
//! <anything else>                 passed through verbatim as the packet
//! ```
//!
//! The structured form is matched non-greedily: PACKET ends at the first
//! `}}`. A payload that itself contains `}}` is cut short there. Hoppie does
//! not escape braces, so no balanced-brace grammar is attempted.

use std::sync::OnceLock;

use acars_schema::{keys, Message};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

// ── Exchange ──────────────────────────────────────────────────────────────────

/// The two logical operations on the single Hoppie endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    /// Deliver a user message (`to`/`type`/`packet` + `logon`/`from`).
    Send,
    /// Ask for pending messages (`type=poll`, addressed to self).
    Poll,
}

impl Exchange {
    /// Key under which an acknowledged reply body is stored.
    pub fn result_key(self) -> &'static str {
        match self {
            Self::Send => keys::RESPONSE,
            Self::Poll => keys::POLL,
        }
    }

    fn error_prefix(self) -> &'static str {
        match self {
            Self::Send => "Message Error",
            Self::Poll => "Poll Error",
        }
    }
}

// ── ParsedResponse ────────────────────────────────────────────────────────────

/// Which wrapper key a result object carried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Origin {
    Poll,
    Response,
    #[default]
    Absent,
}

impl Origin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Poll     => keys::POLL,
            Self::Response => keys::RESPONSE,
            Self::Absent   => "",
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded reply: `(origin, source, msg_type, packet)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    pub origin:   Origin,
    pub source:   Option<String>,
    pub msg_type: Option<String>,
    pub packet:   Option<String>,
}

impl ParsedResponse {
    /// True for a reply that carries nothing but `ok`.
    pub fn is_bare_ack(&self) -> bool {
        self.source.is_none() && self.packet.as_deref().is_some_and(|p| p.eq_ignore_ascii_case("ok"))
    }
}

// ── DecodeError ───────────────────────────────────────────────────────────────

/// Why a loose message string could not be decoded.
///
/// Only observed inside [`parse_loose`], which logs it and falls back.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("empty input")]
    Empty,
    #[error("JSON value is not an object")]
    NotAMapping,
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected {found:?} at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("trailing input at offset {offset}")]
    TrailingInput { offset: usize },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Form fields for a request: every key present in `message`, verbatim.
pub fn encode_request(message: &Message) -> Vec<(String, String)> {
    message
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// True when a reply body begins (case-insensitively) with `ok`.
pub fn is_acknowledged(body: &str) -> bool {
    body.trim_start()
        .get(..2)
        .is_some_and(|head| head.eq_ignore_ascii_case("ok"))
}

/// Wrap the body of an HTTP 200 reply into a result object.
///
/// Acknowledged bodies land under `poll` or `response`; anything else is
/// reported under `error`.
pub fn interpret_reply(exchange: Exchange, body: &str) -> Message {
    if is_acknowledged(body) {
        Message::new().with(exchange.result_key(), body)
    } else {
        Message::new().with(keys::ERROR, format!("{}: {}", exchange.error_prefix(), body.trim()))
    }
}

/// Decode a result object (`{"poll": ...}` or `{"response": ...}`).
///
/// Objects carrying neither key decode to an all-absent response.
pub fn decode_response(result: &Message) -> ParsedResponse {
    if let Some(raw) = result.get(keys::POLL) {
        decode_body(Origin::Poll, raw)
    } else if let Some(raw) = result.get(keys::RESPONSE) {
        decode_body(Origin::Response, raw)
    } else {
        ParsedResponse::default()
    }
}

/// Decode one raw reply body. Never fails: unrecognised text becomes the packet.
pub fn decode_body(origin: Origin, raw: &str) -> ParsedResponse {
    let raw = raw.trim();
    if raw.is_empty() {
        return ParsedResponse { origin, ..ParsedResponse::default() };
    }
    if raw.eq_ignore_ascii_case("ok") {
        return ParsedResponse { origin, packet: Some(raw.to_string()), ..ParsedResponse::default() };
    }
    let captures = structured_reply().and_then(|re| re.captures(raw));
    match captures {
        Some(c) => ParsedResponse {
            origin,
            source:   Some(c[1].to_string()),
            msg_type: Some(c[2].to_string()),
            packet:   Some(c[3].trim().to_string()),
        },
        None => ParsedResponse { origin, packet: Some(raw.to_string()), ..ParsedResponse::default() },
    }
}

/// Best-effort decode of a dataref string into a [`Message`].
///
/// Strict JSON is tried only when the text looks like a JSON object; the
/// single-quoted literal form older producers emit is tried next. Total
/// failure logs a warning and yields an empty message.
pub fn parse_loose(raw: &str) -> Message {
    type Parser = fn(&str) -> Result<Message, DecodeError>;

    let text = raw.trim();
    if text.is_empty() {
        return Message::new();
    }

    let json = looks_like_json(text).then_some(("json", parse_json as Parser));
    let chain = json.into_iter().chain([("literal", parse_literal as Parser)]);

    let mut last_err = None;
    for (name, parser) in chain {
        match parser(text) {
            Ok(msg) => return msg,
            Err(e) => {
                debug!(parser = name, error = %e, "message decode attempt failed");
                last_err = Some(e);
            }
        }
    }
    if let Some(e) = last_err {
        warn!(error = %e, raw = text, "cannot parse message");
    }
    Message::new()
}

/// Text for a string dataref: objects as strict JSON, strings verbatim,
/// other scalars via their JSON spelling.
pub fn format_strict(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── Structured reply matcher ──────────────────────────────────────────────────

const STRUCTURED_REPLY: &str = r"(?is)^ok\s*\{(\S+)\s+(\S+)\s+\{(.*?)\}\}";

/// `ok {SOURCE TYPE {PACKET}}`, compiled once. `None` only if the pattern
/// fails to build, in which case every body passes through verbatim.
fn structured_reply() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(STRUCTURED_REPLY)
            .map_err(|e| warn!(error = %e, "structured reply pattern rejected"))
            .ok()
    })
    .as_ref()
}

// ── Loose decoders ────────────────────────────────────────────────────────────

fn looks_like_json(text: &str) -> bool {
    text.starts_with('{') && text.contains(':') && text.contains('"')
}

fn parse_json(text: &str) -> Result<Message, DecodeError> {
    let Value::Object(map) = serde_json::from_str::<Value>(text)? else {
        return Err(DecodeError::NotAMapping);
    };
    Ok(map
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                Value::Null => String::new(),
                other => format_strict(&other),
            };
            (k, v)
        })
        .collect())
}

fn parse_literal(text: &str) -> Result<Message, DecodeError> {
    if text.is_empty() {
        return Err(DecodeError::Empty);
    }
    LiteralParser { src: text, pos: 0 }.mapping()
}

/// Parser for flat single- or double-quoted dictionary literals, e.g.
/// `{'response': 'ok {ACARS info {LIPE 031350Z}}', "n": 3, 'f': None}`.
struct LiteralParser<'a> {
    src: &'a str,
    pos: usize,
}

impl LiteralParser<'_> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn unexpected(&self, found: char) -> DecodeError {
        DecodeError::UnexpectedChar { found, offset: self.pos }
    }

    fn expect(&mut self, want: char) -> Result<(), DecodeError> {
        match self.bump() {
            Some(c) if c == want => Ok(()),
            Some(c) => Err(self.unexpected(c)),
            None => Err(DecodeError::UnexpectedEnd),
        }
    }

    fn mapping(mut self) -> Result<Message, DecodeError> {
        let mut msg = Message::new();
        self.skip_ws();
        self.expect('{')?;
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.bump();
                break;
            }
            let key = self.string()?;
            self.skip_ws();
            self.expect(':')?;
            self.skip_ws();
            let value = self.value()?;
            msg.insert(&key, value);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => break,
                Some(c) => return Err(self.unexpected(c)),
                None => return Err(DecodeError::UnexpectedEnd),
            }
        }
        self.skip_ws();
        if self.pos < self.src.len() {
            return Err(DecodeError::TrailingInput { offset: self.pos });
        }
        Ok(msg)
    }

    fn string(&mut self) -> Result<String, DecodeError> {
        let quote = match self.bump() {
            Some(q @ ('\'' | '"')) => q,
            Some(c) => return Err(self.unexpected(c)),
            None => return Err(DecodeError::UnexpectedEnd),
        };
        let mut out = String::new();
        loop {
            let c = self.bump().ok_or(DecodeError::UnexpectedEnd)?;
            if c == quote {
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            match self.bump().ok_or(DecodeError::UnexpectedEnd)? {
                'n'  => out.push('\n'),
                't'  => out.push('\t'),
                'r'  => out.push('\r'),
                '0'  => out.push('\0'),
                esc @ ('\\' | '\'' | '"') => out.push(esc),
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
        }
    }

    fn value(&mut self) -> Result<String, DecodeError> {
        match self.peek() {
            Some('\'' | '"') => self.string(),
            Some(_) => {
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '_'))
                {
                    self.bump();
                }
                let word = &self.src[start..self.pos];
                match word {
                    "True" | "true"   => Ok("true".into()),
                    "False" | "false" => Ok("false".into()),
                    "None" | "null"   => Ok(String::new()),
                    w if !w.is_empty() && w.parse::<f64>().is_ok() => Ok(w.to_string()),
                    _ => match self.peek() {
                        Some(c) => Err(self.unexpected(c)),
                        None => Err(DecodeError::UnexpectedEnd),
                    },
                }
            }
            None => Err(DecodeError::UnexpectedEnd),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(key: &str, raw: &str) -> Message {
        Message::new().with(key, raw)
    }

    #[test]
    fn bare_poll_ack_decodes_to_ok_packet() {
        let parsed = decode_response(&wrap("poll", "ok"));
        assert_eq!(parsed.origin, Origin::Poll);
        assert_eq!(parsed.source, None);
        assert_eq!(parsed.msg_type, None);
        assert_eq!(parsed.packet.as_deref(), Some("ok"));
        assert!(parsed.is_bare_ack());
    }

    #[test]
    fn bare_ack_ignores_case() {
        let parsed = decode_response(&wrap("poll", " OK "));
        assert_eq!(parsed.packet.as_deref(), Some("OK"));
        assert!(parsed.is_bare_ack());
        assert!(!decode_body(Origin::Poll, "okay").is_bare_ack());
    }

    #[test]
    fn structured_prefix_ignores_case() {
        let parsed = decode_body(Origin::Poll, "OK {ATC123 telex {HELLO}}");
        assert_eq!(parsed.source.as_deref(), Some("ATC123"));
        assert_eq!(parsed.packet.as_deref(), Some("HELLO"));
    }

    #[test]
    fn structured_reply_needs_leading_ok() {
        let parsed = decode_body(Origin::Poll, "nok {ATC123 telex {HELLO}}");
        assert_eq!(parsed.source, None);
        assert_eq!(parsed.packet.as_deref(), Some("nok {ATC123 telex {HELLO}}"));
    }

    #[test]
    fn structured_response_is_split_into_fields() {
        let parsed = decode_response(&wrap("response", "ok {ATC123 telex {HELLO WORLD}}"));
        assert_eq!(
            parsed,
            ParsedResponse {
                origin:   Origin::Response,
                source:   Some("ATC123".into()),
                msg_type: Some("telex".into()),
                packet:   Some("HELLO WORLD".into()),
            }
        );
    }

    #[test]
    fn structured_packet_may_span_lines() {
        let raw = "ok {SERVER inforeq {LIPE 031350Z 05009KT\n  9999 BKN055 28/13 Q1014 }}";
        let parsed = decode_body(Origin::Response, raw);
        assert_eq!(parsed.source.as_deref(), Some("SERVER"));
        assert_eq!(parsed.packet.as_deref(), Some("LIPE 031350Z 05009KT\n  9999 BKN055 28/13 Q1014"));
    }

    #[test]
    fn packet_stops_at_first_double_brace() {
        // Known limitation: no brace balancing.
        let parsed = decode_body(Origin::Poll, "ok {KLAX cpdlc {/data2/1//WU/{CLIMB}} TO FL350}}");
        assert_eq!(parsed.msg_type.as_deref(), Some("cpdlc"));
        assert_eq!(parsed.packet.as_deref(), Some("/data2/1//WU/{CLIMB"));
    }

    #[test]
    fn single_inner_braces_survive() {
        let parsed = decode_body(Origin::Poll, "ok {KLAX cpdlc {/data2/3//R/{A} B}}");
        assert_eq!(parsed.packet.as_deref(), Some("/data2/3//R/{A} B"));
    }

    #[test]
    fn unrecognised_text_passes_through() {
        let parsed = decode_body(Origin::Response, "  error {illegal logon code}  ");
        assert_eq!(parsed.origin, Origin::Response);
        assert_eq!(parsed.source, None);
        assert_eq!(parsed.packet.as_deref(), Some("error {illegal logon code}"));
    }

    #[test]
    fn empty_body_keeps_origin_only() {
        let parsed = decode_body(Origin::Poll, "   ");
        assert_eq!(parsed, ParsedResponse { origin: Origin::Poll, ..ParsedResponse::default() });
    }

    #[test]
    fn result_without_wrapper_is_absent() {
        let parsed = decode_response(&wrap("error", "boom"));
        assert_eq!(parsed, ParsedResponse::default());
        assert_eq!(parsed.origin.as_str(), "");
    }

    #[test]
    fn poll_wins_over_response() {
        let mut result = wrap("response", "ok {A telex {X}}");
        result.insert("poll", "ok");
        assert_eq!(decode_response(&result).origin, Origin::Poll);
    }

    #[test]
    fn encode_request_carries_present_keys_only() {
        let msg = Message::outbound("SERVER", "weather", "METAR LIPE").with("logon", "ABC123");
        let mut form = encode_request(&msg);
        form.sort();
        assert_eq!(
            form,
            vec![
                ("logon".to_string(), "ABC123".to_string()),
                ("packet".to_string(), "METAR LIPE".to_string()),
                ("to".to_string(), "SERVER".to_string()),
                ("type".to_string(), "weather".to_string()),
            ]
        );
    }

    #[test]
    fn interpret_reply_requires_leading_ok() {
        assert_eq!(interpret_reply(Exchange::Poll, "ok "), wrap("poll", "ok "));
        assert_eq!(interpret_reply(Exchange::Send, "OK {A b {c}}"), wrap("response", "OK {A b {c}}"));
        assert_eq!(
            interpret_reply(Exchange::Send, "error {illegal logon code}"),
            wrap("error", "Message Error: error {illegal logon code}")
        );
        assert_eq!(interpret_reply(Exchange::Poll, ""), wrap("error", "Poll Error: "));
    }

    #[test]
    fn parse_loose_reads_strict_json() {
        let msg = parse_loose(r#"{"to": "SERVER", "type": "inforeq", "packet": "METAR LIPE"}"#);
        assert_eq!(msg, Message::outbound("SERVER", "inforeq", "METAR LIPE"));
    }

    #[test]
    fn parse_loose_reads_single_quoted_literal() {
        assert_eq!(parse_loose("{'response': 'ok'}"), wrap("response", "ok"));

        let msg = parse_loose(r"{'response': 'ok {acars info {LIPE 031350Z}}', 'n': 3, 'x': None,}");
        assert_eq!(msg.field("response"), "ok {acars info {LIPE 031350Z}}");
        assert_eq!(msg.field("n"), "3");
        assert_eq!(msg.field("x"), "");
    }

    #[test]
    fn parse_loose_falls_back_when_json_fails() {
        // Contains a double quote, so JSON is tried first and fails.
        let msg = parse_loose(r#"{'packet': 'SAY "AGAIN"', 'to': 'KLAX'}"#);
        assert_eq!(msg.field("packet"), r#"SAY "AGAIN""#);
        assert_eq!(msg.field("to"), "KLAX");
    }

    #[test]
    fn parse_loose_handles_escapes() {
        let msg = parse_loose(r"{'packet': 'IT\'S\nFINE'}");
        assert_eq!(msg.field("packet"), "IT'S\nFINE");
    }

    #[test]
    fn parse_loose_never_fails_outward() {
        assert!(parse_loose("").is_empty());
        assert!(parse_loose("   ").is_empty());
        assert!(parse_loose("not a dict").is_empty());
        assert!(parse_loose("{'to': 'A'").is_empty());
        assert!(parse_loose("{'to': 'A'} extra").is_empty());
        assert!(parse_loose(r#"["a", "b"]"#).is_empty());
    }

    #[test]
    fn parse_json_stringifies_scalars() {
        let msg = parse_loose(r#"{"n": 7, "b": true, "z": null}"#);
        assert_eq!(msg.field("n"), "7");
        assert_eq!(msg.field("b"), "true");
        assert_eq!(msg.field("z"), "");
    }

    #[test]
    fn format_strict_serializes_mappings_only() {
        let msg = Message::outbound("SERVER", "inforeq", "METAR LIPE");
        let text = format_strict(&Value::from(&msg));
        assert_eq!(text, r#"{"packet":"METAR LIPE","to":"SERVER","type":"inforeq"}"#);
        assert_eq!(parse_loose(&text), msg);

        assert_eq!(format_strict(&Value::String("plain text".into())), "plain text");
        assert_eq!(format_strict(&Value::from(42)), "42");
    }
}
