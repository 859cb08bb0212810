//! Message and dataref definitions shared by the HoppieBridge plugin and any
//! add-on that talks to it.
//!
//! Dataref paths are part of the public contract with third-party cockpit
//! add-ons. Do not rename.

use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

// ── Message keys ──────────────────────────────────────────────────────────────

/// Keys used in outbound messages and in transport result objects.
pub mod keys {
    pub const LOGON:    &str = "logon";
    pub const FROM:     &str = "from";
    pub const TO:       &str = "to";
    pub const TYPE:     &str = "type";
    pub const PACKET:   &str = "packet";
    // Result object
    pub const POLL:     &str = "poll";
    pub const RESPONSE: &str = "response";
    pub const ERROR:    &str = "error";
}

// ── Dataref paths ─────────────────────────────────────────────────────────────

pub mod paths {
    // Simulator
    pub const AVIONICS_ON: &str = "sim/cockpit/electrical/avionics_on";
    // Session
    pub const CALLSIGN:     &str = "hoppiebridge/callsign";
    pub const CALLSIGN_SET: &str = "hoppiebridge/callsign_set";
    pub const LOGON_SET:    &str = "hoppiebridge/logon_set";
    // Outbox
    pub const SEND_QUEUE:     &str = "hoppiebridge/send_queue";
    pub const OUTBOX_TO:      &str = "hoppiebridge/outbox/to";
    pub const OUTBOX_TYPE:    &str = "hoppiebridge/outbox/type";
    pub const OUTBOX_PACKET:  &str = "hoppiebridge/outbox/packet";
    // Inbox
    pub const POLL_QUEUE:     &str = "hoppiebridge/poll_queue";
    pub const INBOX_ORIGIN:   &str = "hoppiebridge/inbox/origin";
    pub const INBOX_FROM:     &str = "hoppiebridge/inbox/from";
    pub const INBOX_TYPE:     &str = "hoppiebridge/inbox/type";
    pub const INBOX_PACKET:   &str = "hoppiebridge/inbox/packet";
    pub const INBOX_PENDING:  &str = "hoppiebridge/inbox/pending";
    pub const CLEAR_INBOX:    &str = "hoppiebridge/clear_inbox";
    // Link state
    pub const COMM_READY: &str = "hoppiebridge/comm_ready";
    pub const STATUS:     &str = "hoppiebridge/status";
}

// ── MessageType ───────────────────────────────────────────────────────────────

/// Message types accepted by Hoppie's `connect.html` endpoint.
///
/// `Message` stores the type as plain text so that values outside this list
/// still reach the service, which is the authority on validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum MessageType {
    Progress,
    Cpdlc,
    Telex,
    Ping,
    Inforeq,
    Posreq,
    Position,
    Datareq,
    Poll,
    Peek,
}

// ── Message ───────────────────────────────────────────────────────────────────

/// A flat string → string mapping.
///
/// Used both for outbound requests (`to`/`type`/`packet`, plus the injected
/// `logon`/`from`) and for transport result objects (`poll`, `response` or
/// `error`). Serializes as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(BTreeMap<String, String>);

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// An outbound message as supplied by a cockpit add-on.
    pub fn outbound(to: &str, kind: &str, packet: &str) -> Self {
        Self::new()
            .with(keys::TO, to)
            .with(keys::TYPE, kind)
            .with(keys::PACKET, packet)
    }

    /// The poll request for `callsign`, addressed to itself.
    pub fn poll(logon: &str, callsign: &str) -> Self {
        Self::new()
            .with(keys::LOGON, logon)
            .with(keys::FROM, callsign)
            .with(keys::TO, callsign)
            .with(keys::TYPE, MessageType::Poll.as_ref())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Value for `key`, or `""` when absent.
    pub fn field(&self, key: &str) -> &str {
        self.get(key).unwrap_or_default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }

    /// The `type` field parsed into a known [`MessageType`], if it is one.
    pub fn message_type(&self) -> Option<MessageType> {
        self.get(keys::TYPE)?.parse().ok()
    }

    /// True when `to`, `type` and `packet` are all present and non-empty.
    pub fn is_complete(&self) -> bool {
        [keys::TO, keys::TYPE, keys::PACKET]
            .iter()
            .all(|k| !self.field(k).is_empty())
    }

    /// Strict JSON text of the mapping.
    pub fn to_json(&self) -> String {
        serde_json::Value::from(self).to_string()
    }
}

impl From<&Message> for serde_json::Value {
    fn from(msg: &Message) -> Self {
        let map = msg
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Message {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for Message {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Message {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
