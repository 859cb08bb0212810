//! The bridge's dataref set: handle caching and typed access.

use acars_schema::paths;
use tracing::warn;

use crate::xplm_shim::{DataRefHandle, XplmApi};

// ── DataRefHandles ────────────────────────────────────────────────────────────

/// Cached dataref handles looked up once at plugin enable time.
#[derive(Debug, Default, Clone)]
pub struct DataRefHandles {
    pub avionics_on:   Option<DataRefHandle>,
    pub callsign:      Option<DataRefHandle>,
    pub callsign_set:  Option<DataRefHandle>,
    pub logon_set:     Option<DataRefHandle>,
    pub send_queue:    Option<DataRefHandle>,
    pub outbox_to:     Option<DataRefHandle>,
    pub outbox_type:   Option<DataRefHandle>,
    pub outbox_packet: Option<DataRefHandle>,
    pub poll_queue:    Option<DataRefHandle>,
    pub inbox_origin:  Option<DataRefHandle>,
    pub inbox_from:    Option<DataRefHandle>,
    pub inbox_type:    Option<DataRefHandle>,
    pub inbox_packet:  Option<DataRefHandle>,
    pub inbox_pending: Option<DataRefHandle>,
    pub clear_inbox:   Option<DataRefHandle>,
    pub comm_ready:    Option<DataRefHandle>,
    pub status:        Option<DataRefHandle>,
}

/// How the `hoppiebridge/*` datarefs are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// The bridge publishes them.
    Register,
    /// A consumer looks up the ones the bridge published.
    Find,
}

impl DataRefHandles {
    /// Resolve every handle. Missing ones are logged and left `None`.
    pub fn bind(xplm: &dyn XplmApi, binding: Binding) -> Self {
        let mut h = Self::default();

        macro_rules! bind {
            (@register string, $path:expr) => { xplm.register_string($path) };
            (@register int, $path:expr) => { xplm.register_int($path) };
            ($field:ident, $path:expr, $kind:ident) => {
                h.$field = match binding {
                    Binding::Register => bind!(@register $kind, $path),
                    Binding::Find => xplm.find_dataref($path),
                };
                if h.$field.is_none() {
                    warn!(path = $path, "dataref not available");
                }
            };
        }

        h.avionics_on = xplm.find_dataref(paths::AVIONICS_ON);
        if h.avionics_on.is_none() {
            warn!(path = paths::AVIONICS_ON, "dataref not found");
        }

        bind!(callsign,      paths::CALLSIGN,      string);
        bind!(callsign_set,  paths::CALLSIGN_SET,  string);
        bind!(logon_set,     paths::LOGON_SET,     string);
        bind!(send_queue,    paths::SEND_QUEUE,    string);
        bind!(outbox_to,     paths::OUTBOX_TO,     string);
        bind!(outbox_type,   paths::OUTBOX_TYPE,   string);
        bind!(outbox_packet, paths::OUTBOX_PACKET, string);
        bind!(poll_queue,    paths::POLL_QUEUE,    string);
        bind!(inbox_origin,  paths::INBOX_ORIGIN,  string);
        bind!(inbox_from,    paths::INBOX_FROM,    string);
        bind!(inbox_type,    paths::INBOX_TYPE,    string);
        bind!(inbox_packet,  paths::INBOX_PACKET,  string);
        bind!(inbox_pending, paths::INBOX_PENDING, int);
        bind!(clear_inbox,   paths::CLEAR_INBOX,   int);
        bind!(comm_ready,    paths::COMM_READY,    int);
        bind!(status,        paths::STATUS,        string);
        h
    }

    /// True once every dataref the bridge depends on is bound.
    pub fn is_complete(&self) -> bool {
        [
            self.avionics_on,
            self.callsign,
            self.callsign_set,
            self.logon_set,
            self.send_queue,
            self.outbox_to,
            self.outbox_type,
            self.outbox_packet,
            self.poll_queue,
            self.inbox_origin,
            self.inbox_from,
            self.inbox_type,
            self.inbox_packet,
            self.inbox_pending,
            self.clear_inbox,
            self.comm_ready,
            self.status,
        ]
        .iter()
        .all(Option::is_some)
    }
}

// ── Datarefs ──────────────────────────────────────────────────────────────────

/// Borrowed view pairing the shim with the cached handles.
///
/// Reads of unbound datarefs yield `""`/`0`; writes to them are dropped.
#[derive(Clone, Copy)]
pub struct Datarefs<'a> {
    pub xplm:    &'a dyn XplmApi,
    pub handles: &'a DataRefHandles,
}

impl<'a> Datarefs<'a> {
    pub fn new(xplm: &'a dyn XplmApi, handles: &'a DataRefHandles) -> Self {
        Self { xplm, handles }
    }

    pub fn text(&self, h: Option<DataRefHandle>) -> String {
        h.map_or_else(String::new, |h| self.xplm.get_string(h))
    }

    pub fn set_text(&self, h: Option<DataRefHandle>, value: &str) {
        if let Some(h) = h {
            self.xplm.set_string(h, value);
        }
    }

    pub fn int(&self, h: Option<DataRefHandle>) -> i32 {
        h.map_or(0, |h| self.xplm.get_int(h))
    }

    pub fn set_int(&self, h: Option<DataRefHandle>, value: i32) {
        if let Some(h) = h {
            self.xplm.set_int(h, value);
        }
    }

    // ── Session ───────────────────────────────────────────────────────────────

    pub fn avionics_on(&self) -> bool {
        self.int(self.handles.avionics_on) != 0
    }

    pub fn callsign(&self) -> String {
        self.text(self.handles.callsign).trim().to_string()
    }

    pub fn set_callsign(&self, callsign: &str) {
        self.set_text(self.handles.callsign, callsign);
    }

    /// Take a pending request from a `*_set` dataref, clearing it.
    fn take_request(&self, h: Option<DataRefHandle>) -> Option<String> {
        let raw = self.text(h);
        if raw.is_empty() {
            return None;
        }
        self.set_text(h, "");
        let value = raw.trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    pub fn take_callsign_request(&self) -> Option<String> {
        self.take_request(self.handles.callsign_set)
    }

    pub fn request_callsign(&self, callsign: &str) {
        self.set_text(self.handles.callsign_set, callsign);
    }

    pub fn take_logon_request(&self) -> Option<String> {
        self.take_request(self.handles.logon_set)
    }

    pub fn request_logon(&self, logon: &str) {
        self.set_text(self.handles.logon_set, logon);
    }

    // ── Link state ────────────────────────────────────────────────────────────

    pub fn status(&self) -> String {
        self.text(self.handles.status)
    }

    pub fn set_status(&self, status: &str) {
        if self.status() != status {
            self.set_text(self.handles.status, status);
        }
    }

    pub fn comm_ready(&self) -> bool {
        self.int(self.handles.comm_ready) != 0
    }

    pub fn set_comm_ready(&self, ready: bool) {
        self.set_int(self.handles.comm_ready, i32::from(ready));
    }
}
