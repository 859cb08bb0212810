//! Inbox/outbox datarefs.
//!
//! Each direction has two representations of the same [`Message`]: the
//! structured datarefs (`outbox/to`, `inbox/packet`, ...) and one legacy
//! combined string (`send_queue`, `poll_queue`). On the outbox side the
//! structured form wins when complete. The inbox is a single slot; messages
//! arriving while it is occupied wait in a FIFO backlog.

use std::collections::VecDeque;

use acars_schema::{keys, Message};
use hoppie_protocol::{decode_response, format_strict, parse_loose};
use serde_json::Value;
use tracing::{debug, info};

use crate::fields::Datarefs;

// ── Outbox ────────────────────────────────────────────────────────────────────

/// Place a message in the outbox (consumer side).
///
/// Complete messages go to the structured datarefs; anything else is written
/// to the legacy string as strict JSON.
pub fn set_outbox(io: &Datarefs<'_>, message: &Message) {
    let h = io.handles;
    if message.is_complete() {
        io.set_text(h.outbox_to, message.field(keys::TO));
        io.set_text(h.outbox_type, message.field(keys::TYPE));
        io.set_text(h.outbox_packet, message.field(keys::PACKET));
    } else {
        debug!(?message, "incomplete message written to legacy outbox");
        io.set_text(h.send_queue, &format_strict(&Value::from(message)));
    }
}

/// The message waiting in the outbox, or an empty one.
///
/// Structured fields take priority when `to`, `type` and `packet` are all
/// set. A partially filled structured outbox is ignored in favour of the
/// legacy string. A legacy string that cannot be parsed is cleared.
pub fn read_outbox(io: &Datarefs<'_>) -> Message {
    let h = io.handles;
    let to = io.text(h.outbox_to);
    let kind = io.text(h.outbox_type);
    let packet = io.text(h.outbox_packet);

    let filled = [&to, &kind, &packet].iter().filter(|s| !s.trim().is_empty()).count();
    if filled == 3 {
        return Message::outbound(to.trim(), kind.trim(), &packet);
    }
    if filled > 0 {
        debug!(to, kind, packet, "structured outbox incomplete, ignored");
    }
    let legacy = io.text(h.send_queue);
    let message = parse_loose(&legacy);
    if message.is_empty() && !legacy.trim().is_empty() {
        info!("unreadable legacy outbox discarded");
        io.set_text(h.send_queue, "");
    }
    message
}

/// Reset both outbox representations.
pub fn clear_outbox(io: &Datarefs<'_>) {
    let h = io.handles;
    for handle in [h.outbox_to, h.outbox_type, h.outbox_packet, h.send_queue] {
        io.set_text(handle, "");
    }
}

// ── Inbox ─────────────────────────────────────────────────────────────────────

/// Structured view of the inbox slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboxEntry {
    pub origin:   String,
    pub from:     String,
    pub msg_type: String,
    pub packet:   String,
    /// Legacy JSON text of the transport result object.
    pub raw:      String,
}

pub fn inbox_is_empty(io: &Datarefs<'_>) -> bool {
    let h = io.handles;
    [h.poll_queue, h.inbox_origin, h.inbox_from, h.inbox_type, h.inbox_packet]
        .into_iter()
        .all(|handle| io.text(handle).trim().is_empty())
}

/// Read the inbox slot (consumer side). Falls back to decoding the legacy
/// string when only that one was written.
pub fn read_inbox(io: &Datarefs<'_>) -> Option<InboxEntry> {
    if inbox_is_empty(io) {
        return None;
    }
    let h = io.handles;
    let mut entry = InboxEntry {
        origin:   io.text(h.inbox_origin),
        from:     io.text(h.inbox_from),
        msg_type: io.text(h.inbox_type),
        packet:   io.text(h.inbox_packet),
        raw:      io.text(h.poll_queue),
    };
    if entry.origin.is_empty() && entry.packet.is_empty() {
        let parsed = decode_response(&parse_loose(&entry.raw));
        entry.origin = parsed.origin.to_string();
        entry.from = parsed.source.unwrap_or_default();
        entry.msg_type = parsed.msg_type.unwrap_or_default();
        entry.packet = parsed.packet.unwrap_or_default();
    }
    Some(entry)
}

/// Ask the bridge to empty the inbox slot (consumer side).
pub fn request_clear_inbox(io: &Datarefs<'_>) {
    io.set_int(io.handles.clear_inbox, 1);
}

/// Empty every inbox dataref.
pub fn clear_inbox(io: &Datarefs<'_>) {
    let h = io.handles;
    for handle in [h.poll_queue, h.inbox_origin, h.inbox_from, h.inbox_type, h.inbox_packet] {
        io.set_text(handle, "");
    }
}

fn write_inbox(io: &Datarefs<'_>, message: &Message) {
    let h = io.handles;
    let parsed = decode_response(message);
    io.set_text(h.poll_queue, &format_strict(&Value::from(message)));
    io.set_text(h.inbox_origin, parsed.origin.as_str());
    io.set_text(h.inbox_from, parsed.source.as_deref().unwrap_or_default());
    io.set_text(h.inbox_type, parsed.msg_type.as_deref().unwrap_or_default());
    io.set_text(h.inbox_packet, parsed.packet.as_deref().unwrap_or_default());
}

// ── Mailbox ───────────────────────────────────────────────────────────────────

/// Where an inbound message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Queued,
}

/// Backlog of inbound messages waiting for the inbox slot.
#[derive(Debug, Default)]
pub struct Mailbox {
    pending: VecDeque<Message>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Message> {
        self.pending.iter()
    }

    /// Put a received result object in the inbox slot if it is empty,
    /// otherwise append it to the backlog. Nothing is ever overwritten.
    pub fn deliver(&mut self, io: &Datarefs<'_>, message: Message) -> Delivery {
        if inbox_is_empty(io) {
            write_inbox(io, &message);
            Delivery::Delivered
        } else {
            self.pending.push_back(message);
            self.publish_pending(io);
            Delivery::Queued
        }
    }

    /// Honour a raised `clear_inbox` flag. Returns true if the slot was cleared.
    pub fn handle_clear_request(&mut self, io: &Datarefs<'_>) -> bool {
        let flag = io.handles.clear_inbox;
        if io.int(flag) == 0 {
            return false;
        }
        clear_inbox(io);
        io.set_int(flag, 0);
        info!(pending = self.pending.len(), "inbox cleared");
        true
    }

    /// Move the oldest backlog entry into the slot if the slot is empty.
    pub fn promote_pending(&mut self, io: &Datarefs<'_>) -> bool {
        if self.pending.is_empty() || !inbox_is_empty(io) {
            return false;
        }
        let Some(message) = self.pending.pop_front() else { return false };
        write_inbox(io, &message);
        self.publish_pending(io);
        true
    }

    pub fn publish_pending(&self, io: &Datarefs<'_>) {
        let count = i32::try_from(self.pending.len()).unwrap_or(i32::MAX);
        io.set_int(io.handles.inbox_pending, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{Binding, DataRefHandles};
    use crate::xplm_shim::MemoryXplm;
    use acars_schema::paths;

    fn setup() -> (MemoryXplm, DataRefHandles) {
        let xp = MemoryXplm::new();
        let h = DataRefHandles::bind(&xp, Binding::Register);
        (xp, h)
    }

    fn reply(n: usize) -> Message {
        Message::new().with(keys::POLL, format!("ok {{SRV{n} telex {{MSG {n}}}}}"))
    }

    #[test]
    fn structured_outbox_beats_legacy() {
        let (xp, h) = setup();
        let io = Datarefs::new(&xp, &h);
        io.set_text(h.outbox_to, "X");
        io.set_text(h.outbox_type, "telex");
        io.set_text(h.outbox_packet, "Y");
        io.set_text(h.send_queue, r#"{"to": "LEGACY", "type": "ping", "packet": "Z"}"#);

        assert_eq!(read_outbox(&io), Message::outbound("X", "telex", "Y"));
    }

    #[test]
    fn incomplete_structured_outbox_falls_through_to_legacy() {
        let (xp, h) = setup();
        let io = Datarefs::new(&xp, &h);
        io.set_text(h.outbox_to, "X");
        io.set_text(h.send_queue, "{'to': 'SERVER', 'type': 'inforeq', 'packet': 'METAR LIPE'}");

        assert_eq!(read_outbox(&io), Message::outbound("SERVER", "inforeq", "METAR LIPE"));
    }

    #[test]
    fn empty_or_garbage_outbox_reads_empty() {
        let (xp, h) = setup();
        let io = Datarefs::new(&xp, &h);
        assert!(read_outbox(&io).is_empty());
        io.set_text(h.send_queue, "hello tower");
        assert!(read_outbox(&io).is_empty());
        assert_eq!(xp.text(paths::SEND_QUEUE), "");
    }

    #[test]
    fn readable_legacy_outbox_is_kept_until_cleared() {
        let (xp, h) = setup();
        let io = Datarefs::new(&xp, &h);
        io.set_text(h.send_queue, "{'to': 'SERVER', 'type': 'ping', 'packet': 'x'}");
        assert_eq!(read_outbox(&io), Message::outbound("SERVER", "ping", "x"));
        assert_ne!(xp.text(paths::SEND_QUEUE), "");
    }

    #[test]
    fn set_outbox_picks_representation() {
        let (xp, h) = setup();
        let io = Datarefs::new(&xp, &h);

        set_outbox(&io, &Message::outbound("SERVER", "inforeq", "METAR LIPE"));
        assert_eq!(xp.text(paths::OUTBOX_TO), "SERVER");
        assert_eq!(xp.text(paths::OUTBOX_PACKET), "METAR LIPE");
        assert_eq!(xp.text(paths::SEND_QUEUE), "");

        clear_outbox(&io);
        assert!(read_outbox(&io).is_empty());

        let partial = Message::new().with(keys::TO, "SERVER").with(keys::TYPE, "ping");
        set_outbox(&io, &partial);
        assert_eq!(xp.text(paths::OUTBOX_TO), "");
        assert_eq!(xp.text(paths::SEND_QUEUE), r#"{"to":"SERVER","type":"ping"}"#);
    }

    #[test]
    fn deliver_fills_every_inbox_field() {
        let (xp, h) = setup();
        let io = Datarefs::new(&xp, &h);
        let mut mailbox = Mailbox::new();

        let msg = Message::new().with(keys::RESPONSE, "ok {ATC123 telex {HELLO WORLD}}");
        assert_eq!(mailbox.deliver(&io, msg), Delivery::Delivered);

        assert_eq!(xp.text(paths::INBOX_ORIGIN), "response");
        assert_eq!(xp.text(paths::INBOX_FROM), "ATC123");
        assert_eq!(xp.text(paths::INBOX_TYPE), "telex");
        assert_eq!(xp.text(paths::INBOX_PACKET), "HELLO WORLD");
        assert_eq!(
            xp.text(paths::POLL_QUEUE),
            r#"{"response":"ok {ATC123 telex {HELLO WORLD}}"}"#
        );
    }

    #[test]
    fn occupied_inbox_queues_in_arrival_order() {
        let (xp, h) = setup();
        let io = Datarefs::new(&xp, &h);
        let mut mailbox = Mailbox::new();

        assert_eq!(mailbox.deliver(&io, reply(1)), Delivery::Delivered);
        for n in 2..=4 {
            assert_eq!(mailbox.deliver(&io, reply(n)), Delivery::Queued);
        }
        assert_eq!(mailbox.pending_len(), 3);
        assert_eq!(xp.int(paths::INBOX_PENDING), 3);
        assert_eq!(xp.text(paths::INBOX_FROM), "SRV1");

        // Drain: every message shows up exactly once, oldest first.
        let mut seen = vec![xp.text(paths::INBOX_FROM)];
        for _ in 0..3 {
            assert!(!mailbox.promote_pending(&io), "slot still occupied");
            request_clear_inbox(&io);
            assert!(mailbox.handle_clear_request(&io));
            assert!(mailbox.promote_pending(&io));
            seen.push(xp.text(paths::INBOX_FROM));
        }
        assert_eq!(seen, ["SRV1", "SRV2", "SRV3", "SRV4"]);
        assert_eq!(mailbox.pending_len(), 0);
        assert_eq!(xp.int(paths::INBOX_PENDING), 0);
    }

    #[test]
    fn clear_request_resets_flag_and_fields() {
        let (xp, h) = setup();
        let io = Datarefs::new(&xp, &h);
        let mut mailbox = Mailbox::new();

        assert!(!mailbox.handle_clear_request(&io));
        mailbox.deliver(&io, reply(1));
        request_clear_inbox(&io);
        assert!(mailbox.handle_clear_request(&io));
        assert_eq!(xp.int(paths::CLEAR_INBOX), 0);
        assert!(inbox_is_empty(&io));
        // Clearing again is harmless.
        clear_inbox(&io);
        assert!(inbox_is_empty(&io));
    }

    #[test]
    fn read_inbox_decodes_legacy_only_slot() {
        let (xp, h) = setup();
        let io = Datarefs::new(&xp, &h);
        assert_eq!(read_inbox(&io), None);

        io.set_text(h.poll_queue, "{'response': 'ok {acars info {LIPE 031350Z}}'}");
        let entry = read_inbox(&io).unwrap();
        assert_eq!(entry.origin, "response");
        assert_eq!(entry.from, "acars");
        assert_eq!(entry.msg_type, "info");
        assert_eq!(entry.packet, "LIPE 031350Z");
    }
}
