//! Consumer side of the bridge datarefs, as a cockpit add-on would use them.

use std::collections::VecDeque;

use acars_schema::{paths, Message};
use hoppie_bridge::mailbox::{read_inbox, read_outbox, request_clear_inbox, set_outbox};
use hoppie_bridge::xplm_shim::DataRefValue;
use hoppie_bridge::{Binding, DataRefHandles, Datarefs, InboxEntry, MemoryXplm};
use tracing::debug;

/// What happened to a message handed to [`ConsoleClient::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outgoing {
    /// Written to the outbox.
    Posted,
    /// Outbox busy; held until it empties.
    Queued(usize),
}

/// Snapshot of the link datarefs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkState {
    pub status:     String,
    pub comm_ready: bool,
    pub callsign:   String,
    pub pending:    i32,
}

pub struct ConsoleClient {
    xplm:    MemoryXplm,
    handles: DataRefHandles,
    queue:   VecDeque<Message>,
}

impl ConsoleClient {
    /// Call after the bridge has published its datarefs.
    pub fn new(xplm: MemoryXplm) -> Self {
        let handles = DataRefHandles::bind(&xplm, Binding::Find);
        Self { xplm, handles, queue: VecDeque::new() }
    }

    fn io(&self) -> Datarefs<'_> {
        Datarefs::new(&self.xplm, &self.handles)
    }

    pub fn set_callsign(&self, callsign: &str) {
        self.io().request_callsign(&callsign.trim().to_uppercase());
    }

    pub fn set_logon(&self, logon: &str) {
        self.io().request_logon(logon.trim());
    }

    pub fn set_power(&self, on: bool) {
        self.xplm.set_dataref(paths::AVIONICS_ON, DataRefValue::Int(i32::from(on)));
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn send(&mut self, message: Message) -> Outgoing {
        if self.queue.is_empty() && read_outbox(&self.io()).is_empty() {
            set_outbox(&self.io(), &message);
            return Outgoing::Posted;
        }
        self.queue.push_back(message);
        Outgoing::Queued(self.queue.len())
    }

    /// Flush the local queue into a free outbox and take the inbox entry,
    /// if any, asking the bridge to clear it.
    pub fn tick(&mut self) -> Option<InboxEntry> {
        if !self.queue.is_empty() && read_outbox(&self.io()).is_empty() {
            if let Some(next) = self.queue.pop_front() {
                debug!(queued = self.queue.len(), "queued message posted");
                set_outbox(&self.io(), &next);
            }
        }

        let io = self.io();
        // Already taken, the bridge clears it on its next tick.
        if io.int(self.handles.clear_inbox) != 0 {
            return None;
        }
        let entry = read_inbox(&io)?;
        request_clear_inbox(&io);
        Some(entry)
    }

    pub fn link(&self) -> LinkState {
        let io = self.io();
        LinkState {
            status:     io.status(),
            comm_ready: io.comm_ready(),
            callsign:   io.callsign(),
            pending:    io.int(self.handles.inbox_pending),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acars_schema::keys;
    use hoppie_bridge::mailbox::{clear_inbox, clear_outbox, Mailbox};

    /// A dataref table with the bridge side published.
    fn published() -> (MemoryXplm, DataRefHandles) {
        let xp = MemoryXplm::new();
        xp.set_dataref(paths::AVIONICS_ON, DataRefValue::Int(1));
        let h = DataRefHandles::bind(&xp, Binding::Register);
        (xp, h)
    }

    #[test]
    fn callsign_is_upper_cased() {
        let (xp, _h) = published();
        let client = ConsoleClient::new(xp.clone());
        client.set_callsign(" dlh42 ");
        assert_eq!(xp.text(paths::CALLSIGN_SET), "DLH42");
    }

    #[test]
    fn busy_outbox_queues_fifo() {
        let (xp, h) = published();
        let bridge = Datarefs::new(&xp, &h);
        let mut client = ConsoleClient::new(xp.clone());

        assert_eq!(client.send(Message::outbound("A", "telex", "1")), Outgoing::Posted);
        assert_eq!(client.send(Message::outbound("B", "telex", "2")), Outgoing::Queued(1));
        assert_eq!(client.send(Message::outbound("C", "telex", "3")), Outgoing::Queued(2));

        let mut sent = Vec::new();
        for _ in 0..3 {
            client.tick();
            let out = read_outbox(&bridge);
            sent.push(out.field(keys::TO).to_string());
            clear_outbox(&bridge);
        }
        assert_eq!(sent, ["A", "B", "C"]);
        assert_eq!(client.queued_len(), 0);
    }

    #[test]
    fn inbox_is_taken_once() {
        let (xp, h) = published();
        let bridge = Datarefs::new(&xp, &h);
        let mut mailbox = Mailbox::new();
        let mut client = ConsoleClient::new(xp.clone());
        assert_eq!(client.tick(), None);

        mailbox.deliver(&bridge, Message::new().with(keys::POLL, "ok {ATC telex {CLIMB FL340}}"));
        let entry = client.tick().unwrap();
        assert_eq!(entry.from, "ATC");
        assert_eq!(entry.packet, "CLIMB FL340");
        assert_eq!(xp.int(paths::CLEAR_INBOX), 1);
        assert_eq!(client.tick(), None, "waiting for the bridge to clear");

        assert!(mailbox.handle_clear_request(&bridge));
        clear_inbox(&bridge);
        assert_eq!(client.tick(), None);
    }

    #[test]
    fn link_state_reflects_bridge() {
        let (xp, h) = published();
        let bridge = Datarefs::new(&xp, &h);
        bridge.set_status("ACARS ready");
        bridge.set_comm_ready(true);
        bridge.set_callsign("DLH42");

        let client = ConsoleClient::new(xp.clone());
        client.set_power(false);
        assert!(!bridge.avionics_on());
        assert_eq!(
            client.link(),
            LinkState { status: "ACARS ready".into(), comm_ready: true, callsign: "DLH42".into(), pending: 0 }
        );
    }
}
