//! BridgePlugin state machine: the core of the HoppieBridge plugin.
//!
//! This module is free of any XPLM types so it can be fully unit-tested via
//! `MemoryXplm` and a scripted [`Transport`].

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use acars_schema::{keys, Message};
use hoppie_protocol::{decode_response, Exchange, Origin};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::TransportError;
use crate::fields::{Binding, DataRefHandles, Datarefs};
use crate::mailbox::{clear_outbox, read_outbox, Delivery, Mailbox};
use crate::runner::{self, Task, TaskPoll};
use crate::settings::Settings;
use crate::transport::{self, Transport};
use crate::xplm_shim::XplmApi;

/// The one network round-trip the bridge may have outstanding.
pub type RequestTask = Task<Result<Message, TransportError>>;

// ── Status ────────────────────────────────────────────────────────────────────

/// Text published on `hoppiebridge/status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    SystemError,
    SystemOff,
    SetLogon,
    WaitingForCallsign,
    Ready,
    Idle,
    Polling,
    Sending,
    NoNewMessages,
    MessageReceived,
    InboxBusy,
    ConnectionFailed(String),
    AcarsError(String),
    InvalidResponse,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SystemError         => f.write_str("System Error"),
            Self::SystemOff           => f.write_str("System off"),
            Self::SetLogon            => f.write_str("Set Hoppie Logon"),
            Self::WaitingForCallsign  => f.write_str("waiting for callsign"),
            Self::Ready               => f.write_str("ACARS ready"),
            Self::Idle                => f.write_str("ACARS idle"),
            Self::Polling             => f.write_str("Polling ACARS ..."),
            Self::Sending             => f.write_str("Sending message ..."),
            Self::NoNewMessages       => f.write_str("No new messages"),
            Self::MessageReceived     => f.write_str("New Message received ..."),
            Self::InboxBusy           => f.write_str("Message received but inbox not empty"),
            Self::ConnectionFailed(e) => write!(f, "Connection failed: {e}"),
            Self::AcarsError(e)       => write!(f, "Error: {e}"),
            Self::InvalidResponse     => f.write_str("Invalid response"),
        }
    }
}

/// Random delay within an inclusive window of whole seconds.
pub fn poll_delay((lo, hi): (u64, u64)) -> Duration {
    Duration::from_secs(rand::thread_rng().gen_range(lo..=hi.max(lo)))
}

// ── BridgePlugin ──────────────────────────────────────────────────────────────

pub struct BridgePlugin {
    xplm:             Box<dyn XplmApi>,
    handles:          DataRefHandles,
    config:           BridgeConfig,
    transport:        Arc<dyn Transport>,
    settings_path:    Option<PathBuf>,
    logon:            String,
    mailbox:          Mailbox,
    comm_ready:       bool,
    in_flight:        Option<RequestTask>,
    waiting_response: bool,
    next_poll_time:   Instant,
    last_poll_time:   Option<Instant>,
    status:           Status,
}

impl BridgePlugin {
    pub fn new(xplm: Box<dyn XplmApi>, transport: Arc<dyn Transport>, config: BridgeConfig) -> Self {
        Self {
            xplm,
            handles: DataRefHandles::default(),
            config,
            transport,
            settings_path: None,
            logon: String::new(),
            mailbox: Mailbox::new(),
            comm_ready: false,
            in_flight: None,
            waiting_response: false,
            next_poll_time: Instant::now(),
            last_poll_time: None,
            status: Status::SystemError,
        }
    }

    /// Use `path` as the settings file and load the saved logon from it.
    pub fn with_settings_file(mut self, path: PathBuf) -> Self {
        match Settings::load(&path) {
            Ok(Some(settings)) => {
                info!(path = %path.display(), "logon loaded");
                self.logon = settings.logon().trim().to_string();
            }
            Ok(None) => debug!(path = %path.display(), "no settings file"),
            Err(e) => warn!(path = %path.display(), error = %e, "cannot load settings"),
        }
        self.settings_path = Some(path);
        self
    }

    /// Publish the bridge datarefs and look up the simulator ones.
    pub fn bind_datarefs(&mut self) {
        self.handles = DataRefHandles::bind(self.xplm.as_ref(), Binding::Register);
        if !self.handles.is_complete() {
            warn!("dataref set incomplete, bridge disabled");
        }
        self.publish();
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn comm_ready(&self) -> bool {
        self.comm_ready
    }

    pub fn logon(&self) -> &str {
        &self.logon
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn waiting_response(&self) -> bool {
        self.waiting_response
    }

    pub fn next_poll_time(&self) -> Instant {
        self.next_poll_time
    }

    pub fn last_poll_time(&self) -> Option<Instant> {
        self.last_poll_time
    }

    pub fn settings_path(&self) -> Option<&Path> {
        self.settings_path.as_deref()
    }

    /// Set the logon for this session without saving it.
    pub fn set_logon(&mut self, logon: &str) {
        let logon = logon.trim();
        if logon != self.logon {
            info!("logon changed");
            self.logon = logon.to_string();
            self.comm_ready = false;
        }
    }

    fn save_logon(&self) {
        let Some(path) = &self.settings_path else { return };
        if let Err(e) = Settings::with_logon(&self.logon).save(path) {
            warn!(path = %path.display(), error = %e, "cannot save settings");
        }
    }

    // ── Flight loop ───────────────────────────────────────────────────────────

    /// Called by the host flight loop. Returns seconds until the next call.
    pub fn flight_loop_tick(&mut self) -> f32 {
        self.tick_at(Instant::now());
        self.config.tick_interval.as_secs_f32()
    }

    pub fn tick_at(&mut self, now: Instant) {
        let status = self.step(now);
        if status != self.status {
            info!(%status, comm_ready = self.comm_ready, "status");
            self.status = status;
        }
        self.publish();
    }

    /// Cancel any request in flight and drop the link.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.in_flight.take() {
            task.cancel();
        }
        self.comm_ready = false;
        self.waiting_response = false;
        self.publish();
        info!("bridge stopped");
    }

    fn publish(&self) {
        let io = Datarefs::new(self.xplm.as_ref(), &self.handles);
        io.set_status(&self.status.to_string());
        io.set_comm_ready(self.comm_ready);
        self.mailbox.publish_pending(&io);
    }

    fn step(&mut self, now: Instant) -> Status {
        // 1. Hard preconditions.
        if !self.handles.is_complete() {
            self.comm_ready = false;
            return Status::SystemError;
        }
        if !Datarefs::new(self.xplm.as_ref(), &self.handles).avionics_on() {
            self.comm_ready = false;
            return Status::SystemOff;
        }
        self.apply_logon_request();
        if self.logon.is_empty() {
            self.comm_ready = false;
            return Status::SetLogon;
        }

        let io = Datarefs::new(self.xplm.as_ref(), &self.handles);

        // 2. Callsign.
        if let Some(requested) = io.take_callsign_request() {
            if requested != io.callsign() {
                info!(callsign = %requested, "callsign set");
                io.set_callsign(&requested);
                self.comm_ready = false;
            }
        }
        let callsign = io.callsign();
        if callsign.is_empty() {
            self.comm_ready = false;
            return Status::WaitingForCallsign;
        }

        // 3. Inbox housekeeping.
        self.mailbox.handle_clear_request(&io);
        self.mailbox.promote_pending(&io);

        // 4. Harvest the request in flight.
        if let Some(task) = self.in_flight.take() {
            return match task.poll() {
                TaskPoll::Running => {
                    self.in_flight = Some(task);
                    Status::NoNewMessages
                }
                TaskPoll::Failed(e) => {
                    warn!(label = task.label(), elapsed = ?task.elapsed(), error = %e, "request worker lost");
                    Status::ConnectionFailed(e.to_string())
                }
                TaskPoll::Completed(Err(e)) => {
                    warn!(label = task.label(), elapsed = ?task.elapsed(), error = %e, "ACARS request failed");
                    Status::ConnectionFailed(e.to_string())
                }
                TaskPoll::Completed(Ok(result)) => {
                    debug!(label = task.label(), elapsed = ?task.elapsed(), "request completed");
                    self.handle_result(result)
                }
            };
        }

        // 5. Dispatch.
        let outbox = read_outbox(&io);
        if self.comm_ready && !outbox.is_empty() {
            let message = outbox
                .with(keys::LOGON, self.logon.as_str())
                .with(keys::FROM, callsign.as_str());
            return match self.dispatch(Exchange::Send, message, now) {
                Ok(()) => {
                    clear_outbox(&Datarefs::new(self.xplm.as_ref(), &self.handles));
                    Status::Sending
                }
                Err(e) => Status::AcarsError(e.to_string()),
            };
        }
        if !self.comm_ready || now >= self.next_poll_time {
            let message = Message::poll(&self.logon, &callsign);
            return match self.dispatch(Exchange::Poll, message, now) {
                Ok(()) => {
                    self.last_poll_time = Some(now);
                    Status::Polling
                }
                Err(e) => Status::AcarsError(e.to_string()),
            };
        }
        Status::Idle
    }

    fn apply_logon_request(&mut self) {
        let requested = Datarefs::new(self.xplm.as_ref(), &self.handles).take_logon_request();
        if let Some(logon) = requested {
            self.set_logon(&logon);
            self.save_logon();
        }
    }

    fn dispatch(&mut self, kind: Exchange, message: Message, now: Instant) -> io::Result<()> {
        let transport = Arc::clone(&self.transport);
        let url = self.config.url.clone();
        let label = match kind {
            Exchange::Send => "send",
            Exchange::Poll => "poll",
        };
        let task = runner::schedule(label, move |cancel| {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            transport::exchange(transport.as_ref(), &url, kind, &message)
        })?;
        self.in_flight = Some(task);
        if kind == Exchange::Send {
            self.waiting_response = true;
        }
        self.next_poll_time = now + poll_delay(self.config.window(self.waiting_response));
        debug!(label, next_poll_in = ?(self.next_poll_time - now), "request dispatched");
        Ok(())
    }

    /// Apply a completed round-trip's result object.
    fn handle_result(&mut self, result: Message) -> Status {
        if let Some(error) = result.get(keys::ERROR) {
            warn!(error, "ACARS error");
            return Status::AcarsError(error.to_string());
        }
        if !result.contains_key(keys::POLL) && !result.contains_key(keys::RESPONSE) {
            warn!(?result, "invalid response");
            return Status::InvalidResponse;
        }
        self.waiting_response = false;

        let poll_ok = result
            .get(keys::POLL)
            .is_some_and(|p| p.trim().eq_ignore_ascii_case("ok"));
        if !self.comm_ready && poll_ok {
            self.comm_ready = true;
            info!("ACARS link up");
            return Status::Ready;
        }

        let parsed = decode_response(&result);
        if parsed.origin == Origin::Poll && (parsed.is_bare_ack() || parsed.packet.is_none()) {
            return Status::NoNewMessages;
        }

        let io = Datarefs::new(self.xplm.as_ref(), &self.handles);
        match self.mailbox.deliver(&io, result) {
            Delivery::Delivered => {
                info!(from = ?parsed.source, kind = ?parsed.msg_type, "message delivered");
                Status::MessageReceived
            }
            Delivery::Queued => {
                info!(pending = self.mailbox.pending_len(), "message queued");
                Status::InboxBusy
            }
        }
    }
}
