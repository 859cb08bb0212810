//! HTTP access to the ACARS endpoint.
//!
//! [`Transport`] is the seam: the plugin and the console use
//! [`HttpTransport`], tests script replies.

use std::sync::OnceLock;

use acars_schema::Message;
use hoppie_protocol::{encode_request, interpret_reply, Exchange};
use reqwest::blocking::Client;
use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::error::TransportError;

/// Status line and body of one HTTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub reason: String,
    pub body:   String,
}

impl HttpReply {
    pub fn ok(body: &str) -> Self {
        Self { status: 200, reason: "OK".into(), body: body.to_string() }
    }
}

pub trait Transport: Send + Sync {
    /// POST `form` as `application/x-www-form-urlencoded` to `url`.
    fn post_form(&self, url: &str, form: &[(String, String)]) -> Result<HttpReply, TransportError>;
}

// ── HttpTransport ─────────────────────────────────────────────────────────────

static CLIENT: OnceLock<Client> = OnceLock::new();

/// `reqwest` blocking transport sharing one client per process.
///
/// The client is built on first use with the timeouts and user agent of
/// whichever `HttpTransport` gets there first.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    config: BridgeConfig,
}

impl HttpTransport {
    pub fn new(config: &BridgeConfig) -> Self {
        Self { config: config.clone() }
    }

    fn client(&self) -> Result<&'static Client, TransportError> {
        if let Some(client) = CLIENT.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .user_agent(self.config.user_agent.as_str())
            .connect_timeout(self.config.connect_timeout)
            .timeout(self.config.read_timeout)
            .build()?;
        info!(user_agent = %self.config.user_agent, "HTTP client created");
        Ok(CLIENT.get_or_init(|| client))
    }
}

impl Transport for HttpTransport {
    fn post_form(&self, url: &str, form: &[(String, String)]) -> Result<HttpReply, TransportError> {
        let resp = self.client()?.post(url).form(form).send()?;
        let status = resp.status();
        let reason = status.canonical_reason().unwrap_or_default().to_string();
        let body = resp.text()?;
        Ok(HttpReply { status: status.as_u16(), reason, body })
    }
}

// ── Round-trip ────────────────────────────────────────────────────────────────

/// Post `message` and wrap the reply into a result object
/// (`poll`/`response`/`error`).
pub fn exchange(
    transport: &dyn Transport,
    url: &str,
    kind: Exchange,
    message: &Message,
) -> Result<Message, TransportError> {
    let form = encode_request(message);
    let reply = transport.post_form(url, &form)?;
    debug!(?kind, status = reply.status, body = %reply.body, "ACARS reply");
    if reply.status != 200 {
        return Err(TransportError::Status { code: reply.status, reason: reply.reason });
    }
    Ok(interpret_reply(kind, &reply.body))
}
