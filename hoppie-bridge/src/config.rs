//! Bridge tunables.

use std::time::Duration;

// ── Constants ─────────────────────────────────────────────────────────────────

pub const HOPPIE_URL: &str = "https://www.hoppie.nl/acars/system/connect.html";
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);
/// Poll delay bounds in whole seconds, inclusive.
pub const POLL_WINDOW: (u64, u64)  = (45, 75);
pub const REPLY_WINDOW: (u64, u64) = (18, 24);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
pub const READ_TIMEOUT: Duration    = Duration::from_secs(15);

pub fn default_user_agent() -> String {
    format!("HoppieBridge/{}", env!("CARGO_PKG_VERSION"))
}

// ── BridgeConfig ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub url:             String,
    /// Returned to the host flight loop from every tick.
    pub tick_interval:   Duration,
    /// Delay before the next poll while nothing is expected.
    pub poll_window:     (u64, u64),
    /// Delay before the next poll after a user message went out.
    pub reply_window:    (u64, u64),
    pub connect_timeout: Duration,
    pub read_timeout:    Duration,
    pub user_agent:      String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url:             HOPPIE_URL.to_string(),
            tick_interval:   TICK_INTERVAL,
            poll_window:     POLL_WINDOW,
            reply_window:    REPLY_WINDOW,
            connect_timeout: CONNECT_TIMEOUT,
            read_timeout:    READ_TIMEOUT,
            user_agent:      default_user_agent(),
        }
    }
}

impl BridgeConfig {
    /// Window for the next poll delay.
    pub fn window(&self, waiting_response: bool) -> (u64, u64) {
        if waiting_response {
            self.reply_window
        } else {
            self.poll_window
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.url, HOPPIE_URL);
        assert_eq!(cfg.tick_interval.as_secs(), 5);
        assert_eq!(cfg.window(true), (18, 24));
        assert_eq!(cfg.window(false), (45, 75));
        assert!(cfg.user_agent.starts_with("HoppieBridge/"));
    }
}
