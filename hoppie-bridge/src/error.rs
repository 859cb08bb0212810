//! Error types for the bridge engine.

use std::io;

/// Failure of one HTTP round-trip to the ACARS endpoint.
///
/// Reported as "Connection failed" and never touches `comm_ready` or the
/// mailboxes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("cannot connect: {0}")]
    Connect(String),
    #[error("HTTP {code} {reason}")]
    Status { code: u16, reason: String },
    #[error("{0}")]
    Request(String),
    #[error("request cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// Failure reading or writing the `hoppiebridge.prf` settings file.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings I/O: {0}")]
    Io(#[from] io::Error),
    #[error("settings format: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_reads_like_http() {
        let e = TransportError::Status { code: 503, reason: "Service Unavailable".into() };
        assert_eq!(e.to_string(), "HTTP 503 Service Unavailable");
    }

    #[test]
    fn settings_errors_wrap_sources() {
        let io = SettingsError::from(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert!(io.to_string().starts_with("settings I/O"));
        let json = SettingsError::from(serde_json::from_str::<u8>("x").unwrap_err());
        assert!(json.to_string().starts_with("settings format"));
    }
}
