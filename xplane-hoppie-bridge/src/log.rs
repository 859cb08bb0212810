//! `tracing` output to X-Plane's `Log.txt`.

use std::ffi::CString;
use std::io;

use tracing_subscriber::EnvFilter;

/// Hands each formatted event to `XPLMDebugString`.
struct DebugStringWriter;

impl io::Write for DebugStringWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let line = String::from_utf8_lossy(buf).replace('\0', " ");
        if let Ok(c) = CString::new(format!("HoppieBridge: {line}")) {
            unsafe { crate::xplm_sys::XPLMDebugString(c.as_ptr()) }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Install the subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(|| DebugStringWriter)
        .with_ansi(false)
        .without_time()
        .try_init();
}
