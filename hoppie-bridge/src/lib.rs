//! HoppieBridge engine.
//!
//! Everything between the simulator's datarefs and Hoppie's ACARS endpoint:
//! the mailboxes, the connection state machine and the background request
//! runner. Free of XPLM symbols; the `xplane-hoppie-bridge` crate supplies
//! the real [`XplmApi`] and the X-Plane entry points.

pub mod config;
pub mod error;
pub mod fields;
pub mod mailbox;
pub mod plugin;
pub mod runner;
pub mod settings;
pub mod transport;
pub mod xplm_shim;

pub use config::BridgeConfig;
pub use error::{SettingsError, TransportError};
pub use fields::{Binding, DataRefHandles, Datarefs};
pub use mailbox::{InboxEntry, Mailbox};
pub use plugin::{BridgePlugin, Status};
pub use settings::{Settings, SETTINGS_FILE};
pub use transport::{HttpTransport, Transport};
pub use xplm_shim::{DataRefHandle, DataRefValue, MemoryXplm, XplmApi};
