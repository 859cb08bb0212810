//! `hoppiebridge.prf`: the saved Hoppie logon.
//!
//! ```json
//! {"settings": {"logon": "ABC123"}}
//! ```

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SettingsError;

pub const SETTINGS_FILE: &str = "hoppiebridge.prf";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub settings: LogonSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogonSettings {
    #[serde(default)]
    pub logon: String,
}

impl Settings {
    pub fn with_logon(logon: &str) -> Self {
        Self { settings: LogonSettings { logon: logon.to_string() } }
    }

    pub fn logon(&self) -> &str {
        &self.settings.logon
    }

    /// Load from `path`. A missing file is `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>, SettingsError> {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        fs::write(path, serde_json::to_string(self)?)?;
        info!(path = %path.display(), "settings saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);

        Settings::with_logon("ABC123").save(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), r#"{"settings":{"logon":"ABC123"}}"#);

        let loaded = Settings::load(&path).unwrap().unwrap();
        assert_eq!(loaded.logon(), "ABC123");
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(&dir.path().join(SETTINGS_FILE)).unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        io::Write::write_all(&mut file, b"{'settings': ").unwrap();
        assert!(matches!(Settings::load(file.path()), Err(SettingsError::Json(_))));
    }

    #[test]
    fn missing_logon_key_defaults_to_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        io::Write::write_all(&mut file, br#"{"settings": {}}"#).unwrap();
        assert_eq!(Settings::load(file.path()).unwrap().unwrap().logon(), "");
    }
}
