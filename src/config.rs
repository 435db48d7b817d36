use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const TOKEN_PLACEHOLDER: &str = "YOUR_TELEGRAM_TOKEN";

const MAX_PROBE_SECONDS: u64 = 24 * 60 * 60;
const MAX_AUTO_PROBE_MINUTES: u64 = 366 * 24 * 60;
const MAX_RETENTION_DAYS: u64 = 100 * 366;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: &'static str },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    pub target_address: String,
    pub probe_interval_seconds: u64,
    pub probe_timeout_seconds: u64,
    pub auto_probe_interval_minutes: u64,
    pub auto_probe_enabled: bool,
    pub log_directory: PathBuf,
    pub log_retention_days: u64,
    pub telegram_bot_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_port: Option<u16>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_address: "10.9.0.2".into(),
            probe_interval_seconds: 10,
            probe_timeout_seconds: 10,
            auto_probe_interval_minutes: 30,
            auto_probe_enabled: true,
            log_directory: PathBuf::from("logs"),
            log_retention_days: 5,
            telegram_bot_token: TOKEN_PLACEHOLDER.into(),
            status_port: None,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        let bounded = [
            ("probe_interval_seconds", self.probe_interval_seconds, MAX_PROBE_SECONDS),
            ("probe_timeout_seconds", self.probe_timeout_seconds, MAX_PROBE_SECONDS),
            ("auto_probe_interval_minutes", self.auto_probe_interval_minutes, MAX_AUTO_PROBE_MINUTES),
        ];
        for (field, value, max) in bounded {
            if value == 0 {
                return Err(SettingsError::Invalid { field, reason: "must be greater than zero" });
            }
            if value > max {
                return Err(SettingsError::Invalid { field, reason: "is too large" });
            }
        }
        if self.log_retention_days > MAX_RETENTION_DAYS {
            return Err(SettingsError::Invalid { field: "log_retention_days", reason: "is too large" });
        }
        if self.target_address.trim().is_empty() {
            return Err(SettingsError::Invalid { field: "target_address", reason: "must not be empty" });
        }
        Ok(())
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    pub fn auto_probe_interval(&self) -> Duration {
        Duration::from_secs(self.auto_probe_interval_minutes.saturating_mul(60))
    }

    pub fn has_bot_token(&self) -> bool {
        let token = self.telegram_bot_token.trim();
        !token.is_empty() && token != TOKEN_PLACEHOLDER
    }
}

/// Durable home of the [`Settings`] value.
pub trait SettingsStore: Send + Sync {
    /// `Ok(None)` means nothing has been stored yet.
    fn load(&self) -> Result<Option<Settings>, SettingsError>;
    fn save(&self, settings: &Settings) -> Result<(), SettingsError>;
}

/// Pretty-printed JSON file, editable by hand.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl SettingsStore for JsonFileStore {
    fn load(&self) -> Result<Option<Settings>, SettingsError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(SettingsError::Read { path: self.path.clone(), source }),
        };
        let settings: Settings = serde_json::from_str(&raw)
            .map_err(|source| SettingsError::Parse { path: self.path.clone(), source })?;
        settings.validate()?;
        Ok(Some(settings))
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let write_err = |source| SettingsError::Write { path: self.path.clone(), source };
        let mut body = serde_json::to_string_pretty(settings)
            .map_err(|e| write_err(std::io::Error::other(e)))?;
        body.push('\n');
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(&self.path, body).map_err(write_err)
    }
}

/// Loads the stored settings, or writes and returns the defaults when the
/// store is empty.
pub fn load_or_create(store: &dyn SettingsStore) -> Result<Settings, SettingsError> {
    if let Some(settings) = store.load()? {
        return Ok(settings);
    }
    info!("No configuration found, writing defaults");
    let settings = Settings::default();
    store.save(&settings)?;
    Ok(settings)
}

/// Live settings shared by the dispatcher and scheduler. Every mutation is
/// written through to the store; a failed save leaves the in-memory value in
/// charge for the rest of the run.
pub struct SharedSettings {
    current: RwLock<Settings>,
    store: Box<dyn SettingsStore>,
}

impl SharedSettings {
    pub fn new(settings: Settings, store: Box<dyn SettingsStore>) -> Self {
        Self { current: RwLock::new(settings), store }
    }

    pub fn snapshot(&self) -> Settings {
        self.read().clone()
    }

    pub fn auto_probe_enabled(&self) -> bool {
        self.read().auto_probe_enabled
    }

    pub fn probe_interval(&self) -> Duration {
        self.read().probe_interval()
    }

    pub fn set_auto_probe(&self, enabled: bool) {
        let updated = {
            let mut guard = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.auto_probe_enabled = enabled;
            guard.clone()
        };
        if let Err(e) = self.store.save(&updated) {
            warn!("Failed to persist settings, keeping in-memory value: {}", e);
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Settings> {
        self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// In-memory store that records every save.
    #[derive(Default, Clone)]
    pub(crate) struct MemoryStore {
        pub saved: Arc<Mutex<Vec<Settings>>>,
        pub fail_saves: bool,
    }

    impl SettingsStore for MemoryStore {
        fn load(&self) -> Result<Option<Settings>, SettingsError> {
            Ok(self.saved.lock().unwrap().last().cloned())
        }

        fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
            if self.fail_saves {
                return Err(SettingsError::Write {
                    path: PathBuf::from("memory"),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.saved.lock().unwrap().push(settings.clone());
            Ok(())
        }
    }

    #[test]
    fn missing_file_creates_defaults() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("config.json"));

        let settings = load_or_create(&store).unwrap();

        assert_eq!(settings, Settings::default());
        assert!(settings.auto_probe_enabled);
        assert_eq!(settings.probe_interval_seconds, 10);
        assert_eq!(settings.target_address, "10.9.0.2");
        assert!(store.path().exists());
        assert_eq!(store.load().unwrap(), Some(Settings::default()));
    }

    #[test]
    fn save_then_load_is_field_for_field_equal() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/config.json"));
        let settings = Settings {
            target_address: "vpn-peer.lan".into(),
            probe_interval_seconds: 42,
            probe_timeout_seconds: 3,
            auto_probe_interval_minutes: 5,
            auto_probe_enabled: false,
            log_directory: PathBuf::from("/var/log/vpn-pulse"),
            log_retention_days: 0,
            telegram_bot_token: "123:abc".into(),
            status_port: Some(8088),
        };

        store.save(&settings).unwrap();

        assert_eq!(store.load().unwrap(), Some(settings));
    }

    #[test]
    fn unset_status_port_is_omitted_from_file() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("config.json"));
        store.save(&Settings::default()).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("status_port"));
        assert!(raw.contains("\"auto_probe_enabled\": true"));
    }

    #[test]
    fn corrupt_file_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_or_create(&JsonFileStore::new(path)).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let settings = Settings { probe_timeout_seconds: 0, ..Settings::default() };
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { field: "probe_timeout_seconds", .. }));
    }

    #[test]
    fn oversized_intervals_are_rejected() {
        let settings = Settings { auto_probe_interval_minutes: u64::MAX, ..Settings::default() };
        assert!(matches!(
            settings.validate().unwrap_err(),
            SettingsError::Invalid { field: "auto_probe_interval_minutes", .. }
        ));
        assert_eq!(settings.auto_probe_interval(), Duration::from_secs(u64::MAX));

        let settings = Settings { log_retention_days: u64::MAX, ..Settings::default() };
        assert!(matches!(settings.validate().unwrap_err(), SettingsError::Invalid { field: "log_retention_days", .. }));

        let settings = Settings { probe_interval_seconds: 86_400, log_retention_days: 36_600, ..Settings::default() };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn placeholder_token_is_not_a_token() {
        assert!(!Settings::default().has_bot_token());
        let settings = Settings { telegram_bot_token: "123:abc".into(), ..Settings::default() };
        assert!(settings.has_bot_token());
    }

    #[test]
    fn toggling_auto_probe_persists_immediately() {
        let store = MemoryStore::default();
        let shared = SharedSettings::new(Settings::default(), Box::new(store.clone()));

        shared.set_auto_probe(false);

        assert!(!shared.auto_probe_enabled());
        let saved = store.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert!(!saved[0].auto_probe_enabled);
    }

    #[test]
    fn failed_save_keeps_in_memory_value() {
        let store = MemoryStore { fail_saves: true, ..MemoryStore::default() };
        let shared = SharedSettings::new(Settings::default(), Box::new(store));

        shared.set_auto_probe(false);

        assert!(!shared.auto_probe_enabled());
    }
}
