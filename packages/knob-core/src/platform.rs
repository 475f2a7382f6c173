//! Collaborator seams owned by the host platform.
//!
//! The engine persists its [`BridgeConfig`] and reads power/display state
//! through these traits rather than touching storage or hardware directly.
//! Different hosts (firmware, headless daemon, tests) supply their own
//! implementations.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::state::{BridgeConfig, ConfigError};

/// File name used by [`JsonFileConfigStore`].
pub const BRIDGE_CONFIG_FILE: &str = "bridge_config.json";

// ─────────────────────────────────────────────────────────────────────────────
// Config storage
// ─────────────────────────────────────────────────────────────────────────────

/// Persistent storage for the bridge configuration.
///
/// Called on every mutation, outside the state lock.
pub trait ConfigStore: Send + Sync {
    /// Loads the stored configuration, `None` when nothing was saved yet.
    fn load(&self) -> Result<Option<BridgeConfig>, ConfigError>;

    fn save(&self, config: &BridgeConfig) -> Result<(), ConfigError>;
}

/// Stores the configuration as pretty JSON.
pub struct JsonFileConfigStore {
    dir: PathBuf,
    file_name: String,
}

impl JsonFileConfigStore {
    /// Stores [`BRIDGE_CONFIG_FILE`] inside `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file_name: BRIDGE_CONFIG_FILE.to_string(),
        }
    }

    /// Stores the configuration at an exact file path.
    pub fn at_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| BRIDGE_CONFIG_FILE.to_string());
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self { dir, file_name }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!("{}.tmp", self.file_name))
    }
}

impl ConfigStore for JsonFileConfigStore {
    fn load(&self) -> Result<Option<BridgeConfig>, ConfigError> {
        let path = self.path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Uses atomic write (temp file + rename) to prevent corruption on crash.
    /// Creates the directory if it doesn't exist.
    fn save(&self, config: &BridgeConfig) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.dir)?;
        let contents = serde_json::to_string_pretty(config)?;
        let temp_path = self.temp_path();
        std::fs::write(&temp_path, contents)?;
        std::fs::rename(&temp_path, self.path())?;
        log::debug!("[ConfigStore] Saved bridge config to {}", self.dir.display());
        Ok(())
    }
}

/// Keeps the configuration in memory. Counts saves.
#[derive(Default)]
pub struct MemoryConfigStore {
    saved: Mutex<Option<BridgeConfig>>,
    saves: AtomicUsize,
}

impl MemoryConfigStore {
    pub fn new(initial: Option<BridgeConfig>) -> Self {
        Self {
            saved: Mutex::new(initial),
            saves: Default::default(),
        }
    }

    pub fn current(&self) -> Option<BridgeConfig> {
        self.saved.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<Option<BridgeConfig>, ConfigError> {
        Ok(self.saved.lock().clone())
    }

    fn save(&self, config: &BridgeConfig) -> Result<(), ConfigError> {
        *self.saved.lock() = Some(config.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Power & display
// ─────────────────────────────────────────────────────────────────────────────

/// Power and display snapshot consulted by the poll interval policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerStatus {
    pub charging: bool,
    /// Battery level in percent, when the platform knows it.
    pub battery_level: Option<u8>,
    pub display_sleeping: bool,
}

impl Default for PowerStatus {
    fn default() -> Self {
        Self {
            charging: true,
            battery_level: None,
            display_sleeping: false,
        }
    }
}

pub trait PowerMonitor: Send + Sync {
    fn status(&self) -> PowerStatus;
}

/// A power monitor whose readings are set by the host.
///
/// Defaults to "on mains, display awake", which is what a headless host
/// without battery hardware reports.
pub struct ManualPowerMonitor {
    charging: AtomicBool,
    display_sleeping: AtomicBool,
    /// `u8::MAX` means unknown.
    battery_level: AtomicU8,
}

impl Default for ManualPowerMonitor {
    fn default() -> Self {
        Self {
            charging: AtomicBool::new(true),
            display_sleeping: AtomicBool::new(false),
            battery_level: AtomicU8::new(u8::MAX),
        }
    }
}

impl ManualPowerMonitor {
    pub fn set_charging(&self, charging: bool) {
        self.charging.store(charging, Ordering::Relaxed);
    }

    pub fn set_display_sleeping(&self, sleeping: bool) {
        self.display_sleeping.store(sleeping, Ordering::Relaxed);
    }

    pub fn set_battery_level(&self, level: Option<u8>) {
        let raw = level.map(|l| l.min(100)).unwrap_or(u8::MAX);
        self.battery_level.store(raw, Ordering::Relaxed);
    }
}

impl PowerMonitor for ManualPowerMonitor {
    fn status(&self) -> PowerStatus {
        let level = self.battery_level.load(Ordering::Relaxed);
        PowerStatus {
            charging: self.charging.load(Ordering::Relaxed),
            battery_level: (level != u8::MAX).then_some(level),
            display_sleeping: self.display_sleeping.load(Ordering::Relaxed),
        }
    }
}
