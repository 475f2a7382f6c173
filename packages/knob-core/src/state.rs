//! Configuration and shared engine state.
//!
//! - [`EngineConfig`]: tunables for the poll loop, discovery and transports.
//! - [`BridgeConfig`]: the persisted record (bridge address, zone, display preferences).
//! - [`SharedState`]: everything the poll task and input handlers share, behind one mutex.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Notify;

use crate::protocol_constants::{DEFAULT_BRIDGE_PORT, MAX_ZONES};
use crate::services::manifest_cache::ManifestCache;
use crate::wire::{FastState, Zone};

/// Fallback bridge address used when every discovery method fails.
pub const DEFAULT_FALLBACK_BRIDGE_BASE: &str = "http://127.0.0.1:8088";

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration problems. Never fatal: the engine reports a status and retries.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no bridge address known")]
    NoBridge,

    #[error("no zone selected")]
    NoZone,

    #[error("unknown zone '{0}'")]
    UnknownZone(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("config storage failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("config serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// ─────────────────────────────────────────────────────────────────────────────
// Engine Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for the synchronization engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Poll interval while charging (milliseconds).
    pub poll_charging_ms: u64,
    /// Poll interval on battery (milliseconds).
    pub poll_battery_ms: u64,
    /// Poll interval while the display sleeps and the zone plays (milliseconds).
    pub poll_sleeping_ms: u64,
    /// Poll interval while the display sleeps and the zone is stopped
    /// (milliseconds). Overridden by the persisted display preference.
    pub poll_sleeping_stopped_ms: u64,
    /// Poll interval once the bridge is considered unreachable (milliseconds).
    pub poll_unreachable_ms: u64,

    /// Consecutive bridge failures before the bridge is reported unreachable.
    pub bridge_fail_threshold: u8,
    /// Consecutive discovery failures before the bridge is reported not found.
    pub discovery_fail_threshold: u8,

    /// Whether polls try the UDP fast path before HTTP.
    pub fast_path: bool,
    /// Receive timeout of the fast-path socket (milliseconds).
    pub fast_path_timeout_ms: u64,
    /// Timeout of every HTTP request (seconds).
    pub http_timeout_secs: u64,

    pub broadcast_discovery: bool,
    /// How long to wait for a broadcast discovery reply (milliseconds).
    pub broadcast_timeout_ms: u64,
    pub mdns_discovery: bool,
    /// How long to browse for the bridge over mDNS (milliseconds).
    pub mdns_timeout_ms: u64,
    /// Minimum time between discovery re-checks once the bridge is verified.
    pub rediscovery_interval_secs: u64,
    /// Address used when discovery finds nothing. Never persisted.
    pub fallback_bridge_base: Option<String>,
    /// HTTP port assumed for bridges found by broadcast.
    pub bridge_port: u16,

    /// Identifier sent with zone listings. Defaults to the host name.
    pub knob_id: Option<String>,

    /// Forget an auto-discovered bridge address when the network reconnects.
    pub forget_discovered_bridge_on_network_change: bool,
    /// Forget a manually configured bridge address when the network reconnects.
    pub forget_manual_bridge_on_network_change: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_charging_ms: 2_000,
            poll_battery_ms: 5_000,
            poll_sleeping_ms: 30_000,
            poll_sleeping_stopped_ms: 60_000,
            poll_unreachable_ms: 30_000,
            bridge_fail_threshold: 5,
            discovery_fail_threshold: 10,
            fast_path: true,
            fast_path_timeout_ms: 500,
            http_timeout_secs: 5,
            broadcast_discovery: true,
            broadcast_timeout_ms: 1_000,
            mdns_discovery: true,
            mdns_timeout_ms: 3_000,
            rediscovery_interval_secs: 3_600,
            fallback_bridge_base: Some(DEFAULT_FALLBACK_BRIDGE_BASE.to_string()),
            bridge_port: DEFAULT_BRIDGE_PORT,
            knob_id: None,
            forget_discovered_bridge_on_network_change: true,
            forget_manual_bridge_on_network_change: false,
        }
    }
}

impl EngineConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        let intervals = [
            ("pollChargingMs", self.poll_charging_ms),
            ("pollBatteryMs", self.poll_battery_ms),
            ("pollSleepingMs", self.poll_sleeping_ms),
            ("pollSleepingStoppedMs", self.poll_sleeping_stopped_ms),
            ("pollUnreachableMs", self.poll_unreachable_ms),
            ("fastPathTimeoutMs", self.fast_path_timeout_ms),
            ("httpTimeoutSecs", self.http_timeout_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(format!("{} must be greater than 0", name));
            }
        }
        if self.bridge_fail_threshold == 0 {
            return Err("bridgeFailThreshold must be greater than 0".to_string());
        }
        if self.discovery_fail_threshold == 0 {
            return Err("discoveryFailThreshold must be greater than 0".to_string());
        }
        if self.bridge_port == 0 || self.bridge_port == u16::MAX {
            return Err(format!("bridgePort {} leaves no fast-path port", self.bridge_port));
        }
        if let Some(base) = &self.fallback_bridge_base {
            if crate::utils::host_of(base).is_none() {
                return Err(format!("fallbackBridgeBase '{}' has no host", base));
            }
        }
        Ok(())
    }

    pub fn fast_path_timeout(&self) -> Duration {
        Duration::from_millis(self.fast_path_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn rediscovery_interval(&self) -> Duration {
        Duration::from_secs(self.rediscovery_interval_secs)
    }

    /// The knob id sent to the bridge, falling back to the host name.
    pub fn resolved_knob_id(&self) -> String {
        self.knob_id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| {
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .filter(|h| !h.is_empty())
            })
            .unwrap_or_else(|| "knob".to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Persisted Bridge Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// The persisted configuration record.
///
/// Fields this crate does not own (display and power preferences managed by
/// other modules) are kept in `extra` so saving never drops them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Bridge base URL, `None` while undiscovered.
    pub bridge_base: Option<String>,
    /// Whether `bridge_base` came from auto-discovery.
    pub bridge_from_discovery: bool,
    /// Selected zone.
    pub zone_id: Option<String>,
    /// Poll interval while asleep with a stopped zone (seconds), owned by the
    /// display settings.
    pub sleep_poll_stopped_secs: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl BridgeConfig {
    pub fn has_bridge(&self) -> bool {
        self.bridge_base.as_deref().is_some_and(|b| !b.is_empty())
    }

    /// Stores a bridge address and where it came from.
    pub fn set_bridge(&mut self, base: String, from_discovery: bool) {
        self.bridge_base = Some(base);
        self.bridge_from_discovery = from_discovery;
    }

    pub fn clear_bridge(&mut self) {
        self.bridge_base = None;
        self.bridge_from_discovery = false;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Device Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Device lifecycle as seen by rendering and input dispatch.
///
/// `Operational` requires a resolved zone; `Reconnecting` is only entered
/// from `Operational`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    #[default]
    Boot,
    Connecting,
    Connected,
    Operational,
    Reconnecting,
}

impl DeviceState {
    /// The network interface started connecting.
    pub fn on_network_connecting(self) -> Self {
        match self {
            Self::Boot => Self::Connecting,
            other => other,
        }
    }

    /// The network interface has an address.
    pub fn on_network_ready(self) -> Self {
        match self {
            Self::Operational => Self::Operational,
            _ => Self::Connected,
        }
    }

    /// The network interface went away.
    pub fn on_network_lost(self) -> Self {
        match self {
            Self::Operational | Self::Reconnecting => Self::Reconnecting,
            _ => Self::Boot,
        }
    }

    /// The bridge answered. Promotes to `Operational` once a zone is resolved.
    pub fn on_bridge_reachable(self, zone_resolved: bool) -> Self {
        match self {
            Self::Connected if zone_resolved => Self::Operational,
            other => other,
        }
    }

    pub fn is_operational(self) -> bool {
        self == Self::Operational
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Zone Directory
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of resolving the active zone against a fresh directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneResolution {
    pub zone: Zone,
    /// Whether the active zone differs from the persisted one.
    pub changed: bool,
}

/// Zones known to the bridge plus the active selection.
#[derive(Debug, Clone, Default)]
pub struct ZoneDirectory {
    zones: Vec<Zone>,
    selected_id: Option<String>,
    selected_label: String,
}

impl ZoneDirectory {
    /// Replaces the directory wholesale.
    pub fn replace(&mut self, mut zones: Vec<Zone>) {
        zones.truncate(MAX_ZONES);
        self.zones = zones;
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn find(&self, zone_id: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.zone_id == zone_id)
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected_id.as_deref()
    }

    pub fn selected_label(&self) -> &str {
        &self.selected_label
    }

    pub fn select(&mut self, zone: &Zone) {
        self.selected_id = Some(zone.zone_id.clone());
        self.selected_label = zone.zone_name.clone();
    }

    /// Picks the active zone for this directory.
    ///
    /// A `requested` id that exists wins. Otherwise the persisted zone is
    /// kept when present, and the first zone is used when nothing is
    /// persisted or the persisted zone has disappeared.
    pub fn resolve(&self, persisted: Option<&str>, requested: Option<&str>) -> Option<ZoneResolution> {
        let persisted = persisted.filter(|id| !id.is_empty());
        let chosen = requested
            .and_then(|id| self.find(id))
            .or_else(|| persisted.and_then(|id| self.find(id)))
            .or_else(|| self.zones.first())?;

        Some(ZoneResolution {
            zone: chosen.clone(),
            changed: persisted != Some(chosen.zone_id.as_str()),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure Counters
// ─────────────────────────────────────────────────────────────────────────────

/// A consecutive-failure counter that stops at its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaturatingCounter {
    count: u8,
    threshold: u8,
}

impl SaturatingCounter {
    pub fn new(threshold: u8) -> Self {
        Self {
            count: 0,
            threshold: threshold.max(1),
        }
    }

    /// Records a failure and returns the new count.
    pub fn increment(&mut self) -> u8 {
        if self.count < self.threshold {
            self.count += 1;
        }
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u8 {
        self.count
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn is_exhausted(&self) -> bool {
        self.count >= self.threshold
    }
}

/// Bridge-request and discovery failure counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureCounters {
    pub bridge: SaturatingCounter,
    pub discovery: SaturatingCounter,
}

impl FailureCounters {
    pub fn new(bridge_threshold: u8, discovery_threshold: u8) -> Self {
        Self {
            bridge: SaturatingCounter::new(bridge_threshold),
            discovery: SaturatingCounter::new(discovery_threshold),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Optimistic Volume
// ─────────────────────────────────────────────────────────────────────────────

/// Step multiplier for a burst of rotary ticks.
pub fn velocity_multiplier(ticks: u32) -> f32 {
    match ticks {
        0 => 0.0,
        1 => 1.0,
        2 => 3.0,
        _ => 5.0,
    }
}

/// Clamps without panicking on an inverted range or NaN input.
fn clamp_volume(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        return min;
    }
    value.max(min).min(max)
}

/// Locally predicted volume, rendered before the bridge confirms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimisticVolume {
    value: f32,
    min: f32,
    max: f32,
    step: f32,
    /// Whether a fast state has been seen since boot.
    known: bool,
}

impl Default for OptimisticVolume {
    fn default() -> Self {
        Self {
            value: 0.0,
            min: 0.0,
            max: 100.0,
            step: 1.0,
            known: false,
        }
    }
}

impl OptimisticVolume {
    /// Overwrites the prediction with server state.
    pub fn reconcile(&mut self, fast: &FastState) {
        self.min = fast.volume_min;
        self.max = fast.volume_max;
        self.step = if fast.volume_step > 0.0 {
            fast.volume_step
        } else {
            1.0
        };
        self.value = clamp_volume(fast.volume, self.min, self.max);
        self.known = true;
    }

    /// Applies a signed burst of ticks and returns the new prediction.
    pub fn apply_ticks(&mut self, ticks: i32) -> f32 {
        let multiplier = velocity_multiplier(ticks.unsigned_abs());
        let delta = multiplier * self.step * ticks.signum() as f32;
        self.value = clamp_volume(self.value + delta, self.min, self.max);
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    pub fn range(&self) -> (f32, f32) {
        (self.min, self.max)
    }

    pub fn is_known(&self) -> bool {
        self.known
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared State
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the poll task and input handlers share.
#[derive(Debug)]
pub struct KnobState {
    pub config: BridgeConfig,
    pub device_state: DeviceState,
    pub zones: ZoneDirectory,
    pub volume: OptimisticVolume,
    pub failures: FailureCounters,
    pub cache: ManifestCache,

    pub network_ready: bool,
    pub device_ip: Option<String>,
    /// The current bridge answered at least once since the last network change.
    pub bridge_verified: bool,
    /// The current bridge address is the unpersisted fallback.
    pub bridge_is_fallback: bool,
    /// A zone has been resolved against the current bridge.
    pub zone_resolved: bool,
    /// Last time the locator ran, `None` forces the next check.
    pub last_discovery_check: Option<Instant>,
    /// Result of the previous poll, for edge-triggered status messages.
    pub last_poll_ok: bool,
    pub last_charging: Option<bool>,
}

impl KnobState {
    pub fn new(config: BridgeConfig, engine: &EngineConfig) -> Self {
        Self {
            config,
            device_state: DeviceState::Boot,
            zones: ZoneDirectory::default(),
            volume: OptimisticVolume::default(),
            failures: FailureCounters::new(
                engine.bridge_fail_threshold,
                engine.discovery_fail_threshold,
            ),
            cache: ManifestCache::default(),
            network_ready: false,
            device_ip: None,
            bridge_verified: false,
            bridge_is_fallback: false,
            zone_resolved: false,
            last_discovery_check: None,
            last_poll_ok: false,
            last_charging: None,
        }
    }

    /// The bridge base currently in use.
    pub fn bridge_base(&self) -> Option<String> {
        self.config.bridge_base.clone().filter(|b| !b.is_empty())
    }

    /// The active zone id, once the directory has resolved one.
    pub fn active_zone(&self) -> Option<String> {
        self.zones
            .selected_id()
            .map(str::to_string)
            .or_else(|| self.config.zone_id.clone())
            .filter(|z| !z.is_empty())
    }

    /// Moves the lifecycle, logging transitions.
    pub fn transition(&mut self, next: DeviceState) {
        if next != self.device_state {
            log::info!(
                "[KnobState] Device state {:?} -> {:?}",
                self.device_state,
                next
            );
            self.device_state = next;
        }
    }

    /// Applies a lifecycle step, returning the new state if it changed.
    pub fn advance(&mut self, step: impl FnOnce(DeviceState) -> DeviceState) -> Option<DeviceState> {
        let before = self.device_state;
        self.transition(step(before));
        (self.device_state != before).then_some(self.device_state)
    }
}

/// The single lock around [`KnobState`] plus the "poll now" wake signal.
pub struct SharedState {
    state: Mutex<KnobState>,
    poll_now: Notify,
}

impl SharedState {
    pub fn new(state: KnobState) -> Self {
        Self {
            state: Mutex::new(state),
            poll_now: Notify::new(),
        }
    }

    /// Locks the state. Keep critical sections to field reads and copies.
    pub fn lock(&self) -> MutexGuard<'_, KnobState> {
        self.state.lock()
    }

    pub fn read<R>(&self, f: impl FnOnce(&KnobState) -> R) -> R {
        f(&self.state.lock())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut KnobState) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// Asks the poll task to run now instead of waiting out its interval.
    pub fn request_poll(&self) {
        self.poll_now.notify_one();
    }

    /// Resolves when [`request_poll`](Self::request_poll) is called.
    pub async fn poll_requested(&self) {
        self.poll_now.notified().await;
    }
}
