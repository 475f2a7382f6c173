//! The poll loop that keeps the device in sync with the bridge.
//!
//! One iteration:
//! 1. skip while the network is down
//! 2. run the [`BridgeLocator`] when it is due
//! 3. resolve the active zone if the bridge has not answered yet
//! 4. try the UDP fast path; an unchanged hash needs no JSON at all
//! 5. otherwise fetch the manifest over HTTP
//! 6. apply the result to the cache and post the delta to the UI
//!
//! Failures feed the saturating counters and escalate the network banner.
//! The loop then sleeps for the interval chosen by the poll policy, waking
//! early when something calls [`SyncEngine::trigger_poll`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::bridge_locator::BridgeLocator;
use super::bridge_status::{bridge_failure_status, discovery_failure_status};
use super::manifest_cache::mark_selected_zone;
use super::poll_policy::{PollConditions, PollIntervals};
use crate::bridge::BridgeClient;
use crate::context::BridgeUrls;
use crate::error::KnobResult;
use crate::events::{EventEmitter, PowerEvent, StatusEvent, SyncEvent, ZoneEvent};
use crate::platform::{ConfigStore, PowerMonitor, PowerStatus};
use crate::runtime::PollTask;
use crate::state::{BridgeConfig, DeviceState, EngineConfig, SharedState};
use crate::wire::{parse_manifest_if_changed, parse_zones, Manifest, Zone};

/// Log every Nth fast-path success (the first one always).
const FAST_PATH_LOG_EVERY: u32 = 30;

/// Which transport produced a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTransport {
    Fast,
    Http,
}

/// What one poll iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The network is not up; nothing was sent.
    NetworkDown,
    /// No bridge address is known.
    NoBridge,
    /// The bridge answered but lists no zones.
    NoZone,
    /// The cache was updated. `full` is true when screens were replaced.
    Synced { transport: SyncTransport, full: bool },
    /// The bridge did not answer usefully.
    Failed,
}

/// Retry progress for whichever stage is failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryInfo {
    pub attempt: u8,
    pub max: u8,
    /// True while no bridge address is known (discovery is failing).
    pub searching: bool,
}

pub struct SyncEngine {
    state: Arc<SharedState>,
    client: Arc<dyn BridgeClient>,
    locator: Arc<BridgeLocator>,
    store: Arc<dyn ConfigStore>,
    power: Arc<dyn PowerMonitor>,
    emitter: Arc<dyn EventEmitter>,
    config: Arc<EngineConfig>,
    knob_id: String,
    fast_ok_count: AtomicU32,
    cancel_token: CancellationToken,
}

impl SyncEngine {
    /// Creates the engine.
    ///
    /// # Arguments
    /// * `state` - State shared with the input dispatcher
    /// * `client` - Fast-path and HTTP transport
    /// * `locator` - Resolves the bridge address
    /// * `store` - Persists the bridge configuration
    /// * `power` - Charging and display readings for the poll policy
    /// * `emitter` - UI event sink
    /// * `config` - Engine tunables
    /// * `cancel_token` - Stops the poll loop
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<SharedState>,
        client: Arc<dyn BridgeClient>,
        locator: Arc<BridgeLocator>,
        store: Arc<dyn ConfigStore>,
        power: Arc<dyn PowerMonitor>,
        emitter: Arc<dyn EventEmitter>,
        config: Arc<EngineConfig>,
        cancel_token: CancellationToken,
    ) -> Self {
        let knob_id = config.resolved_knob_id();
        Self {
            state,
            client,
            locator,
            store,
            power,
            emitter,
            config,
            knob_id,
            fast_ok_count: AtomicU32::new(0),
            cancel_token,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Poll loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Spawns [`run`](Self::run) on the current runtime, stopped by the
    /// engine's cancellation token.
    pub fn start(self: Arc<Self>) -> PollTask {
        let cancel = self.cancel_token.clone();
        PollTask::spawn(cancel, async move { self.run().await })
    }

    /// Polls until cancelled.
    pub async fn run(&self) {
        log::info!("[SyncEngine] Poll loop started (knob id {})", self.knob_id);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => break,
                outcome = self.poll_once() => {
                    log::trace!("[SyncEngine] Poll outcome: {:?}", outcome);
                }
            }

            let interval = self.next_interval();
            tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => break,
                _ = self.state.poll_requested() => {
                    log::debug!("[SyncEngine] Immediate poll requested");
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
        log::info!("[SyncEngine] Poll loop stopped");
    }

    /// Stops the poll loop.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    /// Runs one poll iteration.
    pub async fn poll_once(&self) -> PollOutcome {
        if !self.state.read(|s| s.network_ready) {
            return PollOutcome::NetworkDown;
        }
        self.check_power();

        if let Some(outcome) = self.locator.locate_if_due().await {
            log::debug!("[SyncEngine] Locator: {:?}", outcome);
        }

        let Some(base) = self.state.read(|s| s.bridge_base()) else {
            self.report_no_bridge();
            return PollOutcome::NoBridge;
        };

        if !self.state.read(|s| s.zone_resolved) {
            if let Err(e) = self.refresh_zone_label(&base, None).await {
                log::warn!("[SyncEngine] Zone list fetch failed: {}", e);
                self.record_failure();
                return PollOutcome::Failed;
            }
        }

        let Some(zone_id) = self.state.read(|s| s.active_zone()) else {
            log::warn!("[SyncEngine] Bridge lists no zones");
            self.record_reachable();
            return PollOutcome::NoZone;
        };

        match self.fetch_manifest(&base, &zone_id).await {
            Ok((manifest, transport)) => {
                let full = self.apply_manifest(manifest, &zone_id);
                PollOutcome::Synced { transport, full }
            }
            Err(e) => {
                log::warn!("[SyncEngine] Manifest fetch failed: {}", e);
                self.record_failure();
                PollOutcome::Failed
            }
        }
    }

    /// Interval until the next poll, from the current conditions.
    pub fn next_interval(&self) -> Duration {
        let power = self.power.status();
        self.state.read(|s| {
            let intervals = PollIntervals::from_config(&self.config, &s.config);
            let unreachable = s.failures.bridge.is_exhausted()
                || (s.bridge_base().is_none() && s.failures.discovery.is_exhausted());
            let playing = s.cache.fast().is_some_and(|fast| fast.is_playing);
            intervals.select(&PollConditions::new(unreachable, playing, power))
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fetching
    // ─────────────────────────────────────────────────────────────────────────

    async fn fetch_manifest(&self, base: &str, zone_id: &str) -> KnobResult<(Manifest, SyncTransport)> {
        let cached_sha = self.state.read(|s| s.cache.sha().map(str::to_string));

        if self.config.fast_path {
            let last_hash = cached_sha.as_deref().unwrap_or("");
            match self.client.poll_fast(base, last_hash, zone_id).await {
                Ok(reply) => {
                    self.note_fast_path_ok();
                    if let Some(sha) = cached_sha.as_deref().filter(|sha| reply.hash == *sha) {
                        let fast = reply.to_fast_state(zone_id);
                        return Ok((Manifest::fast_only(sha, fast), SyncTransport::Fast));
                    }
                    log::debug!(
                        "[SyncEngine] Manifest hash changed ({:?} -> {}), fetching",
                        cached_sha,
                        reply.hash
                    );
                }
                Err(e) => {
                    self.fast_ok_count.store(0, Ordering::Relaxed);
                    log::debug!("[SyncEngine] Fast path unavailable ({}), using HTTP", e);
                }
            }
        }

        let body = self
            .client
            .fetch_manifest(base, zone_id, cached_sha.as_deref())
            .await?;
        let manifest = parse_manifest_if_changed(&body, cached_sha.as_deref())?;
        Ok((manifest, SyncTransport::Http))
    }

    fn note_fast_path_ok(&self) {
        let previous = self.fast_ok_count.fetch_add(1, Ordering::Relaxed);
        if previous % FAST_PATH_LOG_EVERY == 0 {
            log::info!("[SyncEngine] Fast path OK ({} consecutive)", previous + 1);
        }
    }

    /// Fetches the zone directory and resolves the active zone.
    ///
    /// `requested` wins when it is listed. Otherwise the persisted zone is
    /// kept, or the first zone is used when it is unset or gone. A changed
    /// selection is persisted.
    pub async fn refresh_zone_label(
        &self,
        base: &str,
        requested: Option<&str>,
    ) -> KnobResult<Option<Zone>> {
        let body = self.client.fetch_zones(base, Some(&self.knob_id)).await?;
        let zones = parse_zones(&body)?;

        let (resolution, snapshot, device_change, directory, selected) = self.state.update(|s| {
            s.zones.replace(zones);
            let resolution = s.zones.resolve(s.config.zone_id.as_deref(), requested);
            let mut snapshot = None;
            let mut device_change = None;
            if let Some(resolution) = &resolution {
                let switched = s.zones.selected_id() != Some(resolution.zone.zone_id.as_str());
                s.zones.select(&resolution.zone);
                s.zone_resolved = true;
                if switched {
                    s.cache.clear();
                }
                if resolution.changed {
                    s.config.zone_id = Some(resolution.zone.zone_id.clone());
                    snapshot = Some(s.config.clone());
                }
                device_change = s.advance(|d| d.on_bridge_reachable(true));
            }
            (
                resolution,
                snapshot,
                device_change,
                s.zones.zones().to_vec(),
                s.zones.selected_id().map(str::to_string),
            )
        });

        if let Some(snapshot) = snapshot {
            self.persist(&snapshot);
        }
        self.emitter.emit_zone(ZoneEvent::Directory {
            zones: directory,
            selected,
        });
        if let Some(state) = device_change {
            self.emitter.emit_sync(SyncEvent::DeviceState { state });
        }

        match resolution {
            Some(resolution) => {
                log::info!(
                    "[SyncEngine] Active zone '{}' ({}){}",
                    resolution.zone.zone_name,
                    resolution.zone.zone_id,
                    if resolution.changed { ", saved" } else { "" }
                );
                self.emitter.emit_zone(ZoneEvent::Name {
                    name: resolution.zone.zone_name.clone(),
                });
                Ok(Some(resolution.zone))
            }
            None => Ok(None),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Results
    // ─────────────────────────────────────────────────────────────────────────

    /// Applies a fetched manifest and posts the delta. Returns whether the
    /// screens were replaced.
    fn apply_manifest(&self, mut manifest: Manifest, zone_id: &str) -> bool {
        mark_selected_zone(&mut manifest, zone_id);

        let (delta, was_online, device_change, label) = self.state.update(|s| {
            s.failures.bridge.reset();
            let was_online = s.last_poll_ok;
            s.last_poll_ok = true;
            s.bridge_verified = true;
            let zone_resolved = s.zone_resolved;
            let device_change = s.advance(|d| d.on_bridge_reachable(zone_resolved));
            s.volume.reconcile(&manifest.fast);
            let delta = s.cache.apply(manifest);
            (
                delta,
                was_online,
                device_change,
                s.zones.selected_label().to_string(),
            )
        });

        let full = delta.is_full();
        self.emitter.emit_sync(SyncEvent::Manifest { delta });
        if !was_online {
            self.announce_online(label);
        }
        if let Some(state) = device_change {
            self.emitter.emit_sync(SyncEvent::DeviceState { state });
        }
        full
    }

    /// The bridge answered but there is nothing to fetch.
    fn record_reachable(&self) {
        let (was_online, label) = self.state.update(|s| {
            s.failures.bridge.reset();
            let was_online = s.last_poll_ok;
            s.last_poll_ok = true;
            s.bridge_verified = true;
            (was_online, s.zones.selected_label().to_string())
        });
        if !was_online {
            self.announce_online(label);
        }
    }

    fn announce_online(&self, zone_label: String) {
        log::info!("[SyncEngine] Bridge connected");
        self.emitter.message("Bridge: Connected");
        self.emitter
            .emit_status(StatusEvent::Network { status: None });
        self.emitter.emit_zone(ZoneEvent::Name { name: zone_label });
        self.emitter.emit_sync(SyncEvent::Online { online: true });
    }

    fn record_failure(&self) {
        let (failures, threshold, was_online, device_ip) = self.state.update(|s| {
            let failures = s.failures.bridge.increment();
            let was_online = s.last_poll_ok;
            s.last_poll_ok = false;
            (
                failures,
                s.failures.bridge.threshold(),
                was_online,
                s.device_ip.clone(),
            )
        });

        match bridge_failure_status(failures, threshold, was_online, device_ip.as_deref()) {
            Some(status) => {
                log::warn!(
                    "[SyncEngine] {} ({}/{})",
                    status.headline(),
                    failures,
                    threshold
                );
                self.emitter.emit_status(StatusEvent::Network {
                    status: Some(status),
                });
                self.emitter.emit_zone(ZoneEvent::Name {
                    name: String::new(),
                });
            }
            None => log::info!("[SyncEngine] Bridge request failed, retrying"),
        }
        if was_online {
            self.emitter.emit_sync(SyncEvent::Online { online: false });
        }
    }

    fn report_no_bridge(&self) {
        let (failures, threshold, was_online, device_ip) = self.state.update(|s| {
            let was_online = s.last_poll_ok;
            s.last_poll_ok = false;
            (
                s.failures.discovery.count(),
                s.failures.discovery.threshold(),
                was_online,
                s.device_ip.clone(),
            )
        });
        let status = discovery_failure_status(failures, threshold, device_ip.as_deref());
        log::debug!("[SyncEngine] No bridge: {}", status.headline());
        self.emitter.emit_status(StatusEvent::Network {
            status: Some(status),
        });
        self.emitter.emit_zone(ZoneEvent::Name {
            name: String::new(),
        });
        if was_online {
            self.emitter.emit_sync(SyncEvent::Online { online: false });
        }
    }

    /// Reads power state, posting an event when charging flips.
    fn check_power(&self) -> PowerStatus {
        let power = self.power.status();
        let changed = self.state.update(|s| {
            let changed = s.last_charging != Some(power.charging);
            s.last_charging = Some(power.charging);
            changed
        });
        if changed {
            self.emitter.emit_power(PowerEvent::Charging {
                charging: power.charging,
                battery_level: power.battery_level,
            });
        }
        power
    }

    fn persist(&self, config: &BridgeConfig) {
        if let Err(e) = self.store.save(config) {
            log::error!("[SyncEngine] Failed to persist config: {}", e);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Network hooks
    // ─────────────────────────────────────────────────────────────────────────

    /// The network interface started connecting.
    pub fn set_network_connecting(&self) {
        let change = self
            .state
            .update(|s| s.advance(DeviceState::on_network_connecting));
        if let Some(state) = change {
            self.emitter.emit_sync(SyncEvent::DeviceState { state });
        }
    }

    /// The network interface came up (`true`) or went away (`false`).
    ///
    /// Coming up applies the forget-on-network-change policy, invalidates the
    /// bridge and zone checks and wakes the poll loop.
    pub fn set_network_ready(&self, ready: bool) {
        if !ready {
            let (change, was_online) = self.state.update(|s| {
                s.network_ready = false;
                let was_online = s.last_poll_ok;
                s.last_poll_ok = false;
                (s.advance(DeviceState::on_network_lost), was_online)
            });
            log::info!("[SyncEngine] Network lost");
            self.emitter.message("Reconnecting...");
            if let Some(state) = change {
                self.emitter.emit_sync(SyncEvent::DeviceState { state });
            }
            if was_online {
                self.emitter.emit_sync(SyncEvent::Online { online: false });
            }
            return;
        }

        let forget_discovered = self.config.forget_discovered_bridge_on_network_change;
        let forget_manual = self.config.forget_manual_bridge_on_network_change;
        let (snapshot, change) = self.state.update(|s| {
            s.network_ready = true;
            let mut snapshot = None;
            if s.bridge_is_fallback {
                s.config.clear_bridge();
                s.bridge_is_fallback = false;
            } else if s.config.has_bridge() {
                let forget = if s.config.bridge_from_discovery {
                    forget_discovered
                } else {
                    forget_manual
                };
                if forget {
                    log::info!(
                        "[SyncEngine] Network changed, forgetting bridge {:?}",
                        s.config.bridge_base
                    );
                    s.config.clear_bridge();
                    snapshot = Some(s.config.clone());
                }
            }
            s.zone_resolved = false;
            s.bridge_verified = false;
            s.last_discovery_check = None;
            s.failures.bridge.reset();
            s.failures.discovery.reset();
            (snapshot, s.advance(DeviceState::on_network_ready))
        });

        log::info!("[SyncEngine] Network ready");
        if let Some(snapshot) = snapshot {
            self.persist(&snapshot);
        }
        if let Some(state) = change {
            self.emitter.emit_sync(SyncEvent::DeviceState { state });
        }
        self.state.request_poll();
    }

    /// Records the device's own address, shown in recovery instructions.
    pub fn set_device_ip(&self, ip: Option<String>) {
        self.state.update(|s| s.device_ip = ip);
    }

    /// Wakes the poll loop now.
    pub fn trigger_poll(&self) {
        self.state.request_poll();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn bridge_url(&self) -> Option<String> {
        self.state.read(|s| s.bridge_base())
    }

    /// Whether the last poll reached the bridge.
    pub fn is_bridge_connected(&self) -> bool {
        self.state.read(|s| s.last_poll_ok)
    }

    pub fn bridge_from_discovery(&self) -> bool {
        self.state.read(|s| s.config.bridge_from_discovery)
    }

    pub fn bridge_retry_info(&self) -> RetryInfo {
        self.state.read(|s| {
            let searching = s.bridge_base().is_none();
            let counter = if searching {
                s.failures.discovery
            } else {
                s.failures.bridge
            };
            RetryInfo {
                attempt: counter.count(),
                max: counter.threshold(),
                searching,
            }
        })
    }

    pub fn device_state(&self) -> DeviceState {
        self.state.read(|s| s.device_state)
    }

    /// The zone directory and the selected zone id.
    pub fn zones(&self) -> (Vec<Zone>, Option<String>) {
        self.state.read(|s| {
            (
                s.zones.zones().to_vec(),
                s.zones.selected_id().map(str::to_string),
            )
        })
    }

    /// Artwork URL for the active zone, scaled to the display.
    pub fn artwork_url(&self, width: u32, height: u32, clip_radius: Option<u32>) -> Option<String> {
        let (base, zone_id) = self.state.read(|s| (s.bridge_base(), s.active_zone()));
        let url = BridgeUrls::new(&base?).artwork(&zone_id?, width, height, clip_radius);
        match url {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                log::warn!("[SyncEngine] {}", e);
                None
            }
        }
    }
}
