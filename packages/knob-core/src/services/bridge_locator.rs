//! Resolves a usable bridge base address.
//!
//! Order of preference: the persisted address, UDP broadcast discovery,
//! mDNS discovery, then the configured fallback. Discovered addresses are
//! persisted so later boots skip discovery; the fallback never is.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::bridge::{BridgeDiscovery, DiscoveryMethod};
use crate::events::EventEmitter;
use crate::platform::ConfigStore;
use crate::state::{EngineConfig, SharedState};
use crate::utils::sanitize_bridge_base;

/// Result of one locator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocateOutcome {
    /// The stored address stays in use; no discovery traffic or nothing better found.
    Existing(String),
    /// Discovery found a bridge and the address was persisted.
    Discovered {
        base: String,
        method: DiscoveryMethod,
    },
    /// Discovery failed and the unpersisted fallback is in use.
    Fallback(String),
    /// Discovery failed and there is no fallback.
    NotFound { failures: u8 },
}

impl LocateOutcome {
    /// The bridge address in use after this run.
    pub fn base(&self) -> Option<&str> {
        match self {
            Self::Existing(base) | Self::Fallback(base) => Some(base),
            Self::Discovered { base, .. } => Some(base),
            Self::NotFound { .. } => None,
        }
    }
}

/// What the locator reads from shared state before deciding.
struct Snapshot {
    current: Option<String>,
    from_discovery: bool,
    is_fallback: bool,
    failing: bool,
    periodic_due: bool,
}

pub struct BridgeLocator {
    state: Arc<SharedState>,
    discovery: Arc<dyn BridgeDiscovery>,
    store: Arc<dyn ConfigStore>,
    emitter: Arc<dyn EventEmitter>,
    config: Arc<EngineConfig>,
}

impl BridgeLocator {
    pub fn new(
        state: Arc<SharedState>,
        discovery: Arc<dyn BridgeDiscovery>,
        store: Arc<dyn ConfigStore>,
        emitter: Arc<dyn EventEmitter>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            state,
            discovery,
            store,
            emitter,
            config,
        }
    }

    /// Whether the locator should run this cycle.
    ///
    /// Runs every cycle until the bridge has answered, then at most once per
    /// rediscovery interval. A network change clears the last check time,
    /// which forces the next cycle to run.
    pub fn is_due(&self, now: Instant) -> bool {
        let interval = self.config.rediscovery_interval();
        self.state.read(|s| {
            !s.bridge_verified
                || s
                    .last_discovery_check
                    .map_or(true, |last| now.saturating_duration_since(last) >= interval)
        })
    }

    /// Runs [`locate`](Self::locate) if it is due. Returns `None` otherwise.
    pub async fn locate_if_due(&self) -> Option<LocateOutcome> {
        let now = Instant::now();
        if !self.is_due(now) {
            return None;
        }
        let outcome = self.locate(now).await;
        self.state.update(|s| s.last_discovery_check = Some(now));
        Some(outcome)
    }

    /// Resolves the bridge address, running discovery when needed.
    pub async fn locate(&self, now: Instant) -> LocateOutcome {
        let snapshot = self.snapshot(now);

        if let Some(current) = &snapshot.current {
            // A failing auto-discovered address is re-checked on the periodic
            // refresh; the fallback is always retried against real discovery.
            let refresh = snapshot.periodic_due && snapshot.from_discovery && snapshot.failing;
            if !snapshot.is_fallback && !refresh {
                return LocateOutcome::Existing(current.clone());
            }
            log::info!(
                "[BridgeLocator] Re-running discovery (current {}{})",
                current,
                if snapshot.is_fallback { ", fallback" } else { ", failing" }
            );
        }

        if let Some((base, method)) = self.discover().await {
            self.adopt(&base);
            return LocateOutcome::Discovered { base, method };
        }

        if let Some(current) = snapshot.current {
            return if snapshot.is_fallback {
                LocateOutcome::Fallback(current)
            } else {
                LocateOutcome::Existing(current)
            };
        }

        match self.config.fallback_bridge_base.as_deref().and_then(sanitize_bridge_base) {
            Some(fallback) => {
                log::info!("[BridgeLocator] Discovery failed, using fallback: {}", fallback);
                self.state.update(|s| {
                    s.config.bridge_base = Some(fallback.clone());
                    s.config.bridge_from_discovery = false;
                    s.bridge_is_fallback = true;
                });
                LocateOutcome::Fallback(fallback)
            }
            None => {
                let (failures, threshold) = self.state.update(|s| {
                    let failures = s.failures.discovery.increment();
                    (failures, s.failures.discovery.threshold())
                });
                log::warn!(
                    "[BridgeLocator] Discovery failed ({}/{}) - configure the bridge in Settings",
                    failures,
                    threshold
                );
                LocateOutcome::NotFound { failures }
            }
        }
    }

    fn snapshot(&self, now: Instant) -> Snapshot {
        let interval = self.config.rediscovery_interval();
        self.state.read(|s| Snapshot {
            current: s.bridge_base(),
            from_discovery: s.config.bridge_from_discovery,
            is_fallback: s.bridge_is_fallback,
            failing: s.failures.bridge.count() > 0,
            periodic_due: s
                .last_discovery_check
                .is_some_and(|last| now.saturating_duration_since(last) >= interval),
        })
    }

    /// Tries broadcast, then mDNS.
    async fn discover(&self) -> Option<(String, DiscoveryMethod)> {
        let port = self.config.bridge_port;

        if self.config.broadcast_discovery {
            let wait = std::time::Duration::from_millis(self.config.broadcast_timeout_ms);
            match self.discovery.discover_broadcast(port, wait).await {
                Ok(Some(ip)) => {
                    let base = format!("http://{}", SocketAddr::new(ip, port));
                    log::info!("[BridgeLocator] UDP broadcast discovered bridge at {}", base);
                    return Some((base, DiscoveryMethod::Broadcast));
                }
                Ok(None) => log::debug!("[BridgeLocator] No broadcast reply"),
                Err(e) => log::warn!("[BridgeLocator] Broadcast discovery failed: {}", e),
            }
        }

        if self.config.mdns_discovery {
            let wait = std::time::Duration::from_millis(self.config.mdns_timeout_ms);
            match self.discovery.discover_mdns(wait).await {
                Ok(Some(raw)) => match sanitize_bridge_base(&raw) {
                    Some(base) => {
                        log::info!("[BridgeLocator] mDNS discovered bridge: {}", base);
                        return Some((base, DiscoveryMethod::Mdns));
                    }
                    None => log::warn!("[BridgeLocator] Ignoring mDNS address without host: {}", raw),
                },
                Ok(None) => log::debug!("[BridgeLocator] No mDNS record"),
                Err(e) => log::warn!("[BridgeLocator] mDNS discovery failed: {}", e),
            }
        }

        None
    }

    /// Stores a discovered address and persists it outside the lock.
    fn adopt(&self, base: &str) {
        let snapshot = self.state.update(|s| {
            let changed = s.bridge_base().as_deref() != Some(base);
            s.config.set_bridge(base.to_string(), true);
            s.bridge_is_fallback = false;
            s.failures.discovery.reset();
            if changed {
                // A different bridge has its own zones and failure history.
                s.failures.bridge.reset();
                s.bridge_verified = false;
                s.zone_resolved = false;
            }
            s.config.clone()
        });

        if let Err(e) = self.store.save(&snapshot) {
            log::error!("[BridgeLocator] Failed to persist bridge address: {}", e);
        }
        self.emitter.message("Bridge: Found");
    }
}
