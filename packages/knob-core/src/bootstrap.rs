//! Engine bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where the
//! engine's services are instantiated and wired together. Hosts hand in
//! their platform collaborators (config storage, power monitor, IP detector)
//! and get back running services plus the receiving end of the UI queue.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use crate::bridge::{BridgeClient, BridgeClientImpl, BridgeDiscovery, NetworkDiscovery};
use crate::context::{IpDetector, LocalIpDetector};
use crate::error::KnobResult;
use crate::events::{ChannelEventBridge, EventEmitter, UiEvent};
use crate::platform::{ConfigStore, ManualPowerMonitor, MemoryConfigStore, PowerMonitor};
use crate::runtime::PollTask;
use crate::services::{BridgeLocator, InputDispatcher, SyncEngine};
use crate::state::{BridgeConfig, ConfigError, EngineConfig, KnobState, SharedState};
use crate::utils::sanitize_bridge_base;

/// How long [`KnobServices::stop`] waits for the poll in flight.
const POLL_STOP_GRACE: Duration = Duration::from_secs(2);

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct KnobServices {
    /// State shared by the poll task and input handlers.
    pub state: Arc<SharedState>,
    /// The poll loop.
    pub engine: Arc<SyncEngine>,
    /// Turns user input into bridge commands.
    pub dispatcher: Arc<InputDispatcher>,
    /// Event bridge feeding the UI queue and an optional external emitter.
    pub event_bridge: Arc<ChannelEventBridge>,
    /// Where the bridge configuration is persisted.
    pub store: Arc<dyn ConfigStore>,
    /// Engine tunables, after validation.
    pub engine_config: Arc<EngineConfig>,
    ip_detector: Arc<dyn IpDetector>,
    poll_task: Arc<Mutex<Option<PollTask>>>,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl KnobServices {
    /// Returns a builder with production defaults for every collaborator.
    pub fn builder(engine_config: EngineConfig) -> KnobServicesBuilder {
        KnobServicesBuilder::new(engine_config)
    }

    /// Spawns the poll loop. Does nothing while a loop is already running.
    pub fn start(&self) {
        let mut slot = self.poll_task.lock();
        if slot.as_ref().is_some_and(PollTask::is_running) {
            log::warn!("[Bootstrap] Poll loop already running");
            return;
        }
        *slot = Some(Arc::clone(&self.engine).start());
    }

    /// Reports that the network interface is up.
    ///
    /// Refreshes the device address shown in recovery instructions before
    /// waking the engine.
    pub fn network_up(&self) {
        let ip = match self.ip_detector.detect() {
            Ok(ip) => Some(ip),
            Err(e) => {
                log::warn!("[Bootstrap] {}", e);
                None
            }
        };
        self.engine.set_device_ip(ip);
        self.engine.set_network_ready(true);
    }

    pub fn network_down(&self) {
        self.engine.set_network_ready(false);
    }

    /// Signals the poll loop to stop without waiting for it.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] Shutting down");
        self.cancel_token.cancel();
    }

    /// Stops the poll loop and waits for it to exit.
    ///
    /// Returns `false` if the loop had to be aborted.
    pub async fn stop(&self) -> bool {
        self.shutdown();
        let task = self.poll_task.lock().take();
        match task {
            Some(task) => task.stop(POLL_STOP_GRACE).await,
            None => true,
        }
    }
}

/// Builder for [`KnobServices`].
pub struct KnobServicesBuilder {
    engine_config: EngineConfig,
    store: Option<Arc<dyn ConfigStore>>,
    power: Option<Arc<dyn PowerMonitor>>,
    ip_detector: Option<Arc<dyn IpDetector>>,
    client: Option<Arc<dyn BridgeClient>>,
    discovery: Option<Arc<dyn BridgeDiscovery>>,
    bridge_base: Option<String>,
    zone_id: Option<String>,
}

impl KnobServicesBuilder {
    pub fn new(engine_config: EngineConfig) -> Self {
        Self {
            engine_config,
            store: None,
            power: None,
            ip_detector: None,
            client: None,
            discovery: None,
            bridge_base: None,
            zone_id: None,
        }
    }

    /// Sets the config store. Defaults to an in-memory store.
    pub fn store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the power monitor. Defaults to "charging, display on".
    pub fn power(mut self, power: Arc<dyn PowerMonitor>) -> Self {
        self.power = Some(power);
        self
    }

    pub fn ip_detector(mut self, detector: Arc<dyn IpDetector>) -> Self {
        self.ip_detector = Some(detector);
        self
    }

    /// Replaces the UDP/HTTP transport.
    pub fn client(mut self, client: Arc<dyn BridgeClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Replaces broadcast and mDNS discovery.
    pub fn discovery(mut self, discovery: Arc<dyn BridgeDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Configures the bridge address manually, overriding the stored one.
    pub fn bridge_base(mut self, base: impl Into<String>) -> Self {
        self.bridge_base = Some(base.into());
        self
    }

    /// Selects a zone, overriding the stored one.
    pub fn zone(mut self, zone_id: impl Into<String>) -> Self {
        self.zone_id = Some(zone_id.into());
        self
    }

    /// Wires every service together.
    ///
    /// The wiring order matters:
    /// 1. Shared infrastructure (UI queue, cancellation token)
    /// 2. Bridge config (stored record plus overrides) and shared state
    /// 3. Transports (HTTP client, fast path, discovery)
    /// 4. Locator, engine and dispatcher
    ///
    /// # Errors
    ///
    /// Returns an error if the engine config is invalid, a bridge override
    /// is not a usable address, or the HTTP client cannot be built.
    pub fn build(self) -> KnobResult<(KnobServices, UnboundedReceiver<UiEvent>)> {
        self.engine_config.validate().map_err(ConfigError::Invalid)?;
        let engine_config = Arc::new(self.engine_config);

        let cancel_token = CancellationToken::new();
        let (event_bridge, ui_rx) = ChannelEventBridge::new();
        let event_bridge = Arc::new(event_bridge);
        let emitter = Arc::clone(&event_bridge) as Arc<dyn EventEmitter>;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryConfigStore::default()));
        let power = self
            .power
            .unwrap_or_else(|| Arc::new(ManualPowerMonitor::default()));
        let ip_detector = self.ip_detector.unwrap_or_else(LocalIpDetector::arc);

        let config = initial_config(store.as_ref(), self.bridge_base, self.zone_id)?;
        let state = Arc::new(SharedState::new(KnobState::new(config, &engine_config)));

        let client = match self.client {
            Some(client) => client,
            None => {
                let http = BridgeClientImpl::http_client(engine_config.http_timeout())?;
                Arc::new(BridgeClientImpl::new(
                    http,
                    engine_config.fast_path_timeout(),
                ))
            }
        };
        let discovery = self
            .discovery
            .unwrap_or_else(|| Arc::new(NetworkDiscovery::new()));

        let locator = Arc::new(BridgeLocator::new(
            Arc::clone(&state),
            discovery,
            Arc::clone(&store),
            Arc::clone(&emitter),
            Arc::clone(&engine_config),
        ));

        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&state),
            Arc::clone(&client),
            locator,
            Arc::clone(&store),
            power,
            Arc::clone(&emitter),
            Arc::clone(&engine_config),
            cancel_token.clone(),
        ));

        let dispatcher = Arc::new(InputDispatcher::new(
            Arc::clone(&state),
            client,
            Arc::clone(&store),
            emitter,
        ));

        let services = KnobServices {
            state,
            engine,
            dispatcher,
            event_bridge,
            store,
            engine_config,
            ip_detector,
            poll_task: Arc::new(Mutex::new(None)),
            cancel_token,
        };
        Ok((services, ui_rx))
    }
}

/// Loads the stored record and applies host overrides, persisting the result
/// when an override changed it.
fn initial_config(
    store: &dyn ConfigStore,
    bridge_base: Option<String>,
    zone_id: Option<String>,
) -> KnobResult<BridgeConfig> {
    let stored = match store.load() {
        Ok(stored) => stored.unwrap_or_default(),
        Err(e) => {
            log::warn!("[Bootstrap] Ignoring unreadable bridge config: {}", e);
            BridgeConfig::default()
        }
    };

    let mut config = stored.clone();
    if let Some(raw) = bridge_base {
        let base = sanitize_bridge_base(&raw)
            .ok_or_else(|| ConfigError::Invalid(format!("bridge address '{}' has no host", raw)))?;
        config.set_bridge(base, false);
    }
    if let Some(zone_id) = zone_id.filter(|z| !z.is_empty()) {
        config.zone_id = Some(zone_id);
    }

    if config != stored {
        store.save(&config)?;
    }
    log::info!(
        "[Bootstrap] Bridge {:?} ({}), zone {:?}",
        config.bridge_base,
        if config.bridge_from_discovery {
            "discovered"
        } else {
            "manual"
        },
        config.zone_id
    );
    Ok(config)
}
