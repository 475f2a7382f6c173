//! Hand-written collaborators for service tests.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::bridge::{BridgeDiscovery, BridgeHttp, DiscoveryResult, FastPath, TransportError, TransportResult};
use crate::events::{ChannelEventBridge, EventEmitter, StatusEvent, UiEvent, ZoneEvent};
use crate::platform::{ConfigStore, ManualPowerMonitor, MemoryConfigStore, PowerMonitor};
use crate::services::bridge_locator::BridgeLocator;
use crate::services::bridge_status::BridgeStatus;
use crate::services::input_dispatcher::InputDispatcher;
use crate::services::sync_engine::SyncEngine;
use crate::state::{BridgeConfig, EngineConfig, KnobState, SharedState};
use crate::test_fixtures::{MANIFEST_FULL, ZONES_TWO};
use crate::wire::{ControlRequest, FastResponse, HashField, TransportFlags};

pub(crate) const TEST_BRIDGE: &str = "http://10.0.0.2:8088";

/// Engine config with discovery off and no fallback, so tests never touch
/// the network.
pub(crate) fn test_engine_config() -> EngineConfig {
    EngineConfig {
        broadcast_discovery: false,
        mdns_discovery: false,
        fallback_bridge_base: None,
        knob_id: Some("knob-test".to_string()),
        ..EngineConfig::default()
    }
}

pub(crate) fn manual_bridge(zone_id: Option<&str>) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.set_bridge(TEST_BRIDGE.to_string(), false);
    config.zone_id = zone_id.map(str::to_string);
    config
}

pub(crate) fn fast_reply(hash: &str, volume: f32) -> FastResponse {
    FastResponse {
        playing: true,
        transport: TransportFlags {
            play: false,
            pause: true,
            next: true,
            prev: true,
        },
        hash: HashField::truncating(hash).0,
        volume,
        volume_min: -64.0,
        volume_max: 0.0,
        volume_step: 1.0,
        seek_position: 10,
        length: 200,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bridge
// ─────────────────────────────────────────────────────────────────────────────

/// Scripted bridge. `None` replies fail: the fast path times out and HTTP
/// endpoints answer 503.
#[derive(Default)]
pub(crate) struct MockBridge {
    pub fast_reply: Mutex<Option<FastResponse>>,
    pub manifest_body: Mutex<Option<String>>,
    pub zones_body: Mutex<Option<String>>,
    /// Error text the control endpoint reports in its body.
    pub control_error: Mutex<Option<String>>,
    pub volume_fails: AtomicBool,
    pub control_fails: AtomicBool,

    pub fast_calls: AtomicUsize,
    pub manifest_calls: AtomicUsize,
    pub zones_calls: AtomicUsize,
    pub control_calls: AtomicUsize,
    pub volume_calls: AtomicUsize,

    pub last_manifest_sha: Mutex<Option<String>>,
    pub last_knob_id: Mutex<Option<String>>,
    pub last_control: Mutex<Option<ControlRequest>>,
    pub last_volume: Mutex<Option<(String, f32)>>,
}

impl MockBridge {
    /// Serves [`MANIFEST_FULL`] and [`ZONES_TWO`] over HTTP; no fast path.
    pub fn healthy() -> Self {
        let bridge = Self::default();
        bridge.set_manifest(Some(MANIFEST_FULL));
        bridge.set_zones(Some(ZONES_TWO));
        bridge
    }

    pub fn set_fast_reply(&self, reply: Option<FastResponse>) {
        *self.fast_reply.lock() = reply;
    }

    pub fn set_manifest(&self, body: Option<&str>) {
        *self.manifest_body.lock() = body.map(str::to_string);
    }

    pub fn set_zones(&self, body: Option<&str>) {
        *self.zones_body.lock() = body.map(str::to_string);
    }

    /// Takes every endpoint down.
    pub fn go_offline(&self) {
        self.set_fast_reply(None);
        self.set_manifest(None);
        self.set_zones(None);
        self.volume_fails.store(true, Ordering::SeqCst);
        self.control_fails.store(true, Ordering::SeqCst);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

fn body_or_unavailable(body: &Mutex<Option<String>>) -> TransportResult<Vec<u8>> {
    body.lock()
        .clone()
        .map(String::into_bytes)
        .ok_or(TransportError::HttpStatus(503))
}

#[async_trait]
impl FastPath for MockBridge {
    async fn poll_fast(
        &self,
        _base: &str,
        _last_hash: &str,
        _zone_id: &str,
    ) -> TransportResult<FastResponse> {
        self.fast_calls.fetch_add(1, Ordering::SeqCst);
        self.fast_reply.lock().clone().ok_or(TransportError::Timeout(500))
    }

    async fn send_volume(&self, _base: &str, zone_id: &str, value: f32) -> TransportResult<()> {
        self.volume_calls.fetch_add(1, Ordering::SeqCst);
        if self.volume_fails.load(Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::NetworkUnreachable,
                "network unreachable",
            )));
        }
        *self.last_volume.lock() = Some((zone_id.to_string(), value));
        Ok(())
    }
}

#[async_trait]
impl BridgeHttp for MockBridge {
    async fn fetch_manifest(
        &self,
        _base: &str,
        _zone_id: &str,
        sha: Option<&str>,
    ) -> TransportResult<Vec<u8>> {
        self.manifest_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_manifest_sha.lock() = sha.map(str::to_string);
        body_or_unavailable(&self.manifest_body)
    }

    async fn fetch_zones(&self, _base: &str, knob_id: Option<&str>) -> TransportResult<Vec<u8>> {
        self.zones_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_knob_id.lock() = knob_id.map(str::to_string);
        body_or_unavailable(&self.zones_body)
    }

    async fn post_control(&self, _base: &str, request: &ControlRequest) -> TransportResult<()> {
        self.control_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_control.lock() = Some(request.clone());
        if self.control_fails.load(Ordering::SeqCst) {
            return Err(TransportError::HttpStatus(503));
        }
        match self.control_error.lock().clone() {
            Some(message) => Err(TransportError::Rejected(message)),
            None => Ok(()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Discovery
// ─────────────────────────────────────────────────────────────────────────────

/// Discovery that answers with fixed results.
#[derive(Default)]
pub(crate) struct MockDiscovery {
    pub broadcast: Option<IpAddr>,
    pub mdns: Option<String>,
    pub broadcast_calls: AtomicUsize,
    pub mdns_calls: AtomicUsize,
}

#[async_trait]
impl BridgeDiscovery for MockDiscovery {
    async fn discover_broadcast(
        &self,
        _bridge_port: u16,
        _wait: Duration,
    ) -> DiscoveryResult<Option<IpAddr>> {
        self.broadcast_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.broadcast)
    }

    async fn discover_mdns(&self, _wait: Duration) -> DiscoveryResult<Option<String>> {
        self.mdns_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.mdns.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn drain(rx: &mut UnboundedReceiver<UiEvent>) -> Vec<UiEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Transient status messages, in order.
pub(crate) fn messages(events: &[UiEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            UiEvent::Status(StatusEvent::Message { text }) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

/// Network banner updates, in order. `None` entries are clears.
pub(crate) fn banners(events: &[UiEvent]) -> Vec<Option<BridgeStatus>> {
    events
        .iter()
        .filter_map(|event| match event {
            UiEvent::Status(StatusEvent::Network { status }) => Some(status.clone()),
            _ => None,
        })
        .collect()
}

pub(crate) fn zone_names(events: &[UiEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            UiEvent::Zone(ZoneEvent::Name { name }) => Some(name.clone()),
            _ => None,
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────────

/// Every service wired to mocks, sharing one state and one UI queue.
pub(crate) struct Harness {
    pub state: Arc<SharedState>,
    pub bridge: Arc<MockBridge>,
    pub discovery: Arc<MockDiscovery>,
    pub store: Arc<MemoryConfigStore>,
    pub power: Arc<ManualPowerMonitor>,
    pub engine: Arc<SyncEngine>,
    pub dispatcher: InputDispatcher,
    pub events: UnboundedReceiver<UiEvent>,
}

impl Harness {
    pub fn new(
        config: BridgeConfig,
        engine_config: EngineConfig,
        bridge: MockBridge,
        discovery: MockDiscovery,
    ) -> Self {
        let engine_config = Arc::new(engine_config);
        let state = Arc::new(SharedState::new(KnobState::new(
            config.clone(),
            &engine_config,
        )));
        let bridge = Arc::new(bridge);
        let discovery = Arc::new(discovery);
        let store = Arc::new(MemoryConfigStore::new(Some(config)));
        let power = Arc::new(ManualPowerMonitor::default());
        let (event_bridge, events) = ChannelEventBridge::new();
        let emitter: Arc<dyn EventEmitter> = Arc::new(event_bridge);

        let locator = Arc::new(BridgeLocator::new(
            Arc::clone(&state),
            discovery.clone() as Arc<dyn BridgeDiscovery>,
            store.clone() as Arc<dyn ConfigStore>,
            Arc::clone(&emitter),
            Arc::clone(&engine_config),
        ));
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&state),
            bridge.clone(),
            locator,
            store.clone() as Arc<dyn ConfigStore>,
            power.clone() as Arc<dyn PowerMonitor>,
            Arc::clone(&emitter),
            Arc::clone(&engine_config),
            tokio_util::sync::CancellationToken::new(),
        ));
        let dispatcher = InputDispatcher::new(
            Arc::clone(&state),
            bridge.clone(),
            store.clone() as Arc<dyn ConfigStore>,
            emitter,
        );

        Self {
            state,
            bridge,
            discovery,
            store,
            power,
            engine,
            dispatcher,
            events,
        }
    }

    /// A manually configured bridge, network up, events drained.
    pub fn online(bridge: MockBridge) -> Self {
        let mut harness = Self::new(
            manual_bridge(None),
            test_engine_config(),
            bridge,
            MockDiscovery::default(),
        );
        harness.engine.set_network_ready(true);
        harness.drain();
        harness
    }

    pub fn drain(&mut self) -> Vec<UiEvent> {
        drain(&mut self.events)
    }
}
