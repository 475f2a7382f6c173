//! Turns user input into bridge commands.
//!
//! Volume is optimistic: the prediction is rendered first, then sent as a
//! fire-and-forget fast-path command with a JSON fallback. Everything else
//! is a single JSON control request. Input handlers never wait on the poll
//! task; they write under the state lock and ask for an immediate poll.

use std::sync::Arc;

use serde_json::Value;

use crate::bridge::BridgeClient;
use crate::events::{EventEmitter, InputFeedback, SyncEvent, ZoneEvent};
use crate::platform::ConfigStore;
use crate::state::{ConfigError, ConfigResult, SharedState};
use crate::wire::{ActionRef, ControlRequest};

// ─────────────────────────────────────────────────────────────────────────────
// Actions & Inputs
// ─────────────────────────────────────────────────────────────────────────────

/// A command the user can trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    PlayPause,
    Play,
    Pause,
    Next,
    Prev,
    VolumeUp,
    VolumeDown,
    /// A bridge-defined action, sent verbatim.
    Named {
        name: String,
        params: Option<Value>,
    },
}

impl Action {
    /// Maps an action name from a manifest or a host to an action.
    pub fn from_name(name: &str, params: Option<Value>) -> Self {
        match name {
            "play_pause" | "toggle" => Self::PlayPause,
            "play" => Self::Play,
            "pause" => Self::Pause,
            "next" | "next_track" => Self::Next,
            "prev" | "previous" | "prev_track" => Self::Prev,
            "vol_up" | "volume_up" => Self::VolumeUp,
            "vol_down" | "volume_down" => Self::VolumeDown,
            _ => Self::Named {
                name: name.to_string(),
                params,
            },
        }
    }

    /// The `action` field of the control request.
    pub fn control_name(&self) -> &str {
        match self {
            Self::PlayPause => "play_pause",
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Next => "next",
            Self::Prev => "prev",
            Self::VolumeUp => "vol_up",
            Self::VolumeDown => "vol_down",
            Self::Named { name, .. } => name,
        }
    }

    fn params(&self) -> Option<Value> {
        match self {
            Self::Named { params, .. } => params.clone(),
            _ => None,
        }
    }

    /// Volume actions go through the optimistic path as a single tick.
    fn volume_ticks(&self) -> Option<i32> {
        match self {
            Self::VolumeUp => Some(1),
            Self::VolumeDown => Some(-1),
            _ => None,
        }
    }

    fn failure_message(&self) -> String {
        match self {
            Self::PlayPause => "Play/pause failed".to_string(),
            Self::Play => "Play failed".to_string(),
            Self::Pause => "Pause failed".to_string(),
            Self::Next => "Next track failed".to_string(),
            Self::Prev => "Previous track failed".to_string(),
            Self::VolumeUp | Self::VolumeDown => "Volume change failed".to_string(),
            Self::Named { name, .. } => format!("{} failed", name),
        }
    }
}

impl From<&ActionRef> for Action {
    fn from(action: &ActionRef) -> Self {
        Self::from_name(&action.action, action.params.clone())
    }
}

/// Raw input from the rotary encoder and touch surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// A burst of rotary ticks, positive clockwise.
    Rotate(i32),
    Press,
    LongPress,
    DoubleTap,
    SwipeLeft,
    SwipeRight,
}

impl InputEvent {
    /// Key of this input in a manifest's `interactions` map.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rotate(_) => "rotate",
            Self::Press => "press",
            Self::LongPress => "long_press",
            Self::DoubleTap => "double_tap",
            Self::SwipeLeft => "swipe_left",
            Self::SwipeRight => "swipe_right",
        }
    }

    /// Built-in behaviour when the manifest maps nothing. Rotation is volume.
    fn default_action(&self) -> Option<Action> {
        match self {
            Self::Press => Some(Action::PlayPause),
            Self::SwipeLeft => Some(Action::Next),
            Self::SwipeRight => Some(Action::Prev),
            Self::Rotate(_) | Self::LongPress | Self::DoubleTap => None,
        }
    }
}

/// How an input was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not sent: the device is not operational or nothing is mapped.
    Ignored,
    /// Sent as a fast-path datagram.
    SentFast,
    /// Sent as a JSON control request.
    SentJson,
    /// Every transport failed; the user was told.
    Failed,
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────────────────────────────────────

pub struct InputDispatcher {
    state: Arc<SharedState>,
    client: Arc<dyn BridgeClient>,
    store: Arc<dyn ConfigStore>,
    emitter: Arc<dyn EventEmitter>,
}

impl InputDispatcher {
    pub fn new(
        state: Arc<SharedState>,
        client: Arc<dyn BridgeClient>,
        store: Arc<dyn ConfigStore>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            state,
            client,
            store,
            emitter,
        }
    }

    /// Bridge and zone, or `None` (after telling the user) while the device
    /// is not operational.
    fn target(&self) -> Option<(String, String)> {
        let target = self.state.read(|s| {
            if !s.device_state.is_operational() {
                return None;
            }
            Some((s.bridge_base()?, s.active_zone()?))
        });
        if target.is_none() {
            self.emitter.message("Connecting...");
        }
        target
    }

    /// Resolves an input through the current screen's encoder map, then the
    /// manifest's interactions, then the built-in defaults.
    pub async fn handle_input(&self, input: InputEvent) -> DispatchOutcome {
        match self.resolve(input) {
            Some(action) => self.handle_action(action).await,
            None => match input {
                InputEvent::Rotate(ticks) => self.handle_volume_delta(ticks).await,
                _ => DispatchOutcome::Ignored,
            },
        }
    }

    fn resolve(&self, input: InputEvent) -> Option<Action> {
        let mapped = self.state.read(|s| {
            let manifest = s.cache.manifest()?;
            let encoder = s
                .cache
                .current_screen_id()
                .and_then(|id| manifest.screen(id))
                .and_then(|screen| screen.encoder.as_ref());
            let from_encoder = encoder.and_then(|encoder| match input {
                InputEvent::Rotate(ticks) if ticks > 0 => encoder.cw.as_ref(),
                InputEvent::Rotate(ticks) if ticks < 0 => encoder.ccw.as_ref(),
                InputEvent::Press => encoder.press.as_ref(),
                InputEvent::LongPress => encoder.long_press.as_ref(),
                _ => None,
            });
            from_encoder.map(Action::from).or_else(|| {
                manifest
                    .interaction_for(input.name())
                    .map(|name| Action::from_name(name, None))
            })
        });
        mapped.or_else(|| input.default_action())
    }

    /// Applies a burst of rotary ticks to the predicted volume and sends it.
    pub async fn handle_volume_delta(&self, ticks: i32) -> DispatchOutcome {
        if ticks == 0 {
            return DispatchOutcome::Ignored;
        }
        let Some((base, zone_id)) = self.target() else {
            return DispatchOutcome::Ignored;
        };
        let predicted = self.state.update(|s| {
            s.volume
                .is_known()
                .then(|| (s.volume.apply_ticks(ticks), s.volume.step()))
        });
        let Some((value, step)) = predicted else {
            log::debug!("[InputDispatcher] No volume state yet, ignoring {} ticks", ticks);
            return DispatchOutcome::Ignored;
        };

        self.emitter
            .emit_input(InputFeedback::Volume { value, step });

        match self.client.send_volume(&base, &zone_id, value).await {
            Ok(()) => return DispatchOutcome::SentFast,
            Err(e) => log::debug!("[InputDispatcher] Fast volume send failed: {}", e),
        }

        let request = ControlRequest::volume_absolute(zone_id, value);
        match self.client.post_control(&base, &request).await {
            Ok(()) => DispatchOutcome::SentJson,
            Err(e) => {
                log::warn!("[InputDispatcher] Volume change failed: {}", e);
                self.emitter.message("Volume change failed");
                DispatchOutcome::Failed
            }
        }
    }

    /// Sends an action as one JSON control request.
    pub async fn handle_action(&self, action: Action) -> DispatchOutcome {
        if let Some(ticks) = action.volume_ticks() {
            return self.handle_volume_delta(ticks).await;
        }
        let Some((base, zone_id)) = self.target() else {
            return DispatchOutcome::Ignored;
        };

        let request = ControlRequest::new(zone_id, action.control_name()).with_params(action.params());
        match self.client.post_control(&base, &request).await {
            Ok(()) => {
                log::debug!("[InputDispatcher] Sent '{}'", request.action);
                self.state.request_poll();
                DispatchOutcome::SentJson
            }
            Err(e) => {
                log::warn!("[InputDispatcher] '{}' failed: {}", request.action, e);
                self.emitter.message(&action.failure_message());
                DispatchOutcome::Failed
            }
        }
    }

    /// Switches the active zone to one listed by the bridge.
    pub fn select_zone(&self, zone_id: &str) -> ConfigResult<()> {
        let (snapshot, label, device_change) = self.state.update(|s| {
            let zone = s
                .zones
                .find(zone_id)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownZone(zone_id.to_string()))?;
            if s.zones.selected_id() != Some(zone.zone_id.as_str()) {
                s.cache.clear();
            }
            s.zones.select(&zone);
            s.config.zone_id = Some(zone.zone_id.clone());
            s.zone_resolved = true;
            let device_change = s.advance(|d| d.on_bridge_reachable(true));
            Ok::<_, ConfigError>((s.config.clone(), zone.zone_name, device_change))
        })?;

        log::info!("[InputDispatcher] Zone switched to '{}' ({})", label, zone_id);
        if let Err(e) = self.store.save(&snapshot) {
            log::error!("[InputDispatcher] Failed to persist zone: {}", e);
        }
        self.emitter.emit_zone(ZoneEvent::Name { name: label });
        if let Some(state) = device_change {
            self.emitter.emit_sync(SyncEvent::DeviceState { state });
        }
        self.emitter.message("Loading zone...");
        self.state.request_poll();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::UiEvent;
    use crate::services::test_support::{messages, zone_names, Harness, MockBridge};
    use crate::state::DeviceState;
    use crate::wire::FastState;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    async fn operational() -> Harness {
        let mut h = Harness::online(MockBridge::healthy());
        h.engine.poll_once().await;
        assert_eq!(h.engine.device_state(), DeviceState::Operational);
        h.drain();
        h
    }

    fn volume_feedback(events: &[UiEvent]) -> Vec<f32> {
        events
            .iter()
            .filter_map(|event| match event {
                UiEvent::Input(InputFeedback::Volume { value, .. }) => Some(*value),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn action_names_round_trip() {
        for name in ["play_pause", "play", "pause", "next", "prev"] {
            assert_eq!(Action::from_name(name, None).control_name(), name);
        }
        assert_eq!(Action::from_name("toggle", None), Action::PlayPause);
        assert_eq!(
            Action::from_name("shuffle", Some(json!({"on": true}))),
            Action::Named {
                name: "shuffle".into(),
                params: Some(json!({"on": true}))
            }
        );
    }

    #[tokio::test]
    async fn input_before_operational_is_ignored() {
        let mut h = Harness::online(MockBridge::healthy());

        assert_eq!(
            h.dispatcher.handle_volume_delta(2).await,
            DispatchOutcome::Ignored
        );
        assert_eq!(
            h.dispatcher.handle_action(Action::Next).await,
            DispatchOutcome::Ignored
        );
        assert_eq!(MockBridge::count(&h.bridge.volume_calls), 0);
        assert_eq!(MockBridge::count(&h.bridge.control_calls), 0);
        assert_eq!(messages(&h.drain()), vec!["Connecting...", "Connecting..."]);
    }

    #[tokio::test]
    async fn burst_of_three_ticks_is_predicted_and_sent_fast() {
        let mut h = operational().await;
        h.state.update(|s| {
            s.volume.reconcile(&FastState {
                volume: -10.0,
                volume_min: -64.0,
                volume_max: 0.0,
                volume_step: 1.0,
                ..FastState::default()
            })
        });

        let outcome = h.dispatcher.handle_volume_delta(3).await;

        assert_eq!(outcome, DispatchOutcome::SentFast);
        assert_eq!(
            *h.bridge.last_volume.lock(),
            Some(("zone-1".to_string(), -5.0))
        );
        assert_eq!(volume_feedback(&h.drain()), vec![-5.0]);
        assert_eq!(MockBridge::count(&h.bridge.control_calls), 0);
    }

    #[tokio::test]
    async fn volume_is_clamped_at_maximum() {
        let h = operational().await;
        // fixture volume -20, range -64..0
        for _ in 0..10 {
            h.dispatcher.handle_volume_delta(3).await;
        }
        assert_eq!(h.state.read(|s| s.volume.value()), 0.0);
    }

    #[tokio::test]
    async fn failed_fast_send_falls_back_to_json() {
        let h = operational().await;
        h.bridge.volume_fails.store(true, Ordering::SeqCst);

        let outcome = h.dispatcher.handle_volume_delta(-1).await;

        assert_eq!(outcome, DispatchOutcome::SentJson);
        let request = h.bridge.last_control.lock().clone().unwrap();
        assert_eq!(request, ControlRequest::volume_absolute("zone-1", -21.0));
    }

    #[tokio::test]
    async fn both_transports_failing_tells_the_user() {
        let mut h = operational().await;
        h.bridge.volume_fails.store(true, Ordering::SeqCst);
        h.bridge.control_fails.store(true, Ordering::SeqCst);

        assert_eq!(
            h.dispatcher.handle_volume_delta(1).await,
            DispatchOutcome::Failed
        );
        let events = h.drain();
        // the prediction is still shown
        assert_eq!(volume_feedback(&events), vec![-19.0]);
        assert_eq!(messages(&events), vec!["Volume change failed"]);
    }

    #[tokio::test]
    async fn volume_actions_use_the_optimistic_path() {
        let h = operational().await;
        assert_eq!(
            h.dispatcher.handle_action(Action::VolumeUp).await,
            DispatchOutcome::SentFast
        );
        assert_eq!(h.state.read(|s| s.volume.value()), -19.0);
    }

    #[tokio::test]
    async fn transport_action_is_one_control_request() {
        let h = operational().await;

        let outcome = h.dispatcher.handle_action(Action::PlayPause).await;

        assert_eq!(outcome, DispatchOutcome::SentJson);
        assert_eq!(
            h.bridge.last_control.lock().clone(),
            Some(ControlRequest::new("zone-1", "play_pause"))
        );
    }

    #[tokio::test]
    async fn rejected_action_reports_failure() {
        let mut h = operational().await;
        *h.bridge.control_error.lock() = Some("zone offline".into());

        assert_eq!(
            h.dispatcher.handle_action(Action::Prev).await,
            DispatchOutcome::Failed
        );
        assert_eq!(messages(&h.drain()), vec!["Previous track failed"]);
    }

    #[tokio::test]
    async fn inputs_resolve_through_manifest() {
        let h = operational().await;

        // "now" has no encoder map and no "press" interaction
        h.dispatcher.handle_input(InputEvent::Press).await;
        assert_eq!(
            h.bridge.last_control.lock().as_ref().map(|r| r.action.clone()),
            Some("play_pause".to_string())
        );

        h.dispatcher.handle_input(InputEvent::LongPress).await;
        assert_eq!(
            h.bridge.last_control.lock().as_ref().map(|r| r.action.clone()),
            Some("zone_picker".to_string())
        );

        // the queue card maps the encoder to scrolling
        h.state.update(|s| s.cache.step_screen(-1));
        assert_eq!(h.state.read(|s| s.cache.current_screen_id().map(str::to_string)), Some("queue".into()));
        let outcome = h.dispatcher.handle_input(InputEvent::Rotate(2)).await;
        assert_eq!(outcome, DispatchOutcome::SentJson);
        assert_eq!(
            h.bridge.last_control.lock().as_ref().map(|r| r.action.clone()),
            Some("scroll_down".to_string())
        );
        assert_eq!(MockBridge::count(&h.bridge.volume_calls), 0);
    }

    #[tokio::test]
    async fn rotation_defaults_to_volume() {
        let h = operational().await;
        assert_eq!(
            h.dispatcher.handle_input(InputEvent::Rotate(-2)).await,
            DispatchOutcome::SentFast
        );
        assert_eq!(h.state.read(|s| s.volume.value()), -23.0);
        assert_eq!(
            h.dispatcher.handle_input(InputEvent::DoubleTap).await,
            DispatchOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn select_zone_persists_and_reloads() {
        let mut h = operational().await;

        let err = h.dispatcher.select_zone("nowhere").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownZone(_)));

        h.dispatcher.select_zone("zone-2").unwrap();
        assert_eq!(
            h.store.current().unwrap().zone_id.as_deref(),
            Some("zone-2")
        );
        assert!(h.state.read(|s| s.cache.manifest().is_none()));
        let events = h.drain();
        assert_eq!(zone_names(&events), vec!["Den"]);
        assert_eq!(messages(&events), vec!["Loading zone..."]);

        // the next poll fetches the new zone's manifest in full
        let calls = MockBridge::count(&h.bridge.manifest_calls);
        h.engine.poll_once().await;
        assert_eq!(MockBridge::count(&h.bridge.manifest_calls), calls + 1);
        assert_eq!(h.engine.zones().1.as_deref(), Some("zone-2"));
    }
}
