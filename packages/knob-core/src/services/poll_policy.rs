//! Poll interval selection.
//!
//! Conditions are checked in priority order and the first match decides:
//! unreachable bridge, asleep with a stopped zone, asleep while playing,
//! charging, on battery.

use std::time::Duration;

use crate::platform::PowerStatus;
use crate::state::{BridgeConfig, EngineConfig};

/// Inputs to the interval decision, copied out of shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollConditions {
    pub bridge_unreachable: bool,
    pub display_sleeping: bool,
    pub zone_playing: bool,
    pub charging: bool,
}

impl PollConditions {
    pub fn new(bridge_unreachable: bool, zone_playing: bool, power: PowerStatus) -> Self {
        Self {
            bridge_unreachable,
            display_sleeping: power.display_sleeping,
            zone_playing,
            charging: power.charging,
        }
    }
}

/// Fixed intervals for each condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub unreachable: Duration,
    pub sleeping_stopped: Duration,
    pub sleeping: Duration,
    pub charging: Duration,
    pub battery: Duration,
}

impl PollIntervals {
    /// Builds intervals from the engine config.
    ///
    /// A persisted `sleep_poll_stopped_secs` display preference overrides
    /// the configured sleeping-stopped interval.
    pub fn from_config(engine: &EngineConfig, bridge: &BridgeConfig) -> Self {
        let sleeping_stopped = bridge
            .sleep_poll_stopped_secs
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_millis(engine.poll_sleeping_stopped_ms));
        Self {
            unreachable: Duration::from_millis(engine.poll_unreachable_ms),
            sleeping_stopped,
            sleeping: Duration::from_millis(engine.poll_sleeping_ms),
            charging: Duration::from_millis(engine.poll_charging_ms),
            battery: Duration::from_millis(engine.poll_battery_ms),
        }
    }

    pub fn select(&self, conditions: &PollConditions) -> Duration {
        if conditions.bridge_unreachable {
            self.unreachable
        } else if conditions.display_sleeping && !conditions.zone_playing {
            self.sleeping_stopped
        } else if conditions.display_sleeping {
            self.sleeping
        } else if conditions.charging {
            self.charging
        } else {
            self.battery
        }
    }
}
