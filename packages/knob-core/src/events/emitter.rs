//! Event emitter abstraction for decoupling the engine from the UI transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than the concrete
//! queue, which keeps them testable and lets hosts add their own sinks.

use super::{InputFeedback, PowerEvent, StatusEvent, SyncEvent, ZoneEvent};

/// Trait for emitting UI events without knowledge of transport.
pub trait EventEmitter: Send + Sync {
    /// Emits a poll-cycle result.
    fn emit_sync(&self, event: SyncEvent);

    /// Emits a status banner or message.
    fn emit_status(&self, event: StatusEvent);

    /// Emits a zone label or directory update.
    fn emit_zone(&self, event: ZoneEvent);

    /// Emits optimistic input feedback.
    fn emit_input(&self, event: InputFeedback);

    /// Emits a power state change.
    fn emit_power(&self, event: PowerEvent);

    /// Shorthand for a transient status message.
    fn message(&self, text: &str) {
        self.emit_status(StatusEvent::Message {
            text: text.to_string(),
        });
    }
}

/// No-op emitter for tests and hosts without a UI.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_sync(&self, _event: SyncEvent) {}

    fn emit_status(&self, _event: StatusEvent) {}

    fn emit_zone(&self, _event: ZoneEvent) {}

    fn emit_input(&self, _event: InputFeedback) {}

    fn emit_power(&self, _event: PowerEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_sync(&self, event: SyncEvent) {
        tracing::debug!(?event, "sync_event");
    }

    fn emit_status(&self, event: StatusEvent) {
        tracing::debug!(?event, "status_event");
    }

    fn emit_zone(&self, event: ZoneEvent) {
        tracing::debug!(?event, "zone_event");
    }

    fn emit_input(&self, event: InputFeedback) {
        tracing::debug!(?event, "input_event");
    }

    fn emit_power(&self, event: PowerEvent) {
        tracing::debug!(?event, "power_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Test emitter that counts events.
    #[derive(Default)]
    struct CountingEventEmitter {
        status_count: AtomicUsize,
        input_count: AtomicUsize,
    }

    impl EventEmitter for CountingEventEmitter {
        fn emit_sync(&self, _event: SyncEvent) {}

        fn emit_status(&self, _event: StatusEvent) {
            self.status_count.fetch_add(1, Ordering::SeqCst);
        }

        fn emit_zone(&self, _event: ZoneEvent) {}

        fn emit_input(&self, _event: InputFeedback) {
            self.input_count.fetch_add(1, Ordering::SeqCst);
        }

        fn emit_power(&self, _event: PowerEvent) {}
    }

    #[test]
    fn message_shorthand_emits_status() {
        let emitter = Arc::new(CountingEventEmitter::default());
        let dyn_emitter: Arc<dyn EventEmitter> = emitter.clone();

        dyn_emitter.message("Loading zone...");
        dyn_emitter.emit_input(InputFeedback::Volume {
            value: -10.0,
            step: 1.0,
        });

        assert_eq!(emitter.status_count.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.input_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn noop_and_logging_emitters_accept_events() {
        let emitters: [Arc<dyn EventEmitter>; 2] =
            [Arc::new(NoopEventEmitter), Arc::new(LoggingEventEmitter)];
        for emitter in emitters {
            emitter.message("Bridge: Connected");
            emitter.emit_power(PowerEvent::Charging {
                charging: true,
                battery_level: Some(80),
            });
        }
    }
}
