//! Bridge implementation that maps engine events onto the UI queue.
//!
//! The [`ChannelEventBridge`] lives at the boundary between the poll task and
//! the UI task. The queue is unbounded and has exactly one consumer, so
//! emitting never blocks the engine.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use super::emitter::EventEmitter;
use super::{InputFeedback, PowerEvent, StatusEvent, SyncEvent, UiEvent, ZoneEvent};

/// Bridges engine events to the UI task's queue.
///
/// Also forwards to an optional external emitter (platform logging, a debug
/// overlay) that can be set after construction.
#[derive(Clone)]
pub struct ChannelEventBridge {
    tx: mpsc::UnboundedSender<UiEvent>,
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl ChannelEventBridge {
    /// Creates the bridge and the receiving end the UI task drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::with_sender(tx), rx)
    }

    /// Creates a bridge wrapping an existing sender.
    pub fn with_sender(tx: mpsc::UnboundedSender<UiEvent>) -> Self {
        Self {
            tx,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets an external emitter that sees every event before the queue does.
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }
}

/// Generates an [`EventEmitter`] method that forwards to the external emitter
/// (if set) and then sends to the UI queue.
macro_rules! impl_emit {
    ($method:ident, $event_ty:ty, $variant:ident) => {
        fn $method(&self, event: $event_ty) {
            if let Some(ref emitter) = *self.external_emitter.read() {
                emitter.$method(event.clone());
            }
            if self.tx.send(UiEvent::$variant(event)).is_err() {
                log::trace!("[EventBridge] UI queue closed, dropping event");
            }
        }
    };
}

impl EventEmitter for ChannelEventBridge {
    impl_emit!(emit_sync, SyncEvent, Sync);
    impl_emit!(emit_status, StatusEvent, Status);
    impl_emit!(emit_zone, ZoneEvent, Zone);
    impl_emit!(emit_input, InputFeedback, Input);
    impl_emit!(emit_power, PowerEvent, Power);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LoggingEventEmitter;

    #[test]
    fn events_arrive_in_order() {
        let (bridge, mut rx) = ChannelEventBridge::new();
        bridge.set_external_emitter(Arc::new(LoggingEventEmitter));

        bridge.message("Reconnecting...");
        bridge.emit_sync(SyncEvent::Online { online: true });

        match rx.try_recv().unwrap() {
            UiEvent::Status(StatusEvent::Message { text }) => assert_eq!(text, "Reconnecting..."),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            UiEvent::Sync(SyncEvent::Online { online: true })
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_queue_does_not_panic() {
        let (bridge, rx) = ChannelEventBridge::new();
        drop(rx);
        bridge.message("nobody listening");
    }

    #[test]
    fn events_serialize_with_category_tags() {
        let event = UiEvent::from(ZoneEvent::Name {
            name: "Kitchen".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["category"], "zone");
        assert_eq!(json["type"], "name");
        assert_eq!(json["name"], "Kitchen");
    }
}
