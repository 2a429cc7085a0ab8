//! Event sink: where status events and decoded messages go.

use crate::domain::models::LinkEvent;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Receiver of link events. Delivery is synchronous and unthrottled, so
/// implementations must not block.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: LinkEvent);
}

impl EventSink for mpsc::UnboundedSender<LinkEvent> {
    fn deliver(&self, event: LinkEvent) {
        let _ = self.send(event);
    }
}

/// Single replaceable listener slot shared by every task of one manager.
///
/// An event goes to whichever sink is registered when it is delivered.
#[derive(Clone, Default)]
pub struct EventSinkSlot {
    current: Arc<RwLock<Option<Arc<dyn EventSink>>>>,
}

impl EventSinkSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `sink`, replacing any previous listener.
    pub fn register(&self, sink: Arc<dyn EventSink>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
        debug!("Event sink replaced");
    }

    pub fn clear(&self) {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn emit(&self, event: LinkEvent) {
        match &event {
            LinkEvent::Message(message) => debug!("Received: {}", message),
            other => info!("Status update: {}", other),
        }

        // Clone out so the sink runs without the slot lock held.
        let sink = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match sink {
            Some(sink) => sink.deliver(event),
            None => debug!("No event sink registered, dropping {}", event.category()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_go_to_current_sink() {
        let slot = EventSinkSlot::new();
        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel();

        slot.emit(LinkEvent::NotConnected);

        slot.register(Arc::new(first_tx));
        slot.emit(LinkEvent::ReadyForCommands);

        slot.register(Arc::new(second_tx));
        slot.emit(LinkEvent::Message("OK".into()));

        assert_eq!(first_rx.try_recv().unwrap(), LinkEvent::ReadyForCommands);
        assert!(first_rx.try_recv().is_err());
        assert_eq!(second_rx.try_recv().unwrap(), LinkEvent::Message("OK".into()));
    }

    #[test]
    fn test_clones_share_the_slot() {
        let slot = EventSinkSlot::new();
        let clone = slot.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        slot.register(Arc::new(tx));

        clone.emit(LinkEvent::PermissionDenied);
        assert_eq!(rx.try_recv().unwrap(), LinkEvent::PermissionDenied);

        slot.clear();
        clone.emit(LinkEvent::NotConnected);
        assert!(rx.try_recv().is_err());
    }
}
