//! Outbound notifications for UIs and other plugins.

use mmu_shared::MmuState;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MmuEvent {
    /// Full snapshot after a visible change (or an explicit refresh).
    MmuChanged(MmuState),
    ShowPrompt { session: Uuid, timeout_secs: u64 },
    ClosePrompt { session: Uuid },
}

/// Publishes [`MmuEvent`]s to a single subscriber.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: UnboundedSender<MmuEvent>,
}

impl EventDispatcher {
    pub fn new() -> (Self, UnboundedReceiver<MmuEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn publish(&self, event: MmuEvent) {
        tracing::debug!("Publishing {:?}", event);
        if self.sender.send(event).is_err() {
            tracing::debug!("No subscriber for MMU events");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmu_shared::{MmuStatus, Slot};

    #[test]
    fn test_event_json_shape() {
        let mut state = MmuState::new();
        state.state = MmuStatus::Loaded;
        state.tool = Slot::new(1);
        let json = serde_json::to_value(MmuEvent::MmuChanged(state)).unwrap();
        assert_eq!(json["action"], "mmu_changed");
        assert_eq!(json["state"], "LOADED");
        assert_eq!(json["tool"], 1);

        let session = Uuid::nil();
        let json = serde_json::to_value(MmuEvent::ShowPrompt { session, timeout_secs: 30 }).unwrap();
        assert_eq!(json["action"], "show_prompt");
        assert_eq!(json["timeout_secs"], 30);
    }

    #[test]
    fn test_publish_without_subscriber_is_harmless() {
        let (dispatcher, receiver) = EventDispatcher::new();
        drop(receiver);
        dispatcher.publish(MmuEvent::ClosePrompt { session: Uuid::nil() });
    }

    #[tokio::test]
    async fn test_publish_delivers_in_order() {
        let (dispatcher, mut receiver) = EventDispatcher::new();
        dispatcher.publish(MmuEvent::ShowPrompt { session: Uuid::nil(), timeout_secs: 5 });
        dispatcher.publish(MmuEvent::ClosePrompt { session: Uuid::nil() });
        assert!(matches!(receiver.recv().await, Some(MmuEvent::ShowPrompt { .. })));
        assert!(matches!(receiver.recv().await, Some(MmuEvent::ClosePrompt { .. })));
    }
}
