use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashSet;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::models::{BroadcastReport, ChatId};
use crate::notifier::Notifier;

/// Every chat that has ever messaged the bot. Kept in memory only and never
/// pruned.
#[derive(Default)]
pub struct SubscriberRegistry {
    chats: RwLock<HashSet<ChatId>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the chat was not known before.
    pub async fn register(&self, chat_id: ChatId) -> bool {
        let added = self.chats.write().await.insert(chat_id);
        if added {
            info!("New subscriber: chat {}", chat_id);
        }
        added
    }

    pub async fn len(&self) -> usize {
        self.chats.read().await.len()
    }

    #[cfg(test)]
    pub async fn contains(&self, chat_id: ChatId) -> bool {
        self.chats.read().await.contains(&chat_id)
    }

    /// Sends `message` to every chat registered at call time. Sends run
    /// concurrently; a failed send is logged and does not stop the others.
    /// Chats registered while the sends are in flight are not included.
    pub async fn broadcast(&self, notifier: &dyn Notifier, message: &str) -> BroadcastReport {
        let recipients: Vec<ChatId> = self.chats.read().await.iter().copied().collect();
        let mut sends: FuturesUnordered<_> = recipients
            .into_iter()
            .map(|chat_id| async move { (chat_id, notifier.send(chat_id, message).await) })
            .collect();

        let mut report = BroadcastReport::default();
        while let Some((chat_id, result)) = sends.next().await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Broadcast to chat {} failed: {:#}", chat_id, e);
                    report.failed += 1;
                }
            }
        }
        debug!(delivered = report.delivered, failed = report.failed, "Broadcast finished");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::tests::RecordingNotifier;

    #[tokio::test]
    async fn registering_twice_keeps_one_entry() {
        let registry = SubscriberRegistry::new();

        assert!(registry.register(42).await);
        assert!(!registry.register(42).await);

        assert_eq!(registry.len().await, 1);
        assert!(registry.contains(42).await);
    }

    #[tokio::test]
    async fn broadcast_reaches_everyone_despite_a_failure() {
        let registry = SubscriberRegistry::new();
        for chat in [1, 2, 3] {
            registry.register(chat).await;
        }
        let notifier = RecordingNotifier::failing_for(&[2]);

        let report = registry.broadcast(&notifier, "Automatic status: Client is online.").await;

        assert_eq!(report, BroadcastReport { delivered: 2, failed: 1 });
        let mut reached: Vec<ChatId> = notifier.messages().into_iter().map(|(id, _)| id).collect();
        reached.sort_unstable();
        assert_eq!(reached, [1, 3]);
        assert_eq!(notifier.texts_for(3), ["Automatic status: Client is online."]);
    }

    #[tokio::test]
    async fn broadcast_to_nobody_is_empty() {
        let registry = SubscriberRegistry::new();
        let notifier = RecordingNotifier::default();

        assert_eq!(registry.broadcast(&notifier, "hello").await, BroadcastReport::default());
        assert!(notifier.messages().is_empty());
    }
}
