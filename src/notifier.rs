use anyhow::Result;
use async_trait::async_trait;

use crate::models::ChatId;

/// Outbound side of the chat transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, chat_id: ChatId, text: &str) -> Result<()>;
}
