use tracing::{debug, warn};

use crate::engine::Monitor;
use crate::models::{ChatId, Inbound};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Status,
    EnableAutoProbe,
    DisableAutoProbe,
}

impl Command {
    /// Case-insensitive. Accepts `status`, `/status` and `/status@some_bot`.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.trim().to_lowercase();
        let word = word.strip_prefix('/').unwrap_or(&word);
        let word = word.split_once('@').map_or(word, |(name, _)| name);
        match word {
            "status" => Some(Command::Status),
            "enable_autoping" => Some(Command::EnableAutoProbe),
            "disable_autoping" => Some(Command::DisableAutoProbe),
            _ => None,
        }
    }
}

impl Monitor {
    /// Registers the sender, then answers a recognized command with exactly
    /// one reply. Returns the reply text, `None` for unrecognized input.
    pub async fn handle(&self, inbound: Inbound) -> Option<String> {
        self.subscribers().register(inbound.chat_id).await;
        let Some(command) = Command::parse(&inbound.text) else {
            debug!("Ignoring message from chat {}", inbound.chat_id);
            return None;
        };
        Some(self.handle_command(inbound.chat_id, command).await)
    }

    pub async fn handle_command(&self, chat_id: ChatId, command: Command) -> String {
        let reply = match command {
            Command::Status => self.check_status().await.reply(),
            Command::EnableAutoProbe => {
                self.settings().set_auto_probe(true);
                "Automatic ping enabled.".to_string()
            }
            Command::DisableAutoProbe => {
                self.settings().set_auto_probe(false);
                "Automatic ping disabled.".to_string()
            }
        };
        if let Err(e) = self.notifier().send(chat_id, &reply).await {
            warn!("Reply to chat {} failed: {:#}", chat_id, e);
        }
        reply
    }
}
