use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Telegram chat identifier of a subscriber.
pub type ChatId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Online,
    Offline,
}

impl Status {
    pub fn message(self) -> &'static str {
        match self {
            Status::Online => "Client is online.",
            Status::Offline => "Client is offline.",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Online => write!(f, "online"),
            Status::Offline => write!(f, "offline"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub reachable: bool,
    pub timestamp: DateTime<Local>,
}

impl Verdict {
    pub fn now(reachable: bool) -> Self {
        Self { reachable, timestamp: Local::now() }
    }

    pub fn status(&self) -> Status {
        if self.reachable { Status::Online } else { Status::Offline }
    }
}

/// Result of asking for a status check through the cooldown gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CheckOutcome {
    Probed(Verdict),
    Cooldown { wait_seconds: u64 },
}

impl CheckOutcome {
    #[cfg(test)]
    pub fn is_allowed(&self) -> bool {
        matches!(self, CheckOutcome::Probed(_))
    }

    pub fn reply(&self) -> String {
        match self {
            CheckOutcome::Probed(verdict) => verdict.status().message().to_string(),
            CheckOutcome::Cooldown { wait_seconds } => {
                format!("Please wait {} seconds before the next check.", wait_seconds)
            }
        }
    }
}

/// A text message received from a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub chat_id: ChatId,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub target_address: String,
    pub auto_probe_enabled: bool,
    pub subscribers: usize,
    pub scheduler_ticks: u64,
    pub scheduler_broadcasts: u64,
    pub last_verdict: Option<Verdict>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_reply_names_the_wait() {
        let outcome = CheckOutcome::Cooldown { wait_seconds: 5 };
        assert!(!outcome.is_allowed());
        assert_eq!(outcome.reply(), "Please wait 5 seconds before the next check.");
    }

    #[test]
    fn verdict_maps_to_canonical_status() {
        assert_eq!(Verdict::now(true).status(), Status::Online);
        assert_eq!(Verdict::now(false).status().to_string(), "offline");
        assert_eq!(CheckOutcome::Probed(Verdict::now(false)).reply(), "Client is offline.");
    }
}
