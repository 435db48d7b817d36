//! Minimal Telegram Bot API binding: long-polled updates in, plain text out.

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{ChatId, Inbound};
use crate::notifier::Notifier;

const API_BASE: &str = "https://api.telegram.org";
const POLL_TIMEOUT_SECS: u64 = 60;
const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("HTTP error calling {method}: {source}")]
    Http { method: &'static str, source: reqwest::Error },
    #[error("{method} rejected: {description}")]
    Api { method: &'static str, description: String },
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BotUser {
    pub id: i64,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: ChatId,
}

#[derive(Serialize)]
struct GetUpdates {
    offset: i64,
    timeout: u64,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: ChatId,
    text: &'a str,
}

pub struct TelegramBot {
    http_client: reqwest::Client,
    base_url: String,
}

impl TelegramBot {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_base_url(API_BASE, token)
    }

    pub fn with_base_url(api_base: &str, token: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 15))
            .build()?;
        Ok(Self {
            http_client,
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        })
    }

    async fn call<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: &'static str,
        body: &B,
    ) -> Result<T, TelegramError> {
        let url = format!("{}/{}", self.base_url, method);
        let response: ApiResponse<T> = self
            .http_client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|source| TelegramError::Http { method, source: source.without_url() })?
            .json()
            .await
            .map_err(|source| TelegramError::Http { method, source: source.without_url() })?;
        match response {
            ApiResponse { ok: true, result: Some(result), .. } => Ok(result),
            ApiResponse { description, .. } => Err(TelegramError::Api {
                method,
                description: description.unwrap_or_else(|| "no description".into()),
            }),
        }
    }

    pub async fn get_me(&self) -> Result<BotUser, TelegramError> {
        self.call("getMe", &serde_json::json!({})).await
    }

    /// Long-polls for messages until cancelled. Errors are logged and retried.
    pub async fn poll(&self, tx: mpsc::Sender<Inbound>, cancel: CancellationToken) {
        let mut offset = 0;
        info!("Listening for Telegram updates");
        loop {
            let request = GetUpdates { offset, timeout: POLL_TIMEOUT_SECS };
            let updates: Vec<Update> = tokio::select! {
                _ = cancel.cancelled() => break,
                res = self.call("getUpdates", &request) => match res {
                    Ok(updates) => updates,
                    Err(e) => {
                        warn!("Polling failed: {}", e);
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(RETRY_DELAY) => continue,
                        }
                    }
                },
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(Message { chat, text: Some(text) }) = update.message else {
                    debug!("Skipping non-text update {}", update.update_id);
                    continue;
                };
                if tx.send(Inbound { chat_id: chat.id, text }).await.is_err() {
                    info!("Update receiver closed, stopping poll");
                    return;
                }
            }
        }
        info!("Telegram polling stopped");
    }
}

#[async_trait]
impl Notifier for TelegramBot {
    async fn send(&self, chat_id: ChatId, text: &str) -> Result<()> {
        let _: serde_json::Value = self.call("sendMessage", &SendMessage { chat_id, text }).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_decode_with_and_without_text() {
        let raw = r#"{"ok":true,"result":[
            {"update_id":10,"message":{"message_id":1,"chat":{"id":-100,"type":"group"},"text":"/status"}},
            {"update_id":11,"message":{"message_id":2,"chat":{"id":7,"type":"private"},"sticker":{}}},
            {"update_id":12,"edited_message":{"message_id":3}}
        ]}"#;

        let response: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        let updates = response.result.unwrap();

        assert_eq!(updates.len(), 3);
        let first = updates[0].message.as_ref().unwrap();
        assert_eq!(first.chat.id, -100);
        assert_eq!(first.text.as_deref(), Some("/status"));
        assert!(updates[1].message.as_ref().unwrap().text.is_none());
        assert!(updates[2].message.is_none());
    }

    #[test]
    fn api_errors_carry_the_description() {
        let raw = r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#;
        let response: ApiResponse<BotUser> = serde_json::from_str(raw).unwrap();
        assert!(!response.ok);
        assert_eq!(response.description.as_deref(), Some("Unauthorized"));
    }

    #[tokio::test]
    async fn transport_errors_do_not_reveal_the_token() {
        let bot = TelegramBot::with_base_url("http://127.0.0.1:1", "123456:SECRET-TOKEN").unwrap();

        let err = bot.get_me().await.unwrap_err();

        let text = format!("{} {:?}", err, err);
        assert!(matches!(err, TelegramError::Http { method: "getMe", .. }));
        assert!(!text.contains("SECRET-TOKEN"), "token leaked: {}", text);
    }

    #[test]
    fn base_url_embeds_the_token() {
        let bot = TelegramBot::with_base_url("http://localhost:8081/", "123:abc").unwrap();
        assert_eq!(bot.base_url, "http://localhost:8081/bot123:abc");
    }
}
