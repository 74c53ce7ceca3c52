// src/telegram.rs
//! Telegram Bot API client: message delivery plus the long-poll update
//! stream consumed by the command front-end.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::model::ChatId;

#[derive(Debug, Error)]
pub enum SendError {
    /// The chat rejected the bot (blocked, kicked, deactivated).
    /// Kept distinct for a future auto-unsubscribe; the dispatcher
    /// currently treats it like any other failure and retries.
    #[error("destination {0} no longer reachable: {1}")]
    Gone(ChatId, String),
    /// Network trouble, timeout, rate limit. Retried next cycle.
    #[error("transient send failure to {0}: {1}")]
    Transient(ChatId, String),
}

/// Delivery seam between the dispatcher and Telegram.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, chat: ChatId, text: &str) -> Result<(), SendError>;
}

pub struct TelegramClient {
    token: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl TelegramClient {
    pub fn new(token: String) -> Self {
        Self {
            token,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.token, method)
    }

    /// Long-poll for updates after `offset`. `timeout_secs` is the
    /// server-side hold; the request timeout is padded past it.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> anyhow::Result<Vec<Update>> {
        let mut body = serde_json::json!({ "timeout": timeout_secs });
        if let Some(off) = offset {
            body["offset"] = off.into();
        }
        let resp: ApiResponse<Vec<Update>> = self
            .client
            .post(self.method_url("getUpdates"))
            .timeout(Duration::from_secs(timeout_secs + 10))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        resp.into_result()
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send(&self, chat: ChatId, text: &str) -> Result<(), SendError> {
        let body = serde_json::json!({ "chat_id": chat.0, "text": text });

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(self.method_url("sendMessage"))
                .timeout(self.timeout)
                .json(&body)
                .send()
                .await;

            match res {
                Ok(rsp) if rsp.status() == reqwest::StatusCode::FORBIDDEN => {
                    let detail = rsp.text().await.unwrap_or_default();
                    return Err(SendError::Gone(chat, detail));
                }
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1)))
                                .await;
                            continue;
                        }
                        return Err(SendError::Transient(chat, e.to_string()));
                    }
                },
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(SendError::Transient(chat, e.to_string()));
                }
            }
        }
    }
}

// --- Bot API wire types (the subset the command layer reads) ---

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> anyhow::Result<T> {
        if self.ok {
            self.result
                .ok_or_else(|| anyhow::anyhow!("telegram: ok response without result"))
        } else {
            anyhow::bail!(
                "telegram: {}",
                self.description.unwrap_or_else(|| "unknown error".into())
            )
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub text: Option<String>,
    pub chat: Chat,
    pub from: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub title: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub username: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_response_surfaces_description() {
        let raw = r#"{"ok": false, "description": "Unauthorized"}"#;
        let resp: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        let err = resp.into_result().unwrap_err();
        assert!(err.to_string().contains("Unauthorized"));
    }

    #[test]
    fn update_payload_parses() {
        let raw = r#"{"ok": true, "result": [{"update_id": 7,
            "message": {"text": "/start", "chat": {"id": -1001, "title": "news"},
                        "from": {"username": "alice"}}}]}"#;
        let resp: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        let updates = resp.into_result().unwrap();
        assert_eq!(updates[0].update_id, 7);
        let msg = updates[0].message.as_ref().unwrap();
        assert_eq!(msg.text.as_deref(), Some("/start"));
        assert_eq!(msg.chat.id, -1001);
    }
}
