//! Telegram channel implementation.
//!
//! Talks to the Bot API directly over HTTPS: `getUpdates` long-polling for
//! inbound messages, `sendMessage`/`sendPhoto` for replies. The bot token
//! comes from config.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use doodlebot_core::types::{InboundMessage, OutboundMessage, SendResult, Sender};

use crate::{Channel, ChannelHandle, ChannelMeta, ChannelStatus, InboundReceiver};

const API_BASE: &str = "https://api.telegram.org";

/// Bot API response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    from: Option<TgUser>,
    chat: TgChat,
    date: i64,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
    first_name: Option<String>,
    last_name: Option<String>,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgMe {
    id: i64,
    username: Option<String>,
    first_name: Option<String>,
}

pub struct TelegramChannel {
    bot_token: String,
    allowed_users: Vec<String>,
    poll_timeout_secs: u64,
    client: reqwest::Client,
}

fn api_url(token: &str, method: &str) -> String {
    format!("{API_BASE}/bot{token}/{method}")
}

/// Empty allow-list admits everyone; otherwise the numeric user id or the
/// username (with or without a leading `@`) must match.
fn sender_allowed(allowed: &[String], sender: &Sender) -> bool {
    if allowed.is_empty() {
        return true;
    }
    allowed.iter().any(|entry| {
        let entry = entry.trim_start_matches('@');
        entry == sender.id
            || sender
                .username
                .as_deref()
                .is_some_and(|u| u.eq_ignore_ascii_case(entry))
    })
}

fn to_inbound(msg: TgMessage) -> InboundMessage {
    let sender = match msg.from {
        Some(user) => {
            let display_name = match (&user.first_name, &user.last_name) {
                (Some(first), Some(last)) => Some(format!("{first} {last}")),
                (Some(first), None) => Some(first.clone()),
                _ => None,
            };
            Sender {
                id: user.id.to_string(),
                display_name,
                username: user.username,
            }
        }
        None => Sender {
            id: String::new(),
            display_name: None,
            username: None,
        },
    };

    InboundMessage {
        chat_id: msg.chat.id.to_string(),
        sender,
        text: msg.text,
        timestamp: DateTime::<Utc>::from_timestamp(msg.date, 0).unwrap_or_else(Utc::now),
    }
}

impl TelegramChannel {
    pub fn new(bot_token: String, allowed_users: Vec<String>, poll_timeout_secs: u64) -> Self {
        Self {
            bot_token,
            allowed_users,
            poll_timeout_secs,
            client: reqwest::Client::new(),
        }
    }

    async fn get_me(&self) -> anyhow::Result<TgMe> {
        let resp: ApiResponse<TgMe> = self
            .client
            .get(api_url(&self.bot_token, "getMe"))
            .send()
            .await?
            .json()
            .await?;
        match resp.result {
            Some(me) if resp.ok => Ok(me),
            _ => anyhow::bail!(
                "getMe failed: {}",
                resp.description.unwrap_or_else(|| "unknown error".into())
            ),
        }
    }
}

async fn poll_updates(
    client: &reqwest::Client,
    token: &str,
    offset: i64,
    timeout_secs: u64,
) -> anyhow::Result<Vec<Update>> {
    let resp: ApiResponse<Vec<Update>> = client
        .get(api_url(token, "getUpdates"))
        .query(&[("offset", offset), ("timeout", timeout_secs as i64)])
        // The request itself must outlive the server-side long-poll window
        .timeout(Duration::from_secs(timeout_secs + 10))
        .send()
        .await?
        .json()
        .await?;

    if !resp.ok {
        anyhow::bail!(
            "getUpdates failed: {}",
            resp.description.unwrap_or_else(|| "unknown error".into())
        );
    }
    Ok(resp.result.unwrap_or_default())
}

#[async_trait]
impl Channel for TelegramChannel {
    fn id(&self) -> &str {
        "telegram"
    }

    fn meta(&self) -> ChannelMeta {
        ChannelMeta {
            label: "Telegram".into(),
            description: "Telegram bot via the Bot API".into(),
            docs_url: Some("https://core.telegram.org/bots/api".into()),
        }
    }

    async fn start(&self) -> anyhow::Result<(InboundReceiver, ChannelHandle)> {
        let me = self.get_me().await?;
        info!(
            bot_id = me.id,
            username = me.username.as_deref().unwrap_or("?"),
            "Telegram bot authenticated"
        );

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<InboundMessage>();
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();

        let client = self.client.clone();
        let token = self.bot_token.clone();
        let allowed = self.allowed_users.clone();
        let timeout_secs = self.poll_timeout_secs;

        tokio::spawn(async move {
            let mut offset: i64 = 0;
            loop {
                let batch = tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("Telegram channel stopped");
                        break;
                    }
                    result = poll_updates(&client, &token, offset, timeout_secs) => result,
                };

                let updates = match batch {
                    Ok(updates) => updates,
                    Err(e) => {
                        warn!(error = %e, "getUpdates failed, retrying");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                };

                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    let Some(msg) = update.message else { continue };
                    let inbound = to_inbound(msg);
                    if !sender_allowed(&allowed, &inbound.sender) {
                        debug!(sender = %inbound.sender.id, "dropping message from disallowed sender");
                        continue;
                    }
                    if inbound_tx.send(inbound).is_err() {
                        // Receiver dropped, nothing left to deliver to
                        return;
                    }
                }
            }
        });

        Ok((inbound_rx, ChannelHandle::new(shutdown_tx)))
    }

    async fn send(&self, chat_id: &str, message: OutboundMessage) -> anyhow::Result<SendResult> {
        let resp = if let Some(photo) = message.photo {
            let mut form = reqwest::multipart::Form::new()
                .text("chat_id", chat_id.to_string())
                .part(
                    "photo",
                    reqwest::multipart::Part::bytes(photo)
                        .file_name("canvas.jpg")
                        .mime_str("image/jpeg")?,
                );
            if let Some(caption) = message.text {
                form = form.text("caption", caption);
            }
            self.client
                .post(api_url(&self.bot_token, "sendPhoto"))
                .multipart(form)
                .send()
                .await
        } else {
            let text = message.text.unwrap_or_default();
            if text.is_empty() {
                return Ok(SendResult {
                    message_id: None,
                    success: true,
                    error: None,
                });
            }
            self.client
                .post(api_url(&self.bot_token, "sendMessage"))
                .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
                .send()
                .await
        };

        match resp {
            Ok(r) => {
                let api: ApiResponse<TgMessage> = r.json().await?;
                if api.ok {
                    Ok(SendResult {
                        message_id: api.result.map(|m| m.message_id.to_string()),
                        success: true,
                        error: None,
                    })
                } else {
                    let desc = api.description.unwrap_or_else(|| "unknown error".into());
                    error!(chat_id, error = %desc, "Telegram send failed");
                    Ok(SendResult {
                        message_id: None,
                        success: false,
                        error: Some(desc),
                    })
                }
            }
            Err(e) => Ok(SendResult {
                message_id: None,
                success: false,
                error: Some(e.to_string()),
            }),
        }
    }

    async fn set_typing(&self, chat_id: &str) -> anyhow::Result<()> {
        self.client
            .post(api_url(&self.bot_token, "sendChatAction"))
            .json(&serde_json::json!({ "chat_id": chat_id, "action": "upload_photo" }))
            .send()
            .await?;
        Ok(())
    }

    async fn status(&self) -> ChannelStatus {
        match self.get_me().await {
            Ok(me) => ChannelStatus {
                connected: true,
                account_id: Some(me.id.to_string()),
                display_name: me.first_name.or(me.username),
                error: None,
            },
            Err(e) => ChannelStatus {
                connected: false,
                account_id: None,
                display_name: None,
                error: Some(e.to_string()),
            },
        }
    }
}
