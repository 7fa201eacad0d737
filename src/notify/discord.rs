// src/notify/discord.rs
//! Discord REST sink: posts embeds to one channel as a bot user.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::embed::{self, MessagePayload};
use super::NotificationSink;
use crate::error::SinkError;
use crate::types::NormalizedPost;

pub const DISCORD_API: &str = "https://discord.com/api/v10";

// GUILD_TEXT, GUILD_ANNOUNCEMENT and thread channels accept messages.
const TEXT_CHANNEL_TYPES: [u8; 5] = [0, 5, 10, 11, 12];

#[derive(Clone)]
pub struct DiscordNotifier {
    api_base: String,
    token: String,
    channel_id: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

#[derive(Deserialize)]
struct BotUser {
    username: String,
    #[serde(default)]
    discriminator: Option<String>,
}

#[derive(Deserialize)]
struct Channel {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    guild_id: Option<String>,
}

#[derive(Deserialize)]
struct RateLimited {
    retry_after: f64,
}

impl DiscordNotifier {
    pub fn new(token: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            api_base: DISCORD_API.to_string(),
            token: token.into(),
            channel_id: channel_id.into(),
            client: Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    /// Point at a different API root (tests use a local fake).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    /// Verify the token and that the channel is a text channel in `guild_id`.
    pub async fn connect(self, guild_id: &str) -> Result<Self, SinkError> {
        let me: BotUser = self.get_json("/users/@me").await?;
        let tag = match me.discriminator.as_deref() {
            Some(d) if d != "0" => format!("{}#{}", me.username, d),
            _ => me.username.clone(),
        };
        tracing::info!(bot = %tag, "logged in to discord");

        let path = format!("/channels/{}", self.channel_id);
        let ch: Channel = match self.get_json(&path).await {
            Ok(ch) => ch,
            Err(SinkError::Status { status: 404, .. }) => {
                return Err(SinkError::BadChannel(self.channel_id.clone()))
            }
            Err(e) => return Err(e),
        };
        if !TEXT_CHANNEL_TYPES.contains(&ch.kind) {
            return Err(SinkError::BadChannel(self.channel_id.clone()));
        }
        if ch.guild_id.as_deref() != Some(guild_id) {
            return Err(SinkError::WrongGuild {
                channel: self.channel_id.clone(),
                expected: guild_id.to_string(),
                actual: ch.guild_id,
            });
        }
        Ok(self)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, SinkError> {
        let rsp = self
            .client
            .get(format!("{}{}", self.api_base, path))
            .header("Authorization", format!("Bot {}", self.token))
            .timeout(self.timeout)
            .send()
            .await?;
        let status = rsp.status();
        if !status.is_success() {
            let body = rsp.text().await.unwrap_or_default();
            return Err(SinkError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(rsp.json::<T>().await?)
    }

    /// POST one message, retrying transient failures with exponential backoff.
    /// A 429 waits for the advertised `retry_after` instead.
    pub async fn send_message<P: Serialize + Sync>(&self, payload: &P) -> Result<(), SinkError> {
        let url = format!("{}/channels/{}/messages", self.api_base, self.channel_id);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&url)
                .header("Authorization", format!("Bot {}", self.token))
                .timeout(self.timeout)
                .json(payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) if rsp.status().is_success() => return Ok(()),
                Ok(rsp) if rsp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let body = rsp.text().await.unwrap_or_default();
                    let wait = serde_json::from_str::<RateLimited>(&body)
                        .map(|r| Duration::from_secs_f64(r.retry_after.clamp(0.0, 60.0)))
                        .unwrap_or_else(|_| backoff(attempt));
                    if attempt < self.max_retries {
                        tracing::debug!(?wait, "discord rate limited");
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    SinkError::Status { status: 429, body }
                }
                Ok(rsp) => {
                    let status = rsp.status();
                    let body = rsp.text().await.unwrap_or_default();
                    // 4xx other than 429 will not succeed on retry.
                    if status.is_client_error() {
                        return Err(SinkError::Status {
                            status: status.as_u16(),
                            body,
                        });
                    }
                    SinkError::Status {
                        status: status.as_u16(),
                        body,
                    }
                }
                Err(e) => SinkError::Http(e),
            };

            if attempt < self.max_retries {
                tokio::time::sleep(backoff(attempt)).await;
                continue;
            }
            return Err(err);
        }
    }
}

fn backoff(attempt: u8) -> Duration {
    Duration::from_millis(500u64 << (attempt.saturating_sub(1)).min(6))
}

#[async_trait::async_trait]
impl NotificationSink for DiscordNotifier {
    async fn deliver_post(&self, post: &NormalizedPost) -> Result<(), SinkError> {
        let payload = MessagePayload::embeds(vec![embed::post_embed(post)]);
        self.send_message(&payload).await
    }

    async fn deliver_extra_media(&self, post: &NormalizedPost) -> Result<(), SinkError> {
        for payload in embed::extra_media_payloads(post) {
            self.send_message(&payload).await?;
        }
        Ok(())
    }

    async fn send_alert(&self, title: &str, body: &str) -> Result<(), SinkError> {
        let payload = MessagePayload::embeds(vec![embed::alert_embed(title, body)]);
        self.send_message(&payload).await
    }

    async fn close(&self) {
        tracing::info!(channel = %self.channel_id, "discord sink closed");
    }
}
