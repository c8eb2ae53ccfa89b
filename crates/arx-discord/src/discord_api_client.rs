//! Typed Discord REST client used by the ticket workflow.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::discord_http_helpers::{
    is_retryable_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error,
};

pub const GUILD_TEXT_CHANNEL_TYPE: u8 = 0;
pub const OVERWRITE_TYPE_ROLE: u8 = 0;
pub const OVERWRITE_TYPE_MEMBER: u8 = 1;
pub const PERMISSION_VIEW_CHANNEL: u64 = 1 << 10;
pub const PERMISSION_SEND_MESSAGES: u64 = 1 << 11;

#[derive(Debug, Clone)]
/// Construction parameters for [`DiscordApiClient`].
pub struct DiscordApiClientConfig {
    pub api_base: String,
    pub bot_token: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
/// Guild summary returned by the current-user guild listing.
pub struct DiscordGuild {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
/// Channel summary used by the duplicate guard and provisioner.
pub struct DiscordChannel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
/// Message author fields consumed by transcript rendering.
pub struct DiscordMessageAuthor {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
}

impl DiscordMessageAuthor {
    /// Display handle preferred for transcripts.
    pub fn display_name(&self) -> &str {
        self.global_name
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(self.username.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
/// Channel message as returned by the history endpoint.
pub struct DiscordMessage {
    pub id: String,
    #[serde(default)]
    pub content: String,
    pub author: DiscordMessageAuthor,
    #[serde(default)]
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
/// Permission overwrite entry attached at channel creation.
pub struct PermissionOverwrite {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deny: Option<String>,
}

impl PermissionOverwrite {
    pub fn deny_role(role_id: &str, deny_bits: u64) -> Self {
        Self {
            id: role_id.to_string(),
            kind: OVERWRITE_TYPE_ROLE,
            allow: None,
            deny: Some(deny_bits.to_string()),
        }
    }

    pub fn allow_role(role_id: &str, allow_bits: u64) -> Self {
        Self {
            id: role_id.to_string(),
            kind: OVERWRITE_TYPE_ROLE,
            allow: Some(allow_bits.to_string()),
            deny: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
/// Body for guild channel creation.
pub struct NewGuildChannel {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub parent_id: String,
    pub permission_overwrites: Vec<PermissionOverwrite>,
}

#[derive(Debug, Clone)]
/// One evidence file to attach to a posted message.
pub struct DiscordAttachmentUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
/// Thin client over the Discord REST endpoints the bridge needs.
pub struct DiscordApiClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl DiscordApiClient {
    pub fn new(config: DiscordApiClientConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("arx-ticket-bridge"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .context("failed to create discord api client")?;

        let api_base = config.api_base.trim().trim_end_matches('/').to_string();
        if api_base.is_empty() {
            bail!("discord api base cannot be empty");
        }
        let bot_token = config.bot_token.trim().to_string();
        if bot_token.is_empty() {
            bail!("discord bot token cannot be empty");
        }

        Ok(Self {
            http,
            api_base,
            bot_token,
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms.max(1),
        })
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.bot_token)
    }

    /// Lists the guilds the bot credential is a member of.
    pub async fn list_current_user_guilds(&self) -> Result<Vec<DiscordGuild>> {
        self.request_json("users/@me/guilds list", || {
            self.http
                .get(format!("{}/users/@me/guilds", self.api_base))
                .header("authorization", self.auth_header())
        })
        .await
    }

    /// Fetches the full channel list of a guild.
    pub async fn list_guild_channels(&self, guild_id: &str) -> Result<Vec<DiscordChannel>> {
        self.request_json("guild channels list", || {
            self.http
                .get(format!("{}/guilds/{guild_id}/channels", self.api_base))
                .header("authorization", self.auth_header())
        })
        .await
    }

    /// Creates a guild channel with its initial permission overwrites.
    pub async fn create_guild_channel(
        &self,
        guild_id: &str,
        new_channel: &NewGuildChannel,
    ) -> Result<DiscordChannel> {
        self.request_json("guild channel create", || {
            self.http
                .post(format!("{}/guilds/{guild_id}/channels", self.api_base))
                .header("authorization", self.auth_header())
                .json(new_channel)
        })
        .await
    }

    /// Upserts a member permission overwrite on an existing channel.
    pub async fn edit_member_permission_overwrite(
        &self,
        channel_id: &str,
        user_id: &str,
        allow_bits: u64,
    ) -> Result<()> {
        let payload = serde_json::json!({
            "type": OVERWRITE_TYPE_MEMBER,
            "allow": allow_bits.to_string(),
        });
        self.request_expect_success("channel permission overwrite", || {
            self.http
                .put(format!(
                    "{}/channels/{channel_id}/permissions/{user_id}",
                    self.api_base
                ))
                .header("authorization", self.auth_header())
                .json(&payload)
        })
        .await
    }

    /// Posts a message; attachments are sent as multipart file parts next to
    /// the `payload_json` part.
    pub async fn create_message(
        &self,
        channel_id: &str,
        payload_json: &Value,
        attachments: &[DiscordAttachmentUpload],
    ) -> Result<DiscordMessage> {
        let encoded_payload =
            serde_json::to_string(payload_json).context("encode discord message payload")?;
        self.request_json("channel message create", || {
            let mut form = reqwest::multipart::Form::new().part(
                "payload_json",
                reqwest::multipart::Part::text(encoded_payload.clone()),
            );
            for (index, attachment) in attachments.iter().enumerate() {
                form = form.part(
                    format!("files[{index}]"),
                    reqwest::multipart::Part::bytes(attachment.bytes.clone())
                        .file_name(attachment.filename.clone()),
                );
            }
            self.http
                .post(format!("{}/channels/{channel_id}/messages", self.api_base))
                .header("authorization", self.auth_header())
                .multipart(form)
        })
        .await
    }

    /// Fetches up to `limit` most recent messages, newest first.
    pub async fn fetch_channel_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<DiscordMessage>> {
        let limit = limit.clamp(1, 100).to_string();
        self.request_json("channel messages fetch", || {
            self.http
                .get(format!("{}/channels/{channel_id}/messages", self.api_base))
                .query(&[("limit", limit.as_str())])
                .header("authorization", self.auth_header())
        })
        .await
    }

    pub async fn delete_channel(&self, channel_id: &str) -> Result<()> {
        self.request_expect_success("channel delete", || {
            self.http
                .delete(format!("{}/channels/{channel_id}", self.api_base))
                .header("authorization", self.auth_header())
        })
        .await
    }

    async fn request_json<T, F>(&self, operation: &str, builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let response = self.request_success_response(operation, builder).await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode discord {operation} response"))
    }

    async fn request_expect_success<F>(&self, operation: &str, builder: F) -> Result<()>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let _ = self.request_success_response(operation, builder).await?;
        Ok(())
    }

    async fn request_success_response<F>(
        &self,
        operation: &str,
        mut builder: F,
    ) -> Result<reqwest::Response>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = builder().send().await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts && is_retryable_status(status.as_u16()) {
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }

                    bail!(
                        "discord api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 800)
                    );
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("discord api {operation} request failed"));
                }
            }
        }
    }
}

impl std::fmt::Debug for DiscordApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordApiClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}
