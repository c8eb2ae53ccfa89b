//! The submission workflow: Resolve → Guard → Provision → Publish.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{json, Value};
use thiserror::Error;

use arx_discord::{
    DiscordApiClient, DiscordAttachmentUpload, DiscordChannel, NewGuildChannel,
    PermissionOverwrite, GUILD_TEXT_CHANNEL_TYPE, PERMISSION_SEND_MESSAGES,
    PERMISSION_VIEW_CHANNEL,
};
use arx_identity::{resolve_roblox_identity, RobloxIdentity};

use crate::ticket_close::CLOSE_TICKET_CUSTOM_ID;
use crate::ticket_name::derive_ticket_name;

const REPORT_EMBED_COLOR: u32 = 0x00C4_1E3A;

// Snowflake ids are 17+ digits; anything shorter is not worth an API call.
const PLAUSIBLE_DISCORD_ID_MIN_CHARS: usize = 16;

#[derive(Debug, Clone)]
/// Workflow settings shared by submission and closure.
pub struct TicketWorkflowConfig {
    /// Target guild. When absent the workflow uses the first guild the bot
    /// credential is a member of.
    pub guild_id: Option<String>,
    pub category_id: String,
    pub staff_role_id: String,
    pub log_channel_id: String,
    pub roblox_api_base: String,
    pub roblox_web_base: String,
    pub lookup_request_timeout_ms: u64,
    pub transcript_fetch_limit: usize,
    pub delete_delay: Duration,
}

#[derive(Debug, Clone)]
/// A validated report submission with its stored evidence paths.
pub struct TicketSubmission {
    pub discord_id: String,
    pub discord_username: String,
    pub roblox_username: String,
    pub title: String,
    pub description: String,
    pub evidence: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Success payload returned to the submitting client.
pub struct ProvisionedTicket {
    pub channel_id: String,
    pub channel_name: String,
}

#[derive(Debug, Error)]
/// Enumerates the submission failures the HTTP surface maps onto statuses.
pub enum TicketSubmitError {
    #[error("Hai già un ticket aperto: {name}. Chiudilo prima di aprirne un altro.")]
    DuplicateTicket { name: String },
    #[error("Bot not in any guild")]
    BotNotInGuild,
    #[error(transparent)]
    Platform(#[from] anyhow::Error),
}

impl TicketSubmitError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::DuplicateTicket { .. } => 400,
            Self::BotNotInGuild | Self::Platform(_) => 500,
        }
    }

    /// User-safe message rendered verbatim by the client.
    pub fn user_message(&self) -> String {
        match self {
            Self::DuplicateTicket { .. } | Self::BotNotInGuild => self.to_string(),
            Self::Platform(error) => format!("Server Error: {error}"),
        }
    }
}

#[derive(Debug, Clone)]
/// Runs submissions and closures against the chat platform.
pub struct TicketWorkflow {
    pub(crate) api: DiscordApiClient,
    pub(crate) config: TicketWorkflowConfig,
    lookup_http: reqwest::Client,
}

impl TicketWorkflow {
    pub fn new(api: DiscordApiClient, config: TicketWorkflowConfig) -> Result<Self> {
        let lookup_http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.lookup_request_timeout_ms.max(1)))
            .build()
            .context("failed to create identity lookup client")?;
        Ok(Self {
            api,
            config,
            lookup_http,
        })
    }

    /// Runs one submission to completion. Steps execute strictly in order;
    /// no step starts before the prior one succeeded.
    pub async fn submit(
        &self,
        submission: &TicketSubmission,
    ) -> Result<ProvisionedTicket, TicketSubmitError> {
        let guild_id = self.resolve_guild_id().await?;
        tracing::info!(
            discord_username = %submission.discord_username,
            roblox_username = %submission.roblox_username,
            evidence_count = submission.evidence.len(),
            "new report submission"
        );

        let roblox = resolve_roblox_identity(
            &self.lookup_http,
            &self.config.roblox_api_base,
            &self.config.roblox_web_base,
            &submission.roblox_username,
        )
        .await;
        tracing::info!(roblox_id = %roblox.id, resolved = roblox.resolved, "roblox identity resolved");

        let channel_name = derive_ticket_name(&submission.discord_username);

        // Fresh listing immediately before creation. Two concurrent
        // submissions for the same name can still both pass; the platform
        // does not enforce uniqueness either. Accepted race.
        let channels = self.api.list_guild_channels(&guild_id).await?;
        if let Some(existing) = find_open_ticket(&channels, &self.config.category_id, &channel_name)
        {
            tracing::info!(channel = %existing.name, "duplicate ticket rejected");
            return Err(TicketSubmitError::DuplicateTicket {
                name: existing.name.clone(),
            });
        }

        let channel = self
            .api
            .create_guild_channel(
                &guild_id,
                &NewGuildChannel {
                    name: channel_name.clone(),
                    kind: GUILD_TEXT_CHANNEL_TYPE,
                    parent_id: self.config.category_id.clone(),
                    permission_overwrites: vec![
                        PermissionOverwrite::deny_role(&guild_id, PERMISSION_VIEW_CHANNEL),
                        PermissionOverwrite::allow_role(
                            &self.config.staff_role_id,
                            PERMISSION_VIEW_CHANNEL | PERMISSION_SEND_MESSAGES,
                        ),
                    ],
                },
            )
            .await?;
        tracing::info!(channel_id = %channel.id, channel = %channel_name, "ticket channel created");

        // Best-effort: grant the submitter access when the id looks like a
        // real snowflake. Never fails the submission.
        if submission.discord_id.trim().len() >= PLAUSIBLE_DISCORD_ID_MIN_CHARS {
            if let Err(error) = self
                .api
                .edit_member_permission_overwrite(
                    &channel.id,
                    submission.discord_id.trim(),
                    PERMISSION_VIEW_CHANNEL | PERMISSION_SEND_MESSAGES,
                )
                .await
            {
                tracing::warn!(
                    channel_id = %channel.id,
                    user_id = %submission.discord_id,
                    %error,
                    "failed to grant submitter access to ticket channel"
                );
            }
        }

        let attachments = load_evidence_attachments(&submission.evidence).await?;
        let payload = build_report_payload(submission, &roblox, &self.config.staff_role_id);
        if let Err(error) = self.api.create_message(&channel.id, &payload, &attachments).await {
            // The channel survives the failed publish; the client sees an
            // error while the ticket exists. Known inconsistency, logged so
            // operators can reap orphans.
            tracing::warn!(
                channel_id = %channel.id,
                %error,
                "report publish failed after channel creation; channel left in place"
            );
            return Err(TicketSubmitError::Platform(error));
        }

        tracing::info!(channel_id = %channel.id, "report published");
        Ok(ProvisionedTicket {
            channel_id: channel.id,
            channel_name,
        })
    }

    async fn resolve_guild_id(&self) -> Result<String, TicketSubmitError> {
        if let Some(guild_id) = self
            .config
            .guild_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return Ok(guild_id.to_string());
        }
        let guilds = self.api.list_current_user_guilds().await?;
        match guilds.first() {
            Some(guild) => Ok(guild.id.clone()),
            None => Err(TicketSubmitError::BotNotInGuild),
        }
    }
}

fn find_open_ticket<'a>(
    channels: &'a [DiscordChannel],
    category_id: &str,
    channel_name: &str,
) -> Option<&'a DiscordChannel> {
    channels
        .iter()
        .find(|channel| channel.parent_id.as_deref() == Some(category_id) && channel.name == channel_name)
}

async fn load_evidence_attachments(paths: &[PathBuf]) -> Result<Vec<DiscordAttachmentUpload>> {
    let mut attachments = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read evidence file {}", path.display()))?;
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("evidence")
            .to_string();
        attachments.push(DiscordAttachmentUpload { filename, bytes });
    }
    Ok(attachments)
}

fn build_report_payload(
    submission: &TicketSubmission,
    roblox: &RobloxIdentity,
    staff_role_id: &str,
) -> Value {
    json!({
        "content": format!("<@{}> <@&{staff_role_id}>", submission.discord_id),
        "embeds": [{
            "title": format!("Nuova Segnalazione: {}", submission.title),
            "color": REPORT_EMBED_COLOR,
            "fields": [
                {
                    "name": "Utente Discord",
                    "value": format!("<@{}>", submission.discord_id),
                    "inline": true,
                },
                {
                    "name": "Utente Roblox",
                    "value": format!(
                        "[{}]({}) (ID: {})",
                        submission.roblox_username, roblox.profile_url, roblox.id
                    ),
                    "inline": true,
                },
                {
                    "name": "Descrizione",
                    "value": submission.description,
                },
            ],
            "timestamp": Utc::now().to_rfc3339(),
        }],
        "components": [{
            "type": 1,
            "components": [{
                "type": 2,
                "style": 4,
                "label": "Chiudi Ticket",
                "custom_id": CLOSE_TICKET_CUSTOM_ID,
            }],
        }],
    })
}
