//! Discord REST API client used by the ticket workflow and webhook surface.
//!
//! Wraps the handful of endpoints the bridge needs (guild/channel listing,
//! channel provisioning, permission overwrites, message posting with
//! attachments, message history, channel deletion) behind a typed client
//! with bounded retries, plus ed25519 verification for the interactions
//! webhook.

pub mod discord_api_client;
pub mod discord_http_helpers;
pub mod interaction_signature;

pub use discord_api_client::{
    DiscordApiClient, DiscordApiClientConfig, DiscordAttachmentUpload, DiscordChannel,
    DiscordGuild, DiscordMessage, DiscordMessageAuthor, NewGuildChannel, PermissionOverwrite,
    GUILD_TEXT_CHANNEL_TYPE, OVERWRITE_TYPE_MEMBER, OVERWRITE_TYPE_ROLE, PERMISSION_SEND_MESSAGES,
    PERMISSION_VIEW_CHANNEL,
};
pub use interaction_signature::verify_interaction_signature;
