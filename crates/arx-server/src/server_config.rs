//! Environment-backed configuration for the bridge server.

use clap::Parser;

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Clone, Parser)]
#[command(name = "arx-server", about = "Report-intake ticket bridge", version)]
/// Server configuration; every flag can come from the environment.
pub struct ServerConfig {
    #[arg(
        long,
        env = "ARX_BIND",
        default_value = "0.0.0.0:3000",
        help = "Address the HTTP server listens on"
    )]
    pub bind: String,

    #[arg(
        long = "client-origin",
        env = "ARX_CLIENT_ORIGIN",
        help = "Browser client origin, used for CORS and callback redirects"
    )]
    pub client_origin: String,

    #[arg(
        long = "discord-client-id",
        env = "ARX_DISCORD_CLIENT_ID",
        help = "OAuth application client id"
    )]
    pub discord_client_id: String,

    #[arg(
        long = "discord-client-secret",
        env = "ARX_DISCORD_CLIENT_SECRET",
        help = "OAuth application client secret"
    )]
    pub discord_client_secret: String,

    #[arg(
        long = "discord-redirect-uri",
        env = "ARX_DISCORD_REDIRECT_URI",
        help = "OAuth redirect URI registered with the provider"
    )]
    pub discord_redirect_uri: String,

    #[arg(
        long = "discord-bot-token",
        env = "ARX_DISCORD_BOT_TOKEN",
        help = "Bot credential used for channel and message operations"
    )]
    pub discord_bot_token: String,

    #[arg(
        long = "discord-guild-id",
        env = "ARX_DISCORD_GUILD_ID",
        help = "Target guild id; when omitted the bot's first guild is used"
    )]
    pub discord_guild_id: Option<String>,

    #[arg(
        long = "category-id",
        env = "ARX_CATEGORY_ID",
        help = "Category (parent grouping) ticket channels are created under"
    )]
    pub category_id: String,

    #[arg(
        long = "staff-role-id",
        env = "ARX_STAFF_ROLE_ID",
        help = "Role allowed to view tickets and close them"
    )]
    pub staff_role_id: String,

    #[arg(
        long = "log-channel-id",
        env = "ARX_LOG_CHANNEL_ID",
        default_value = "",
        help = "Channel receiving closure transcripts; empty skips delivery"
    )]
    pub log_channel_id: String,

    #[arg(
        long = "interactions-public-key",
        env = "ARX_INTERACTIONS_PUBLIC_KEY",
        help = "Hex-encoded application public key for the interactions webhook"
    )]
    pub interactions_public_key: String,

    #[arg(
        long = "uploads-dir",
        env = "ARX_UPLOADS_DIR",
        default_value = "uploads",
        help = "Directory evidence uploads are stored in"
    )]
    pub uploads_dir: String,

    #[arg(
        long = "discord-api-base",
        env = "ARX_DISCORD_API_BASE",
        default_value = "https://discord.com/api/v10",
        help = "Discord REST API base URL"
    )]
    pub discord_api_base: String,

    #[arg(
        long = "roblox-api-base",
        env = "ARX_ROBLOX_API_BASE",
        default_value = "https://users.roblox.com",
        help = "Roblox users API base URL"
    )]
    pub roblox_api_base: String,

    #[arg(
        long = "roblox-web-base",
        env = "ARX_ROBLOX_WEB_BASE",
        default_value = "https://www.roblox.com",
        help = "Roblox web base URL used for profile and search links"
    )]
    pub roblox_web_base: String,

    #[arg(
        long = "request-timeout-ms",
        env = "ARX_REQUEST_TIMEOUT_MS",
        default_value_t = 15_000,
        value_parser = parse_positive_u64,
        help = "Timeout applied to every outbound call"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "retry-max-attempts",
        env = "ARX_RETRY_MAX_ATTEMPTS",
        default_value_t = 3,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Attempts per retryable Discord API call"
    )]
    pub retry_max_attempts: u64,

    #[arg(
        long = "retry-base-delay-ms",
        env = "ARX_RETRY_BASE_DELAY_MS",
        default_value_t = 250,
        value_parser = parse_positive_u64,
        help = "Base backoff delay between retries"
    )]
    pub retry_base_delay_ms: u64,

    #[arg(
        long = "delete-delay-ms",
        env = "ARX_DELETE_DELAY_MS",
        default_value_t = 5_000,
        value_parser = parse_positive_u64,
        help = "Delay before a closed ticket channel is deleted"
    )]
    pub delete_delay_ms: u64,
}

impl ServerConfig {
    pub fn client_origin(&self) -> &str {
        self.client_origin.trim().trim_end_matches('/')
    }
}
