//! External identity flows for the report bridge.
//!
//! Covers the two identity sources a submission carries: the best-effort
//! Roblox username lookup (degrades to a placeholder identity, never
//! fails a submission) and the Discord OAuth2 authorization-code flow.

pub mod discord_oauth;
pub mod roblox_lookup;

pub use discord_oauth::{
    build_authorize_url, exchange_oauth_code, fetch_discord_profile, DiscordOauthConfig,
    DiscordProfile,
};
pub use roblox_lookup::{resolve_roblox_identity, RobloxIdentity, UNRESOLVED_ROBLOX_ID};
