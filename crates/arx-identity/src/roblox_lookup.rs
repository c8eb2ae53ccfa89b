//! Best-effort Roblox username resolution.

use serde::Deserialize;
use serde_json::json;

pub const UNRESOLVED_ROBLOX_ID: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Resolved (or degraded) Roblox identity for a submitted handle.
pub struct RobloxIdentity {
    pub id: String,
    pub profile_url: String,
    pub resolved: bool,
}

impl RobloxIdentity {
    /// Placeholder identity pointing at a keyword search for the handle.
    fn degraded(web_base: &str, handle: &str) -> Self {
        let keyword = url::form_urlencoded::byte_serialize(handle.trim().as_bytes())
            .collect::<String>();
        Self {
            id: UNRESOLVED_ROBLOX_ID.to_string(),
            profile_url: format!(
                "{}/search/users?keyword={keyword}",
                web_base.trim_end_matches('/')
            ),
            resolved: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RobloxUsernameLookupResponse {
    #[serde(default)]
    data: Vec<RobloxUserRecord>,
}

#[derive(Debug, Deserialize)]
struct RobloxUserRecord {
    id: u64,
}

/// Resolves a free-text handle to a Roblox identity.
///
/// Misses, banned-only matches, and transport failures all degrade to the
/// placeholder identity; this path never fails the enclosing submission.
pub async fn resolve_roblox_identity(
    http: &reqwest::Client,
    api_base: &str,
    web_base: &str,
    handle: &str,
) -> RobloxIdentity {
    let payload = json!({
        "usernames": [handle],
        "excludeBannedUsers": true,
    });
    let url = format!("{}/v1/usernames/users", api_base.trim_end_matches('/'));
    let response = match http.post(url).json(&payload).send().await {
        Ok(response) => response,
        Err(error) => {
            tracing::warn!(handle, %error, "roblox lookup transport failure");
            return RobloxIdentity::degraded(web_base, handle);
        }
    };
    if !response.status().is_success() {
        tracing::warn!(
            handle,
            status = response.status().as_u16(),
            "roblox lookup returned non-success status"
        );
        return RobloxIdentity::degraded(web_base, handle);
    }
    let decoded = match response.json::<RobloxUsernameLookupResponse>().await {
        Ok(decoded) => decoded,
        Err(error) => {
            tracing::warn!(handle, %error, "roblox lookup response decode failure");
            return RobloxIdentity::degraded(web_base, handle);
        }
    };

    match decoded.data.first() {
        Some(record) => RobloxIdentity {
            id: record.id.to_string(),
            profile_url: format!(
                "{}/users/{}/profile",
                web_base.trim_end_matches('/'),
                record.id
            ),
            resolved: true,
        },
        None => RobloxIdentity::degraded(web_base, handle),
    }
}
