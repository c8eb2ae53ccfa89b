//! Discord OAuth2 authorization-code flow (identify scope).

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

const OAUTH_SCOPE: &str = "identify";

#[derive(Debug, Clone)]
/// OAuth application settings for the authorization-code flow.
pub struct DiscordOauthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// API base, also the root for the oauth2 endpoints. Overridable so
    /// tests can point the flow at a mock server.
    pub api_base: String,
}

impl DiscordOauthConfig {
    fn api_base(&self) -> &str {
        self.api_base.trim().trim_end_matches('/')
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Identity fields fetched from the OAuth profile endpoint.
pub struct DiscordProfile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub discriminator: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl DiscordProfile {
    /// Composite `name#discriminator` handle carried through the wizard.
    pub fn composite_username(&self) -> String {
        let discriminator = self.discriminator.trim();
        if discriminator.is_empty() {
            format!("{}#0", self.username)
        } else {
            format!("{}#{discriminator}", self.username)
        }
    }
}

/// Builds the provider authorization URL the login route redirects to.
pub fn build_authorize_url(config: &DiscordOauthConfig) -> Result<String> {
    let endpoint = format!("{}/oauth2/authorize", config.api_base());
    let mut url = Url::parse(&endpoint)
        .with_context(|| format!("failed to parse oauth authorize endpoint '{endpoint}'"))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("client_id", &config.client_id);
        query.append_pair("redirect_uri", &config.redirect_uri);
        query.append_pair("response_type", "code");
        query.append_pair("scope", OAUTH_SCOPE);
    }
    Ok(url.to_string())
}

/// Exchanges an authorization code for an access token.
pub async fn exchange_oauth_code(
    http: &reqwest::Client,
    config: &DiscordOauthConfig,
    code: &str,
) -> Result<String> {
    if code.trim().is_empty() {
        bail!("oauth authorization code cannot be empty");
    }
    let mut form = BTreeMap::new();
    form.insert("client_id".to_string(), config.client_id.clone());
    form.insert("client_secret".to_string(), config.client_secret.clone());
    form.insert("grant_type".to_string(), "authorization_code".to_string());
    form.insert("code".to_string(), code.trim().to_string());
    form.insert("redirect_uri".to_string(), config.redirect_uri.clone());

    let response = http
        .post(format!("{}/oauth2/token", config.api_base()))
        .form(&form)
        .send()
        .await
        .context("oauth token request failed")?;
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable response body>".to_string());
        bail!("oauth token endpoint returned status {status} body {body}");
    }
    let payload = response
        .json::<Value>()
        .await
        .context("failed to decode oauth token response body")?;
    payload
        .get("access_token")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("oauth token response missing access_token"))
}

/// Fetches the authenticated user's profile with a bearer token.
pub async fn fetch_discord_profile(
    http: &reqwest::Client,
    api_base: &str,
    access_token: &str,
) -> Result<DiscordProfile> {
    let response = http
        .get(format!(
            "{}/users/@me",
            api_base.trim().trim_end_matches('/')
        ))
        .bearer_auth(access_token)
        .send()
        .await
        .context("oauth profile request failed")?;
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable response body>".to_string());
        bail!("oauth profile endpoint returned status {status} body {body}");
    }
    response
        .json::<DiscordProfile>()
        .await
        .context("failed to decode oauth profile response body")
}
