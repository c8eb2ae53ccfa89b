//! OAuth login and callback routes.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use arx_identity::{build_authorize_url, exchange_oauth_code, fetch_discord_profile};
use arx_wizard::SecondaryClaim;

use crate::server_app::AppState;

#[derive(Debug, Deserialize)]
pub struct OauthCallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
}

/// Sends the browser to the provider's authorization page.
pub async fn handle_login(State(state): AppState) -> Response {
    match build_authorize_url(&state.oauth) {
        Ok(url) => Redirect::temporary(&url).into_response(),
        Err(error) => {
            tracing::error!(%error, "failed to build oauth authorize url");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Server configuration error"})),
            )
                .into_response()
        }
    }
}

/// Completes the code exchange and bounces back to the report page with the
/// verified identity in the query string; failures bounce back with an
/// error marker instead.
pub async fn handle_callback(
    State(state): AppState,
    Query(query): Query<OauthCallbackQuery>,
) -> Redirect {
    let Some(code) = query
        .code
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return report_redirect(&state.client_origin, "error=no_code");
    };

    let claim = match complete_login(&state, code).await {
        Ok(claim) => claim,
        Err(error) => {
            tracing::warn!(%error, "oauth callback exchange failed");
            return report_redirect(&state.client_origin, "error=auth_failed");
        }
    };

    match serde_json::to_string(&claim) {
        Ok(encoded) => {
            let encoded = url::form_urlencoded::byte_serialize(encoded.as_bytes())
                .collect::<String>();
            report_redirect(&state.client_origin, &format!("discord_auth={encoded}"))
        }
        Err(error) => {
            tracing::warn!(%error, "failed to encode oauth identity payload");
            report_redirect(&state.client_origin, "error=auth_failed")
        }
    }
}

async fn complete_login(
    state: &crate::server_app::ServerState,
    code: &str,
) -> anyhow::Result<SecondaryClaim> {
    let access_token = exchange_oauth_code(&state.oauth_http, &state.oauth, code).await?;
    let profile =
        fetch_discord_profile(&state.oauth_http, &state.oauth.api_base, &access_token).await?;
    Ok(SecondaryClaim {
        id: profile.id.clone(),
        username: profile.composite_username(),
        avatar: profile.avatar.clone(),
    })
}

fn report_redirect(client_origin: &str, query: &str) -> Redirect {
    Redirect::temporary(&format!("{client_origin}/report?{query}"))
}
