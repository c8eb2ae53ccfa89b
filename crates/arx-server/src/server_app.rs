//! Router construction and the serve loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use arx_discord::{DiscordApiClient, DiscordApiClientConfig};
use arx_identity::DiscordOauthConfig;
use arx_ticket::{TicketWorkflow, TicketWorkflowConfig};

use crate::evidence_store::EvidenceStore;
use crate::server_config::ServerConfig;
use crate::{auth_routes, interaction_routes, report_routes};

const MAX_SUBMISSION_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Shared state behind every handler.
pub struct ServerState {
    pub oauth: DiscordOauthConfig,
    pub oauth_http: reqwest::Client,
    pub client_origin: String,
    pub interactions_public_key: String,
    pub workflow: TicketWorkflow,
    pub evidence: EvidenceStore,
}

pub fn build_server_state(config: &ServerConfig) -> Result<Arc<ServerState>> {
    let oauth_http = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
        .build()
        .context("failed to create oauth http client")?;

    let api = DiscordApiClient::new(DiscordApiClientConfig {
        api_base: config.discord_api_base.clone(),
        bot_token: config.discord_bot_token.clone(),
        request_timeout_ms: config.request_timeout_ms,
        retry_max_attempts: config.retry_max_attempts as usize,
        retry_base_delay_ms: config.retry_base_delay_ms,
    })?;

    let workflow = TicketWorkflow::new(
        api,
        TicketWorkflowConfig {
            guild_id: config.discord_guild_id.clone(),
            category_id: config.category_id.clone(),
            staff_role_id: config.staff_role_id.clone(),
            log_channel_id: config.log_channel_id.clone(),
            roblox_api_base: config.roblox_api_base.clone(),
            roblox_web_base: config.roblox_web_base.clone(),
            lookup_request_timeout_ms: config.request_timeout_ms,
            transcript_fetch_limit: 100,
            delete_delay: Duration::from_millis(config.delete_delay_ms),
        },
    )?;

    let evidence = EvidenceStore::new(config.uploads_dir.clone())?;

    Ok(Arc::new(ServerState {
        oauth: DiscordOauthConfig {
            client_id: config.discord_client_id.clone(),
            client_secret: config.discord_client_secret.clone(),
            redirect_uri: config.discord_redirect_uri.clone(),
            api_base: config.discord_api_base.clone(),
        },
        oauth_http,
        client_origin: config.client_origin().to_string(),
        interactions_public_key: config.interactions_public_key.clone(),
        workflow,
        evidence,
    }))
}

pub fn build_router(state: Arc<ServerState>) -> Result<Router> {
    let origin = state
        .client_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("invalid client origin '{}'", state.client_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        .route("/api/auth/discord/login", get(auth_routes::handle_login))
        .route(
            "/api/auth/discord/callback",
            get(auth_routes::handle_callback),
        )
        .route("/api/report/submit", post(report_routes::handle_submit))
        .route(
            "/uploads/{file_name}",
            get(report_routes::handle_evidence_download),
        )
        .route(
            "/api/interactions",
            post(interaction_routes::handle_interaction),
        )
        .route("/healthz", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_SUBMISSION_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

/// Binds and serves until ctrl-c.
pub async fn run(config: ServerConfig) -> Result<()> {
    let state = build_server_state(&config)?;
    let app = build_router(state.clone())?;

    let listener = TcpListener::bind(config.bind.as_str())
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound address")?;
    tracing::info!(
        addr = %local_addr,
        uploads_dir = %state.evidence.root().display(),
        "report bridge listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("report bridge server exited unexpectedly")?;
    Ok(())
}

// State extractor alias used by the route modules.
pub(crate) type AppState = State<Arc<ServerState>>;

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use ed25519_dalek::{Signer, SigningKey};
    use httpmock::prelude::*;
    use serde_json::{json, Value};

    use arx_ticket::{CLOSE_DENIED_REPLY, CLOSE_IN_PROGRESS_REPLY};

    use super::*;

    fn test_signing_key() -> SigningKey {
        SigningKey::from_bytes(&[9_u8; 32])
    }

    fn test_public_key_hex() -> String {
        hex::encode(test_signing_key().verifying_key().to_bytes())
    }

    fn sign_interaction(timestamp: &str, body: &str) -> String {
        let mut message = timestamp.as_bytes().to_vec();
        message.extend_from_slice(body.as_bytes());
        hex::encode(test_signing_key().sign(&message).to_bytes())
    }

    fn test_config(mock_base: &str, uploads_dir: &Path) -> ServerConfig {
        ServerConfig {
            bind: "127.0.0.1:0".to_string(),
            client_origin: "http://localhost:5173".to_string(),
            discord_client_id: "client-1".to_string(),
            discord_client_secret: "secret-1".to_string(),
            discord_redirect_uri: "http://localhost:3000/api/auth/discord/callback".to_string(),
            discord_bot_token: "bot-token-test".to_string(),
            discord_guild_id: Some("G1".to_string()),
            category_id: "CAT1".to_string(),
            staff_role_id: "STAFF".to_string(),
            log_channel_id: "LOG1".to_string(),
            interactions_public_key: test_public_key_hex(),
            uploads_dir: uploads_dir.display().to_string(),
            discord_api_base: mock_base.to_string(),
            roblox_api_base: mock_base.to_string(),
            roblox_web_base: "https://www.roblox.com".to_string(),
            request_timeout_ms: 3_000,
            retry_max_attempts: 1,
            retry_base_delay_ms: 5,
            delete_delay_ms: 10,
        }
    }

    async fn spawn_app(config: ServerConfig) -> String {
        let state = build_server_state(&config).expect("state");
        let app = build_router(state).expect("router");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn no_redirect_client() -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("client")
    }

    #[tokio::test]
    async fn functional_healthz_reports_ok() {
        let server = MockServer::start();
        let tempdir = tempfile::tempdir().expect("tempdir");
        let base = spawn_app(test_config(&server.base_url(), tempdir.path())).await;

        let response = reqwest::get(format!("{base}/healthz")).await.expect("get");
        assert_eq!(response.status().as_u16(), 200);
        let body = response.json::<Value>().await.expect("json");
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn functional_login_redirects_to_provider_authorize_url() {
        let server = MockServer::start();
        let tempdir = tempfile::tempdir().expect("tempdir");
        let base = spawn_app(test_config(&server.base_url(), tempdir.path())).await;

        let response = no_redirect_client()
            .get(format!("{base}/api/auth/discord/login"))
            .send()
            .await
            .expect("get");
        assert!(response.status().is_redirection());
        let location = response
            .headers()
            .get("location")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert!(location.contains("/oauth2/authorize?"));
        assert!(location.contains("client_id=client-1"));
        assert!(location.contains("scope=identify"));
    }

    #[tokio::test]
    async fn functional_callback_without_code_redirects_with_error_marker() {
        let server = MockServer::start();
        let tempdir = tempfile::tempdir().expect("tempdir");
        let base = spawn_app(test_config(&server.base_url(), tempdir.path())).await;

        let response = no_redirect_client()
            .get(format!("{base}/api/auth/discord/callback"))
            .send()
            .await
            .expect("get");
        assert!(response.status().is_redirection());
        let location = response
            .headers()
            .get("location")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert_eq!(location, "http://localhost:5173/report?error=no_code");
    }

    #[tokio::test]
    async fn functional_callback_exchanges_code_and_delivers_identity_fragment() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/oauth2/token");
            then.status(200)
                .json_body(json!({"access_token": "tok-9", "token_type": "Bearer"}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/users/@me");
            then.status(200).json_body(json!({
                "id": "555",
                "username": "Steve",
                "discriminator": "1",
                "avatar": "abcd",
            }));
        });
        let tempdir = tempfile::tempdir().expect("tempdir");
        let base = spawn_app(test_config(&server.base_url(), tempdir.path())).await;

        let response = no_redirect_client()
            .get(format!("{base}/api/auth/discord/callback?code=auth-9"))
            .send()
            .await
            .expect("get");
        assert!(response.status().is_redirection());
        let location = response
            .headers()
            .get("location")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert!(location.starts_with("http://localhost:5173/report?discord_auth="));
        assert!(location.contains("%22id%22%3A%22555%22"));
        assert!(location.contains("Steve%231"));
    }

    #[tokio::test]
    async fn functional_callback_exchange_failure_redirects_with_auth_failed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/oauth2/token");
            then.status(400).body("{\"error\": \"invalid_grant\"}");
        });
        let tempdir = tempfile::tempdir().expect("tempdir");
        let base = spawn_app(test_config(&server.base_url(), tempdir.path())).await;

        let response = no_redirect_client()
            .get(format!("{base}/api/auth/discord/callback?code=bad"))
            .send()
            .await
            .expect("get");
        let location = response
            .headers()
            .get("location")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert_eq!(location, "http://localhost:5173/report?error=auth_failed");
    }

    fn submission_form(with_title: bool) -> reqwest::multipart::Form {
        let mut form = reqwest::multipart::Form::new()
            .text("discordId", "91234567890123456")
            .text("discordUsername", "Steve#1")
            .text("robloxUsername", "player123")
            .text("description", "Trade window manipulation during a drop.")
            .part(
                "evidence",
                reqwest::multipart::Part::bytes(b"png bytes".to_vec()).file_name("clip.png"),
            );
        if with_title {
            form = form.text("title", "Suspicious trade");
        }
        form
    }

    #[tokio::test]
    async fn functional_submit_rejects_incomplete_submission_before_any_workflow_step() {
        let server = MockServer::start();
        let discord_mock = server.mock(|when, then| {
            when.method(GET).path("/guilds/G1/channels");
            then.status(200).json_body(json!([]));
        });
        let tempdir = tempfile::tempdir().expect("tempdir");
        let base = spawn_app(test_config(&server.base_url(), tempdir.path())).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/api/report/submit"))
            .multipart(submission_form(false))
            .send()
            .await
            .expect("post");
        assert_eq!(response.status().as_u16(), 400);
        let body = response.json::<Value>().await.expect("json");
        assert_eq!(body["error"], "Compila tutti i campi");
        discord_mock.assert_hits(0);
    }

    #[tokio::test]
    async fn functional_submit_end_to_end_provisions_ticket() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/usernames/users");
            then.status(200)
                .json_body(json!({"data": [{"id": 555_000, "name": "player123"}]}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/guilds/G1/channels");
            then.status(200).json_body(json!([]));
        });
        server.mock(|when, then| {
            when.method(POST).path("/guilds/G1/channels");
            then.status(201)
                .json_body(json!({"id": "CH9", "name": "ticket-steve", "parent_id": "CAT1"}));
        });
        server.mock(|when, then| {
            when.method(PUT)
                .path("/channels/CH9/permissions/91234567890123456");
            then.status(204);
        });
        let publish_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/channels/CH9/messages")
                .body_includes("Nuova Segnalazione: Suspicious trade")
                .body_includes("close_ticket");
            then.status(200).json_body(json!({
                "id": "M1",
                "channel_id": "CH9",
                "author": {"id": "BOT", "username": "arx"}
            }));
        });
        let tempdir = tempfile::tempdir().expect("tempdir");
        let base = spawn_app(test_config(&server.base_url(), tempdir.path())).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/api/report/submit"))
            .multipart(submission_form(true))
            .send()
            .await
            .expect("post");
        assert_eq!(response.status().as_u16(), 200);
        let body = response.json::<Value>().await.expect("json");
        assert_eq!(body, json!({"success": true, "channelId": "CH9"}));

        publish_mock.assert();
        // The evidence upload landed in the store.
        let stored = std::fs::read_dir(tempdir.path())
            .expect("read dir")
            .count();
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn functional_submit_duplicate_ticket_returns_400_with_named_channel() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/usernames/users");
            then.status(200).json_body(json!({"data": []}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/guilds/G1/channels");
            then.status(200).json_body(json!([
                {"id": "CH1", "name": "ticket-steve", "parent_id": "CAT1"}
            ]));
        });
        let create_mock = server.mock(|when, then| {
            when.method(POST).path("/guilds/G1/channels");
            then.status(201).json_body(json!({"id": "CH9", "name": "x"}));
        });
        let tempdir = tempfile::tempdir().expect("tempdir");
        let base = spawn_app(test_config(&server.base_url(), tempdir.path())).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/api/report/submit"))
            .multipart(submission_form(true))
            .send()
            .await
            .expect("post");
        assert_eq!(response.status().as_u16(), 400);
        let body = response.json::<Value>().await.expect("json");
        assert!(body["error"]
            .as_str()
            .unwrap_or_default()
            .contains("ticket-steve"));
        create_mock.assert_hits(0);
    }

    #[tokio::test]
    async fn functional_uploads_route_serves_stored_evidence() {
        let server = MockServer::start();
        let tempdir = tempfile::tempdir().expect("tempdir");
        std::fs::write(tempdir.path().join("1700.png"), b"png bytes").expect("seed");
        let base = spawn_app(test_config(&server.base_url(), tempdir.path())).await;

        let response = reqwest::get(format!("{base}/uploads/1700.png"))
            .await
            .expect("get");
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(
            response
                .headers()
                .get("content-type")
                .and_then(|value| value.to_str().ok()),
            Some("image/png")
        );
        assert_eq!(response.bytes().await.expect("bytes").as_ref(), b"png bytes");

        let missing = reqwest::get(format!("{base}/uploads/none.png"))
            .await
            .expect("get");
        assert_eq!(missing.status().as_u16(), 404);
    }

    fn close_interaction_body(roles: &[&str]) -> String {
        json!({
            "type": 3,
            "data": {"custom_id": "close_ticket"},
            "channel": {"id": "CH9", "name": "ticket-steve"},
            "member": {
                "user": {"id": "42", "username": "Moderator"},
                "roles": roles,
            },
        })
        .to_string()
    }

    async fn post_interaction(base: &str, body: &str, signature: &str, timestamp: &str) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("{base}/api/interactions"))
            .header("x-signature-ed25519", signature)
            .header("x-signature-timestamp", timestamp)
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("post")
    }

    #[tokio::test]
    async fn regression_interaction_with_invalid_signature_is_unauthorized() {
        let server = MockServer::start();
        let tempdir = tempfile::tempdir().expect("tempdir");
        let base = spawn_app(test_config(&server.base_url(), tempdir.path())).await;

        let body = json!({"type": 1}).to_string();
        let signature = sign_interaction("111", &body);
        // Signed for a different timestamp.
        let response = post_interaction(&base, &body, &signature, "222").await;
        assert_eq!(response.status().as_u16(), 401);
    }

    #[tokio::test]
    async fn functional_interaction_ping_pongs() {
        let server = MockServer::start();
        let tempdir = tempfile::tempdir().expect("tempdir");
        let base = spawn_app(test_config(&server.base_url(), tempdir.path())).await;

        let body = json!({"type": 1}).to_string();
        let signature = sign_interaction("111", &body);
        let response = post_interaction(&base, &body, &signature, "111").await;
        assert_eq!(response.status().as_u16(), 200);
        let payload = response.json::<Value>().await.expect("json");
        assert_eq!(payload, json!({"type": 1}));
    }

    #[tokio::test]
    async fn functional_close_denied_for_non_staff_leaves_channel_alone() {
        let server = MockServer::start();
        let delete_mock = server.mock(|when, then| {
            when.method(DELETE).path("/channels/CH9");
            then.status(200);
        });
        let tempdir = tempfile::tempdir().expect("tempdir");
        let base = spawn_app(test_config(&server.base_url(), tempdir.path())).await;

        let body = close_interaction_body(&["SOME-OTHER-ROLE"]);
        let signature = sign_interaction("111", &body);
        let response = post_interaction(&base, &body, &signature, "111").await;
        assert_eq!(response.status().as_u16(), 200);
        let payload = response.json::<Value>().await.expect("json");
        assert_eq!(payload["data"]["content"], CLOSE_DENIED_REPLY);
        assert_eq!(payload["data"]["flags"], 64);

        tokio::time::sleep(Duration::from_millis(100)).await;
        delete_mock.assert_hits(0);
    }

    #[tokio::test]
    async fn functional_close_accepted_for_staff_archives_and_deletes() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/channels/CH9/messages");
            then.status(200).json_body(json!([
                {"id": "M1", "content": "opening report", "author": {"id": "U1", "username": "steve"}}
            ]));
        });
        let log_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/channels/LOG1/messages")
                .body_includes("Ticket chiuso da Moderator")
                .body_includes("transcript-ticket-steve.txt");
            then.status(200).json_body(json!({
                "id": "M9",
                "channel_id": "LOG1",
                "author": {"id": "BOT", "username": "arx"}
            }));
        });
        let delete_mock = server.mock(|when, then| {
            when.method(DELETE).path("/channels/CH9");
            then.status(200);
        });
        let tempdir = tempfile::tempdir().expect("tempdir");
        let base = spawn_app(test_config(&server.base_url(), tempdir.path())).await;

        let body = close_interaction_body(&["STAFF"]);
        let signature = sign_interaction("111", &body);
        let response = post_interaction(&base, &body, &signature, "111").await;
        assert_eq!(response.status().as_u16(), 200);
        let payload = response.json::<Value>().await.expect("json");
        assert_eq!(payload["data"]["content"], CLOSE_IN_PROGRESS_REPLY);

        // The closer runs detached; give it time to archive and delete.
        for _ in 0..50 {
            if delete_mock.hits() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        log_mock.assert();
        delete_mock.assert();
    }
}
