//! Discord interactions webhook: signature check, ping, close button.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use arx_discord::interaction_signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use arx_discord::verify_interaction_signature;
use arx_ticket::{
    CloseTicketRequest, CLOSE_DENIED_REPLY, CLOSE_IN_PROGRESS_REPLY, CLOSE_TICKET_CUSTOM_ID,
};

use crate::server_app::AppState;

const INTERACTION_TYPE_PING: u64 = 1;
const INTERACTION_TYPE_MESSAGE_COMPONENT: u64 = 3;
const INTERACTION_CALLBACK_PONG: u64 = 1;
const INTERACTION_CALLBACK_CHANNEL_MESSAGE: u64 = 4;
const MESSAGE_FLAG_EPHEMERAL: u64 = 1 << 6;

/// Entry point for every interaction Discord posts to the webhook.
pub async fn handle_interaction(
    State(state): AppState,
    headers: HeaderMap,
    body: String,
) -> Response {
    let signature = header_value(&headers, SIGNATURE_HEADER);
    let timestamp = header_value(&headers, TIMESTAMP_HEADER);
    if let Err(error) = verify_interaction_signature(
        &state.interactions_public_key,
        signature,
        timestamp,
        body.as_bytes(),
    ) {
        tracing::warn!(%error, "rejected interaction with invalid signature");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid request signature"})),
        )
            .into_response();
    }

    let payload = match serde_json::from_str::<Value>(&body) {
        Ok(payload) => payload,
        Err(error) => {
            tracing::warn!(%error, "interaction payload is not valid JSON");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "malformed interaction payload"})),
            )
                .into_response();
        }
    };

    match payload.get("type").and_then(Value::as_u64) {
        Some(INTERACTION_TYPE_PING) => {
            Json(json!({"type": INTERACTION_CALLBACK_PONG})).into_response()
        }
        Some(INTERACTION_TYPE_MESSAGE_COMPONENT) => handle_component(&state, &payload),
        other => {
            tracing::debug!(interaction_type = ?other, "unsupported interaction type");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "unsupported interaction type"})),
            )
                .into_response()
        }
    }
}

fn handle_component(state: &crate::server_app::ServerState, payload: &Value) -> Response {
    let custom_id = payload
        .pointer("/data/custom_id")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if custom_id != CLOSE_TICKET_CUSTOM_ID {
        tracing::debug!(custom_id, "unsupported component interaction");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "unsupported component"})),
        )
            .into_response();
    }

    let Some(request) = close_request_from_payload(payload) else {
        tracing::warn!("close interaction payload missing channel or member fields");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "malformed interaction payload"})),
        )
            .into_response();
    };

    if !state.workflow.authorize_close(&request) {
        tracing::info!(
            channel_id = %request.channel_id,
            actor = %request.actor_username,
            "close attempt denied, actor lacks staff role"
        );
        return ephemeral_reply(CLOSE_DENIED_REPLY);
    }

    let workflow = state.workflow.clone();
    tokio::spawn(async move {
        workflow.finalize_close(request).await;
    });
    ephemeral_reply(CLOSE_IN_PROGRESS_REPLY)
}

fn close_request_from_payload(payload: &Value) -> Option<CloseTicketRequest> {
    let channel_id = payload
        .pointer("/channel/id")
        .or_else(|| payload.get("channel_id"))
        .and_then(Value::as_str)
        .map(str::to_string)?;
    let channel_name = payload
        .pointer("/channel/name")
        .and_then(Value::as_str)
        .unwrap_or("ticket")
        .to_string();
    let actor_id = payload
        .pointer("/member/user/id")
        .and_then(Value::as_str)
        .map(str::to_string)?;
    let actor_username = payload
        .pointer("/member/user/username")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let actor_role_ids = payload
        .pointer("/member/roles")
        .and_then(Value::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Some(CloseTicketRequest {
        channel_id,
        channel_name,
        actor_id,
        actor_username,
        actor_role_ids,
    })
}

fn ephemeral_reply(content: &str) -> Response {
    Json(json!({
        "type": INTERACTION_CALLBACK_CHANNEL_MESSAGE,
        "data": {
            "content": content,
            "flags": MESSAGE_FLAG_EPHEMERAL,
        },
    }))
    .into_response()
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}
