//! Multipart submission route and static evidence serving.

use anyhow::{Context, Result};
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use arx_ticket::TicketSubmission;
use arx_wizard::{ReportWizard, SecondaryClaim};

use crate::evidence_store::{content_type_for, EvidenceStore, StoredEvidence};
use crate::server_app::AppState;

#[derive(Debug, Default)]
struct SubmissionFields {
    discord_id: String,
    discord_username: String,
    roblox_username: String,
    title: String,
    description: String,
    evidence: Vec<StoredEvidence>,
}

/// Accepts the wizard's multipart submission and runs the ticket workflow.
pub async fn handle_submit(State(state): AppState, multipart: Multipart) -> Response {
    let fields = match read_submission_fields(&state.evidence, multipart).await {
        Ok(fields) => fields,
        Err(error) => {
            tracing::warn!(%error, "malformed report submission");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("Invalid submission: {error}")})),
            )
                .into_response();
        }
    };

    // The server walks the same wizard guards the client does; a request
    // that could not have come from a completed wizard is rejected before
    // any workflow step runs.
    let secondary = SecondaryClaim {
        id: fields.discord_id.clone(),
        username: fields.discord_username.clone(),
        avatar: None,
    };
    let evidence_names = fields
        .evidence
        .iter()
        .map(|stored| stored.file_name.clone())
        .collect::<Vec<_>>();
    if let Err(guard) = ReportWizard::validate_submission(
        &fields.roblox_username,
        secondary,
        &fields.title,
        &fields.description,
        evidence_names,
    ) {
        tracing::info!(reason = %guard, "report submission rejected at boundary");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": guard.to_string()})),
        )
            .into_response();
    }

    let submission = TicketSubmission {
        discord_id: fields.discord_id,
        discord_username: fields.discord_username,
        roblox_username: fields.roblox_username,
        title: fields.title,
        description: fields.description,
        evidence: fields
            .evidence
            .into_iter()
            .map(|stored| stored.path)
            .collect(),
    };

    match state.workflow.submit(&submission).await {
        Ok(ticket) => (
            StatusCode::OK,
            Json(json!({"success": true, "channelId": ticket.channel_id})),
        )
            .into_response(),
        Err(error) => {
            tracing::error!(error = %error.user_message(), "ticket submission failed");
            let status = StatusCode::from_u16(error.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(json!({"error": error.user_message()}))).into_response()
        }
    }
}

async fn read_submission_fields(
    evidence_store: &EvidenceStore,
    mut multipart: Multipart,
) -> Result<SubmissionFields> {
    let mut fields = SubmissionFields::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .context("failed to read multipart field")?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "discordId" => fields.discord_id = read_text(field, &name).await?,
            "discordUsername" => fields.discord_username = read_text(field, &name).await?,
            "robloxUsername" => fields.roblox_username = read_text(field, &name).await?,
            "title" => fields.title = read_text(field, &name).await?,
            "description" => fields.description = read_text(field, &name).await?,
            "evidence" => {
                let original_name = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "evidence".to_string());
                let bytes = field
                    .bytes()
                    .await
                    .with_context(|| format!("failed to read evidence part '{original_name}'"))?;
                let stored = evidence_store.store(&original_name, &bytes)?;
                fields.evidence.push(stored);
            }
            other => {
                tracing::debug!(field = other, "ignoring unknown multipart field");
            }
        }
    }
    Ok(fields)
}

async fn read_text(field: axum::extract::multipart::Field<'_>, name: &str) -> Result<String> {
    field
        .text()
        .await
        .with_context(|| format!("failed to read field '{name}'"))
}

/// Serves previously stored evidence by its flat file name.
pub async fn handle_evidence_download(
    State(state): AppState,
    Path(file_name): Path<String>,
) -> Response {
    match state.evidence.read(&file_name) {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type_for(&file_name))],
            bytes,
        )
            .into_response(),
        Err(error) => {
            tracing::debug!(%file_name, %error, "evidence download miss");
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "file not found"})),
            )
                .into_response()
        }
    }
}
