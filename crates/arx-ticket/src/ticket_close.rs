//! Staff-only ticket closure: transcript, log delivery, delayed deletion.

use arx_discord::{DiscordAttachmentUpload, DiscordMessage};
use serde_json::json;

use crate::ticket_workflow::TicketWorkflow;

pub const CLOSE_TICKET_CUSTOM_ID: &str = "close_ticket";
pub const CLOSE_DENIED_REPLY: &str = "Non hai il permesso di chiudere questo ticket.";
pub const CLOSE_IN_PROGRESS_REPLY: &str = "Chiusura ticket in corso...";

#[derive(Debug, Clone)]
/// Close request extracted from the button interaction payload.
pub struct CloseTicketRequest {
    pub channel_id: String,
    pub channel_name: String,
    pub actor_id: String,
    pub actor_username: String,
    pub actor_role_ids: Vec<String>,
}

/// Serializes fetched history (newest first) into chronological
/// `display name: content` lines.
pub fn render_transcript(messages: &[DiscordMessage]) -> String {
    messages
        .iter()
        .rev()
        .map(|message| format!("{}: {}", message.author.display_name(), message.content))
        .collect::<Vec<_>>()
        .join("\n")
}

impl TicketWorkflow {
    /// The close button is staff-only; everyone else gets a private denial
    /// and nothing changes.
    pub fn authorize_close(&self, request: &CloseTicketRequest) -> bool {
        request
            .actor_role_ids
            .iter()
            .any(|role_id| role_id == &self.config.staff_role_id)
    }

    /// Archives and removes a ticket after the actor was acknowledged.
    ///
    /// Runs detached from the triggering request: every failure past this
    /// point is logged rather than surfaced, and deletion happens after a
    /// fixed delay so the acknowledgement stays visible.
    pub async fn finalize_close(&self, request: CloseTicketRequest) {
        tracing::info!(
            channel_id = %request.channel_id,
            closed_by = %request.actor_username,
            "ticket closure started"
        );

        match self
            .api
            .fetch_channel_messages(&request.channel_id, self.config.transcript_fetch_limit)
            .await
        {
            Ok(messages) => {
                let transcript = render_transcript(&messages);
                self.deliver_transcript(&request, transcript).await;
            }
            Err(error) => {
                tracing::warn!(
                    channel_id = %request.channel_id,
                    %error,
                    "transcript fetch failed; delivery skipped"
                );
            }
        }

        tokio::time::sleep(self.config.delete_delay).await;
        if let Err(error) = self.api.delete_channel(&request.channel_id).await {
            tracing::warn!(
                channel_id = %request.channel_id,
                %error,
                "ticket channel deletion failed"
            );
        } else {
            tracing::info!(channel_id = %request.channel_id, "ticket channel deleted");
        }
    }

    async fn deliver_transcript(&self, request: &CloseTicketRequest, transcript: String) {
        let log_channel_id = self.config.log_channel_id.trim();
        if log_channel_id.is_empty() {
            tracing::warn!(
                channel_id = %request.channel_id,
                "log channel not configured; transcript delivery skipped"
            );
            return;
        }

        let payload = json!({
            "content": format!("Ticket chiuso da {}", request.actor_username),
        });
        let attachment = DiscordAttachmentUpload {
            filename: format!("transcript-{}.txt", request.channel_name),
            bytes: transcript.into_bytes(),
        };
        if let Err(error) = self
            .api
            .create_message(log_channel_id, &payload, &[attachment])
            .await
        {
            tracing::warn!(
                channel_id = %request.channel_id,
                log_channel_id,
                %error,
                "transcript delivery failed"
            );
        }
    }
}
