//! Deterministic channel-name derivation for tickets.

const TICKET_NAME_PREFIX: &str = "ticket-";

/// Derives the per-user channel name from the verified display handle.
///
/// Only the portion before the first `#` participates: lower-cased and
/// stripped of everything outside `[a-z0-9]`, then prefixed. The same user
/// always maps to the same name; the duplicate guard depends on that.
pub fn derive_ticket_name(display_handle: &str) -> String {
    let username_part = display_handle.split('#').next().unwrap_or_default();
    let sanitized = username_part
        .to_lowercase()
        .chars()
        .filter(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit())
        .collect::<String>();
    format!("{TICKET_NAME_PREFIX}{sanitized}")
}
