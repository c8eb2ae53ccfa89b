//! Ed25519 verification for Discord interactions webhook requests.
//!
//! Discord signs `timestamp || raw_body` with the application's key and
//! sends the hex-encoded signature and timestamp as request headers. The
//! webhook must reject anything that does not verify against the
//! application public key.

use anyhow::{anyhow, bail, Result};
use ed25519_dalek::{Signature, VerifyingKey};

pub const SIGNATURE_HEADER: &str = "x-signature-ed25519";
pub const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

/// Verifies an interactions request signature against the application public key.
pub fn verify_interaction_signature(
    public_key_hex: &str,
    signature_hex: &str,
    timestamp: &str,
    body: &[u8],
) -> Result<()> {
    let public_key_bytes = decode_hex_array::<32>(public_key_hex, "public key")?;
    let signature_bytes = decode_hex_array::<64>(signature_hex, "signature")?;

    let verifying_key = VerifyingKey::from_bytes(&public_key_bytes)
        .map_err(|error| anyhow!("invalid interaction public key: {error}"))?;
    let signature = Signature::from_bytes(&signature_bytes);

    let mut message = Vec::with_capacity(timestamp.len() + body.len());
    message.extend_from_slice(timestamp.as_bytes());
    message.extend_from_slice(body);

    verifying_key
        .verify_strict(&message, &signature)
        .map_err(|error| anyhow!("interaction signature verification failed: {error}"))
}

fn decode_hex_array<const N: usize>(raw: &str, label: &str) -> Result<[u8; N]> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("interaction {label} header cannot be empty");
    }
    let decoded = hex::decode(raw)
        .map_err(|error| anyhow!("interaction {label} is not valid hex: {error}"))?;
    decoded
        .try_into()
        .map_err(|_| anyhow!("interaction {label} must be {N} bytes"))
}
