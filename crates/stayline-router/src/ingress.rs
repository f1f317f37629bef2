//! Webhook ingress: signature verification and payload decoding.

use anyhow::{bail, Context, Result};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verifies a `sha256=<hex>` signature header over the raw request body.
pub fn verify_sha256_hmac_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(hex_signature) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Some(signature) = decode_hex(hex_signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

fn decode_hex(input: &str) -> Option<Vec<u8>> {
    if input.len() % 2 != 0 {
        return None;
    }
    (0..input.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(&input[index..index + 2], 16).ok())
        .collect()
}

/// One decoded inbound message, channel provider specifics stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Phone number on shared-phone channels, opaque user token on
    /// direct-chat channels.
    pub sender_id: String,
    pub text: String,
    pub provider_message_id: Option<String>,
    pub sender_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(alias = "from", alias = "user_id")]
    sender: String,
    #[serde(default)]
    text: String,
    #[serde(default, alias = "id")]
    message_id: Option<String>,
    #[serde(default, alias = "profile_name")]
    name: Option<String>,
}

/// Decodes the webhook body into an [`InboundMessage`].
pub fn parse_inbound(body: &[u8]) -> Result<InboundMessage> {
    let payload: WebhookPayload =
        serde_json::from_slice(body).context("decoding webhook payload")?;
    if payload.sender.trim().is_empty() {
        bail!("webhook payload carries no sender");
    }
    Ok(InboundMessage {
        sender_id: payload.sender,
        text: payload.text,
        provider_message_id: payload.message_id,
        sender_name: payload.name,
    })
}
