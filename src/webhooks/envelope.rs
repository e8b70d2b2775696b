//! Parsing of the signed webhook envelope.
//!
//! Inbound webhooks arrive as a compact three-segment token:
//! `base64url(header).base64url(payload).base64url(signature)`. Parsing here
//! is purely structural; nothing is trusted until
//! [`WebhookVerifier`](super::WebhookVerifier) has checked the signature.

use crate::error::{LockgateError, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;

/// The protected header of a signed envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvelopeHeader {
    /// Declared signature algorithm, e.g. `ES512`.
    pub alg: String,
    /// Identifier of the signing key within the provider's key set.
    pub kid: String,
}

/// A structurally valid, not yet verified webhook envelope.
#[derive(Debug, Clone)]
pub struct WebhookEnvelope {
    header: EnvelopeHeader,
    /// The exact bytes the signature covers: `header_b64.payload_b64`.
    signing_input: Vec<u8>,
    payload: Vec<u8>,
    signature: Vec<u8>,
}

impl WebhookEnvelope {
    /// Parse a raw token into its three segments.
    ///
    /// Fails with [`LockgateError::MalformedWebhook`] on anything other than
    /// three non-empty, base64url-decodable segments with a JSON header
    /// carrying `alg` and `kid`.
    pub fn parse(token: &str) -> Result<Self> {
        let token = token.trim();
        let mut segments = token.split('.');
        let (header_b64, payload_b64, signature_b64) = match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some(h), Some(p), Some(s), None) => (h, p, s),
            _ => {
                return Err(LockgateError::malformed(
                    "expected three dot-separated segments",
                ))
            }
        };

        if header_b64.is_empty() || payload_b64.is_empty() || signature_b64.is_empty() {
            return Err(LockgateError::malformed("empty segment"));
        }

        let header_bytes = decode_segment(header_b64, "header")?;
        let payload = decode_segment(payload_b64, "payload")?;
        let signature = decode_segment(signature_b64, "signature")?;

        let header: EnvelopeHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| LockgateError::malformed(format!("invalid header: {}", e)))?;

        if header.kid.is_empty() {
            return Err(LockgateError::malformed("header has an empty kid"));
        }

        let signing_input = format!("{}.{}", header_b64, payload_b64).into_bytes();

        Ok(Self {
            header,
            signing_input,
            payload,
            signature,
        })
    }

    pub fn header(&self) -> &EnvelopeHeader {
        &self.header
    }

    pub fn alg(&self) -> &str {
        &self.header.alg
    }

    pub fn kid(&self) -> &str {
        &self.header.kid
    }

    /// The bytes covered by the signature.
    pub fn signing_input(&self) -> &[u8] {
        &self.signing_input
    }

    /// The decoded, unverified payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The decoded signature bytes.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| LockgateError::malformed(format!("{} is not valid base64url: {}", name, e)))
}
