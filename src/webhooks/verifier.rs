//! Signed-envelope verification.
//!
//! Checks run in a fixed order and any failure is terminal: structural parse,
//! algorithm allow-list (before any key resolution, so a disallowed algorithm
//! never causes a network call), key lookup, ECDSA signature verification,
//! payload decode, and the optional issuance-time skew check. A
//! [`VerifiedWebhookEvent`] can only be produced by passing all of them.

use crate::error::{LockgateError, Result};
use crate::jwks::{Jwk, JwksManager};
use crate::webhooks::envelope::WebhookEnvelope;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use p256::ecdsa::signature::Verifier;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Signature algorithms accepted for webhook envelopes.
///
/// This is a fixed allow-list: the provider signs with the ECDSA family, and
/// everything else (`none`, HMAC, RSA) is rejected outright to rule out
/// algorithm-confusion attacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Es256,
    Es384,
    Es512,
}

impl SignatureAlgorithm {
    /// Every algorithm verification will accept.
    pub const ALLOWED: [SignatureAlgorithm; 3] = [Self::Es256, Self::Es384, Self::Es512];

    /// Look an algorithm up by its JWS name. Case-sensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ES256" => Some(Self::Es256),
            "ES384" => Some(Self::Es384),
            "ES512" => Some(Self::Es512),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Es256 => "ES256",
            Self::Es384 => "ES384",
            Self::Es512 => "ES512",
        }
    }

    /// JWK curve name this algorithm runs on.
    pub fn curve(&self) -> &'static str {
        match self {
            Self::Es256 => "P-256",
            Self::Es384 => "P-384",
            Self::Es512 => "P-521",
        }
    }

    /// Width of one coordinate (and half a raw signature) in bytes.
    fn coordinate_len(&self) -> usize {
        match self {
            Self::Es256 => 32,
            Self::Es384 => 48,
            Self::Es512 => 66,
        }
    }
}

impl std::fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An event whose envelope passed cryptographic verification.
///
/// The constructor is crate-private: values of this type can only originate
/// from [`WebhookVerifier::verify`], so handlers never see unverified input.
#[derive(Debug, Clone)]
pub struct VerifiedWebhookEvent {
    event_type: String,
    payload: serde_json::Value,
    verified_at: DateTime<Utc>,
}

impl VerifiedWebhookEvent {
    pub(crate) fn new(event_type: String, payload: serde_json::Value) -> Self {
        Self {
            event_type,
            payload,
            verified_at: Utc::now(),
        }
    }

    /// The payload's top-level `type` field.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The decoded JSON payload.
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// When verification completed.
    pub fn verified_at(&self) -> DateTime<Utc> {
        self.verified_at
    }

    /// Decode the payload into a typed event struct.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| LockgateError::malformed(format!("payload does not match type: {}", e)))
    }
}

/// Verifies a webhook's signed envelope using keys resolved via
/// [`JwksManager`].
pub struct WebhookVerifier {
    jwks: Arc<JwksManager>,
    clock_skew_tolerance: Option<Duration>,
}

impl WebhookVerifier {
    pub fn new(jwks: Arc<JwksManager>, clock_skew_tolerance: Option<Duration>) -> Self {
        Self {
            jwks,
            clock_skew_tolerance,
        }
    }

    /// Verify a raw webhook token and return the trusted event.
    ///
    /// Yields exactly one event or exactly one discriminable error; failures
    /// are never retried here, since a forged or stale signature is not a
    /// transient fault.
    pub async fn verify(&self, token: &str) -> Result<VerifiedWebhookEvent> {
        let envelope = WebhookEnvelope::parse(token)?;

        // Gate on the allow-list before resolving any key, so a disallowed
        // algorithm never triggers a key-set fetch.
        let algorithm = SignatureAlgorithm::from_name(envelope.alg()).ok_or_else(|| {
            LockgateError::unsupported_algorithm(format!(
                "'{}' is not an accepted signature algorithm",
                envelope.alg()
            ))
        })?;

        let jwk = self.jwks.get_key(envelope.kid()).await?;

        check_key_agreement(algorithm, &jwk)?;
        verify_signature(algorithm, &jwk, envelope.signing_input(), envelope.signature())?;

        let payload: serde_json::Value = serde_json::from_slice(envelope.payload())
            .map_err(|e| LockgateError::malformed(format!("payload is not valid JSON: {}", e)))?;

        self.check_issuance_time(&payload)?;

        let event_type = payload
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LockgateError::malformed("payload has no 'type' field"))?
            .to_string();

        tracing::debug!(
            event_type = %event_type,
            kid = envelope.kid(),
            alg = %algorithm,
            "Webhook signature verified"
        );

        Ok(VerifiedWebhookEvent::new(event_type, payload))
    }

    /// Compare a declared issuance time (`iat`, Unix seconds) against the
    /// configured skew tolerance. Payloads without one pass untouched.
    fn check_issuance_time(&self, payload: &serde_json::Value) -> Result<()> {
        let Some(tolerance) = self.clock_skew_tolerance else {
            return Ok(());
        };
        let Some(iat) = payload.get("iat").and_then(|v| v.as_i64()) else {
            return Ok(());
        };

        let skew = (Utc::now().timestamp() - iat).unsigned_abs();
        if skew > tolerance.as_secs() {
            return Err(LockgateError::StaleTimestamp(format!(
                "declared issuance time is {}s from now (tolerance {}s)",
                skew,
                tolerance.as_secs()
            )));
        }

        Ok(())
    }
}

/// Reject keys whose own declarations disagree with the envelope algorithm.
fn check_key_agreement(algorithm: SignatureAlgorithm, jwk: &Jwk) -> Result<()> {
    if jwk.kty != "EC" {
        return Err(LockgateError::unsupported_algorithm(format!(
            "key '{}' has type '{}', expected 'EC'",
            jwk.kid, jwk.kty
        )));
    }

    if let Some(key_use) = &jwk.key_use {
        if key_use != "sig" {
            return Err(LockgateError::unsupported_algorithm(format!(
                "key '{}' is declared for '{}', not signing",
                jwk.kid, key_use
            )));
        }
    }

    if let Some(declared) = &jwk.alg {
        if declared != algorithm.name() {
            return Err(LockgateError::unsupported_algorithm(format!(
                "envelope declares {} but key '{}' declares {}",
                algorithm, jwk.kid, declared
            )));
        }
    }

    if let Some(crv) = &jwk.crv {
        if crv != algorithm.curve() {
            return Err(LockgateError::unsupported_algorithm(format!(
                "{} requires curve {} but key '{}' is on {}",
                algorithm,
                algorithm.curve(),
                jwk.kid,
                crv
            )));
        }
    }

    Ok(())
}

/// Verify the raw `r || s` signature over the signing input.
fn verify_signature(
    algorithm: SignatureAlgorithm,
    jwk: &Jwk,
    signing_input: &[u8],
    signature: &[u8],
) -> Result<()> {
    let sec1 = sec1_point(algorithm, jwk)?;

    if signature.len() != algorithm.coordinate_len() * 2 {
        tracing::debug!(
            kid = %jwk.kid,
            len = signature.len(),
            "Signature has wrong length for declared algorithm"
        );
        return Err(LockgateError::SignatureInvalid);
    }

    let verified = match algorithm {
        SignatureAlgorithm::Es256 => {
            let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                .map_err(|_| invalid_key_material(jwk))?;
            p256::ecdsa::Signature::from_slice(signature)
                .and_then(|sig| key.verify(signing_input, &sig))
                .is_ok()
        }
        SignatureAlgorithm::Es384 => {
            let key = p384::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                .map_err(|_| invalid_key_material(jwk))?;
            p384::ecdsa::Signature::from_slice(signature)
                .and_then(|sig| key.verify(signing_input, &sig))
                .is_ok()
        }
        SignatureAlgorithm::Es512 => {
            let key = p521::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                .map_err(|_| invalid_key_material(jwk))?;
            p521::ecdsa::Signature::from_slice(signature)
                .and_then(|sig| key.verify(signing_input, &sig))
                .is_ok()
        }
    };

    if !verified {
        tracing::debug!(kid = %jwk.kid, "Webhook signature verification failed");
        return Err(LockgateError::SignatureInvalid);
    }

    Ok(())
}

/// Build the uncompressed SEC1 point (`04 || x || y`) from the JWK's
/// base64url coordinates.
fn sec1_point(algorithm: SignatureAlgorithm, jwk: &Jwk) -> Result<Vec<u8>> {
    let x = decode_coordinate(jwk, jwk.x.as_deref(), "x")?;
    let y = decode_coordinate(jwk, jwk.y.as_deref(), "y")?;

    let expected = algorithm.coordinate_len();
    if x.len() != expected || y.len() != expected {
        return Err(LockgateError::MalformedKeySet(format!(
            "key '{}' has coordinates of length {}/{}, expected {}",
            jwk.kid,
            x.len(),
            y.len(),
            expected
        )));
    }

    let mut sec1 = Vec::with_capacity(1 + expected * 2);
    sec1.push(0x04);
    sec1.extend_from_slice(&x);
    sec1.extend_from_slice(&y);
    Ok(sec1)
}

fn decode_coordinate(jwk: &Jwk, value: Option<&str>, name: &str) -> Result<Vec<u8>> {
    let value = value.ok_or_else(|| {
        LockgateError::MalformedKeySet(format!("key '{}' is missing the {} coordinate", jwk.kid, name))
    })?;
    URL_SAFE_NO_PAD.decode(value).map_err(|_| {
        LockgateError::MalformedKeySet(format!(
            "key '{}' has a {} coordinate that is not base64url",
            jwk.kid, name
        ))
    })
}

fn invalid_key_material(jwk: &Jwk) -> LockgateError {
    LockgateError::MalformedKeySet(format!("key '{}' has invalid EC key material", jwk.kid))
}
