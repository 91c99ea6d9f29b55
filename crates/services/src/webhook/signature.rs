use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use classmeet_config::LiveKitSettings;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::MeetingError;

/// Claims of the token the conferencing service puts in `Authorization`.
#[derive(Debug, Serialize, Deserialize)]
struct WebhookClaims {
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    sha256: Option<String>,
    exp: i64,
}

/// Checks that a webhook body was signed with the shared API secret: the
/// `Authorization` header carries an HS256 JWT whose `sha256` claim is the
/// base64 sha256 of the raw body.
pub struct WebhookVerifier {
    api_key: String,
    decoding_key: DecodingKey,
    enabled: bool,
}

impl WebhookVerifier {
    pub fn new(settings: &LiveKitSettings) -> Self {
        Self {
            api_key: settings.api_key.clone(),
            decoding_key: DecodingKey::from_secret(settings.api_secret.as_bytes()),
            enabled: settings.verify_webhooks,
        }
    }

    pub fn verify(&self, body: &[u8], authorization: Option<&str>) -> Result<(), MeetingError> {
        if !self.enabled {
            return Ok(());
        }

        let header = authorization
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| MeetingError::InvalidSignature("missing authorization".to_string()))?;
        let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();

        let claims = decode::<WebhookClaims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| MeetingError::InvalidSignature(e.to_string()))?
        .claims;

        if claims.iss.as_deref() != Some(self.api_key.as_str()) {
            warn!(issuer = ?claims.iss, "Webhook token issuer does not match the API key");
        }

        let expected = body_digest(body);
        match claims.sha256 {
            Some(claimed) if claimed == expected => Ok(()),
            Some(_) => Err(MeetingError::InvalidSignature(
                "body hash mismatch".to_string(),
            )),
            None => Err(MeetingError::InvalidSignature(
                "token has no body hash".to_string(),
            )),
        }
    }
}

fn body_digest(body: &[u8]) -> String {
    BASE64.encode(Sha256::digest(body))
}

/// Produces an `Authorization` value for `body` the same way the
/// conferencing service does. Used to drive the webhook endpoint in tests
/// and local tooling.
pub fn sign_body(api_key: &str, api_secret: &str, body: &[u8]) -> Result<String, MeetingError> {
    let claims = WebhookClaims {
        iss: Some(api_key.to_string()),
        sha256: Some(body_digest(body)),
        exp: chrono::Utc::now().timestamp() + 300,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(api_secret.as_bytes()),
    )
    .map_err(|e| MeetingError::InvalidSignature(e.to_string()))
}
