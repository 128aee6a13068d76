use crate::error::{AppError, Result};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Access token claims issued by the identity provider. `sub` is the user id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub aud: String,
}

impl Claims {
    #[must_use]
    pub fn new(user_id: Uuid, ttl_secs: u64, audience: &str) -> Self {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        let exp = usize::try_from(now.saturating_add(ttl_secs)).unwrap_or(usize::MAX);
        Self { sub: user_id, exp, aud: audience.to_string() }
    }

    /// Signs the claims with HS256.
    ///
    /// # Errors
    /// Returns `AppError::Internal` if encoding fails.
    pub fn encode(&self, secret: &str) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), self, &EncodingKey::from_secret(secret.as_bytes()))
            .map_err(|_| AppError::Internal)
    }

    /// Verifies signature, expiry and audience.
    ///
    /// # Errors
    /// Returns `AppError::AuthError` if the token is invalid for any reason.
    pub fn decode(token: &str, secret: &str, audience: &str) -> Result<Self> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[audience]);

        let token_data = decode::<Self>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token rejected");
                AppError::AuthError
            })?;

        Ok(token_data.claims)
    }
}
