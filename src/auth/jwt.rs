//! HMAC-signed JWT issuing and validation.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::{AuthContext, Role};
use crate::infra::ServiceError;

const ISSUER: &str = "ccm-platform";
const AUDIENCE: &str = "ccm-services";

/// Token claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user identity).
    pub sub: String,
    /// Role string; see [`Role::parse`].
    pub role: String,
    pub iss: String,
    pub aud: String,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Issued at (Unix timestamp).
    pub iat: i64,
}

/// Validates and issues bearer tokens for both services.
pub struct JwtValidator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtValidator {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    pub fn issue(
        &self,
        user_id: &str,
        role: Role,
        ttl: Duration,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            role: role.as_str().to_string(),
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(format!("token encoding failed: {e}")))
    }

    pub fn validate(&self, token: &str) -> Result<AuthContext, ServiceError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[AUDIENCE]);

        let data =
            decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        ServiceError::Unauthorized("token expired".into())
                    }
                    _ => ServiceError::Unauthorized("invalid token".into()),
                }
            })?;

        let role = Role::parse(&data.claims.role)
            .ok_or_else(|| ServiceError::Unauthorized("unknown role".into()))?;

        Ok(AuthContext::new(data.claims.sub, role))
    }
}
