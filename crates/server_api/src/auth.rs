use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid session token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("session secret is empty")]
    EmptySecret,
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        ApiError::new(ErrorCode::Unauthorized, value.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 signing material for admin sessions.
#[derive(Clone)]
pub struct SessionKeys {
    secret: String,
    ttl_seconds: i64,
}

impl SessionKeys {
    pub fn new(secret: impl Into<String>, ttl_seconds: i64) -> Result<Self, AuthError> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(AuthError::EmptySecret);
        }
        Ok(Self {
            secret,
            ttl_seconds,
        })
    }

    pub fn mint(&self, subject: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.ttl_seconds)).timestamp(),
        };
        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )?;
        Ok(data.claims)
    }

    /// Resolves an `Authorization` header value to the session subject.
    pub fn verify_bearer(&self, header: Option<&str>) -> Result<String, AuthError> {
        let token = header
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;
        Ok(self.verify(token)?.sub)
    }
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
