//! HS256 session tokens.

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use async_trait::async_trait;

use crate::{AuthConfig, AuthError, Session, SessionClaims, SessionConfig, SessionResolver, SessionUser, validate_claims};

/// Issues and verifies signed session tokens.
#[derive(Clone)]
pub struct JwtSessionVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    session: SessionConfig,
}

impl core::fmt::Debug for JwtSessionVerifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JwtSessionVerifier")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl JwtSessionVerifier {
    pub fn new(secret: &[u8], session: SessionConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            session,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.secret.as_bytes(), config.session)
    }

    /// Sign a token for `user`, valid for the configured session lifetime.
    pub fn issue(&self, user: &SessionUser, now: DateTime<Utc>) -> Result<String, AuthError> {
        let expires_at = TimeDelta::try_seconds(self.session.expires_in_secs)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| AuthError::Provider("session lifetime out of range".to_string()))?;
        let claims = SessionClaims {
            sub: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            roles: user.roles.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Provider(e.to_string()))
    }

    /// Verify signature and validity window.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Session, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // The window is checked by `validate_claims` against the caller's clock.
        validation.validate_exp = false;
        validation.leeway = 0;

        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        validate_claims(&data.claims, now)?;
        Ok(Session::from(data.claims))
    }
}

#[async_trait]
impl SessionResolver for JwtSessionVerifier {
    async fn get_session(&self, token: &str) -> Result<Option<Session>, AuthError> {
        self.verify(token, Utc::now()).map(Some)
    }
}
