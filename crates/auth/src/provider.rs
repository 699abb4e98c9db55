//! Identity-provider boundary.
//!
//! Account storage, password hashing and social sign-in are the identity
//! library's job. This layer only needs the operations below.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Session, TokenValidationError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("a user with this email already exists")]
    UserAlreadyExists,

    #[error("invalid session token: {0}")]
    InvalidToken(String),

    #[error(transparent)]
    Token(#[from] TokenValidationError),

    #[error("{0} is disabled")]
    Disabled(&'static str),

    #[error("identity provider failure: {0}")]
    Provider(String),
}

/// Resolves the session behind a token.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// `Ok(None)` means the token is well-formed but has no live session.
    async fn get_session(&self, token: &str) -> Result<Option<Session>, AuthError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUpEmail {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInEmail {
    pub email: String,
    pub password: String,
}

/// Result of a successful sign-up or sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedIn {
    pub token: String,
    pub session: Session,
}

/// Full identity-provider surface mounted by the auth module.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up_email(&self, request: SignUpEmail) -> Result<SignedIn, AuthError>;

    async fn sign_in_email(&self, request: SignInEmail) -> Result<SignedIn, AuthError>;

    async fn sign_out(&self, token: &str) -> Result<(), AuthError>;

    async fn get_session(&self, token: &str) -> Result<Option<Session>, AuthError>;
}
