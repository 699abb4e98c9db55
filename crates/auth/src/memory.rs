//! In-process identity provider.
//!
//! Accounts live in memory with Argon2id password hashes stored as PHC
//! strings. Session tokens are the signed HS256 tokens of
//! [`JwtSessionVerifier`]. Sign-out revokes a token until it would have
//! expired anyway.

use std::collections::HashMap;
use std::sync::RwLock;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    AuthConfig, AuthError, EmailPasswordConfig, IdentityProvider, JwtSessionVerifier, Session, SessionUser,
    SignInEmail, SignUpEmail, SignedIn,
};

struct Account {
    user: SessionUser,
    /// PHC string, e.g. `$argon2id$v=19$...`.
    password_hash: String,
}

pub struct MemoryIdentityProvider {
    verifier: JwtSessionVerifier,
    email_and_password: EmailPasswordConfig,
    accounts: RwLock<HashMap<String, Account>>,
    /// Revoked token -> the moment it expires on its own.
    revoked: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl core::fmt::Debug for MemoryIdentityProvider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryIdentityProvider")
            .field("verifier", &self.verifier)
            .field("email_and_password", &self.email_and_password)
            .finish_non_exhaustive()
    }
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Provider(format!("password hashing failed: {e}")))
}

fn verify_password(password: &str, phc: &str) -> Result<bool, AuthError> {
    let parsed =
        PasswordHash::new(phc).map_err(|e| AuthError::Provider(format!("stored password hash is invalid: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn poisoned() -> AuthError {
    AuthError::Provider("account store lock poisoned".to_string())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

impl MemoryIdentityProvider {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            verifier: JwtSessionVerifier::from_config(config),
            email_and_password: config.email_and_password.clone(),
            accounts: RwLock::new(HashMap::new()),
            revoked: RwLock::new(HashMap::new()),
        }
    }

    /// Add an account directly, bypassing the sign-up switch.
    pub fn insert_user(&self, user: SessionUser, password: &str) -> Result<(), AuthError> {
        let key = normalize_email(&user.email);
        if self.accounts.read().map_err(|_| poisoned())?.contains_key(&key) {
            return Err(AuthError::UserAlreadyExists);
        }
        let password_hash = hash_password(password)?;

        let mut accounts = self.accounts.write().map_err(|_| poisoned())?;
        if accounts.contains_key(&key) {
            return Err(AuthError::UserAlreadyExists);
        }
        accounts.insert(key, Account { user, password_hash });
        Ok(())
    }

    pub fn user_count(&self) -> usize {
        self.accounts.read().map(|a| a.len()).unwrap_or(0)
    }

    fn signed_in(&self, user: &SessionUser) -> Result<SignedIn, AuthError> {
        let now = Utc::now();
        let token = self.verifier.issue(user, now)?;
        let session = self.verifier.verify(&token, now)?;
        Ok(SignedIn { token, session })
    }

    fn is_revoked(&self, token: &str) -> Result<bool, AuthError> {
        Ok(self.revoked.read().map_err(|_| poisoned())?.contains_key(token))
    }

    /// Record a revocation and forget the ones that have expired by `now`.
    fn revoke(&self, token: &str, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), AuthError> {
        let mut revoked = self.revoked.write().map_err(|_| poisoned())?;
        revoked.retain(|_, exp| *exp > now);
        revoked.insert(token.to_string(), expires_at);
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_up_email(&self, request: SignUpEmail) -> Result<SignedIn, AuthError> {
        if !self.email_and_password.enabled {
            return Err(AuthError::Disabled("email sign-up"));
        }
        let password_len = request.password.chars().count();
        if password_len < self.email_and_password.min_password_length
            || password_len > self.email_and_password.max_password_length
        {
            return Err(AuthError::InvalidCredentials);
        }

        let mut user = SessionUser::new(normalize_email(&request.email));
        if let Some(name) = request.name {
            user = user.with_name(name);
        }
        self.insert_user(user.clone(), &request.password)?;
        self.signed_in(&user)
    }

    async fn sign_in_email(&self, request: SignInEmail) -> Result<SignedIn, AuthError> {
        if !self.email_and_password.enabled {
            return Err(AuthError::Disabled("email sign-in"));
        }
        let (user, password_hash) = {
            let accounts = self.accounts.read().map_err(|_| poisoned())?;
            let account = accounts
                .get(&normalize_email(&request.email))
                .ok_or(AuthError::InvalidCredentials)?;
            (account.user.clone(), account.password_hash.clone())
        };
        if !verify_password(&request.password, &password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }
        self.signed_in(&user)
    }

    async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let now = Utc::now();
        let session = self.verifier.verify(token, now)?;
        self.revoke(token, session.expires_at, now)
    }

    async fn get_session(&self, token: &str) -> Result<Option<Session>, AuthError> {
        if self.is_revoked(token)? {
            return Ok(None);
        }
        self.verifier.verify(token, Utc::now()).map(Some)
    }
}
