//! Auth module configuration.
//!
//! One closed struct per concern; defaults are applied in the constructors,
//! and [`AuthConfig::validate`] is run once at startup.

use std::fmt;

use serde::{Deserialize, Serialize};

use routekit_core::ConfigurationError;

/// Minimum secret length enforced in strict (production) mode.
pub const MIN_SECRET_LEN: usize = 32;

/// Longest accepted session lifetime: ten years.
pub const MAX_SESSION_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseProvider {
    #[default]
    Pg,
    Mysql,
    Sqlite,
}

impl std::str::FromStr for DatabaseProvider {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pg" | "postgres" | "postgresql" => Ok(Self::Pg),
            "mysql" => Ok(Self::Mysql),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigurationError::invalid(
                "DATABASE_PROVIDER",
                format!("unsupported provider `{other}` (expected pg, mysql or sqlite)"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    pub provider: DatabaseProvider,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailPasswordConfig {
    pub enabled: bool,
    pub require_email_verification: bool,
    pub min_password_length: usize,
    pub max_password_length: usize,
}

impl Default for EmailPasswordConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            require_email_verification: false,
            min_password_length: 8,
            max_password_length: 128,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocialProvider {
    Github,
    Google,
    Discord,
}

impl SocialProvider {
    pub const ALL: [SocialProvider; 3] = [Self::Github, Self::Google, Self::Discord];

    /// Environment variable prefix, e.g. `GITHUB`.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Self::Github => "GITHUB",
            Self::Google => "GOOGLE",
            Self::Discord => "DISCORD",
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialProviderConfig {
    pub provider: SocialProvider,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for SocialProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocialProviderConfig")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime in seconds, at most [`MAX_SESSION_TTL_SECS`].
    pub expires_in_secs: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expires_in_secs: 60 * 60 * 24 * 7,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub secret: String,
    pub base_url: String,
    pub trusted_origins: Vec<String>,
    pub database: DatabaseConfig,
    pub email_and_password: EmailPasswordConfig,
    pub social_providers: Vec<SocialProviderConfig>,
    pub session: SessionConfig,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("trusted_origins", &self.trusted_origins)
            .field("database", &self.database)
            .field("email_and_password", &self.email_and_password)
            .field("social_providers", &self.social_providers)
            .field("session", &self.session)
            .finish()
    }
}

impl AuthConfig {
    pub fn new(secret: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            base_url: base_url.into(),
            trusted_origins: Vec::new(),
            database: DatabaseConfig::default(),
            email_and_password: EmailPasswordConfig::default(),
            social_providers: Vec::new(),
            session: SessionConfig::default(),
        }
    }

    /// Load from the environment.
    ///
    /// `AUTH_SECRET` is required. Social providers are enabled for every
    /// `<PROVIDER>_CLIENT_ID` / `<PROVIDER>_CLIENT_SECRET` pair present.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let secret = get("AUTH_SECRET").ok_or_else(|| ConfigurationError::missing("AUTH_SECRET"))?;
        let base_url = get("AUTH_URL").unwrap_or_else(|| "http://localhost:8080".to_string());

        let mut config = Self::new(secret, base_url);

        if let Some(origins) = get("AUTH_TRUSTED_ORIGINS") {
            config.trusted_origins = split_list(&origins);
        }
        if let Some(provider) = get("DATABASE_PROVIDER") {
            config.database.provider = provider.parse()?;
        }
        if let Some(enabled) = get("AUTH_EMAIL_PASSWORD") {
            config.email_and_password.enabled = parse_bool("AUTH_EMAIL_PASSWORD", &enabled)?;
        }
        if let Some(ttl) = get("AUTH_SESSION_TTL_SECS") {
            config.session.expires_in_secs = ttl
                .parse()
                .map_err(|_| ConfigurationError::invalid("AUTH_SESSION_TTL_SECS", "expected an integer"))?;
        }

        for provider in SocialProvider::ALL {
            let prefix = provider.env_prefix();
            let id = get(&format!("{prefix}_CLIENT_ID"));
            let secret = get(&format!("{prefix}_CLIENT_SECRET"));
            match (id, secret) {
                (Some(client_id), Some(client_secret)) => config.social_providers.push(SocialProviderConfig {
                    provider,
                    client_id,
                    client_secret,
                }),
                (None, None) => {}
                _ => {
                    return Err(ConfigurationError::invalid(
                        format!("{prefix}_CLIENT_ID/{prefix}_CLIENT_SECRET"),
                        "both the client id and the client secret must be set",
                    ));
                }
            }
        }

        Ok(config)
    }

    /// Check required values. `strict` additionally enforces the production
    /// secret length.
    pub fn validate(&self, strict: bool) -> Result<(), ConfigurationError> {
        if self.secret.trim().is_empty() {
            return Err(ConfigurationError::missing("AUTH_SECRET"));
        }
        if strict && self.secret.len() < MIN_SECRET_LEN {
            return Err(ConfigurationError::invalid(
                "AUTH_SECRET",
                format!("must be at least {MIN_SECRET_LEN} bytes"),
            ));
        }
        if !has_http_scheme(&self.base_url) {
            return Err(ConfigurationError::invalid(
                "AUTH_URL",
                "must start with http:// or https://",
            ));
        }
        if let Some(bad) = self.trusted_origins.iter().find(|o| !has_http_scheme(o)) {
            return Err(ConfigurationError::invalid(
                "AUTH_TRUSTED_ORIGINS",
                format!("`{bad}` must start with http:// or https://"),
            ));
        }
        let ep = &self.email_and_password;
        if ep.min_password_length == 0 || ep.min_password_length > ep.max_password_length {
            return Err(ConfigurationError::invalid(
                "email_and_password.min_password_length",
                "must be between 1 and max_password_length",
            ));
        }
        if !(1..=MAX_SESSION_TTL_SECS).contains(&self.session.expires_in_secs) {
            return Err(ConfigurationError::invalid(
                "AUTH_SESSION_TTL_SECS",
                format!("must be between 1 and {MAX_SESSION_TTL_SECS} seconds"),
            ));
        }
        for social in &self.social_providers {
            if social.client_id.is_empty() || social.client_secret.is_empty() {
                return Err(ConfigurationError::invalid(
                    format!("{}_CLIENT_ID", social.provider.env_prefix()),
                    "client id and secret must not be empty",
                ));
            }
        }
        Ok(())
    }

    pub fn social_provider(&self, provider: SocialProvider) -> Option<&SocialProviderConfig> {
        self.social_providers.iter().find(|s| s.provider == provider)
    }

    /// True when a browser `Origin` may call the auth endpoints: the origin
    /// of `base_url` or one of `trusted_origins`.
    pub fn is_trusted_origin(&self, origin: &str) -> bool {
        let origin = origin_of(origin);
        origin == origin_of(&self.base_url) || self.trusted_origins.iter().any(|t| origin_of(t) == origin)
    }
}

fn has_http_scheme(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// `scheme://host[:port]`, lowercased, without path or trailing slash.
fn origin_of(url: &str) -> String {
    let url = url.trim().to_ascii_lowercase();
    match url.split_once("://") {
        Some((scheme, rest)) => {
            let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
            format!("{scheme}://{authority}")
        }
        None => url,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigurationError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigurationError::invalid(key, "expected a boolean")),
    }
}
