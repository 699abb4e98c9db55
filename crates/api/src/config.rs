//! Process configuration, read once at startup.

use routekit_auth::AuthConfig;
use routekit_core::{ConfigurationError, PaginationConfig};

use crate::error::ErrorRendering;
use crate::routing::RouteSettings;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl std::str::FromStr for Environment {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigurationError::invalid(
                "APP_ENV",
                format!("unknown environment `{other}`"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsConfig {
    pub origins: AllowedOrigins,
    /// Only honoured for an explicit origin list.
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: AllowedOrigins::Any,
            allow_credentials: false,
        }
    }
}

impl CorsConfig {
    /// `*` (or nothing) allows any origin; otherwise a comma separated list.
    pub fn parse(raw: &str) -> Self {
        let origins: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            Self::default()
        } else {
            Self {
                origins: AllowedOrigins::List(origins),
                allow_credentials: true,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub cors: CorsConfig,
    pub pagination: PaginationConfig,
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Defaults around an explicit auth configuration. The environment is
    /// production until `APP_ENV` says otherwise.
    pub fn new(auth: AuthConfig) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            environment: Environment::Production,
            cors: CorsConfig::default(),
            pagination: PaginationConfig::default(),
            auth,
        }
    }

    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut config = Self::new(AuthConfig::from_lookup(&lookup)?);

        if let Some(host) = get("HOST") {
            config.host = host;
        }
        if let Some(port) = get("PORT") {
            config.port = port
                .parse()
                .map_err(|_| ConfigurationError::invalid("PORT", "expected a port number"))?;
        }
        if let Some(env) = get("APP_ENV") {
            config.environment = env.parse()?;
        }
        if let Some(origins) = get("CORS_ORIGINS") {
            config.cors = CorsConfig::parse(&origins);
        }

        let limit = |key: &str, default: u64| -> Result<u64, ConfigurationError> {
            get(key).map_or(Ok(default), |v| {
                v.parse()
                    .map_err(|_| ConfigurationError::invalid(key, "expected a positive integer"))
            })
        };
        config.pagination = PaginationConfig::new(
            limit("PAGINATION_DEFAULT_LIMIT", config.pagination.default_limit)?,
            limit("PAGINATION_MAX_LIMIT", config.pagination.max_limit)?,
        )?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.host.is_empty() {
            return Err(ConfigurationError::missing("HOST"));
        }
        PaginationConfig::new(self.pagination.default_limit, self.pagination.max_limit)?;
        if let AllowedOrigins::List(origins) = &self.cors.origins {
            if let Some(bad) = origins.iter().find(|o| !o.starts_with("http://") && !o.starts_with("https://")) {
                return Err(ConfigurationError::invalid(
                    "CORS_ORIGINS",
                    format!("`{bad}` must start with http:// or https://"),
                ));
            }
        }
        self.auth.validate(self.environment == Environment::Production)
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn route_settings(&self) -> RouteSettings {
        RouteSettings {
            pagination: self.pagination,
            errors: ErrorRendering {
                expose_internal: self.is_development(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use axum::body::to_bytes;
    use axum::http::StatusCode;

    use crate::error::ApiError;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn defaults_apply() {
        let cfg = AppConfig::from_lookup(lookup(&[("AUTH_SECRET", SECRET)])).unwrap();
        assert_eq!(cfg.bind_address(), "0.0.0.0:8080");
        assert_eq!(cfg.pagination, PaginationConfig::default());
        assert_eq!(cfg.cors.origins, AllowedOrigins::Any);
        assert_eq!(cfg.environment, Environment::Production);
        assert!(!cfg.route_settings().errors.expose_internal);
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[tokio::test]
    async fn unset_environment_hides_internal_errors() {
        let cfg = AppConfig::from_lookup(lookup(&[("AUTH_SECRET", SECRET)])).unwrap();
        let err = ApiError::from(anyhow::anyhow!("connect to db://admin:hunter2@db"));
        let resp = err.render(cfg.route_settings().errors);
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({ "success": false, "error": "Internal server error" }));
    }

    #[test]
    fn development_must_be_explicit() {
        let cfg = AppConfig::from_lookup(lookup(&[("AUTH_SECRET", SECRET), ("APP_ENV", "development")])).unwrap();
        assert!(cfg.is_development());
        assert!(cfg.route_settings().errors.expose_internal);
    }

    #[test]
    fn reads_overrides() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("AUTH_SECRET", SECRET),
            ("HOST", "127.0.0.1"),
            ("PORT", "3000"),
            ("APP_ENV", "production"),
            ("CORS_ORIGINS", "https://app.example.com, https://admin.example.com"),
            ("PAGINATION_DEFAULT_LIMIT", "20"),
            ("PAGINATION_MAX_LIMIT", "50"),
        ]))
        .unwrap();
        assert_eq!(cfg.bind_address(), "127.0.0.1:3000");
        assert_eq!(cfg.environment, Environment::Production);
        assert!(!cfg.route_settings().errors.expose_internal);
        assert_eq!(cfg.pagination.default_limit, 20);
        assert_eq!(cfg.pagination.max_limit, 50);
        assert!(matches!(&cfg.cors.origins, AllowedOrigins::List(o) if o.len() == 2));
        assert!(cfg.cors.allow_credentials);
    }

    #[test]
    fn missing_secret_is_fatal() {
        let err = AppConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigurationError::missing("AUTH_SECRET"));
    }

    #[test]
    fn rejects_inverted_pagination_bounds() {
        let err = AppConfig::from_lookup(lookup(&[
            ("AUTH_SECRET", SECRET),
            ("PAGINATION_DEFAULT_LIMIT", "200"),
            ("PAGINATION_MAX_LIMIT", "100"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::Invalid { .. }));
    }

    #[test]
    fn production_requires_long_secret() {
        let cfg = AppConfig::from_lookup(lookup(&[("AUTH_SECRET", "short"), ("APP_ENV", "prod")])).unwrap();
        assert!(cfg.validate().is_err());

        let unset = AppConfig::from_lookup(lookup(&[("AUTH_SECRET", "short")])).unwrap();
        assert!(unset.validate().is_err());

        let dev = AppConfig::from_lookup(lookup(&[("AUTH_SECRET", "short"), ("APP_ENV", "dev")])).unwrap();
        assert_eq!(dev.validate(), Ok(()));
    }

    #[test]
    fn wildcard_cors_wins() {
        assert_eq!(CorsConfig::parse("https://a.example, *"), CorsConfig::default());
        assert_eq!(CorsConfig::parse(""), CorsConfig::default());
    }

    #[test]
    fn unknown_environment_is_rejected() {
        assert!("staging".parse::<Environment>().is_err());
        assert_eq!("TEST".parse::<Environment>(), Ok(Environment::Test));
    }
}
