//! Authentication module mounted at `/api/auth`.
//!
//! Thin HTTP surface over an [`IdentityProvider`]: email sign-up and sign-in,
//! sign-out and session lookup. State-changing calls that carry an `Origin`
//! header must come from a trusted origin.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::header::ORIGIN;
use axum::http::{HeaderMap, StatusCode};
use serde::Serialize;
use serde_json::json;

use routekit_auth::{
    AuthConfig, AuthError, IdentityProvider, Session, SessionResolver, SignInEmail, SignUpEmail,
};
use routekit_core::{ConfigurationError, Field, ObjectSchema, Typed};
use routekit_observability::Logger;

use crate::controller::Controller;
use crate::error::ApiError;
use crate::middleware::extract_token;
use crate::orchestrator::{ComponentHealth, HealthCheckable, Initializable, RouteRegistrar, RouteTable};
use crate::route::{HttpMethod, RouteDescriptor};
use crate::routing::RouteBuilder;

pub const AUTH_BASE_PATH: &str = "/api/auth";

/// Exposes an identity provider's session lookup to the session middleware.
#[derive(Clone)]
pub struct ProviderSessions(pub Arc<dyn IdentityProvider>);

#[async_trait]
impl SessionResolver for ProviderSessions {
    async fn get_session(&self, token: &str) -> Result<Option<Session>, AuthError> {
        self.0.get_session(token).await
    }
}

#[derive(Debug, Serialize)]
struct SignedOut {
    #[serde(rename = "signedOut")]
    signed_out: bool,
}

fn user_schema() -> ObjectSchema {
    ObjectSchema::new()
        .title("SessionUser")
        .field(Field::uuid("id"))
        .field(Field::email("email"))
        .field(Field::string("name").optional())
        .field(Field::array("roles", routekit_core::FieldKind::string()))
}

fn session_schema() -> ObjectSchema {
    ObjectSchema::new()
        .title("Session")
        .field(Field::object("user", user_schema()))
        .field(Field::string("issuedAt"))
        .field(Field::string("expiresAt"))
}

fn signed_in_schema() -> ObjectSchema {
    ObjectSchema::new()
        .title("SignedIn")
        .field(Field::string("token"))
        .field(Field::object("session", session_schema()))
}

fn check_origin(config: &AuthConfig, headers: &HeaderMap) -> Result<(), ApiError> {
    match headers.get(ORIGIN).map(|v| v.to_str()) {
        None => Ok(()),
        Some(Ok(origin)) if config.is_trusted_origin(origin) => Ok(()),
        Some(_) => Err(ApiError::Forbidden("Untrusted origin".to_string())),
    }
}

fn password(config: &AuthConfig) -> Field {
    let ep = &config.email_and_password;
    Field::string("password")
        .min_len(ep.min_password_length)
        .max_len(ep.max_password_length)
}

pub struct AuthController {
    config: AuthConfig,
    provider: Arc<dyn IdentityProvider>,
}

impl AuthController {
    pub fn new(config: AuthConfig, provider: Arc<dyn IdentityProvider>) -> Self {
        Self { config, provider }
    }
}

impl Controller for AuthController {
    fn base_path(&self) -> &str {
        AUTH_BASE_PATH
    }

    fn init_routes(&self, routes: &mut RouteBuilder) -> Result<(), ConfigurationError> {
        let sign_up: Typed<SignUpEmail> = Typed::new(
            ObjectSchema::new()
                .title("SignUpEmail")
                .field(Field::email("email"))
                .field(password(&self.config))
                .field(Field::string("name").optional()),
        );
        let sign_in: Typed<SignInEmail> = Typed::new(
            ObjectSchema::new()
                .title("SignInEmail")
                .field(Field::email("email"))
                .field(Field::string("password").min_len(1)),
        );

        let config = Arc::new(self.config.clone());

        let provider = Arc::clone(&self.provider);
        let origins = Arc::clone(&config);
        let enabled = self.config.email_and_password.enabled;
        routes.action_with_body(
            HttpMethod::Post,
            "/sign-up/email",
            RouteDescriptor::new(&signed_in_schema())
                .request(sign_up)
                .summary("Sign up with email and password")
                .success_status(StatusCode::CREATED),
            move |ctx, body: SignUpEmail| {
                let provider = Arc::clone(&provider);
                let origins = Arc::clone(&origins);
                async move {
                    check_origin(&origins, &ctx.headers)?;
                    if !enabled {
                        return Err(ApiError::from(AuthError::Disabled("email sign-up")));
                    }
                    provider.sign_up_email(body).await.map_err(ApiError::from)
                }
            },
        )?;

        let provider = Arc::clone(&self.provider);
        let origins = Arc::clone(&config);
        routes.action_with_body(
            HttpMethod::Post,
            "/sign-in/email",
            RouteDescriptor::new(&signed_in_schema())
                .request(sign_in)
                .summary("Sign in with email and password"),
            move |ctx, body: SignInEmail| {
                let provider = Arc::clone(&provider);
                let origins = Arc::clone(&origins);
                async move {
                    check_origin(&origins, &ctx.headers)?;
                    provider.sign_in_email(body).await.map_err(ApiError::from)
                }
            },
        )?;

        let provider = Arc::clone(&self.provider);
        let origins = Arc::clone(&config);
        routes.action(
            HttpMethod::Post,
            "/sign-out",
            RouteDescriptor::with_response_schema(json!({
                "type": "object",
                "properties": { "signedOut": { "type": "boolean" } },
            }))
            .secured()
            .summary("Revoke the current session"),
            move |ctx| {
                let provider = Arc::clone(&provider);
                let origins = Arc::clone(&origins);
                async move {
                    check_origin(&origins, &ctx.headers)?;
                    let token = extract_token(&ctx.headers).ok_or_else(ApiError::unauthorized)?;
                    provider.sign_out(&token).await?;
                    Ok::<_, ApiError>(SignedOut { signed_out: true })
                }
            },
        )?;

        routes.action(
            HttpMethod::Get,
            "/get-session",
            RouteDescriptor::new(&session_schema())
                .summary("Current session")
                .description("Returns the caller's session, or null when anonymous."),
            |ctx| async move { Ok(ctx.user().map(|u| u.session().clone())) },
        )?;

        Ok(())
    }
}

/// Registers the auth routes and reports the provider's health.
pub struct AuthModule {
    config: AuthConfig,
    provider: Arc<dyn IdentityProvider>,
    logger: Arc<dyn Logger>,
}

impl AuthModule {
    pub fn new(config: AuthConfig, provider: Arc<dyn IdentityProvider>, logger: Arc<dyn Logger>) -> Self {
        Self {
            config,
            provider,
            logger,
        }
    }

    pub fn sessions(&self) -> ProviderSessions {
        ProviderSessions(Arc::clone(&self.provider))
    }
}

#[async_trait]
impl Initializable for AuthModule {
    async fn initialize(&self) -> anyhow::Result<()> {
        let social: Vec<String> = self
            .config
            .social_providers
            .iter()
            .map(|s| format!("{:?}", s.provider).to_lowercase())
            .collect();
        self.logger.info(
            "auth",
            &format!(
                "auth ready (email/password: {}, social: [{}], database: {:?})",
                self.config.email_and_password.enabled,
                social.join(", "),
                self.config.database.provider
            ),
        );
        Ok(())
    }
}

#[async_trait]
impl HealthCheckable for AuthModule {
    async fn health(&self) -> Option<ComponentHealth> {
        Some(ComponentHealth::healthy())
    }
}

impl RouteRegistrar for AuthModule {
    fn register_routes(&self, routes: &mut RouteTable) -> Result<(), ConfigurationError> {
        routes.mount_controller(&AuthController::new(self.config.clone(), Arc::clone(&self.provider)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use axum::Router;
    use routekit_auth::MemoryIdentityProvider;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::middleware::{SessionState, session_middleware};
    use crate::routing::RouteSettings;

    fn config() -> AuthConfig {
        AuthConfig::new("test-secret", "http://localhost:8080")
    }

    fn router(config: AuthConfig) -> Router {
        let provider: Arc<dyn IdentityProvider> = Arc::new(MemoryIdentityProvider::new(&config));
        let mut table = RouteTable::new(RouteSettings::default());
        table
            .mount_controller(&AuthController::new(config, Arc::clone(&provider)))
            .unwrap();
        let state = SessionState {
            resolver: Arc::new(ProviderSessions(provider)),
        };
        table
            .into_parts()
            .0
            .layer(axum::middleware::from_fn_with_state(state, session_middleware))
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn sign_up_sign_in_and_session_roundtrip() {
        let app = router(config());

        let (status, body) = call(
            &app,
            post_json(
                "/api/auth/sign-up/email",
                json!({"email": "ada@example.com", "password": "correct horse", "name": "Ada"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["session"]["user"]["email"], "ada@example.com");

        let (status, body) = call(
            &app,
            post_json(
                "/api/auth/sign-in/email",
                json!({"email": "ada@example.com", "password": "correct horse"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["data"]["token"].as_str().unwrap().to_string();

        let req = Request::get("/api/auth/get-session")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (_, body) = call(&app, req).await;
        assert_eq!(body["data"]["user"]["name"], "Ada");

        let req = Request::post("/api/auth/sign-out")
            .header("cookie", format!("session_token={token}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["signedOut"], true);

        let req = Request::get("/api/auth/get-session")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (_, body) = call(&app, req).await;
        assert_eq!(body, json!({"success": true, "data": null}));
    }

    #[tokio::test]
    async fn short_password_fails_validation() {
        let app = router(config());
        let (status, body) = call(
            &app,
            post_json("/api/auth/sign-up/email", json!({"email": "ada@example.com", "password": "short"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"][0]["path"], "password");
    }

    #[tokio::test]
    async fn wrong_password_is_401() {
        let app = router(config());
        let (status, body) = call(
            &app,
            post_json("/api/auth/sign-in/email", json!({"email": "nobody@example.com", "password": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid email or password");
    }

    #[tokio::test]
    async fn disabled_sign_up_is_forbidden() {
        let mut cfg = config();
        cfg.email_and_password.enabled = false;
        let app = router(cfg);
        let (status, _) = call(
            &app,
            post_json(
                "/api/auth/sign-up/email",
                json!({"email": "ada@example.com", "password": "correct horse"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    fn with_origin(mut req: Request<Body>, origin: &str) -> Request<Body> {
        req.headers_mut().insert(ORIGIN, origin.parse().unwrap());
        req
    }

    #[tokio::test]
    async fn untrusted_origin_cannot_sign_up() {
        let mut cfg = config();
        cfg.trusted_origins = vec!["https://app.example.com".to_string()];
        let app = router(cfg);
        let body = json!({"email": "ada@example.com", "password": "correct horse"});

        let (status, resp) = call(
            &app,
            with_origin(post_json("/api/auth/sign-up/email", body.clone()), "https://evil.example.com"),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(resp, json!({"success": false, "error": "Untrusted origin"}));

        let (status, _) = call(
            &app,
            with_origin(post_json("/api/auth/sign-up/email", body), "https://app.example.com"),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn base_url_origin_and_originless_calls_are_trusted() {
        let app = router(config());
        let body = json!({"email": "ada@example.com", "password": "correct horse"});
        let (status, _) = call(
            &app,
            with_origin(post_json("/api/auth/sign-up/email", body.clone()), "http://localhost:8080"),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = call(&app, post_json("/api/auth/sign-in/email", body.clone())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(
            &app,
            with_origin(post_json("/api/auth/sign-in/email", body), "http://localhost:3000"),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn sign_out_requires_session() {
        let app = router(config());
        let (status, _) = call(&app, Request::post("/api/auth/sign-out").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
