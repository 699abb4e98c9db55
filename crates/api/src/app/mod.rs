//! HTTP application wiring: orchestrator, modules and the outer layers.
//!
//! - `store.rs`: the in-memory item store, registered as a service
//! - `items.rs`: the items controller and its module
//!
//! The auth module lives in [`crate::auth_module`].

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::catch_panic::CatchPanicLayer;

use routekit_auth::{IdentityProvider, MemoryIdentityProvider};
use routekit_observability::{Logger, TracingLogger};

use crate::auth_module::AuthModule;
use crate::config::AppConfig;
use crate::middleware::{self, SessionState};
use crate::openapi::{ApiInfo, build_document};
use crate::orchestrator::{HealthReport, HealthState, MountedRoutes, Orchestrator, OrchestratorError};
use crate::response::{self, Envelope, Shaped};
use crate::route::RouteContract;

pub mod items;
pub mod store;

pub use items::{ItemsController, ItemsModule};
pub use store::ItemStore;

pub const STORE_SERVICE: &str = "items-store";

/// A fully initialized application.
pub struct App {
    pub router: Router,
    pub orchestrator: Arc<Orchestrator>,
    pub contracts: Vec<RouteContract>,
}

impl core::fmt::Debug for App {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("App")
            .field("orchestrator", &self.orchestrator)
            .field("routes", &self.contracts.len())
            .finish_non_exhaustive()
    }
}

/// Build the full HTTP application (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> Result<App, OrchestratorError> {
    build_app_with(config, Arc::new(TracingLogger), None).await
}

/// Like [`build_app`], with an explicit logger and identity provider. The
/// in-memory provider is used when `provider` is `None`.
pub async fn build_app_with(
    config: &AppConfig,
    logger: Arc<dyn Logger>,
    provider: Option<Arc<dyn IdentityProvider>>,
) -> Result<App, OrchestratorError> {
    let provider =
        provider.unwrap_or_else(|| Arc::new(MemoryIdentityProvider::new(&config.auth)) as Arc<dyn IdentityProvider>);
    let store = Arc::new(ItemStore::new());
    let auth = Arc::new(AuthModule::new(config.auth.clone(), provider, Arc::clone(&logger)));
    let session_state = SessionState {
        resolver: Arc::new(auth.sessions()),
    };

    let mut orchestrator = Orchestrator::new(Arc::clone(&logger), config.route_settings());
    orchestrator
        .register_service(STORE_SERVICE, store.clone())?
        .register_module("auth", auth)?
        .register_module("items", Arc::new(ItemsModule::new(store, Arc::clone(&logger))))?;

    let MountedRoutes { router, contracts } = orchestrator.initialize().await?;
    let orchestrator = Arc::new(orchestrator);

    let info = ApiInfo::new("routekit", env!("CARGO_PKG_VERSION"))
        .description("Resource routes with uniform envelopes, pagination and validation.");
    let document = Arc::new(build_document(&info, &contracts));

    let health = {
        let orchestrator = Arc::clone(&orchestrator);
        get(move || {
            let orchestrator = Arc::clone(&orchestrator);
            async move { health_response(orchestrator.health_status().await) }
        })
    };
    let openapi = get(move || {
        let document = Arc::clone(&document);
        async move { Json((*document).clone()) }
    });

    let router = Router::new()
        .route("/health", health)
        .route("/openapi.json", openapi)
        .merge(router)
        .fallback(middleware::not_found_fallback)
        .layer(axum::middleware::from_fn_with_state(
            session_state,
            middleware::session_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(CatchPanicLayer::custom(middleware::panic_response))
        .layer(middleware::cors_layer(&config.cors));

    Ok(App {
        router,
        orchestrator,
        contracts,
    })
}

/// 200 while healthy or degraded, 503 once every component is down.
pub fn health_response(report: HealthReport) -> Shaped<HealthReport> {
    match report.status {
        HealthState::Healthy | HealthState::Degraded => response::success(report),
        HealthState::Unhealthy => Shaped {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: Envelope {
                success: false,
                data: Some(report),
                error: Some("Service unhealthy".to_string()),
                details: None,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use routekit_auth::AuthConfig;
    use routekit_observability::NoopLogger;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::orchestrator::ComponentHealth;

    async fn app() -> App {
        let config = AppConfig::new(AuthConfig::new("test-secret", "http://localhost:8080"));
        build_app_with(&config, Arc::new(NoopLogger), None).await.unwrap()
    }

    async fn get_json(router: &Router, uri: &str) -> (StatusCode, Value) {
        let resp = router
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_the_store() {
        let app = app().await;
        let (status, body) = get_json(&app.router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "healthy");
        assert_eq!(body["data"]["services"][STORE_SERVICE]["healthy"], true);
    }

    #[tokio::test]
    async fn health_degrades_after_shutdown() {
        let app = app().await;
        app.orchestrator.shutdown().await;
        let (status, body) = get_json(&app.router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "degraded");
        assert_eq!(body["data"]["services"][STORE_SERVICE]["healthy"], false);
    }

    #[test]
    fn unhealthy_report_is_503() {
        let services = BTreeMap::from([("db".to_string(), ComponentHealth::unhealthy("down"))]);
        let shaped = health_response(HealthReport::aggregate(services, BTreeMap::new()));
        assert_eq!(shaped.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(shaped.body.error.as_deref(), Some("Service unhealthy"));
    }

    #[tokio::test]
    async fn openapi_lists_every_contract() {
        let app = app().await;
        let (status, doc) = get_json(&app.router, "/openapi.json").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doc["openapi"], "3.1.0");
        assert!(doc["paths"]["/items/{id}"]["delete"].is_object());
        assert!(doc["paths"]["/api/auth/sign-up/email"]["post"].is_object());
        assert!(app.contracts.iter().any(|c| c.path == "/items/:id/attachments"));
    }

    #[tokio::test]
    async fn attachments_contract_names_the_item_id() {
        let app = app().await;
        let (_, doc) = get_json(&app.router, "/openapi.json").await;
        let upload = &doc["paths"]["/items/{id}/attachments"]["post"];
        assert_eq!(upload["parameters"][0]["name"], "id");
        assert_eq!(upload["parameters"][0]["in"], "path");
        assert!(upload["responses"]["404"].is_object());
        assert!(upload["requestBody"]["content"]["multipart/form-data"].is_object());
    }

    #[tokio::test]
    async fn unknown_route_gets_the_envelope() {
        let app = app().await;
        let (status, body) = get_json(&app.router, "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Route not found");
    }
}
