use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use routekit_auth::SessionResolver;
use routekit_core::RequestId;

use crate::config::{AllowedOrigins, CorsConfig};
use crate::context::AuthUser;
use crate::response;

pub const SESSION_COOKIE: &str = "session_token";
pub const X_REQUEST_ID: &str = "x-request-id";

#[derive(Clone)]
pub struct SessionState {
    pub resolver: Arc<dyn SessionResolver>,
}

/// Resolve the caller's session, if any, and expose it as [`AuthUser`].
///
/// Never rejects: routes that need a user enforce it themselves.
pub async fn session_middleware(State(state): State<SessionState>, mut req: Request, next: Next) -> Response {
    if let Some(token) = extract_token(req.headers()) {
        match state.resolver.get_session(&token).await {
            Ok(Some(session)) => {
                req.extensions_mut().insert(AuthUser::new(session));
            }
            Ok(None) => {}
            Err(err) => tracing::debug!(error = %err, "session token rejected"),
        }
    }
    next.run(req).await
}

/// Bearer token from `Authorization`, falling back to the session cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Assign a request id and log one event per request.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<RequestId>().ok())
        .unwrap_or_default();
    req.extensions_mut().insert(request_id);

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let mut resp = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        resp.headers_mut().insert(X_REQUEST_ID, value);
    }
    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = resp.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    resp
}

pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([HeaderName::from_static(X_REQUEST_ID)]);

    match &config.origins {
        AllowedOrigins::Any => layer.allow_origin(AllowOrigin::any()),
        AllowedOrigins::List(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| match HeaderValue::from_str(o) {
                    Ok(v) => Some(v),
                    Err(_) => {
                        tracing::warn!(origin = %o, "ignoring unparsable CORS origin");
                        None
                    }
                })
                .collect();
            layer
                .allow_origin(AllowOrigin::list(origins))
                .allow_credentials(config.allow_credentials)
        }
    }
}

/// Response for a panicking handler: logged, rendered as a generic 500.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    tracing::error!(panic = %detail, "handler panicked");
    response::server_error("Internal server error").into_response()
}

pub async fn not_found_fallback(uri: Uri) -> Response {
    tracing::debug!(path = %uri.path(), "no route matched");
    response::error("Route not found", StatusCode::NOT_FOUND).into_response()
}
