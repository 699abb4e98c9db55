use std::collections::HashMap;
use std::convert::Infallible;

use axum::extract::{FromRequestParts, Path, Query};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, Uri};

use routekit_auth::{Session, SessionUser};
use routekit_core::{RequestId, UserId};

use crate::error::ApiError;
use crate::multipart::UploadedFile;

/// Authenticated user for a request.
///
/// Inserted into request extensions by the session middleware; absent for
/// anonymous requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    session: Session,
}

impl AuthUser {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn id(&self) -> UserId {
        self.session.user.id
    }

    pub fn email(&self) -> &str {
        &self.session.user.email
    }

    pub fn user(&self) -> &SessionUser {
        &self.session.user
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// True when the user holds any of `roles`.
    pub fn has_role(&self, roles: &[&str]) -> bool {
        self.session.user.has_any_role(roles)
    }
}

/// Everything a route handler gets to know about its request.
#[derive(Debug, Clone)]
pub struct RouteContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub request_id: Option<RequestId>,
    pub files: Vec<UploadedFile>,
    user: Option<AuthUser>,
}

impl RouteContext {
    pub async fn from_parts(parts: &mut Parts) -> Self {
        let params = Path::<HashMap<String, String>>::from_request_parts(parts, &())
            .await
            .map(|Path(p)| p)
            .unwrap_or_default();
        let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();

        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
            params,
            query,
            request_id: parts.extensions.get::<RequestId>().copied(),
            files: Vec::new(),
            user: parts.extensions.get::<AuthUser>().cloned(),
        }
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    /// The authenticated user, or 401.
    pub fn require_user(&self) -> Result<&AuthUser, ApiError> {
        self.user.as_ref().ok_or_else(ApiError::unauthorized)
    }

    /// The authenticated user if they hold any of `roles`; 401 when
    /// anonymous, 403 otherwise.
    pub fn require_role(&self, roles: &[&str]) -> Result<&AuthUser, ApiError> {
        let user = self.require_user()?;
        if user.has_role(roles) {
            Ok(user)
        } else {
            Err(ApiError::forbidden())
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RouteContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use chrono::{Duration, Utc};
    use routekit_auth::Role;

    fn user(roles: &[&'static str]) -> AuthUser {
        let mut u = SessionUser::new("ada@example.com");
        for r in roles {
            u = u.with_role(Role::new(*r));
        }
        let now = Utc::now();
        AuthUser::new(Session {
            user: u,
            issued_at: now,
            expires_at: now + Duration::hours(1),
        })
    }

    async fn context(with_user: Option<AuthUser>) -> RouteContext {
        let mut req = Request::builder()
            .uri("/items?search=bolt&page=2")
            .body(())
            .unwrap();
        if let Some(u) = with_user {
            req.extensions_mut().insert(u);
        }
        let (mut parts, ()) = req.into_parts();
        RouteContext::from_parts(&mut parts).await
    }

    #[tokio::test]
    async fn parses_query_string() {
        let ctx = context(None).await;
        assert_eq!(ctx.query.get("search").map(String::as_str), Some("bolt"));
        assert_eq!(ctx.query.get("page").map(String::as_str), Some("2"));
        assert!(ctx.params.is_empty());
    }

    #[tokio::test]
    async fn anonymous_requests_fail_require_user() {
        let ctx = context(None).await;
        assert!(matches!(ctx.require_user(), Err(ApiError::Auth(_))));
    }

    #[tokio::test]
    async fn role_membership_is_any_of() {
        let ctx = context(Some(user(&["editor"]))).await;
        assert!(ctx.require_role(&["admin", "editor"]).is_ok());
        assert!(matches!(ctx.require_role(&["admin"]), Err(ApiError::Forbidden(_))));
        assert_eq!(ctx.require_user().unwrap().email(), "ada@example.com");
    }
}
