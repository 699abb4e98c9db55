//! Route builder: turns descriptors plus handlers into axum routes and
//! contracts.
//!
//! Every wrapped handler runs the same pipeline: resolve the
//! [`RouteContext`], enforce the session requirement, read the body (JSON or
//! multipart), parse the `:id` param, validate the body, call the handler and
//! shape the result into an envelope. Errors from any step render through
//! [`ApiError::render`].

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, on};
use axum::Router;
use serde::Serialize;
use serde_json::Value;

use routekit_core::{
    ConfigurationError, Page, PageRequest, PaginationConfig, RawPageQuery, ResourceId, Schema,
    ValidationError, validate,
};

use crate::context::RouteContext;
use crate::error::{ApiError, ErrorRendering};
use crate::multipart::extract_form_fields;
use crate::response::{self, Shaped};
use crate::route::{
    ContractInput, HttpMethod, NoRequest, RouteContract, RouteDescriptor, RouteKind, build_contract,
};

/// Request-independent settings shared by every route of an application.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RouteSettings {
    pub pagination: PaginationConfig,
    pub errors: ErrorRendering,
}

/// Query contract of list routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub pagination: PageRequest,
    pub search: Option<String>,
    pub sort: Option<String>,
}

impl ListQuery {
    pub fn from_context(ctx: &RouteContext, config: &PaginationConfig) -> Self {
        let raw = RawPageQuery {
            page: ctx.query.get("page").cloned(),
            limit: ctx.query.get("limit").cloned(),
        };
        let non_empty = |key: &str| {
            ctx.query
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            pagination: config.extract(&raw),
            search: non_empty("search"),
            sort: non_empty("sort"),
        }
    }

    /// Sort field and direction; a leading `-` means descending.
    pub fn sort_key(&self) -> Option<(&str, bool)> {
        self.sort.as_deref().map(|s| match s.strip_prefix('-') {
            Some(field) => (field, true),
            None => (s, false),
        })
    }
}

/// Data of a delete response.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct Deleted {
    pub deleted: bool,
}

/// Collects the routes of one controller.
pub struct RouteBuilder {
    tag: String,
    settings: RouteSettings,
    methods: BTreeMap<String, MethodRouter>,
    registered: BTreeSet<(HttpMethod, String)>,
    contracts: Vec<RouteContract>,
}

impl core::fmt::Debug for RouteBuilder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RouteBuilder")
            .field("tag", &self.tag)
            .field("settings", &self.settings)
            .field("routes", &self.registered)
            .finish()
    }
}

impl RouteBuilder {
    pub fn new(tag: impl Into<String>, settings: RouteSettings) -> Self {
        Self {
            tag: tag.into(),
            settings,
            methods: BTreeMap::new(),
            registered: BTreeSet::new(),
            contracts: Vec::new(),
        }
    }

    pub fn settings(&self) -> &RouteSettings {
        &self.settings
    }

    pub fn contracts(&self) -> &[RouteContract] {
        &self.contracts
    }

    /// `POST path`: validated body in, created resource out (201 by default).
    pub fn create<S, H, Fut, T>(
        &mut self,
        path: &str,
        descriptor: RouteDescriptor<S>,
        handler: H,
    ) -> Result<&mut Self, ConfigurationError>
    where
        S: Schema,
        H: Fn(RouteContext, S::Output) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let request_schema = Some(descriptor.request.json_schema());
        let contract = self.contract(RouteKind::Create, HttpMethod::Post, path, &descriptor, request_schema)?;
        let status = success_status(&contract);
        let schema = Arc::new(descriptor.request);
        let (security, multipart) = (descriptor.security, descriptor.multipart);

        let route = move |req: Request| {
            let handler = handler.clone();
            let schema = Arc::clone(&schema);
            async move {
                let (ctx, body) = prepare(req, security, multipart).await?;
                let input = validate(&body, &*schema)?;
                let data = handler(ctx, input).await?;
                Ok::<_, ApiError>(response::success_with(data, status))
            }
        };
        self.mount(contract, route);
        Ok(self)
    }

    /// `GET path`: paginated listing. The handler gets the resolved
    /// [`ListQuery`] and returns one [`Page`].
    pub fn list<H, Fut, T>(
        &mut self,
        path: &str,
        descriptor: RouteDescriptor<NoRequest>,
        handler: H,
    ) -> Result<&mut Self, ConfigurationError>
    where
        H: Fn(RouteContext, ListQuery) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Page<T>, ApiError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let contract = self.contract(RouteKind::List, HttpMethod::Get, path, &descriptor, None)?;
        let status = success_status(&contract);
        let security = descriptor.security;
        let pagination = self.settings.pagination;

        let route = move |req: Request| {
            let handler = handler.clone();
            async move {
                let ctx = context(req, security).await?.0;
                let query = ListQuery::from_context(&ctx, &pagination);
                let PageRequest { page, limit, .. } = query.pagination;
                let Page { items, total } = handler(ctx, query).await?;
                let mut shaped = response::paginated(items, total, page, limit);
                shaped.status = status;
                Ok::<_, ApiError>(shaped)
            }
        };
        self.mount(contract, route);
        Ok(self)
    }

    /// `GET path` with an `:id` segment. The handler reports absence with
    /// [`ApiError::NotFound`].
    pub fn get_by_id<H, Fut, T>(
        &mut self,
        path: &str,
        descriptor: RouteDescriptor<NoRequest>,
        handler: H,
    ) -> Result<&mut Self, ConfigurationError>
    where
        H: Fn(RouteContext, ResourceId) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let contract = self.contract(RouteKind::GetById, HttpMethod::Get, path, &descriptor, None)?;
        let status = success_status(&contract);
        let security = descriptor.security;

        let route = move |req: Request| {
            let handler = handler.clone();
            async move {
                let ctx = context(req, security).await?.0;
                let id = resource_id(&ctx)?;
                let data = handler(ctx, id).await?;
                Ok::<_, ApiError>(response::success_with(data, status))
            }
        };
        self.mount(contract, route);
        Ok(self)
    }

    /// `PUT path` with an `:id` segment and a validated body.
    pub fn update<S, H, Fut, T>(
        &mut self,
        path: &str,
        descriptor: RouteDescriptor<S>,
        handler: H,
    ) -> Result<&mut Self, ConfigurationError>
    where
        S: Schema,
        H: Fn(RouteContext, ResourceId, S::Output) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let request_schema = Some(descriptor.request.json_schema());
        let contract = self.contract(RouteKind::Update, HttpMethod::Put, path, &descriptor, request_schema)?;
        let status = success_status(&contract);
        let schema = Arc::new(descriptor.request);
        let (security, multipart) = (descriptor.security, descriptor.multipart);

        let route = move |req: Request| {
            let handler = handler.clone();
            let schema = Arc::clone(&schema);
            async move {
                let (ctx, body) = prepare(req, security, multipart).await?;
                let id = resource_id(&ctx)?;
                let input = validate(&body, &*schema)?;
                let data = handler(ctx, id, input).await?;
                Ok::<_, ApiError>(response::success_with(data, status))
            }
        };
        self.mount(contract, route);
        Ok(self)
    }

    /// `DELETE path` with an `:id` segment. Responds with `{deleted}`.
    pub fn delete<H, Fut>(
        &mut self,
        path: &str,
        descriptor: RouteDescriptor<NoRequest>,
        handler: H,
    ) -> Result<&mut Self, ConfigurationError>
    where
        H: Fn(RouteContext, ResourceId) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, ApiError>> + Send + 'static,
    {
        let contract = self.contract(RouteKind::Delete, HttpMethod::Delete, path, &descriptor, None)?;
        let status = success_status(&contract);
        let security = descriptor.security;

        let route = move |req: Request| {
            let handler = handler.clone();
            async move {
                let ctx = context(req, security).await?.0;
                let id = resource_id(&ctx)?;
                let deleted = handler(ctx, id).await?;
                Ok::<_, ApiError>(response::success_with(Deleted { deleted }, status))
            }
        };
        self.mount(contract, route);
        Ok(self)
    }

    /// Any other bodiless endpoint.
    pub fn action<H, Fut, T>(
        &mut self,
        method: HttpMethod,
        path: &str,
        descriptor: RouteDescriptor<NoRequest>,
        handler: H,
    ) -> Result<&mut Self, ConfigurationError>
    where
        H: Fn(RouteContext) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let contract = self.contract(RouteKind::Action, method, path, &descriptor, None)?;
        let status = success_status(&contract);
        let security = descriptor.security;

        let route = move |req: Request| {
            let handler = handler.clone();
            async move {
                let ctx = context(req, security).await?.0;
                let data = handler(ctx).await?;
                Ok::<_, ApiError>(response::success_with(data, status))
            }
        };
        self.mount(contract, route);
        Ok(self)
    }

    /// Any other endpoint taking a validated body.
    pub fn action_with_body<S, H, Fut, T>(
        &mut self,
        method: HttpMethod,
        path: &str,
        descriptor: RouteDescriptor<S>,
        handler: H,
    ) -> Result<&mut Self, ConfigurationError>
    where
        S: Schema,
        H: Fn(RouteContext, S::Output) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let request_schema = Some(descriptor.request.json_schema());
        let contract = self.contract(RouteKind::Action, method, path, &descriptor, request_schema)?;
        let status = success_status(&contract);
        let schema = Arc::new(descriptor.request);
        let (security, multipart) = (descriptor.security, descriptor.multipart);

        let route = move |req: Request| {
            let handler = handler.clone();
            let schema = Arc::clone(&schema);
            async move {
                let (ctx, body) = prepare(req, security, multipart).await?;
                let input = validate(&body, &*schema)?;
                let data = handler(ctx, input).await?;
                Ok::<_, ApiError>(response::success_with(data, status))
            }
        };
        self.mount(contract, route);
        Ok(self)
    }

    /// Endpoint acting on one resource: an `:id` segment plus a validated
    /// body. Documents the `id` parameter and a 404 like the other by-id
    /// routes.
    pub fn action_by_id<S, H, Fut, T>(
        &mut self,
        method: HttpMethod,
        path: &str,
        descriptor: RouteDescriptor<S>,
        handler: H,
    ) -> Result<&mut Self, ConfigurationError>
    where
        S: Schema,
        H: Fn(RouteContext, ResourceId, S::Output) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let request_schema = Some(descriptor.request.json_schema());
        let contract = self.contract(RouteKind::ActionById, method, path, &descriptor, request_schema)?;
        let status = success_status(&contract);
        let schema = Arc::new(descriptor.request);
        let (security, multipart) = (descriptor.security, descriptor.multipart);

        let route = move |req: Request| {
            let handler = handler.clone();
            let schema = Arc::clone(&schema);
            async move {
                let (ctx, body) = prepare(req, security, multipart).await?;
                let id = resource_id(&ctx)?;
                let input = validate(&body, &*schema)?;
                let data = handler(ctx, id, input).await?;
                Ok::<_, ApiError>(response::success_with(data, status))
            }
        };
        self.mount(contract, route);
        Ok(self)
    }

    /// Consume the builder into an axum router and the registered contracts.
    pub fn into_parts(self) -> (Router, Vec<RouteContract>) {
        let router = self
            .methods
            .into_iter()
            .fold(Router::new(), |router, (path, methods)| router.route(&path, methods));
        (router, self.contracts)
    }

    fn contract<Req>(
        &mut self,
        kind: RouteKind,
        method: HttpMethod,
        path: &str,
        descriptor: &RouteDescriptor<Req>,
        request_schema: Option<Value>,
    ) -> Result<RouteContract, ConfigurationError> {
        let contract = build_contract(ContractInput {
            kind,
            method,
            path,
            default_tag: &self.tag,
            request_schema,
            response: &descriptor.response,
            tag: descriptor.tag.as_deref(),
            summary: descriptor.summary.as_deref(),
            description: descriptor.description.as_deref(),
            security: descriptor.security,
            multipart: descriptor.multipart,
            success_status: descriptor.success_status,
        })?;

        if !self.registered.insert((method, contract.path.clone())) {
            return Err(ConfigurationError::DuplicateRoute {
                method: method.to_string(),
                path: contract.path,
            });
        }
        Ok(contract)
    }

    fn mount<F, Fut, T>(&mut self, contract: RouteContract, route: F)
    where
        F: FnOnce(Request) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Shaped<T>, ApiError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let route = wrap(contract.method, route, self.settings.errors);
        let path = contract.path.clone();
        let merged = match self.methods.remove(&path) {
            Some(existing) => existing.merge(route),
            None => route,
        };
        self.methods.insert(path, merged);
        self.contracts.push(contract);
    }
}

fn success_status(contract: &RouteContract) -> StatusCode {
    StatusCode::from_u16(contract.success_status).unwrap_or(StatusCode::OK)
}

fn wrap<F, Fut, T>(method: HttpMethod, route: F, errors: ErrorRendering) -> MethodRouter
where
    F: FnOnce(Request) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Shaped<T>, ApiError>> + Send + 'static,
    T: Serialize + Send + 'static,
{
    on(method.filter(), move |req: Request| async move {
        render(route(req).await, errors)
    })
}

fn render<T: Serialize>(result: Result<Shaped<T>, ApiError>, errors: ErrorRendering) -> Response {
    match result {
        Ok(shaped) => shaped.into_response(),
        Err(err) => err.render(errors),
    }
}

/// Resolve the request context and enforce the session requirement.
async fn context(req: Request, security: bool) -> Result<(RouteContext, Request), ApiError> {
    let (mut parts, body) = req.into_parts();
    let ctx = RouteContext::from_parts(&mut parts).await;
    if security {
        ctx.require_user()?;
    }
    Ok((ctx, Request::from_parts(parts, body)))
}

/// Context plus the decoded body. Auth is checked before the body is read.
async fn prepare(req: Request, security: bool, multipart: bool) -> Result<(RouteContext, Value), ApiError> {
    let (mut ctx, req) = context(req, security).await?;

    if multipart {
        let form = Multipart::from_request(req, &())
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        let (value, files) = extract_form_fields(form).await?.into_value();
        ctx.files = files;
        return Ok((ctx, value));
    }

    let bytes = Bytes::from_request(req, &())
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok((ctx, decode_json(&bytes)?))
}

fn decode_json(bytes: &[u8]) -> Result<Value, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes).map_err(|_| ApiError::BadRequest("Invalid JSON body".to_string()))
}

fn resource_id(ctx: &RouteContext) -> Result<ResourceId, ApiError> {
    ctx.param("id")
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| ValidationError::single("id", "Invalid uuid").into())
}
