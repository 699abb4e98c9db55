//! Route contracts: the declarative description of one endpoint.
//!
//! A contract is derived from a [`RouteDescriptor`] plus the verb shape it is
//! registered with ([`RouteKind`]). It records everything the documentation
//! generator needs, including the standard error responses every route
//! declares: 400 always, 401 when the route requires a session, 404 for
//! routes addressing a single resource.

use axum::http::StatusCode;
use axum::routing::MethodFilter;
use serde::Serialize;
use serde_json::{Value, json};

use routekit_core::{ConfigurationError, Schema};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    pub(crate) fn filter(&self) -> MethodFilter {
        match self {
            Self::Get => MethodFilter::GET,
            Self::Post => MethodFilter::POST,
            Self::Put => MethodFilter::PUT,
            Self::Patch => MethodFilter::PATCH,
            Self::Delete => MethodFilter::DELETE,
        }
    }
}

impl core::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registration shape a contract was produced by.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    Create,
    List,
    GetById,
    Update,
    Delete,
    Action,
    /// Custom operation on one resource, addressed by `:id`.
    ActionById,
}

impl RouteKind {
    fn verb(&self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::List => "List",
            Self::GetById => "Get",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Action | Self::ActionById => "Call",
        }
    }

    fn addresses_one(&self) -> bool {
        matches!(self, Self::GetById | Self::Update | Self::Delete | Self::ActionById)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamContract {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub description: String,
    pub schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseContract {
    pub status: u16,
    pub description: String,
    pub schema: Value,
}

/// One registered endpoint. Never mutated after registration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteContract {
    pub kind: RouteKind,
    pub method: HttpMethod,
    pub path: String,
    pub tag: String,
    pub summary: String,
    pub description: String,
    pub request_schema: Option<Value>,
    pub response_schema: Value,
    pub requires_auth: bool,
    pub is_multipart: bool,
    pub success_status: u16,
    pub responses: Vec<ResponseContract>,
    pub params: Vec<ParamContract>,
}

impl RouteContract {
    pub fn has_response(&self, status: u16) -> bool {
        self.responses.iter().any(|r| r.status == status)
    }

    /// Same contract mounted under `prefix`.
    pub(crate) fn with_prefix(mut self, prefix: &str) -> Self {
        self.path = join_paths(prefix, &self.path);
        self
    }
}

/// Descriptor type-state for routes without a request body.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRequest;

/// Declarative input to the route builder.
///
/// `Req` is the request-body schema; create and update routes only accept a
/// descriptor that has one.
#[derive(Debug, Clone)]
pub struct RouteDescriptor<Req = NoRequest> {
    pub(crate) request: Req,
    pub(crate) response: Value,
    pub(crate) tag: Option<String>,
    pub(crate) summary: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) security: bool,
    pub(crate) multipart: bool,
    pub(crate) success_status: Option<StatusCode>,
}

impl RouteDescriptor<NoRequest> {
    pub fn new<S: Schema>(response: &S) -> Self {
        Self::with_response_schema(response.json_schema())
    }

    /// Descriptor whose response is documented by a raw JSON schema.
    pub fn with_response_schema(response: Value) -> Self {
        Self {
            request: NoRequest,
            response,
            tag: None,
            summary: None,
            description: None,
            security: false,
            multipart: false,
            success_status: None,
        }
    }

    /// Descriptor for routes whose response shape is fixed by the route kind
    /// (delete).
    pub fn empty() -> Self {
        Self::with_response_schema(json!({}))
    }

    pub fn request<S: Schema>(self, schema: S) -> RouteDescriptor<S> {
        RouteDescriptor {
            request: schema,
            response: self.response,
            tag: self.tag,
            summary: self.summary,
            description: self.description,
            security: self.security,
            multipart: self.multipart,
            success_status: self.success_status,
        }
    }
}

impl<Req> RouteDescriptor<Req> {
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Require an authenticated session.
    pub fn secured(self) -> Self {
        self.security(true)
    }

    pub fn security(mut self, required: bool) -> Self {
        self.security = required;
        self
    }

    /// Accept `multipart/form-data` instead of JSON.
    pub fn multipart(mut self) -> Self {
        self.multipart = true;
        self
    }

    pub fn success_status(mut self, status: StatusCode) -> Self {
        self.success_status = Some(status);
        self
    }
}

pub(crate) struct ContractInput<'a> {
    pub kind: RouteKind,
    pub method: HttpMethod,
    pub path: &'a str,
    pub default_tag: &'a str,
    pub request_schema: Option<Value>,
    pub response: &'a Value,
    pub tag: Option<&'a str>,
    pub summary: Option<&'a str>,
    pub description: Option<&'a str>,
    pub security: bool,
    pub multipart: bool,
    pub success_status: Option<StatusCode>,
}

/// Build and check a contract. Malformed declarations fail here, at
/// registration time.
pub(crate) fn build_contract(input: ContractInput<'_>) -> Result<RouteContract, ConfigurationError> {
    let ContractInput {
        kind,
        method,
        path,
        default_tag,
        request_schema,
        response,
        tag,
        summary,
        description,
        security,
        multipart,
        success_status,
    } = input;

    if !path.starts_with('/') {
        return Err(ConfigurationError::invalid_route(path, "path must start with `/`"));
    }
    if path.contains("//") {
        return Err(ConfigurationError::invalid_route(path, "path contains an empty segment"));
    }
    if kind.addresses_one() && !path.split('/').any(|seg| seg == ":id") {
        return Err(ConfigurationError::invalid_route(
            path,
            "routes addressing one resource need an `:id` segment",
        ));
    }

    let tag = tag.unwrap_or(default_tag).trim().to_string();
    if tag.is_empty() {
        return Err(ConfigurationError::invalid_route(path, "route tag must not be empty"));
    }

    let default_status = match kind {
        RouteKind::Create => StatusCode::CREATED,
        _ => StatusCode::OK,
    };
    let success_status = success_status.unwrap_or(default_status).as_u16();

    let data_schema = match kind {
        RouteKind::List => json!({
            "type": "object",
            "properties": {
                "items": { "type": "array", "items": response },
                "pagination": pagination_schema(),
            },
            "required": ["items", "pagination"],
        }),
        RouteKind::Delete => json!({
            "type": "object",
            "properties": { "deleted": { "type": "boolean" } },
            "required": ["deleted"],
        }),
        _ => response.clone(),
    };
    let response_schema = envelope_schema(data_schema);

    let mut responses = vec![ResponseContract {
        status: success_status,
        description: "Successful response".to_string(),
        schema: response_schema.clone(),
    }];
    responses.push(error_response(400, "Validation error"));
    if security {
        responses.push(error_response(401, "Authentication required"));
    }
    if kind.addresses_one() {
        responses.push(error_response(404, "Resource not found"));
    }

    let mut params = Vec::new();
    if kind.addresses_one() {
        params.push(ParamContract {
            name: "id".to_string(),
            location: ParamLocation::Path,
            required: true,
            description: "Resource identifier".to_string(),
            schema: json!({ "type": "string", "format": "uuid" }),
        });
    }
    if kind == RouteKind::List {
        params.extend(list_query_params());
    }

    let verb = kind.verb();
    Ok(RouteContract {
        kind,
        method,
        path: path.to_string(),
        summary: summary
            .map(str::to_string)
            .unwrap_or_else(|| format!("{verb} {tag}")),
        description: description
            .map(str::to_string)
            .unwrap_or_else(|| default_description(kind, &tag)),
        tag,
        request_schema,
        response_schema,
        requires_auth: security,
        is_multipart: multipart,
        success_status,
        responses,
        params,
    })
}

fn default_description(kind: RouteKind, tag: &str) -> String {
    match kind {
        RouteKind::Create => format!("Create a new {tag} resource"),
        RouteKind::List => format!("List {tag} resources with pagination"),
        RouteKind::GetById => format!("Get a single {tag} resource by id"),
        RouteKind::Update => format!("Update a {tag} resource by id"),
        RouteKind::Delete => format!("Delete a {tag} resource by id"),
        RouteKind::Action => format!("{tag} operation"),
        RouteKind::ActionById => format!("{tag} operation on a single resource"),
    }
}

fn list_query_params() -> Vec<ParamContract> {
    let q = |name: &str, description: &str, schema: Value| ParamContract {
        name: name.to_string(),
        location: ParamLocation::Query,
        required: false,
        description: description.to_string(),
        schema,
    };
    vec![
        q("page", "Page number (1-based)", json!({ "type": "integer", "minimum": 1, "default": 1 })),
        q("limit", "Page size", json!({ "type": "integer", "minimum": 1, "default": 10 })),
        q("search", "Free-text filter", json!({ "type": "string" })),
        q("sort", "Sort key; prefix with `-` for descending", json!({ "type": "string" })),
    ]
}

fn envelope_schema(data: Value) -> Value {
    json!({
        "type": "object",
        "properties": {
            "success": { "type": "boolean" },
            "data": data,
        },
        "required": ["success", "data"],
    })
}

fn error_response(status: u16, description: &str) -> ResponseContract {
    ResponseContract {
        status,
        description: description.to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "success": { "type": "boolean", "const": false },
                "error": { "type": "string" },
                "details": { "type": "array", "items": {} },
            },
            "required": ["success", "error"],
        }),
    }
}

fn pagination_schema() -> Value {
    let int = json!({ "type": "integer", "minimum": 0 });
    let boolean = json!({ "type": "boolean" });
    json!({
        "type": "object",
        "properties": {
            "total": int,
            "page": int,
            "limit": int,
            "totalPages": int,
            "hasNext": boolean,
            "hasPrev": boolean,
            "startIndex": int,
            "endIndex": int,
        },
    })
}

/// Join a mount prefix and a route path (`"/items"` + `"/:id"`).
pub(crate) fn join_paths(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    match (prefix.is_empty(), path) {
        (true, _) => path.to_string(),
        (false, "/") => prefix.to_string(),
        (false, _) => format!("{prefix}{path}"),
    }
}
