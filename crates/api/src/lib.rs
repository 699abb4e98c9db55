//! HTTP API: route registration, response shaping and application wiring.

pub mod app;
pub mod auth_module;
pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod middleware;
pub mod multipart;
pub mod openapi;
pub mod orchestrator;
pub mod response;
pub mod route;
pub mod routing;

pub use app::{App, build_app, build_app_with};
pub use config::{AppConfig, CorsConfig, Environment};
pub use context::{AuthUser, RouteContext};
pub use controller::{Controller, ControllerRouter};
pub use error::{ApiError, ErrorRendering};
pub use orchestrator::{
    ComponentHealth, HealthCheckable, HealthReport, HealthState, Initializable, Module, Orchestrator,
    OrchestratorError, RouteRegistrar, RouteTable, Service,
};
pub use response::{Envelope, Shaped};
pub use route::{HttpMethod, RouteContract, RouteDescriptor, RouteKind};
pub use routing::{ListQuery, RouteBuilder, RouteSettings};
