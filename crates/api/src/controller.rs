//! Controllers: named bundles of routes under one base path.

use axum::Router;

use routekit_core::ConfigurationError;

use crate::route::RouteContract;
use crate::routing::{RouteBuilder, RouteSettings};

/// A bundle of routes.
///
/// Implementors populate the builder in [`init_routes`](Self::init_routes);
/// [`ControllerRouter::build`] calls it exactly once.
pub trait Controller: Send + Sync {
    /// Default tag for this controller's routes. The type name without a
    /// trailing `Controller` (`ItemsController` becomes `Items`).
    fn name(&self) -> String {
        controller_name(std::any::type_name::<Self>())
    }

    /// Prefix every route of this controller is mounted under.
    fn base_path(&self) -> &str;

    fn init_routes(&self, routes: &mut RouteBuilder) -> Result<(), ConfigurationError>;
}

fn controller_name(type_name: &str) -> String {
    let short = type_name
        .split('<')
        .next()
        .and_then(|path| path.rsplit("::").next())
        .unwrap_or(type_name);
    match short.strip_suffix("Controller") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => short.to_string(),
    }
}

/// The router and contracts one controller produced.
#[derive(Debug)]
pub struct ControllerRouter {
    name: String,
    base_path: String,
    router: Router,
    contracts: Vec<RouteContract>,
}

impl ControllerRouter {
    pub fn build<C>(controller: &C, settings: RouteSettings) -> Result<Self, ConfigurationError>
    where
        C: Controller + ?Sized,
    {
        let base_path = controller.base_path().to_string();
        if !base_path.starts_with('/') {
            return Err(ConfigurationError::invalid_route(
                base_path,
                "controller base path must start with `/`",
            ));
        }

        let name = controller.name();
        let mut routes = RouteBuilder::new(name.clone(), settings);
        controller.init_routes(&mut routes)?;
        let (router, contracts) = routes.into_parts();

        Ok(Self {
            name,
            base_path,
            router,
            contracts,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Contracts relative to the base path.
    pub fn contracts(&self) -> &[RouteContract] {
        &self.contracts
    }

    pub fn into_parts(self) -> (String, Router, Vec<RouteContract>) {
        (self.base_path, self.router, self.contracts)
    }
}
