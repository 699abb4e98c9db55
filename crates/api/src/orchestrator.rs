//! Module/service orchestration.
//!
//! Services and modules are registered by name, then [`Orchestrator::initialize`]
//! runs every service initializer, then every module initializer (each in
//! registration order), and only then asks modules to register their routes.
//! After that the registry is read-only: further registrations and a second
//! `initialize` are configuration errors.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use serde::Serialize;
use thiserror::Error;

use routekit_core::ConfigurationError;
use routekit_observability::{Logger, NoopLogger};

use crate::controller::{Controller, ControllerRouter};
use crate::route::{HttpMethod, RouteContract};
use crate::routing::RouteSettings;

const COMPONENT: &str = "orchestrator";

/// Lifecycle hooks. Both default to no-ops.
#[async_trait]
pub trait Initializable: Send + Sync {
    async fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Health reporting. `None` means the component does not report.
#[async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health(&self) -> Option<ComponentHealth> {
        None
    }
}

/// Contributes routes to the root router once initialization succeeded.
pub trait RouteRegistrar: Send + Sync {
    fn register_routes(&self, routes: &mut RouteTable) -> Result<(), ConfigurationError>;
}

pub trait Service: Initializable + HealthCheckable {}

impl<T: Initializable + HealthCheckable + ?Sized> Service for T {}

pub trait Module: Initializable + HealthCheckable + RouteRegistrar {}

impl<T: Initializable + HealthCheckable + RouteRegistrar + ?Sized> Module for T {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            message: None,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub services: BTreeMap<String, ComponentHealth>,
    pub modules: BTreeMap<String, ComponentHealth>,
}

impl HealthReport {
    pub fn aggregate(
        services: BTreeMap<String, ComponentHealth>,
        modules: BTreeMap<String, ComponentHealth>,
    ) -> Self {
        let (healthy, total) = services
            .values()
            .chain(modules.values())
            .fold((0usize, 0usize), |(h, t), c| (h + usize::from(c.healthy), t + 1));

        let status = if healthy == total {
            HealthState::Healthy
        } else if healthy == 0 {
            HealthState::Unhealthy
        } else {
            HealthState::Degraded
        };

        Self {
            status,
            services,
            modules,
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("failed to initialize {kind} `{name}`")]
    Initialization {
        kind: &'static str,
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Routers contributed by modules, keyed by mount prefix.
#[derive(Debug)]
pub struct RouteTable {
    settings: RouteSettings,
    mounts: Vec<(String, Router)>,
    prefixes: BTreeSet<String>,
    routes: BTreeSet<(HttpMethod, String)>,
    contracts: Vec<RouteContract>,
}

impl RouteTable {
    pub fn new(settings: RouteSettings) -> Self {
        Self {
            settings,
            mounts: Vec::new(),
            prefixes: BTreeSet::new(),
            routes: BTreeSet::new(),
            contracts: Vec::new(),
        }
    }

    pub fn settings(&self) -> &RouteSettings {
        &self.settings
    }

    /// Mount `router` under `prefix`. `contracts` are relative to the prefix.
    ///
    /// Nothing is mounted when any check fails.
    pub fn mount(
        &mut self,
        prefix: &str,
        router: Router,
        contracts: Vec<RouteContract>,
    ) -> Result<(), ConfigurationError> {
        if !prefix.starts_with('/') {
            return Err(ConfigurationError::invalid_route(prefix, "mount prefix must start with `/`"));
        }
        let prefix = match prefix.trim_end_matches('/') {
            "" => "/".to_string(),
            p => p.to_string(),
        };
        if self.prefixes.contains(&prefix) {
            return Err(ConfigurationError::DuplicateMount(prefix));
        }

        let contracts: Vec<RouteContract> = contracts.into_iter().map(|c| c.with_prefix(&prefix)).collect();
        let mut added = BTreeSet::new();
        for c in &contracts {
            let key = (c.method, c.path.clone());
            if self.routes.contains(&key) || !added.insert(key) {
                return Err(ConfigurationError::DuplicateRoute {
                    method: c.method.to_string(),
                    path: c.path.clone(),
                });
            }
        }

        self.routes.extend(added);
        self.contracts.extend(contracts);
        self.prefixes.insert(prefix.clone());
        self.mounts.push((prefix, router));
        Ok(())
    }

    /// Build `controller` with this table's settings and mount it at its base
    /// path.
    pub fn mount_controller<C>(&mut self, controller: &C) -> Result<(), ConfigurationError>
    where
        C: Controller + ?Sized,
    {
        let (base_path, router, contracts) = ControllerRouter::build(controller, self.settings)?.into_parts();
        self.mount(&base_path, router, contracts)
    }

    pub fn contracts(&self) -> &[RouteContract] {
        &self.contracts
    }

    pub fn into_parts(self) -> (Router, Vec<RouteContract>) {
        let router = self
            .mounts
            .into_iter()
            .fold(Router::new(), |root, (prefix, router)| {
                if prefix == "/" {
                    root.merge(router)
                } else {
                    root.nest(&prefix, router)
                }
            });
        (router, self.contracts)
    }
}

/// Output of a successful [`Orchestrator::initialize`].
#[derive(Debug)]
pub struct MountedRoutes {
    pub router: Router,
    pub contracts: Vec<RouteContract>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Phase {
    Registering,
    Ready,
    Failed,
}

struct Registration<T: ?Sized> {
    name: String,
    instance: Arc<T>,
}

pub struct Orchestrator {
    logger: Arc<dyn Logger>,
    settings: RouteSettings,
    services: Vec<Registration<dyn Service>>,
    modules: Vec<Registration<dyn Module>>,
    phase: Phase,
    services_initialized: usize,
    modules_initialized: usize,
}

impl core::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("phase", &self.phase)
            .field("services", &self.services.iter().map(|r| &r.name).collect::<Vec<_>>())
            .field("modules", &self.modules.iter().map(|r| &r.name).collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(Arc::new(NoopLogger), RouteSettings::default())
    }
}

impl Orchestrator {
    pub fn new(logger: Arc<dyn Logger>, settings: RouteSettings) -> Self {
        Self {
            logger,
            settings,
            services: Vec::new(),
            modules: Vec::new(),
            phase: Phase::Registering,
            services_initialized: 0,
            modules_initialized: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn register_service(
        &mut self,
        name: impl Into<String>,
        service: Arc<dyn Service>,
    ) -> Result<&mut Self, ConfigurationError> {
        let name = name.into();
        self.ensure_open("service", &name)?;
        if self.services.iter().any(|r| r.name == name) {
            return Err(ConfigurationError::DuplicateService(name));
        }
        self.logger.debug(COMPONENT, &format!("registered service `{name}`"));
        self.services.push(Registration { name, instance: service });
        Ok(self)
    }

    pub fn register_module(
        &mut self,
        name: impl Into<String>,
        module: Arc<dyn Module>,
    ) -> Result<&mut Self, ConfigurationError> {
        let name = name.into();
        self.ensure_open("module", &name)?;
        if self.modules.iter().any(|r| r.name == name) {
            return Err(ConfigurationError::DuplicateModule(name));
        }
        self.logger.debug(COMPONENT, &format!("registered module `{name}`"));
        self.modules.push(Registration { name, instance: module });
        Ok(self)
    }

    pub fn service(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services
            .iter()
            .find(|r| r.name == name)
            .map(|r| Arc::clone(&r.instance))
    }

    pub fn module(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules
            .iter()
            .find(|r| r.name == name)
            .map(|r| Arc::clone(&r.instance))
    }

    fn ensure_open(&self, kind: &'static str, name: &str) -> Result<(), ConfigurationError> {
        match self.phase {
            Phase::Registering => Ok(()),
            Phase::Ready | Phase::Failed => Err(ConfigurationError::RegistrationClosed {
                kind,
                name: name.to_string(),
            }),
        }
    }

    /// Initialize services, then modules, then collect module routes.
    ///
    /// Runs at most once. On failure nothing is mounted; components that were
    /// already initialized are still cleaned up by [`shutdown`](Self::shutdown).
    pub async fn initialize(&mut self) -> Result<MountedRoutes, OrchestratorError> {
        if self.phase != Phase::Registering {
            return Err(ConfigurationError::AlreadyInitialized.into());
        }
        self.phase = Phase::Failed;

        for reg in &self.services {
            self.logger.info(COMPONENT, &format!("initializing service `{}`", reg.name));
            reg.instance
                .initialize()
                .await
                .map_err(|source| OrchestratorError::Initialization {
                    kind: "service",
                    name: reg.name.clone(),
                    source,
                })?;
            self.services_initialized += 1;
        }

        for reg in &self.modules {
            self.logger.info(COMPONENT, &format!("initializing module `{}`", reg.name));
            reg.instance
                .initialize()
                .await
                .map_err(|source| OrchestratorError::Initialization {
                    kind: "module",
                    name: reg.name.clone(),
                    source,
                })?;
            self.modules_initialized += 1;
        }

        let mut table = RouteTable::new(self.settings);
        for reg in &self.modules {
            reg.instance.register_routes(&mut table)?;
        }
        let (router, contracts) = table.into_parts();

        self.phase = Phase::Ready;
        self.logger.info(
            COMPONENT,
            &format!(
                "initialized {} services, {} modules, {} routes",
                self.services.len(),
                self.modules.len(),
                contracts.len()
            ),
        );
        Ok(MountedRoutes { router, contracts })
    }

    pub async fn health_status(&self) -> HealthReport {
        let mut services = BTreeMap::new();
        for reg in &self.services {
            if let Some(h) = reg.instance.health().await {
                services.insert(reg.name.clone(), h);
            }
        }
        let mut modules = BTreeMap::new();
        for reg in &self.modules {
            if let Some(h) = reg.instance.health().await {
                modules.insert(reg.name.clone(), h);
            }
        }
        HealthReport::aggregate(services, modules)
    }

    /// Clean up modules, then services, in registration order. Only
    /// components whose initializer succeeded are cleaned up. Failures are
    /// logged and do not stop the remaining cleanups.
    pub async fn shutdown(&self) {
        for reg in self.modules.iter().take(self.modules_initialized) {
            if let Err(err) = reg.instance.cleanup().await {
                self.logger
                    .error(COMPONENT, &format!("cleanup of module `{}` failed: {err:#}", reg.name));
            }
        }
        for reg in self.services.iter().take(self.services_initialized) {
            if let Err(err) = reg.instance.cleanup().await {
                self.logger
                    .error(COMPONENT, &format!("cleanup of service `{}` failed: {err:#}", reg.name));
            }
        }
        self.logger.info(COMPONENT, "shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use routekit_observability::{Level, MemoryLogger};

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        journal: Journal,
        fail_init: bool,
        fail_cleanup: bool,
        health: Option<bool>,
    }

    impl Recorder {
        fn new(name: &'static str, journal: &Journal) -> Self {
            Self {
                name,
                journal: Arc::clone(journal),
                fail_init: false,
                fail_cleanup: false,
                health: None,
            }
        }

        fn note(&self, event: &str) {
            self.journal.lock().unwrap().push(format!("{event}:{}", self.name));
        }
    }

    #[async_trait]
    impl Initializable for Recorder {
        async fn initialize(&self) -> anyhow::Result<()> {
            self.note("init");
            if self.fail_init {
                anyhow::bail!("{} refused to start", self.name);
            }
            Ok(())
        }

        async fn cleanup(&self) -> anyhow::Result<()> {
            self.note("cleanup");
            if self.fail_cleanup {
                anyhow::bail!("{} refused to stop", self.name);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl HealthCheckable for Recorder {
        async fn health(&self) -> Option<ComponentHealth> {
            self.health.map(|ok| {
                if ok {
                    ComponentHealth::healthy()
                } else {
                    ComponentHealth::unhealthy(format!("{} is down", self.name))
                }
            })
        }
    }

    impl RouteRegistrar for Recorder {
        fn register_routes(&self, routes: &mut RouteTable) -> Result<(), ConfigurationError> {
            self.note("routes");
            routes.mount(&format!("/{}", self.name.to_lowercase()), Router::new(), Vec::new())
        }
    }

    fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(journal: &Journal) -> Vec<String> {
        journal.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn services_initialize_before_modules_and_routes_come_last() {
        let j = journal();
        let mut orch = Orchestrator::default();
        orch.register_module("M", Arc::new(Recorder::new("M", &j))).unwrap();
        orch.register_service("A", Arc::new(Recorder::new("A", &j))).unwrap();
        orch.register_service("B", Arc::new(Recorder::new("B", &j))).unwrap();

        orch.initialize().await.unwrap();

        assert_eq!(entries(&j), vec!["init:A", "init:B", "init:M", "routes:M"]);
        assert_eq!(orch.phase(), Phase::Ready);
    }

    #[tokio::test]
    async fn failed_initializer_mounts_nothing() {
        let j = journal();
        let mut broken = Recorder::new("B", &j);
        broken.fail_init = true;

        let mut orch = Orchestrator::default();
        orch.register_service("A", Arc::new(Recorder::new("A", &j))).unwrap();
        orch.register_service("B", Arc::new(broken)).unwrap();
        orch.register_module("M", Arc::new(Recorder::new("M", &j))).unwrap();

        let err = orch.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Initialization { kind: "service", ref name, .. } if name == "B"
        ));
        assert_eq!(entries(&j), vec!["init:A", "init:B"]);

        orch.shutdown().await;
        assert_eq!(entries(&j).last().map(String::as_str), Some("cleanup:A"));
        assert_eq!(entries(&j).len(), 3);
    }

    #[test]
    fn duplicate_names_do_not_overwrite() {
        let j = journal();
        let mut orch = Orchestrator::default();
        let first: Arc<dyn Service> = Arc::new(Recorder::new("first", &j));
        orch.register_service("store", Arc::clone(&first)).unwrap();

        let err = orch
            .register_service("store", Arc::new(Recorder::new("second", &j)))
            .unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateService("store".into()));
        assert!(Arc::ptr_eq(&orch.service("store").unwrap(), &first));

        orch.register_module("m", Arc::new(Recorder::new("m", &j))).unwrap();
        let err = orch.register_module("m", Arc::new(Recorder::new("m", &j))).unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateModule("m".into()));
    }

    #[tokio::test]
    async fn registration_closes_after_initialize() {
        let j = journal();
        let mut orch = Orchestrator::default();
        orch.initialize().await.unwrap();

        let err = orch
            .register_service("late", Arc::new(Recorder::new("late", &j)))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::RegistrationClosed { kind: "service", .. }));

        let err = orch.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Configuration(ConfigurationError::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn duplicate_mount_prefix_fails_initialize() {
        let j = journal();
        let mut orch = Orchestrator::default();
        orch.register_module("one", Arc::new(Recorder::new("Same", &j))).unwrap();
        orch.register_module("two", Arc::new(Recorder::new("Same", &j))).unwrap();

        let err = orch.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Configuration(ConfigurationError::DuplicateMount(ref p)) if p == "/same"
        ));
    }

    #[tokio::test]
    async fn health_is_tri_state() {
        let j = journal();
        let with_health = |name, ok| {
            let mut r = Recorder::new(name, &j);
            r.health = Some(ok);
            Arc::new(r)
        };

        let mut orch = Orchestrator::default();
        orch.register_service("silent", Arc::new(Recorder::new("silent", &j))).unwrap();
        assert_eq!(orch.health_status().await.status, HealthState::Healthy);

        orch.register_service("a", with_health("a", true)).unwrap();
        orch.register_service("b", with_health("b", false)).unwrap();
        let report = orch.health_status().await;
        assert_eq!(report.status, HealthState::Degraded);
        assert_eq!(report.services["b"].message.as_deref(), Some("b is down"));
        assert!(!report.services.contains_key("silent"));

        let mut down = Orchestrator::default();
        down.register_service("x", with_health("x", false)).unwrap();
        down.register_module("y", with_health("y", false)).unwrap();
        assert_eq!(down.health_status().await.status, HealthState::Unhealthy);
    }

    #[tokio::test]
    async fn shutdown_logs_and_continues_past_failures() {
        let j = journal();
        let logger = Arc::new(MemoryLogger::new());
        let mut failing = Recorder::new("M1", &j);
        failing.fail_cleanup = true;

        let mut orch = Orchestrator::new(logger.clone(), RouteSettings::default());
        orch.register_service("S", Arc::new(Recorder::new("S", &j))).unwrap();
        orch.register_module("M1", Arc::new(failing)).unwrap();
        orch.register_module("M2", Arc::new(Recorder::new("M2", &j))).unwrap();
        orch.initialize().await.unwrap();
        orch.shutdown().await;

        let cleanups: Vec<String> = entries(&j).into_iter().filter(|e| e.starts_with("cleanup")).collect();
        assert_eq!(cleanups, vec!["cleanup:M1", "cleanup:M2", "cleanup:S"]);

        let errors = logger.records_at(Level::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("M1 refused to stop"));
    }

    #[test]
    fn route_table_rejects_relative_prefix() {
        let mut table = RouteTable::new(RouteSettings::default());
        assert!(table.mount("api", Router::new(), Vec::new()).is_err());
        table.mount("/", Router::new(), Vec::new()).unwrap();
        assert_eq!(
            table.mount("/", Router::new(), Vec::new()).unwrap_err(),
            ConfigurationError::DuplicateMount("/".into())
        );
    }
}
