use super::artifacts::LoadedArtifacts;
use super::container::Container;
use super::events::EventDispatcher;
use super::middleware::MiddlewareChain;
use super::registry::Registry;
use super::response::{self, Request, Response};
use super::router::Router;
use crate::config::CompilerConfig;
use crate::emit::ArtifactKind;
use crate::error::RuntimeError;
use std::sync::Arc;

/// Everything the runtime serves, booted from the compiled artifacts
pub struct Kernel {
    container: Arc<Container>,
    router: Router,
    middleware: MiddlewareChain,
    events: EventDispatcher,
}

impl Kernel {
    /// Load and check the artifacts, then wire the runtime
    ///
    /// Fails fast when an artifact is missing or stale, when a middleware
    /// cannot be constructed, or when a function it names is not registered.
    pub fn boot(config: &CompilerConfig, registry: Registry) -> Result<Self, RuntimeError> {
        Self::from_artifacts(LoadedArtifacts::load(config)?, registry)
    }

    pub fn from_artifacts(
        artifacts: LoadedArtifacts,
        registry: Registry,
    ) -> Result<Self, RuntimeError> {
        let router_path = artifacts.path(ArtifactKind::Router);
        let registry = Arc::new(registry);
        let container = Container::new(
            artifacts.container.plan,
            artifacts.container.config,
            registry.clone(),
        );
        let router =
            Router::new(artifacts.router, container.clone(), registry.clone()).map_err(|e| {
                RuntimeError::ArtifactInvalid {
                    path: router_path,
                    message: e.to_string(),
                }
            })?;
        let middleware = MiddlewareChain::resolve(&artifacts.middleware, &container, &registry)?;
        let events = EventDispatcher::new(artifacts.listeners, container.clone(), registry);

        tracing::info!(
            services = container.plan().services.len(),
            routes = router.plan().len(),
            middleware = artifacts.middleware.entries.len(),
            "Kernel booted"
        );
        Ok(Self {
            container,
            router,
            middleware,
            events,
        })
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Run a request through the middleware chain and the router
    ///
    /// Errors become JSON error responses with the error's status code.
    pub fn handle(&self, request: Request) -> Response {
        let endpoint = |request: Request| self.router.dispatch(&request);
        match self.middleware.handle(request, &endpoint) {
            Ok(response) => response,
            Err(err) => {
                let status = err.status_code();
                if status >= 500 {
                    tracing::error!(error = %err, "Request failed");
                } else {
                    tracing::warn!(error = %err, "Request rejected");
                }
                response::error(status, &err.to_string())
            }
        }
    }
}
