use super::container::Container;
use super::registry::{MiddlewareFn, Registry};
use super::response::{Request, Response};
use super::value::Instance;
use crate::error::RuntimeError;
use crate::middleware::MiddlewarePlan;

/// One resolved middleware
struct Link {
    class: String,
    instance: Instance,
    handle: MiddlewareFn,
}

/// The rest of the chain, handed to each middleware
pub struct Next<'a> {
    links: &'a [Link],
    endpoint: &'a dyn Fn(Request) -> Result<Response, RuntimeError>,
}

impl Next<'_> {
    pub fn run(self, request: Request) -> Result<Response, RuntimeError> {
        match self.links.split_first() {
            Some((link, rest)) => (link.handle)(
                &link.instance,
                request,
                Next {
                    links: rest,
                    endpoint: self.endpoint,
                },
            ),
            None => (self.endpoint)(request),
        }
    }
}

/// Middleware in compiled priority order, instances resolved once
pub struct MiddlewareChain {
    links: Vec<Link>,
}

impl MiddlewareChain {
    pub fn resolve(
        plan: &MiddlewarePlan,
        container: &Container,
        registry: &Registry,
    ) -> Result<Self, RuntimeError> {
        let links = plan
            .entries
            .iter()
            .map(|entry| {
                Ok(Link {
                    class: entry.class.clone(),
                    instance: container.get(&entry.class)?,
                    handle: registry.middleware(&entry.class)?,
                })
            })
            .collect::<Result<Vec<_>, RuntimeError>>()?;
        Ok(Self { links })
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.links.iter().map(|link| link.class.as_str())
    }

    pub fn handle(
        &self,
        request: Request,
        endpoint: &dyn Fn(Request) -> Result<Response, RuntimeError>,
    ) -> Result<Response, RuntimeError> {
        Next {
            links: &self.links,
            endpoint,
        }
        .run(request)
    }
}
