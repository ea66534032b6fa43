use super::container::Container;
use super::registry::Registry;
use super::response::{self, Request, Response};
use super::value::{Args, Value};
use crate::error::RuntimeError;
use crate::metadata::{DefaultValue, HttpMethod, PrimitiveKind};
use crate::routing::{RouteArgSource, RouteCall, RouteMatch, RouteMatcher, RouterPlan};
use std::sync::Arc;

/// Router served from a compiled [`RouterPlan`]
pub struct Router {
    matcher: RouteMatcher,
    container: Arc<Container>,
    registry: Arc<Registry>,
}

impl Router {
    pub fn new(
        plan: RouterPlan,
        container: Arc<Container>,
        registry: Arc<Registry>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            matcher: RouteMatcher::new(plan)?,
            container,
            registry,
        })
    }

    pub fn plan(&self) -> &RouterPlan {
        self.matcher.plan()
    }

    /// Route for a method and path, without calling it
    pub fn match_route(&self, method: &http::Method, path: &str) -> Option<RouteMatch<'_>> {
        self.matcher.find(HttpMethod::from_http(method)?, path)
    }

    /// Call the route matching the request; not-found is a 404 response
    pub fn dispatch(&self, request: &Request) -> Result<Response, RuntimeError> {
        let Some(found) = self.match_route(request.method(), request.uri().path()) else {
            tracing::debug!(method = %request.method(), path = request.uri().path(), "No route");
            return Ok(response::not_found());
        };
        let call = found.call;
        let args = self.arguments(call, &found.params)?;

        let handle = self.registry.handler(&call.target())?;
        match &call.service {
            Some(id) => {
                let instance = self.container.get(id)?;
                handle(Some(&instance), request, &args)
            }
            None => handle(None, request, &args),
        }
    }

    /// Bind the target's parameters by name
    ///
    /// Request parameters are left out; handlers receive the request itself.
    fn arguments(
        &self,
        call: &RouteCall,
        params: &[(String, String)],
    ) -> Result<Args, RuntimeError> {
        let mut args = Args::new();
        for arg in &call.args {
            let value = match &arg.source {
                RouteArgSource::Captured { coerce } => {
                    let raw = params
                        .iter()
                        .find(|(name, _)| name == &arg.name)
                        .map(|(_, value)| value.as_str())
                        .ok_or_else(|| RuntimeError::MissingArgument {
                            name: arg.name.clone(),
                        })?;
                    coerce_capture(&arg.name, raw, *coerce)?
                }
                RouteArgSource::Request => continue,
                RouteArgSource::Default { value } => match value {
                    DefaultValue::Literal(literal) => Value::from(literal),
                    DefaultValue::Constant(reference) => self.registry.constant(reference)?,
                },
                RouteArgSource::Service { id } => Value::Service(self.container.get(id)?),
            };
            args.insert(arg.name.clone(), value);
        }
        Ok(args)
    }
}

fn coerce_capture(
    name: &str,
    raw: &str,
    kind: Option<PrimitiveKind>,
) -> Result<Value, RuntimeError> {
    let mismatch = |expected| RuntimeError::ArgumentType {
        name: name.to_string(),
        expected,
    };
    Ok(match kind {
        Some(PrimitiveKind::Int) => Value::Int(raw.parse().map_err(|_| mismatch("int"))?),
        Some(PrimitiveKind::Float) => Value::Float(raw.parse().map_err(|_| mismatch("float"))?),
        Some(PrimitiveKind::Bool) => match raw {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => return Err(mismatch("bool")),
        },
        Some(PrimitiveKind::String) | Some(PrimitiveKind::Array) | None => {
            Value::Str(raw.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::container::{ConstructionPlan, ContainerPlan, Origin};
    use crate::routing::path::parse_template;
    use crate::routing::{RouteArg, RouteNode, StaticRoute};
    use crate::runtime::registry::Callable;
    use std::collections::BTreeMap;

    struct UserController {
        prefix: &'static str,
    }

    fn router() -> Router {
        let mut registry = Registry::new();
        registry
            .register(
                "UserController",
                Callable::Constructor(|_| Ok(Arc::new(UserController { prefix: "user" }))),
            )
            .register(
                "UserController::show",
                Callable::Handler(|instance, _request, args| {
                    let controller = instance
                        .and_then(|i| i.downcast_ref::<UserController>())
                        .ok_or_else(|| RuntimeError::handler("no controller", 500))?;
                    let id = args.int("id")?;
                    Ok(response::text(format!("{} {}", controller.prefix, id + 1)))
                }),
            )
            .register(
                "Health::check",
                Callable::Handler(|instance, request, args| {
                    assert!(instance.is_none());
                    Ok(response::text(format!(
                        "{} {}",
                        request.uri().path(),
                        args.str("verbose")?
                    )))
                }),
            );
        let registry = Arc::new(registry);

        let container = Container::new(
            ContainerPlan {
                services: vec![ConstructionPlan {
                    id: "UserController".into(),
                    class: "UserController".into(),
                    factory: None,
                    singleton: true,
                    origin: Origin::Discovered,
                    args: Vec::new(),
                }],
                aliases: Vec::new(),
            },
            CompilerConfig::default(),
            registry.clone(),
        );

        let mut requirements = BTreeMap::new();
        requirements.insert("id".to_string(), "\\d+".to_string());
        let mut plan = RouterPlan::default();
        plan.tries.entry(HttpMethod::Get).or_insert_with(RouteNode::root).insert(
            &parse_template("/users/{id}"),
            &requirements,
            RouteCall {
                class: "UserController".into(),
                method: "show".into(),
                service: Some("UserController".into()),
                args: vec![RouteArg {
                    name: "id".into(),
                    source: RouteArgSource::Captured {
                        coerce: Some(PrimitiveKind::Int),
                    },
                }],
                path: "/users/{id}".into(),
                name: None,
            },
        );
        plan.statics.push(StaticRoute {
            method: HttpMethod::Get,
            path: "/health".into(),
            call: RouteCall {
                class: "Health".into(),
                method: "check".into(),
                service: None,
                args: vec![
                    RouteArg {
                        name: "request".into(),
                        source: RouteArgSource::Request,
                    },
                    RouteArg {
                        name: "verbose".into(),
                        source: RouteArgSource::Default {
                            value: DefaultValue::Literal(crate::metadata::Literal::Str(
                                "no".into(),
                            )),
                        },
                    },
                ],
                path: "/health".into(),
                name: Some("health".into()),
            },
        });
        Router::new(plan, container, registry).unwrap()
    }

    fn get(router: &Router, path: &str) -> Response {
        router
            .dispatch(&response::request(http::Method::GET, path))
            .unwrap()
    }

    #[test]
    fn test_captured_parameter_is_coerced() {
        let router = router();
        let response = get(&router, "/users/42");
        assert_eq!(response.status(), 200);
        assert_eq!(response.body().as_ref(), b"user 43");
    }

    #[test]
    fn test_requirement_mismatch_is_not_found() {
        assert_eq!(get(&router(), "/users/abc").status(), 404);
    }

    #[test]
    fn test_static_target_gets_request_and_defaults() {
        let response = get(&router(), "/health");
        assert_eq!(response.body().as_ref(), b"/health no");
    }

    #[test]
    fn test_match_route_introspection() {
        let router = router();
        let found = router.match_route(&http::Method::GET, "/users/7").unwrap();
        assert_eq!(found.call.target(), "UserController::show");
        assert!(router.match_route(&http::Method::DELETE, "/users/7").is_none());
        assert!(router.match_route(&http::Method::OPTIONS, "/health").is_none());
    }
}
