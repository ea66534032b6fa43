use super::path::{self, Segment};
use super::{RouteArg, RouteArgSource, RouteCall, RouteNode, RouterPlan, StaticRoute};
use crate::config::{split_target, CompilerConfig};
use crate::container::ContainerPlan;
use crate::error::{CompileError, Diagnostic, DiagnosticKind};
use crate::metadata::{Annotation, ClassDescriptor, HttpMethod, MethodDescriptor, PrimitiveKind};
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};

/// A route before its target has been bound
struct RouteDefinition<'a> {
    method: HttpMethod,
    path: String,
    requirements: BTreeMap<String, String>,
    name: Option<String>,
    class: &'a str,
    target: &'a str,
}

impl RouteDefinition<'_> {
    fn subject(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Compiles route annotations and manual routes into a [`RouterPlan`]
///
/// Needs the finished container plan: non-static targets must be
/// constructible and target parameters may be bound to services.
pub struct RouteCompiler<'a> {
    config: &'a CompilerConfig,
    classes: &'a [ClassDescriptor],
    services: &'a ContainerPlan,
}

impl<'a> RouteCompiler<'a> {
    pub fn new(
        config: &'a CompilerConfig,
        classes: &'a [ClassDescriptor],
        services: &'a ContainerPlan,
    ) -> Self {
        Self {
            config,
            classes,
            services,
        }
    }

    pub fn compile(&self, diagnostics: &mut Vec<Diagnostic>) -> Result<RouterPlan, CompileError> {
        let definitions = self.definitions()?;
        let by_name: HashMap<&str, &ClassDescriptor> = self
            .classes
            .iter()
            .map(|c| (c.name.as_str(), c))
            .collect();

        let mut plan = RouterPlan::default();
        let mut statics: HashMap<(HttpMethod, String), usize> = HashMap::new();

        for definition in definitions {
            let subject = definition.subject();
            let call = match self.bind(&definition, &by_name) {
                Ok(call) => call,
                Err(kind) => {
                    tracing::debug!(route = %subject, ?kind, "Route omitted");
                    diagnostics.push(Diagnostic::error(subject, kind));
                    continue;
                }
            };

            let segments = path::parse_template(&definition.path);
            let is_static = segments.iter().all(|s| matches!(s, Segment::Literal(_)));
            let replaced = if is_static {
                let key = (definition.method, definition.path.clone());
                match statics.get(&key) {
                    Some(&i) => Some(std::mem::replace(&mut plan.statics[i].call, call)),
                    None => {
                        statics.insert(key, plan.statics.len());
                        plan.statics.push(StaticRoute {
                            method: definition.method,
                            path: definition.path.clone(),
                            call,
                        });
                        None
                    }
                }
            } else {
                plan.tries
                    .entry(definition.method)
                    .or_insert_with(RouteNode::root)
                    .insert(&segments, &definition.requirements, call)
            };

            if let Some(previous) = replaced {
                if self.config.strict_routes {
                    return Err(CompileError::RouteConflict {
                        method: definition.method,
                        path: definition.path,
                        existing: previous.target(),
                        replacement: format!("{}::{}", definition.class, definition.target),
                    });
                }
                tracing::warn!(
                    route = %subject,
                    previous = %previous.target(),
                    "Route registered twice, last registration wins"
                );
                diagnostics.push(Diagnostic::warning(
                    subject,
                    DiagnosticKind::RouteOverwritten {
                        previous: previous.target(),
                    },
                ));
            }
        }

        tracing::debug!(
            statics = plan.statics.len(),
            methods = plan.tries.len(),
            "Routes compiled"
        );
        Ok(plan)
    }

    /// Discovered routes in class and method order, then manual routes
    fn definitions(&self) -> Result<Vec<RouteDefinition<'a>>, CompileError> {
        let mut definitions = Vec::new();
        let classes: &'a [ClassDescriptor] = self.classes;
        for class in classes {
            let prefix = class.route_prefix().unwrap_or("");
            for method in &class.methods {
                for annotation in &method.annotations {
                    if let Annotation::Route {
                        method: http_method,
                        path,
                        requirements,
                        name,
                    } = annotation
                    {
                        definitions.push(RouteDefinition {
                            method: *http_method,
                            path: self.checked_path(prefix, path, &class.name)?,
                            requirements: requirements.iter().cloned().collect(),
                            name: name.clone(),
                            class: &class.name,
                            target: &method.name,
                        });
                    }
                }
            }
        }

        let config: &'a CompilerConfig = self.config;
        for route in &config.routes {
            let (class, target) = split_target(&route.target).ok_or_else(|| {
                CompileError::declaration(&route.target, "target must have the form Class::method")
            })?;
            definitions.push(RouteDefinition {
                method: route.method,
                path: self.checked_path("", &route.path, &route.target)?,
                requirements: route.requirements.clone(),
                name: route.name.clone(),
                class,
                target,
            });
        }

        for definition in &definitions {
            validate_requirements(definition)?;
        }
        Ok(definitions)
    }

    fn checked_path(&self, prefix: &str, path: &str, owner: &str) -> Result<String, CompileError> {
        if !path.starts_with('/') {
            return Err(CompileError::declaration(
                owner,
                format!("route path '{}' must start with '/'", path),
            ));
        }
        Ok(path::join(prefix, path))
    }

    /// Bind every target parameter, or explain why the route is dropped
    fn bind(
        &self,
        definition: &RouteDefinition<'_>,
        classes: &HashMap<&str, &ClassDescriptor>,
    ) -> Result<RouteCall, DiagnosticKind> {
        let target = format!("{}::{}", definition.class, definition.target);
        let method: &MethodDescriptor = classes
            .get(definition.class)
            .and_then(|class| class.method(definition.target))
            .ok_or_else(|| DiagnosticKind::MissingTarget {
                target: target.clone(),
            })?;

        let service = if method.is_static {
            None
        } else if self.services.has(definition.class) {
            Some(definition.class.to_string())
        } else {
            return Err(DiagnosticKind::MissingTarget {
                target: definition.class.to_string(),
            });
        };

        let captures: HashSet<&str> = path::parse_template(&definition.path)
            .into_iter()
            .filter_map(|s| match s {
                Segment::Capture(name) => Some(name),
                Segment::Literal(_) => None,
            })
            .collect();

        let mut args = Vec::with_capacity(method.params.len());
        for param in &method.params {
            let source = if captures.contains(param.name.as_str()) {
                RouteArgSource::Captured {
                    coerce: param.ty.primitive().filter(|kind| {
                        !matches!(kind, PrimitiveKind::String | PrimitiveKind::Array)
                    }),
                }
            } else if param.ty.identifier() == Some(self.config.capabilities.request.as_str()) {
                RouteArgSource::Request
            } else if let Some(value) = &param.default {
                RouteArgSource::Default {
                    value: value.clone(),
                }
            } else if self.services.has(&param.name) {
                RouteArgSource::Service {
                    id: param.name.clone(),
                }
            } else if let Some(ty) = param.ty.identifier().filter(|ty| self.services.has(ty)) {
                RouteArgSource::Service { id: ty.to_string() }
            } else {
                return Err(DiagnosticKind::UnboundRouteParameter {
                    param: param.name.clone(),
                });
            };
            args.push(RouteArg {
                name: param.name.clone(),
                source,
            });
        }

        Ok(RouteCall {
            class: definition.class.to_string(),
            method: definition.target.to_string(),
            service,
            args,
            path: definition.path.clone(),
            name: definition.name.clone(),
        })
    }
}

fn validate_requirements(definition: &RouteDefinition<'_>) -> Result<(), CompileError> {
    let segments = path::parse_template(&definition.path);
    let mut seen = HashSet::new();
    for segment in &segments {
        if let Segment::Capture(name) = segment {
            if !seen.insert(*name) {
                return Err(CompileError::declaration(
                    definition.subject(),
                    format!("parameter '{}' captured twice", name),
                ));
            }
        }
    }
    for (param, pattern) in &definition.requirements {
        if !seen.contains(param.as_str()) {
            return Err(CompileError::declaration(
                definition.subject(),
                format!("requirement for '{}' which is not in the path", param),
            ));
        }
        Regex::new(&path::anchored(pattern)).map_err(|source| {
            CompileError::InvalidRequirement {
                path: definition.path.clone(),
                param: param.clone(),
                source,
            }
        })?;
    }
    Ok(())
}
