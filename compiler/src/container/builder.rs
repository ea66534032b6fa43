use super::{
    Builtin, FactoryRef, NamedBinding, Origin, ParameterResolver, ServiceDescriptor, ServiceEntry,
    ServiceMap,
};
use crate::config::{CompilerConfig, ServiceDeclaration};
use crate::error::{CompileError, Diagnostic, DiagnosticKind};
use crate::metadata::{ClassDescriptor, Parameter};
use std::collections::{BTreeMap, HashMap};

/// How the parameters of a registered identifier are found
enum ParamSource<'a> {
    Discovered(&'a ClassDescriptor),
    Manual {
        declaration: &'a ServiceDeclaration,
        params: Option<&'a [Parameter]>,
    },
    Builtin,
}

/// Builds the identifier to service mapping
///
/// Registration happens in four passes over the snapshot, in this order:
/// own names of concrete classes, capabilities of concrete classes, manual
/// declarations (which replace anything registered before them), and the
/// builtin container and configuration services.
pub struct ServiceGraphBuilder<'a> {
    config: &'a CompilerConfig,
    classes: &'a [ClassDescriptor],
    by_name: HashMap<&'a str, &'a ClassDescriptor>,
}

impl<'a> ServiceGraphBuilder<'a> {
    pub fn new(config: &'a CompilerConfig, classes: &'a [ClassDescriptor]) -> Self {
        let mut by_name = HashMap::new();
        for class in classes {
            by_name.entry(class.name.as_str()).or_insert(class);
        }
        Self {
            config,
            classes,
            by_name,
        }
    }

    /// Register identifiers and resolve their parameters
    ///
    /// Identifiers with an unresolvable parameter are left out of the result
    /// and reported; ambiguous identifiers stay in as `Ambiguous` entries.
    pub fn build(&self, diagnostics: &mut Vec<Diagnostic>) -> Result<ServiceMap, CompileError> {
        let (registrations, sources) = self.register()?;
        let manual_ids = self.config.services.iter().flat_map(|s| {
            std::iter::once(s.id.as_str()).chain(s.aliases.iter().map(String::as_str))
        });
        let resolver = ParameterResolver::new(&registrations, manual_ids);

        let mut services = ServiceMap::new();
        for (id, entry) in registrations.iter() {
            let descriptor = match entry {
                ServiceEntry::Service(descriptor) => descriptor,
                ServiceEntry::Ambiguous(candidates) => {
                    tracing::debug!(id, ?candidates, "Ambiguous identifier");
                    diagnostics.push(Diagnostic::warning(
                        id,
                        DiagnosticKind::Ambiguous {
                            candidates: candidates.clone(),
                        },
                    ));
                    services.insert(id, entry.clone());
                    continue;
                }
                ServiceEntry::Alias(_) => {
                    services.insert(id, entry.clone());
                    continue;
                }
            };

            let params = match sources.get(id) {
                Some(ParamSource::Discovered(class)) => {
                    resolve_all(&resolver, &class.constructor, &BTreeMap::new())
                }
                Some(ParamSource::Manual {
                    declaration,
                    params,
                }) => match &declaration.arguments {
                    Some(arguments) => Ok(arguments.clone()),
                    None => {
                        let params = params.unwrap_or(&[]);
                        if let Some(unknown) = declaration
                            .params
                            .keys()
                            .find(|name| !params.iter().any(|p| &&p.name == name))
                        {
                            return Err(CompileError::declaration(
                                id,
                                format!("override for unknown parameter '{}'", unknown),
                            ));
                        }
                        resolve_all(&resolver, params, &declaration.params)
                    }
                },
                Some(ParamSource::Builtin) | None => Ok(Vec::new()),
            };

            match params {
                Ok(params) => {
                    let mut descriptor = descriptor.clone();
                    descriptor.params = params;
                    services.insert(id, ServiceEntry::Service(descriptor));
                }
                Err(param) => {
                    tracing::debug!(id, param = %param, "Unresolvable parameter");
                    diagnostics.push(Diagnostic::error(
                        id,
                        DiagnosticKind::UnresolvableParameter { param },
                    ));
                }
            }
        }

        tracing::debug!(identifiers = services.len(), "Service map built");
        Ok(services)
    }

    /// Registration passes; parameters are left empty
    fn register(&self) -> Result<(ServiceMap, HashMap<String, ParamSource<'a>>), CompileError> {
        let mut map = ServiceMap::new();
        let mut sources = HashMap::new();
        let concrete: Vec<&ClassDescriptor> = self
            .classes
            .iter()
            .filter(|c| c.kind.is_instantiable())
            .collect();

        for &class in &concrete {
            map.insert(
                &class.name,
                ServiceEntry::Service(ServiceDescriptor {
                    class: class.name.clone(),
                    params: Vec::new(),
                    singleton: class.singleton_hint().unwrap_or(self.config.default_singleton),
                    factory: None,
                    origin: Origin::Discovered,
                }),
            );
            sources.insert(class.name.clone(), ParamSource::Discovered(class));
        }

        for &class in &concrete {
            for capability in class.capabilities.iter().chain(class.parents.iter()) {
                let replacement = match map.get(capability) {
                    None => ServiceEntry::Alias(class.name.clone()),
                    // own names win over capabilities
                    Some(ServiceEntry::Service(_)) => continue,
                    Some(ServiceEntry::Alias(existing)) if existing == &class.name => continue,
                    Some(ServiceEntry::Alias(existing)) => {
                        ServiceEntry::Ambiguous(vec![existing.clone(), class.name.clone()])
                    }
                    Some(ServiceEntry::Ambiguous(candidates)) => {
                        if candidates.contains(&class.name) {
                            continue;
                        }
                        let mut candidates = candidates.clone();
                        candidates.push(class.name.clone());
                        ServiceEntry::Ambiguous(candidates)
                    }
                };
                map.insert(capability, replacement);
            }
        }

        for declaration in &self.config.services {
            let descriptor = self.manual_descriptor(declaration)?;
            let params = match &descriptor.factory {
                Some(factory) => self
                    .by_name
                    .get(factory.class.as_str())
                    .and_then(|c| c.method(&factory.method))
                    .map(|m| m.params.as_slice()),
                None => self
                    .by_name
                    .get(descriptor.class.as_str())
                    .map(|c| c.constructor.as_slice()),
            };
            if params.is_none() && declaration.arguments.is_none() {
                tracing::warn!(
                    id = %declaration.id,
                    class = %descriptor.class,
                    "Manual service has no known signature, constructing without arguments"
                );
            }
            if let Some(previous) = map.insert(&declaration.id, ServiceEntry::Service(descriptor)) {
                tracing::debug!(
                    id = %declaration.id,
                    ?previous,
                    "Manual declaration replaces registration"
                );
            }
            sources.insert(
                declaration.id.clone(),
                ParamSource::Manual {
                    declaration,
                    params,
                },
            );
            for alias in &declaration.aliases {
                map.insert(alias, ServiceEntry::Alias(declaration.id.clone()));
                sources.remove(alias);
            }
        }

        for (id, builtin) in [
            (&self.config.capabilities.container, Builtin::Container),
            (&self.config.capabilities.config, Builtin::Config),
        ] {
            if map.contains(id) {
                continue;
            }
            map.insert(
                id,
                ServiceEntry::Service(ServiceDescriptor {
                    class: id.clone(),
                    params: Vec::new(),
                    singleton: true,
                    factory: None,
                    origin: Origin::Builtin(builtin),
                }),
            );
            sources.insert(id.clone(), ParamSource::Builtin);
        }

        Ok((map, sources))
    }

    fn manual_descriptor(
        &self,
        declaration: &ServiceDeclaration,
    ) -> Result<ServiceDescriptor, CompileError> {
        let class_name = declaration.class_name();
        let class = self.by_name.get(class_name);

        let factory = match declaration.factory_ref() {
            Some((class, method)) => Some(FactoryRef {
                class: class.to_string(),
                method: method.to_string(),
            }),
            None => None,
        };

        if let (None, Some(class)) = (&factory, class) {
            if !class.kind.is_instantiable() {
                return Err(CompileError::declaration(
                    &declaration.id,
                    format!("class '{}' cannot be instantiated", class.name),
                ));
            }
        }
        if let Some(factory) = &factory {
            let method = self
                .by_name
                .get(factory.class.as_str())
                .and_then(|c| c.method(&factory.method));
            if let Some(method) = method {
                if !method.is_static {
                    return Err(CompileError::declaration(
                        &declaration.id,
                        format!("factory {}::{} is not static", factory.class, factory.method),
                    ));
                }
            }
        }

        Ok(ServiceDescriptor {
            class: class_name.to_string(),
            params: Vec::new(),
            singleton: declaration
                .singleton
                .or_else(|| class.and_then(|c| c.singleton_hint()))
                .unwrap_or(self.config.default_singleton),
            factory,
            origin: Origin::Manual,
        })
    }
}

/// Resolve every parameter, or return the name of the first unresolvable one
fn resolve_all(
    resolver: &ParameterResolver<'_>,
    params: &[Parameter],
    overrides: &BTreeMap<String, super::ParameterBinding>,
) -> Result<Vec<NamedBinding>, String> {
    params
        .iter()
        .map(|param| {
            resolver
                .resolve(param, overrides)
                .map(|binding| NamedBinding::new(&param.name, binding))
                .ok_or_else(|| param.name.clone())
        })
        .collect()
}
