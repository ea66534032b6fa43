use super::{ParameterBinding, ServiceEntry, ServiceMap};
use crate::metadata::{DefaultValue, Literal, Parameter};
use std::collections::{BTreeMap, HashSet};

/// Turns one constructor parameter into a binding chain
///
/// Resolution order:
/// 1. manual override for the parameter
/// 2. `#[env]` hint, falling back to the default value
/// 3. default that names a constant
/// 4. literal default
/// 5. `#[inject]` hint, falling back to the type-based chain
/// 6. declared type; a manual identifier equal to the parameter name is tried first
/// 7. nullable parameters end their service chain with a skip
/// 8. unknown class types still bind by type and fail during graph resolution
/// 9. untyped and primitive parameters bind by name when the name is known
pub struct ParameterResolver<'a> {
    registrations: &'a ServiceMap,
    manual_ids: HashSet<&'a str>,
}

impl<'a> ParameterResolver<'a> {
    pub fn new(
        registrations: &'a ServiceMap,
        manual_ids: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            registrations,
            manual_ids: manual_ids.into_iter().collect(),
        }
    }

    /// Registered and not ambiguous
    pub fn is_known(&self, id: &str) -> bool {
        matches!(
            self.registrations.get(id),
            Some(ServiceEntry::Service(_)) | Some(ServiceEntry::Alias(_))
        )
    }

    /// `None` when the parameter has no binding at all
    pub fn resolve(
        &self,
        param: &Parameter,
        overrides: &BTreeMap<String, ParameterBinding>,
    ) -> Option<ParameterBinding> {
        if let Some(binding) = overrides.get(&param.name) {
            return Some(binding.clone());
        }

        if let Some(key) = param.env_hint() {
            let fallback = default_binding(param).or_else(|| null_if_nullable(param));
            return Some(ParameterBinding::EnvLookup {
                key: key.to_string(),
                fallback: fallback.map(Box::new),
            });
        }

        if let Some(binding) = default_binding(param) {
            return Some(binding);
        }

        if let Some(id) = param.inject_hint() {
            let head = ParameterBinding::service(id);
            let binding = match self.type_chain(param) {
                Some(chain) => head.or(chain),
                None if param.nullable => head.or(ParameterBinding::SkipIfAbsent),
                None => head,
            };
            return Some(binding);
        }

        self.type_chain(param).or_else(|| null_if_nullable(param))
    }

    fn type_chain(&self, param: &Parameter) -> Option<ParameterBinding> {
        let by_name = self.manual_ids.contains(param.name.as_str());
        let chain = match param.ty.identifier() {
            Some(ty) if by_name && ty != param.name => {
                ParameterBinding::service(&param.name).or(ParameterBinding::service(ty))
            }
            Some(ty) => ParameterBinding::service(ty),
            None if by_name || self.is_known(&param.name) => {
                ParameterBinding::service(&param.name)
            }
            None => return None,
        };
        Some(if param.nullable {
            chain.or(ParameterBinding::SkipIfAbsent)
        } else {
            chain
        })
    }
}

fn default_binding(param: &Parameter) -> Option<ParameterBinding> {
    match &param.default {
        Some(DefaultValue::Constant(reference)) => Some(ParameterBinding::constant(reference)),
        Some(DefaultValue::Literal(value)) => Some(ParameterBinding::literal(value.clone())),
        None => None,
    }
}

fn null_if_nullable(param: &Parameter) -> Option<ParameterBinding> {
    param
        .nullable
        .then(|| ParameterBinding::literal(Literal::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{FactoryRef, Origin, ServiceDescriptor};
    use crate::metadata::{ParamHint, ParamType, PrimitiveKind};
    use pretty_assertions::assert_eq;

    fn registrations(ids: &[&str]) -> ServiceMap {
        let mut map = ServiceMap::new();
        for id in ids {
            map.insert(
                *id,
                ServiceEntry::Service(ServiceDescriptor {
                    class: id.to_string(),
                    params: Vec::new(),
                    singleton: true,
                    factory: None::<FactoryRef>,
                    origin: Origin::Discovered,
                }),
            );
        }
        map.insert("Cache", ServiceEntry::Ambiguous(vec!["A".into(), "B".into()]));
        map
    }

    fn named(name: &str, ty: &str) -> Parameter {
        Parameter::new(name, ParamType::Named(ty.into()))
    }

    #[test]
    fn test_untyped_null_default_is_a_literal() {
        let map = registrations(&["value"]);
        let resolver = ParameterResolver::new(&map, []);
        let mut param = Parameter::new("value", ParamType::Untyped);
        param.default = Some(DefaultValue::Literal(Literal::Null));

        assert_eq!(
            resolver.resolve(&param, &BTreeMap::new()),
            Some(ParameterBinding::literal(Literal::Null))
        );
    }

    #[test]
    fn test_defaults_win_over_known_types() {
        let map = registrations(&["Clock"]);
        let resolver = ParameterResolver::new(&map, []);
        let mut param = named("clock", "Clock");
        param.default = Some(DefaultValue::Constant("Clock::UTC".into()));

        assert_eq!(
            resolver.resolve(&param, &BTreeMap::new()),
            Some(ParameterBinding::constant("Clock::UTC"))
        );
    }

    #[test]
    fn test_manual_name_is_tried_before_type() {
        let map = registrations(&["Logger", "audit"]);
        let resolver = ParameterResolver::new(&map, ["audit"]);

        assert_eq!(
            resolver.resolve(&named("audit", "Logger"), &BTreeMap::new()),
            Some(ParameterBinding::service("audit").or(ParameterBinding::service("Logger")))
        );
        // a discovered identifier matching the name does not count
        assert_eq!(
            resolver.resolve(&named("Logger", "Logger"), &BTreeMap::new()),
            Some(ParameterBinding::service("Logger"))
        );
    }

    #[test]
    fn test_nullable_class_ends_with_skip() {
        let map = registrations(&[]);
        let resolver = ParameterResolver::new(&map, []);
        let mut param = named("tracer", "Tracer");
        param.nullable = true;

        let binding = resolver.resolve(&param, &BTreeMap::new()).unwrap();
        assert_eq!(
            binding,
            ParameterBinding::service("Tracer").or(ParameterBinding::SkipIfAbsent)
        );
        binding.validate().unwrap();
    }

    #[test]
    fn test_unknown_class_type_still_binds_by_type() {
        let map = registrations(&[]);
        let resolver = ParameterResolver::new(&map, []);
        assert_eq!(
            resolver.resolve(&named("db", "Database"), &BTreeMap::new()),
            Some(ParameterBinding::service("Database"))
        );
    }

    #[test]
    fn test_primitives_without_default() {
        let map = registrations(&["dsn"]);
        let resolver = ParameterResolver::new(&map, []);
        let known = Parameter::new("dsn", ParamType::Primitive(PrimitiveKind::String));
        let unknown = Parameter::new("port", ParamType::Primitive(PrimitiveKind::Int));
        let mut optional = Parameter::new("timeout", ParamType::Primitive(PrimitiveKind::Int));
        optional.nullable = true;

        assert_eq!(
            resolver.resolve(&known, &BTreeMap::new()),
            Some(ParameterBinding::service("dsn"))
        );
        assert_eq!(resolver.resolve(&unknown, &BTreeMap::new()), None);
        assert_eq!(
            resolver.resolve(&optional, &BTreeMap::new()),
            Some(ParameterBinding::literal(Literal::Null))
        );
    }

    #[test]
    fn test_hints_and_overrides() {
        let map = registrations(&["Transport"]);
        let resolver = ParameterResolver::new(&map, []);

        let mut env = Parameter::new("dsn", ParamType::Primitive(PrimitiveKind::String));
        env.hints.push(ParamHint::Env("MAIL_DSN".into()));
        env.default = Some(DefaultValue::Literal(Literal::Str("smtp://localhost".into())));
        assert_eq!(
            resolver.resolve(&env, &BTreeMap::new()),
            Some(
                ParameterBinding::env("MAIL_DSN")
                    .or(ParameterBinding::literal(Literal::Str("smtp://localhost".into())))
            )
        );

        let mut inject = named("transport", "Transport");
        inject.hints.push(ParamHint::Inject("mail.transport".into()));
        assert_eq!(
            resolver.resolve(&inject, &BTreeMap::new()),
            Some(
                ParameterBinding::service("mail.transport")
                    .or(ParameterBinding::service("Transport"))
            )
        );

        let mut overrides = BTreeMap::new();
        overrides.insert("transport".to_string(), ParameterBinding::service("null_transport"));
        assert_eq!(
            resolver.resolve(&inject, &overrides),
            Some(ParameterBinding::service("null_transport"))
        );
    }

    #[test]
    fn test_ambiguous_identifiers_are_not_known() {
        let map = registrations(&[]);
        let resolver = ParameterResolver::new(&map, []);
        assert!(!resolver.is_known("Cache"));
    }
}
