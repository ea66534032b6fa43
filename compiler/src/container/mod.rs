//! Service graph: identifiers, descriptors and construction plans
//!
//! The builder registers every constructible class under its own name and
//! under the capabilities it satisfies, applies manual declarations and
//! resolves constructor parameters into [`ParameterBinding`] chains. The graph
//! resolver then walks the bindings depth first, drops identifiers that cannot
//! be constructed and lowers the rest into [`ConstructionPlan`]s.

mod binding;
mod builder;
mod graph;
mod resolver;

pub use binding::{ArrayEntry, ArrayKey, NamedBinding, ParameterBinding};
pub use builder::ServiceGraphBuilder;
pub use graph::GraphResolver;
pub use resolver::ParameterResolver;

use crate::metadata::Literal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Services the compiler provides without a class of the project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Builtin {
    /// The compiled container itself
    Container,
    /// The active compiler configuration
    Config,
}

/// Where a service registration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Discovered,
    Manual,
    Builtin(Builtin),
}

/// Static factory used instead of a constructor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryRef {
    pub class: String,
    pub method: String,
}

/// How one identifier is constructed, before graph resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    pub class: String,
    /// Constructor (or factory) parameters, in declaration order
    pub params: Vec<NamedBinding>,
    pub singleton: bool,
    pub factory: Option<FactoryRef>,
    pub origin: Origin,
}

/// What an identifier maps to
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEntry {
    Service(ServiceDescriptor),
    /// Several classes claim the identifier; never auto-resolved
    Ambiguous(Vec<String>),
    /// Another identifier
    Alias(String),
}

/// Identifier to service mapping in registration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceMap {
    entries: Vec<(String, ServiceEntry)>,
    index: HashMap<String, usize>,
}

impl ServiceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; a replaced entry keeps its position
    pub fn insert(&mut self, id: impl Into<String>, entry: ServiceEntry) -> Option<ServiceEntry> {
        let id = id.into();
        match self.index.get(&id) {
            Some(&pos) => Some(std::mem::replace(&mut self.entries[pos].1, entry)),
            None => {
                self.index.insert(id.clone(), self.entries.len());
                self.entries.push((id, entry));
                None
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&ServiceEntry> {
        self.index.get(id).map(|&pos| &self.entries[pos].1)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ServiceEntry)> {
        self.entries.iter().map(|(id, entry)| (id.as_str(), entry))
    }
}

/// A resolved argument, ready to be evaluated by the runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Argument {
    Literal {
        value: Literal,
    },
    Constant {
        reference: String,
    },
    Env {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback: Option<Box<Argument>>,
    },
    Service {
        id: String,
    },
    Array {
        entries: Vec<ArrayArgument>,
    },
    Closure {
        source: String,
        #[serde(default)]
        args: Vec<NamedArgument>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayArgument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<ArrayKey>,
    pub value: Argument,
}

/// Argument addressed by parameter name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedArgument {
    pub name: String,
    pub value: Argument,
}

/// Construction recipe of one constructible identifier
///
/// Skipped parameters are absent from `args`; the runtime passes arguments
/// by name, so a missing parameter never shifts the ones after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructionPlan {
    pub id: String,
    pub class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<FactoryRef>,
    pub singleton: bool,
    pub origin: Origin,
    #[serde(default)]
    pub args: Vec<NamedArgument>,
}

impl ConstructionPlan {
    pub fn arg(&self, name: &str) -> Option<&Argument> {
        self.args.iter().find(|a| a.name == name).map(|a| &a.value)
    }
}

/// Compiled container: every constructible identifier and its aliases
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerPlan {
    pub services: Vec<ConstructionPlan>,
    /// (alias, target) pairs; targets are always constructible
    #[serde(default)]
    pub aliases: Vec<(String, String)>,
}

impl ContainerPlan {
    pub fn service(&self, id: &str) -> Option<&ConstructionPlan> {
        self.services.iter().find(|s| s.id == id)
    }

    /// Whether `id` names a service or an alias of one
    pub fn has(&self, id: &str) -> bool {
        self.service(id).is_some() || self.aliases.iter().any(|(alias, _)| alias == id)
    }

    /// Follow aliases to the plan that constructs `id`
    pub fn resolve(&self, id: &str) -> Option<&ConstructionPlan> {
        let mut current = id;
        // alias targets are plans, never other aliases
        for _ in 0..=self.aliases.len() {
            if let Some(plan) = self.service(current) {
                return Some(plan);
            }
            current = self
                .aliases
                .iter()
                .find(|(alias, _)| alias == current)
                .map(|(_, target)| target.as_str())?;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_map_replace_keeps_position() {
        let mut map = ServiceMap::new();
        map.insert("A", ServiceEntry::Alias("X".into()));
        map.insert("B", ServiceEntry::Alias("Y".into()));
        let previous = map.insert("A", ServiceEntry::Ambiguous(vec!["X".into(), "Z".into()]));

        assert_eq!(previous, Some(ServiceEntry::Alias("X".into())));
        let ids: Vec<&str> = map.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert!(matches!(map.get("A"), Some(ServiceEntry::Ambiguous(_))));
    }

    #[test]
    fn test_container_plan_resolves_aliases() {
        let plan = ContainerPlan {
            services: vec![ConstructionPlan {
                id: "SmtpMailer".into(),
                class: "SmtpMailer".into(),
                factory: None,
                singleton: true,
                origin: Origin::Discovered,
                args: Vec::new(),
            }],
            aliases: vec![("Mailer".into(), "SmtpMailer".into())],
        };
        assert!(plan.has("Mailer"));
        assert_eq!(plan.resolve("Mailer").map(|p| p.id.as_str()), Some("SmtpMailer"));
        assert!(plan.resolve("Other").is_none());
    }
}
