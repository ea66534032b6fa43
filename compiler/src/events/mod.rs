//! Listener table
//!
//! Listeners are grouped by event type. Groups appear in the order their
//! first listener was discovered, and listeners keep discovery order inside a
//! group. A group whose event type implements the stoppable capability is
//! flagged so the dispatcher checks the stop flag before every listener.

use crate::config::{split_target, CompilerConfig};
use crate::container::ContainerPlan;
use crate::error::{CompileError, Diagnostic, DiagnosticKind};
use crate::metadata::{Annotation, ClassDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerEntry {
    pub event: String,
    pub class: String,
    pub method: String,
    pub is_static: bool,
}

impl ListenerEntry {
    pub fn target(&self) -> String {
        format!("{}::{}", self.class, self.method)
    }
}

/// Listeners of one event type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerGroup {
    pub event: String,
    pub stoppable: bool,
    pub listeners: Vec<ListenerEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerTable {
    pub groups: Vec<ListenerGroup>,
}

impl ListenerTable {
    pub fn group(&self, event: &str) -> Option<&ListenerGroup> {
        self.groups.iter().find(|g| g.event == event)
    }
}

pub struct ListenerOrderer<'a> {
    config: &'a CompilerConfig,
    classes: &'a [ClassDescriptor],
    services: &'a ContainerPlan,
}

impl<'a> ListenerOrderer<'a> {
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

    /// Group listeners by event
    ///
    /// A manual declaration whose target is not `Class::method` is fatal.
    pub fn order(
        &self,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<ListenerTable, CompileError> {
        let by_name: HashMap<&str, &ClassDescriptor> =
            self.classes.iter().map(|c| (c.name.as_str(), c)).collect();

        let mut entries = Vec::new();
        for class in self.classes {
            for method in &class.methods {
                for annotation in &method.annotations {
                    if let Annotation::Listener { event } = annotation {
                        entries.push(ListenerEntry {
                            event: event.clone(),
                            class: class.name.clone(),
                            method: method.name.clone(),
                            is_static: method.is_static,
                        });
                    }
                }
            }
        }
        for declaration in &self.config.listeners {
            let (class, method) = split_target(&declaration.target).ok_or_else(|| {
                CompileError::declaration(
                    &declaration.event,
                    format!(
                        "listener target '{}' must have the form Class::method",
                        declaration.target
                    ),
                )
            })?;
            let is_static = by_name
                .get(class)
                .and_then(|c| c.method(method))
                .map(|m| m.is_static)
                .unwrap_or(declaration.is_static);
            entries.push(ListenerEntry {
                event: declaration.event.clone(),
                class: class.to_string(),
                method: method.to_string(),
                is_static,
            });
        }

        let mut table = ListenerTable::default();
        for entry in entries {
            if !entry.is_static && !self.services.has(&entry.class) {
                diagnostics.push(Diagnostic::error(
                    entry.target(),
                    DiagnosticKind::MissingTarget {
                        target: entry.class.clone(),
                    },
                ));
                continue;
            }
            match table.groups.iter_mut().find(|g| g.event == entry.event) {
                Some(group) => group.listeners.push(entry),
                None => {
                    let stoppable = by_name
                        .get(entry.event.as_str())
                        .map(|event| event.implements(&self.config.capabilities.stoppable_event))
                        .unwrap_or(false);
                    table.groups.push(ListenerGroup {
                        event: entry.event.clone(),
                        stoppable,
                        listeners: vec![entry],
                    });
                }
            }
        }

        tracing::debug!(events = table.groups.len(), "Listeners grouped");
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenerDeclaration;
    use crate::container::{ConstructionPlan, Origin};
    use crate::testing::{typed, ClassBuilder, MethodBuilder};
    use pretty_assertions::assert_eq;

    fn listener(class: &str, method: &str, event: &str, is_static: bool) -> ClassDescriptor {
        let mut builder = MethodBuilder::new(method)
            .param(typed("event", event))
            .annotate(Annotation::Listener {
                event: event.into(),
            });
        if is_static {
            builder = builder.static_fn();
        }
        ClassBuilder::concrete(class).method(builder.build()).build()
    }

    fn services(ids: &[&str]) -> ContainerPlan {
        ContainerPlan {
            services: ids
                .iter()
                .map(|id| ConstructionPlan {
                    id: id.to_string(),
                    class: id.to_string(),
                    factory: None,
                    singleton: true,
                    origin: Origin::Discovered,
                    args: Vec::new(),
                })
                .collect(),
            aliases: Vec::new(),
        }
    }

    #[test]
    fn test_groups_in_first_appearance_order() {
        let classes = vec![
            ClassBuilder::concrete("OrderPlaced")
                .implements("StoppableEvent")
                .build(),
            listener("Audit", "on_user", "UserCreated", false),
            listener("Billing", "on_order", "OrderPlaced", true),
            listener("Welcome", "send", "UserCreated", true),
        ];
        let container = services(&["Audit"]);
        let mut diagnostics = Vec::new();
        let table = ListenerOrderer::new(&CompilerConfig::default(), &classes, &container)
            .order(&mut diagnostics)
            .unwrap();

        assert!(diagnostics.is_empty());
        let events: Vec<&str> = table.groups.iter().map(|g| g.event.as_str()).collect();
        assert_eq!(events, vec!["UserCreated", "OrderPlaced"]);

        let users = table.group("UserCreated").unwrap();
        assert!(!users.stoppable);
        let targets: Vec<String> = users.listeners.iter().map(|l| l.target()).collect();
        assert_eq!(targets, vec!["Audit::on_user", "Welcome::send"]);
        assert!(table.group("OrderPlaced").unwrap().stoppable);
    }

    #[test]
    fn test_manual_listeners_and_missing_instances() {
        let classes = vec![listener("Mailer", "on_signup", "Signup", false)];
        let mut config = CompilerConfig::default();
        config.listeners.push(ListenerDeclaration {
            event: "Signup".into(),
            target: "Metrics::count".into(),
            is_static: true,
        });
        let mut diagnostics = Vec::new();
        let table = ListenerOrderer::new(&config, &classes, &services(&[]))
            .order(&mut diagnostics)
            .unwrap();

        let group = table.group("Signup").unwrap();
        assert_eq!(group.listeners.len(), 1);
        assert_eq!(group.listeners[0].target(), "Metrics::count");
        assert_eq!(diagnostics[0].subject, "Mailer::on_signup");
    }

    #[test]
    fn test_malformed_manual_target_is_fatal() {
        let mut config = CompilerConfig::default();
        config.listeners.push(ListenerDeclaration {
            event: "Signup".into(),
            target: "count".into(),
            is_static: true,
        });
        let mut diagnostics = Vec::new();
        let err = ListenerOrderer::new(&config, &[], &services(&[]))
            .order(&mut diagnostics)
            .unwrap_err();
        assert!(matches!(err, CompileError::Declaration { subject, .. } if subject == "Signup"));
    }
}
