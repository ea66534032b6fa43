//! Middleware ordering
//!
//! Middleware comes from `#[middleware(priority = N)]` on a type and from
//! manual declarations. The chain runs highest priority first; equal
//! priorities keep discovery order.

use crate::config::CompilerConfig;
use crate::container::ContainerPlan;
use crate::error::{Diagnostic, DiagnosticKind};
use crate::metadata::ClassDescriptor;
use serde::{Deserialize, Serialize};

/// A middleware class and its priority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiddlewareEntry {
    pub class: String,
    pub priority: i32,
}

/// Middleware in dispatch order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiddlewarePlan {
    pub entries: Vec<MiddlewareEntry>,
}

impl MiddlewarePlan {
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.class.as_str())
    }
}

pub struct MiddlewareOrderer<'a> {
    config: &'a CompilerConfig,
    classes: &'a [ClassDescriptor],
    services: &'a ContainerPlan,
}

impl<'a> MiddlewareOrderer<'a> {
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

    pub fn order(&self, diagnostics: &mut Vec<Diagnostic>) -> MiddlewarePlan {
        let mut entries: Vec<MiddlewareEntry> = self
            .classes
            .iter()
            .filter_map(|class| {
                class.middleware_priority().map(|priority| MiddlewareEntry {
                    class: class.name.clone(),
                    priority,
                })
            })
            .collect();

        // a manual declaration of a discovered middleware only changes its priority
        for declaration in &self.config.middlewares {
            match entries.iter_mut().find(|e| e.class == declaration.class) {
                Some(entry) => entry.priority = declaration.priority,
                None => entries.push(MiddlewareEntry {
                    class: declaration.class.clone(),
                    priority: declaration.priority,
                }),
            }
        }

        entries.retain(|entry| {
            let constructible = self.services.has(&entry.class);
            if !constructible {
                diagnostics.push(Diagnostic::error(
                    &entry.class,
                    DiagnosticKind::MissingTarget {
                        target: entry.class.clone(),
                    },
                ));
            }
            constructible
        });

        // stable: ties keep discovery order
        entries.sort_by(|a, b| b.priority.cmp(&a.priority));
        tracing::debug!(count = entries.len(), "Middleware ordered");
        MiddlewarePlan { entries }
    }
}
