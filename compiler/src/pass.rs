//! Extra compiler passes
//!
//! A pass runs after the built-in stages with mutable access to the compiled
//! plans and the diagnostics list. Passes are collected with `inventory` and
//! looked up by the names listed in the configuration:
//!
//! ```rust,ignore
//! use prewire::pass::PassEntry;
//!
//! fn forbid_admin_routes(ctx: &mut PassContext<'_>) -> Result<(), CompileError> { .. }
//!
//! inventory::submit! {
//!     PassEntry { name: "forbid-admin-routes", run: forbid_admin_routes }
//! }
//! ```

use crate::compiler::CompiledPlans;
use crate::config::CompilerConfig;
use crate::error::{CompileError, Diagnostic, DiagnosticKind};
use std::collections::BTreeMap;

/// Everything a pass may read or change
pub struct PassContext<'a> {
    pub config: &'a CompilerConfig,
    pub plans: &'a mut CompiledPlans,
    pub diagnostics: &'a mut Vec<Diagnostic>,
}

pub type PassFn = fn(&mut PassContext<'_>) -> Result<(), CompileError>;

/// Inventory entry for a compiler pass
pub struct PassEntry {
    pub name: &'static str,
    pub run: PassFn,
}

inventory::collect!(PassEntry);

inventory::submit! {
    PassEntry {
        name: "unique-route-names",
        run: unique_route_names,
    }
}

/// Find a linked pass by name
pub fn find(name: &str) -> Option<&'static PassEntry> {
    inventory::iter::<PassEntry>
        .into_iter()
        .find(|entry| entry.name == name)
}

/// Report every route name shared by more than one route
pub fn unique_route_names(ctx: &mut PassContext<'_>) -> Result<(), CompileError> {
    let mut targets: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (method, call) in ctx.plans.router.routes() {
        if let Some(name) = &call.name {
            targets
                .entry(name.as_str())
                .or_default()
                .push(format!("{} {}", method, call.path));
        }
    }
    for (name, routes) in targets {
        if routes.len() > 1 {
            for route in routes {
                ctx.diagnostics.push(Diagnostic::error(
                    route,
                    DiagnosticKind::DuplicateRouteName {
                        name: name.to_string(),
                    },
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::HttpMethod;
    use crate::routing::{RouteCall, StaticRoute};

    fn named(path: &str, name: Option<&str>) -> StaticRoute {
        StaticRoute {
            method: HttpMethod::Get,
            path: path.into(),
            call: RouteCall {
                class: "Pages".into(),
                method: "show".into(),
                service: None,
                args: Vec::new(),
                path: path.into(),
                name: name.map(String::from),
            },
        }
    }

    #[test]
    fn test_builtin_pass_is_linked() {
        assert!(find("unique-route-names").is_some());
        assert!(find("no-such-pass").is_none());
    }

    #[test]
    fn test_duplicate_route_names_reported() {
        let mut plans = CompiledPlans::default();
        plans.router.statics = vec![
            named("/a", Some("home")),
            named("/b", Some("home")),
            named("/c", Some("about")),
            named("/d", None),
        ];
        let config = CompilerConfig::default();
        let mut diagnostics = Vec::new();
        let mut ctx = PassContext {
            config: &config,
            plans: &mut plans,
            diagnostics: &mut diagnostics,
        };
        unique_route_names(&mut ctx).unwrap();

        let subjects: Vec<&str> = diagnostics.iter().map(|d| d.subject.as_str()).collect();
        assert_eq!(subjects, vec!["GET /a", "GET /b"]);
    }
}
