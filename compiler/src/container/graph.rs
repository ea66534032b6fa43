use super::{
    ArrayArgument, Argument, ConstructionPlan, ContainerPlan, NamedArgument, NamedBinding,
    ParameterBinding, ServiceEntry, ServiceMap,
};
use crate::error::{Diagnostic, DiagnosticKind};
use std::collections::HashMap;

/// Why an identifier cannot be constructed
#[derive(Debug, Clone, PartialEq)]
enum Failure {
    NotRegistered,
    Ambiguous,
    Cycle(Vec<String>),
    Dependency { param: String, dependency: String },
    AliasTarget(String),
}

/// A binding chain that has no satisfiable link
#[derive(Debug, Clone)]
struct ChainFailure {
    dependency: String,
    cause: Failure,
}

/// Result of visiting one identifier
///
/// `open_cycle` is the lowest stack position of a cycle the result depends
/// on. Such a result is only valid while that frame is still being resolved.
#[derive(Debug, Clone)]
struct Visit {
    result: Result<(), Failure>,
    open_cycle: Option<usize>,
}

/// A successful result still waiting for the cycle it depends on to close
struct Pending {
    id: String,
    args: Vec<NamedArgument>,
    open_cycle: usize,
}

type Lowered = Result<Option<Argument>, ChainFailure>;

fn lowest(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Depth-first resolution of the service map into construction plans
///
/// Every `InjectedService` link is followed. An identifier that is re-entered
/// while still on the stack closes a cycle: the link fails and the chain
/// falls through to its fallback, or the owner fails. Failed identifiers are
/// left out of the plan and every dependent without a working fallback fails
/// with them.
pub struct GraphResolver<'a> {
    services: &'a ServiceMap,
    memo: HashMap<String, Result<(), Failure>>,
    args: HashMap<String, Vec<NamedArgument>>,
    stack: Vec<String>,
    /// Unsettled results computed under each stack frame, dropped with it
    provisional: Vec<HashMap<String, Visit>>,
    pending: Vec<Pending>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> GraphResolver<'a> {
    pub fn new(services: &'a ServiceMap) -> Self {
        Self {
            services,
            memo: HashMap::new(),
            args: HashMap::new(),
            stack: Vec::new(),
            provisional: Vec::new(),
            pending: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Resolve every identifier, in registration order
    pub fn resolve(mut self) -> (ContainerPlan, Vec<Diagnostic>) {
        let services = self.services;
        for (id, _) in services.iter() {
            self.visit(id);
        }

        let mut plan = ContainerPlan::default();
        for (id, entry) in services.iter() {
            if !matches!(self.memo.get(id), Some(Ok(()))) {
                continue;
            }
            match entry {
                ServiceEntry::Service(descriptor) => plan.services.push(ConstructionPlan {
                    id: id.to_string(),
                    class: descriptor.class.clone(),
                    factory: descriptor.factory.clone(),
                    singleton: descriptor.singleton,
                    origin: descriptor.origin,
                    args: self.args.remove(id).unwrap_or_default(),
                }),
                ServiceEntry::Alias(target) => {
                    plan.aliases.push((id.to_string(), target.clone()));
                }
                ServiceEntry::Ambiguous(_) => {}
            }
        }

        tracing::debug!(
            services = plan.services.len(),
            aliases = plan.aliases.len(),
            omitted = self.diagnostics.len(),
            "Service graph resolved"
        );
        (plan, self.diagnostics)
    }

    fn visit(&mut self, id: &str) -> Visit {
        if let Some(result) = self.memo.get(id) {
            return Visit {
                result: result.clone(),
                open_cycle: None,
            };
        }
        if let Some(pos) = self.stack.iter().position(|s| s == id) {
            let mut path = self.stack[pos..].to_vec();
            path.push(id.to_string());
            return Visit {
                result: Err(Failure::Cycle(path)),
                open_cycle: Some(pos),
            };
        }
        if let Some(visit) = self.provisional.last().and_then(|frame| frame.get(id)) {
            return visit.clone();
        }

        let depth = self.stack.len();
        let services = self.services;
        let (result, args, open_cycle) = match services.get(id) {
            None => {
                return Visit {
                    result: Err(Failure::NotRegistered),
                    open_cycle: None,
                }
            }
            Some(ServiceEntry::Ambiguous(_)) => {
                return Visit {
                    result: Err(Failure::Ambiguous),
                    open_cycle: None,
                }
            }
            Some(ServiceEntry::Alias(target)) => {
                self.enter(id);
                let visit = self.visit(target);
                self.leave();
                let result = visit.result.map_err(|failure| match failure {
                    Failure::Cycle(path) => Failure::Cycle(path),
                    _ => Failure::AliasTarget(target.clone()),
                });
                (result, Vec::new(), visit.open_cycle)
            }
            Some(ServiceEntry::Service(descriptor)) => {
                self.enter(id);
                let (result, args, open_cycle) = self.lower_params(id, &descriptor.params);
                self.leave();
                (result, args, open_cycle)
            }
        };

        // A cycle closing at this frame or below is settled here.
        let open_cycle = open_cycle.filter(|&pos| pos < depth);
        let visit = Visit { result, open_cycle };
        match open_cycle {
            None => {
                match &visit.result {
                    Ok(()) => {
                        self.args.insert(id.to_string(), args);
                    }
                    Err(failure) => self.report(id, failure),
                }
                self.memo.insert(id.to_string(), visit.result.clone());
                self.commit_pending(depth);
            }
            Some(pos) => {
                for pending in &mut self.pending {
                    if pending.open_cycle >= depth {
                        pending.open_cycle = pos;
                    }
                }
                if visit.result.is_ok() {
                    self.pending.push(Pending {
                        id: id.to_string(),
                        args,
                        open_cycle: pos,
                    });
                }
                // Reused only under the same stack, so a node reached twice
                // from one frame is walked once.
                if let Some(frame) = self.provisional.last_mut() {
                    frame.insert(id.to_string(), visit.clone());
                }
            }
        }
        visit
    }

    /// Settle the successful results that waited on the frame at `depth`
    ///
    /// They keep the arguments they were lowered with, so a service that
    /// broke a cycle through a fallback never starts depending on the frame
    /// it fell back from. Failed results are not kept; they are visited again
    /// once the frame is settled.
    fn commit_pending(&mut self, depth: usize) {
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|pending| pending.open_cycle >= depth);
        self.pending = waiting;
        for pending in ready {
            if !self.memo.contains_key(&pending.id) {
                self.args.insert(pending.id.clone(), pending.args);
                self.memo.insert(pending.id, Ok(()));
            }
        }
    }

    fn enter(&mut self, id: &str) {
        self.stack.push(id.to_string());
        self.provisional.push(HashMap::new());
    }

    fn leave(&mut self) {
        self.stack.pop();
        self.provisional.pop();
    }

    fn lower_params(
        &mut self,
        id: &str,
        params: &[NamedBinding],
    ) -> (Result<(), Failure>, Vec<NamedArgument>, Option<usize>) {
        let mut args = Vec::new();
        let mut open_cycle = None;
        for param in params {
            let (lowered, cycle) = self.lower(&param.binding);
            open_cycle = lowest(open_cycle, cycle);
            match lowered {
                Ok(Some(value)) => args.push(NamedArgument {
                    name: param.name.clone(),
                    value,
                }),
                // skipped parameters are left out, never passed as null
                Ok(None) => {}
                Err(failure) => {
                    let failure = match failure.cause {
                        Failure::Cycle(path) if path.iter().any(|p| p == id) => {
                            Failure::Cycle(path)
                        }
                        _ => Failure::Dependency {
                            param: param.name.clone(),
                            dependency: failure.dependency,
                        },
                    };
                    return (Err(failure), args, open_cycle);
                }
            }
        }
        (Ok(()), args, open_cycle)
    }

    /// Collapse a binding chain to its first satisfiable link
    fn lower(&mut self, binding: &ParameterBinding) -> (Lowered, Option<usize>) {
        match binding {
            ParameterBinding::Literal { value } => {
                (Ok(Some(Argument::Literal { value: value.clone() })), None)
            }
            ParameterBinding::NamedConstant { reference } => (
                Ok(Some(Argument::Constant {
                    reference: reference.clone(),
                })),
                None,
            ),
            ParameterBinding::SkipIfAbsent => (Ok(None), None),
            ParameterBinding::EnvLookup { key, fallback } => {
                let (fallback, cycle) = match fallback {
                    Some(fallback) => match self.lower(fallback) {
                        (Ok(Some(arg)), cycle) => (Some(Box::new(arg)), cycle),
                        (_, cycle) => (None, cycle),
                    },
                    None => (None, None),
                };
                (
                    Ok(Some(Argument::Env {
                        key: key.clone(),
                        fallback,
                    })),
                    cycle,
                )
            }
            ParameterBinding::InjectedService { id, fallback } => {
                let visit = self.visit(id);
                match visit.result {
                    Ok(()) => (Ok(Some(Argument::Service { id: id.clone() })), visit.open_cycle),
                    Err(cause) => {
                        let failure = ChainFailure {
                            dependency: id.clone(),
                            cause,
                        };
                        self.fall_through(fallback.as_deref(), failure, visit.open_cycle)
                    }
                }
            }
            ParameterBinding::ArrayLiteral { entries, fallback } => {
                let mut lowered = Vec::new();
                let mut open_cycle = None;
                for entry in entries {
                    let (value, cycle) = self.lower(&entry.value);
                    open_cycle = lowest(open_cycle, cycle);
                    match value {
                        Ok(Some(value)) => lowered.push(ArrayArgument {
                            key: entry.key.clone(),
                            value,
                        }),
                        Ok(None) => {}
                        Err(failure) => {
                            return self.fall_through(fallback.as_deref(), failure, open_cycle)
                        }
                    }
                }
                (Ok(Some(Argument::Array { entries: lowered })), open_cycle)
            }
            ParameterBinding::ClosureLiteral {
                source,
                params,
                fallback,
            } => {
                let mut args = Vec::new();
                let mut open_cycle = None;
                for param in params {
                    let (value, cycle) = self.lower(&param.binding);
                    open_cycle = lowest(open_cycle, cycle);
                    match value {
                        Ok(Some(value)) => args.push(NamedArgument {
                            name: param.name.clone(),
                            value,
                        }),
                        Ok(None) => {}
                        Err(failure) => {
                            return self.fall_through(fallback.as_deref(), failure, open_cycle)
                        }
                    }
                }
                (
                    Ok(Some(Argument::Closure {
                        source: source.clone(),
                        args,
                    })),
                    open_cycle,
                )
            }
        }
    }

    /// Try the fallback of a failed link; the head failure is kept when the
    /// fallback fails too
    fn fall_through(
        &mut self,
        fallback: Option<&ParameterBinding>,
        failure: ChainFailure,
        open_cycle: Option<usize>,
    ) -> (Lowered, Option<usize>) {
        match fallback {
            Some(fallback) => {
                let (lowered, cycle) = self.lower(fallback);
                let open_cycle = lowest(open_cycle, cycle);
                match lowered {
                    Ok(arg) => (Ok(arg), open_cycle),
                    Err(_) => (Err(failure), open_cycle),
                }
            }
            None => (Err(failure), open_cycle),
        }
    }

    fn report(&mut self, id: &str, failure: &Failure) {
        let kind = match failure {
            Failure::Cycle(path) => DiagnosticKind::Cycle { path: path.clone() },
            Failure::Dependency { param, dependency } => DiagnosticKind::MissingDependency {
                param: param.clone(),
                dependency: dependency.clone(),
            },
            Failure::AliasTarget(target) => DiagnosticKind::MissingTarget {
                target: target.clone(),
            },
            // not entries of their own; reported by the builder if at all
            Failure::NotRegistered | Failure::Ambiguous => return,
        };
        let diagnostic = Diagnostic::error(id, kind);
        tracing::debug!(%diagnostic, "Identifier omitted");
        self.diagnostics.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ArrayEntry, Origin, ServiceDescriptor};
    use crate::metadata::Literal;
    use pretty_assertions::assert_eq;

    fn service(params: Vec<(&str, ParameterBinding)>) -> ServiceEntry {
        ServiceEntry::Service(ServiceDescriptor {
            class: String::new(),
            params: params
                .into_iter()
                .map(|(name, binding)| NamedBinding::new(name, binding))
                .collect(),
            singleton: true,
            factory: None,
            origin: Origin::Discovered,
        })
    }

    fn map(entries: Vec<(&str, ServiceEntry)>) -> ServiceMap {
        let mut map = ServiceMap::new();
        for (id, mut entry) in entries {
            if let ServiceEntry::Service(descriptor) = &mut entry {
                descriptor.class = id.to_string();
            }
            map.insert(id, entry);
        }
        map
    }

    fn ids(plan: &ContainerPlan) -> Vec<&str> {
        plan.services.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_mutual_dependency_omits_both() {
        let services = map(vec![
            ("A", service(vec![("b", ParameterBinding::service("B"))])),
            ("B", service(vec![("a", ParameterBinding::service("A"))])),
        ]);
        let (plan, diagnostics) = GraphResolver::new(&services).resolve();

        assert!(plan.services.is_empty());
        let cycle = vec!["A".to_string(), "B".to_string(), "A".to_string()];
        assert_eq!(
            diagnostics,
            vec![
                Diagnostic::error("A", DiagnosticKind::Cycle { path: cycle.clone() }),
                Diagnostic::error("B", DiagnosticKind::Cycle { path: cycle }),
            ]
        );
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let services = map(vec![(
            "Node",
            service(vec![("parent", ParameterBinding::service("Node"))]),
        )]);
        let (plan, diagnostics) = GraphResolver::new(&services).resolve();

        assert!(plan.services.is_empty());
        assert_eq!(
            diagnostics[0].kind,
            DiagnosticKind::Cycle {
                path: vec!["Node".into(), "Node".into()]
            }
        );
    }

    #[test]
    fn test_long_cycle_and_transitive_dependents() {
        let services = map(vec![
            ("App", service(vec![("a", ParameterBinding::service("A"))])),
            ("A", service(vec![("b", ParameterBinding::service("B"))])),
            ("B", service(vec![("c", ParameterBinding::service("C"))])),
            ("C", service(vec![("a", ParameterBinding::service("A"))])),
            ("Clock", service(vec![])),
        ]);
        let (plan, diagnostics) = GraphResolver::new(&services).resolve();

        assert_eq!(ids(&plan), vec!["Clock"]);
        let subjects: Vec<&str> = diagnostics.iter().map(|d| d.subject.as_str()).collect();
        assert_eq!(subjects, vec!["A", "App", "C", "B"]);
        assert_eq!(
            diagnostics[1].kind,
            DiagnosticKind::MissingDependency {
                param: "a".into(),
                dependency: "A".into()
            }
        );
    }

    #[test]
    fn test_cycle_broken_by_fallback() {
        let services = map(vec![
            (
                "A",
                service(vec![(
                    "b",
                    ParameterBinding::service("B").or(ParameterBinding::literal(Literal::Null)),
                )]),
            ),
            ("B", service(vec![("a", ParameterBinding::service("A"))])),
        ]);
        let (plan, diagnostics) = GraphResolver::new(&services).resolve();

        assert!(diagnostics.is_empty());
        assert_eq!(ids(&plan), vec!["A", "B"]);
        assert_eq!(
            plan.service("A").unwrap().arg("b"),
            Some(&Argument::Literal {
                value: Literal::Null
            })
        );
        assert_eq!(
            plan.service("B").unwrap().arg("a"),
            Some(&Argument::Service { id: "A".into() })
        );
    }

    #[test]
    fn test_double_edged_ring_resolves_in_linear_time() {
        let names: Vec<String> = (0..30).map(|i| format!("N{}", i)).collect();
        let entries = names
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let next = &names[(i + 1) % names.len()];
                let binding = if i + 1 == names.len() {
                    ParameterBinding::service(next.as_str())
                        .or(ParameterBinding::literal(Literal::Null))
                } else {
                    ParameterBinding::service(next.as_str())
                };
                (id.as_str(), service(vec![("left", binding.clone()), ("right", binding)]))
            })
            .collect();
        let services = map(entries);

        let started = std::time::Instant::now();
        let (plan, diagnostics) = GraphResolver::new(&services).resolve();

        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        assert!(diagnostics.is_empty());
        assert_eq!(plan.services.len(), 30);
        assert_eq!(
            plan.service("N29").unwrap().arg("left"),
            Some(&Argument::Literal {
                value: Literal::Null
            })
        );
        assert_eq!(
            plan.service("N0").unwrap().arg("right"),
            Some(&Argument::Service { id: "N1".into() })
        );
    }

    #[test]
    fn test_missing_service_falls_through_to_fallback() {
        let services = map(vec![
            ("Logger", service(vec![])),
            (
                "Mailer",
                service(vec![(
                    "logger",
                    ParameterBinding::service("mail.logger")
                        .or(ParameterBinding::service("Logger")),
                )]),
            ),
        ]);
        let (plan, _) = GraphResolver::new(&services).resolve();
        assert_eq!(
            plan.service("Mailer").unwrap().arg("logger"),
            Some(&Argument::Service {
                id: "Logger".into()
            })
        );
    }

    #[test]
    fn test_skipped_parameter_is_absent_and_later_ones_keep_their_names() {
        let services = map(vec![
            ("Db", service(vec![])),
            (
                "Repo",
                service(vec![
                    ("db", ParameterBinding::service("Db")),
                    (
                        "cache",
                        ParameterBinding::service("Cache").or(ParameterBinding::SkipIfAbsent),
                    ),
                    ("table", ParameterBinding::literal(Literal::Str("users".into()))),
                ]),
            ),
        ]);
        let (plan, diagnostics) = GraphResolver::new(&services).resolve();

        assert!(diagnostics.is_empty());
        let repo = plan.service("Repo").unwrap();
        let names: Vec<&str> = repo.args.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["db", "table"]);
        assert!(repo.arg("cache").is_none());
        assert_eq!(
            repo.arg("table"),
            Some(&Argument::Literal {
                value: Literal::Str("users".into())
            })
        );
    }

    #[test]
    fn test_ambiguous_dependency_is_never_picked() {
        let services = map(vec![
            ("Cache", ServiceEntry::Ambiguous(vec!["X".into(), "Y".into()])),
            ("X", service(vec![])),
            ("Y", service(vec![])),
            ("Page", service(vec![("cache", ParameterBinding::service("Cache"))])),
        ]);
        let (plan, diagnostics) = GraphResolver::new(&services).resolve();

        assert!(!plan.has("Cache"));
        assert!(!plan.has("Page"));
        assert_eq!(
            diagnostics,
            vec![Diagnostic::error(
                "Page",
                DiagnosticKind::MissingDependency {
                    param: "cache".into(),
                    dependency: "Cache".into()
                }
            )]
        );
    }

    #[test]
    fn test_alias_follows_its_target() {
        let services = map(vec![
            ("Broken", service(vec![("x", ParameterBinding::service("Nope"))])),
            ("Iface", ServiceEntry::Alias("Broken".into())),
            ("Ok", service(vec![])),
            ("OkIface", ServiceEntry::Alias("Ok".into())),
        ]);
        let (plan, diagnostics) = GraphResolver::new(&services).resolve();

        assert_eq!(plan.aliases, vec![("OkIface".to_string(), "Ok".to_string())]);
        assert_eq!(
            diagnostics[1],
            Diagnostic::error(
                "Iface",
                DiagnosticKind::MissingTarget {
                    target: "Broken".into()
                }
            )
        );
    }

    #[test]
    fn test_env_and_array_lowering() {
        let services = map(vec![
            ("Handler", service(vec![])),
            (
                "Queue",
                service(vec![
                    (
                        "dsn",
                        ParameterBinding::env("QUEUE_DSN")
                            .or(ParameterBinding::literal(Literal::Str("memory://".into()))),
                    ),
                    (
                        "handlers",
                        ParameterBinding::ArrayLiteral {
                            entries: vec![
                                ArrayEntry {
                                    key: None,
                                    value: ParameterBinding::service("Handler"),
                                },
                                ArrayEntry {
                                    key: None,
                                    value: ParameterBinding::service("Missing")
                                        .or(ParameterBinding::SkipIfAbsent),
                                },
                            ],
                            fallback: None,
                        },
                    ),
                ]),
            ),
        ]);
        let (plan, _) = GraphResolver::new(&services).resolve();
        let queue = plan.service("Queue").unwrap();

        assert_eq!(
            queue.arg("dsn"),
            Some(&Argument::Env {
                key: "QUEUE_DSN".into(),
                fallback: Some(Box::new(Argument::Literal {
                    value: Literal::Str("memory://".into())
                })),
            })
        );
        assert_eq!(
            queue.arg("handlers"),
            Some(&Argument::Array {
                entries: vec![ArrayArgument {
                    key: None,
                    value: Argument::Service {
                        id: "Handler".into()
                    },
                }]
            })
        );
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let build = || {
            map(vec![
                ("C", service(vec![("b", ParameterBinding::service("B"))])),
                ("B", service(vec![("a", ParameterBinding::service("A"))])),
                ("A", service(vec![])),
                ("X", service(vec![("x", ParameterBinding::service("X"))])),
            ])
        };
        let first = GraphResolver::new(&build()).resolve();
        let second = GraphResolver::new(&build()).resolve();
        assert_eq!(first, second);
        assert_eq!(ids(&first.0), vec!["C", "B", "A"]);
    }
}
