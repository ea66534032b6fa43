//! Compile pipeline
//!
//! The analyzer stream is snapshotted once, then the stages run in a fixed
//! order: service graph, graph resolution, routes, middleware, listeners and
//! finally the extra passes named in the configuration.

use crate::config::CompilerConfig;
use crate::container::{ContainerPlan, GraphResolver, ServiceGraphBuilder};
use crate::error::{CompileError, Diagnostic, Severity};
use crate::events::{ListenerOrderer, ListenerTable};
use crate::metadata::{Analyzer, ClassDescriptor};
use crate::middleware::{MiddlewareOrderer, MiddlewarePlan};
use crate::pass::{self, PassContext, PassFn};
use crate::routing::{RouteCompiler, RouterPlan};

/// Every plan one compile produces
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledPlans {
    pub container: ContainerPlan,
    pub router: RouterPlan,
    pub middleware: MiddlewarePlan,
    pub listeners: ListenerTable,
}

/// Result of a successful compile
#[derive(Debug, Clone)]
pub struct Compilation {
    pub plans: CompiledPlans,
    pub diagnostics: Vec<Diagnostic>,
}

impl Compilation {
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }
}

pub struct Compiler {
    config: CompilerConfig,
    passes: Vec<(String, PassFn)>,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config,
            passes: Vec::new(),
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Register a pass explicitly; takes precedence over linked passes of
    /// the same name
    pub fn register_pass(mut self, name: impl Into<String>, run: PassFn) -> Self {
        self.passes.push((name.into(), run));
        self
    }

    /// Analyse the project and compile everything
    ///
    /// Previously emitted artifacts are excluded from analysis.
    pub fn compile<A: Analyzer>(&self, analyzer: A) -> Result<Compilation, CompileError> {
        let exclude = self.config.artifact_paths();
        let classes = analyzer
            .used_classes(&self.config.project_root, &exclude)?
            .collect::<Result<Vec<_>, _>>()?;
        self.compile_classes(&classes)
    }

    pub fn compile_classes(
        &self,
        classes: &[ClassDescriptor],
    ) -> Result<Compilation, CompileError> {
        self.config.validate()?;
        let passes = self.resolve_passes()?;
        tracing::info!(classes = classes.len(), "Compiling");

        let mut diagnostics = Vec::new();
        let services = ServiceGraphBuilder::new(&self.config, classes).build(&mut diagnostics)?;
        let (container, graph_diagnostics) = GraphResolver::new(&services).resolve();
        diagnostics.extend(graph_diagnostics);

        let router =
            RouteCompiler::new(&self.config, classes, &container).compile(&mut diagnostics)?;
        let middleware =
            MiddlewareOrderer::new(&self.config, classes, &container).order(&mut diagnostics);
        let listeners =
            ListenerOrderer::new(&self.config, classes, &container).order(&mut diagnostics)?;

        let mut plans = CompiledPlans {
            container,
            router,
            middleware,
            listeners,
        };

        for (name, run) in passes {
            tracing::debug!(pass = name, "Running compiler pass");
            run(&mut PassContext {
                config: &self.config,
                plans: &mut plans,
                diagnostics: &mut diagnostics,
            })?;
        }

        let compilation = Compilation { plans, diagnostics };
        tracing::info!(
            services = compilation.plans.container.services.len(),
            routes = compilation.plans.router.len(),
            errors = compilation.errors().count(),
            warnings = compilation.warnings().count(),
            "Compiled"
        );
        Ok(compilation)
    }

    /// Look up every configured pass before anything runs
    fn resolve_passes(&self) -> Result<Vec<(&str, PassFn)>, CompileError> {
        self.config
            .passes
            .iter()
            .map(|name| {
                let run = self
                    .passes
                    .iter()
                    .find(|(registered, _)| registered == name)
                    .map(|(_, run)| *run)
                    .or_else(|| pass::find(name).map(|entry| entry.run))
                    .ok_or_else(|| CompileError::UnknownPass(name.clone()))?;
                Ok((name.as_str(), run))
            })
            .collect()
    }
}
