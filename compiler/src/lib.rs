//! Ahead-of-time wiring for dependency injection, routing and event dispatch
//!
//! The compiler reads class descriptors (from the project sources through
//! [`SourceAnalyzer`], or from any other [`Analyzer`]), resolves every
//! constructor parameter, builds the route trie, orders middleware and
//! listeners, and hands the result to an [`Emitter`] which writes versioned
//! artifacts. At runtime the [`Kernel`] boots from those artifacts and only
//! looks things up.
//!
//! ```rust,ignore
//! let config = CompilerConfig::load(Path::new("."))?;
//! let compilation = Compiler::new(config.clone()).compile(SourceAnalyzer::new())?;
//! JsonEmitter::default().emit(&compilation.plans, &config)?;
//!
//! let kernel = Kernel::boot(&config, Registry::from_inventory())?;
//! let response = kernel.handle(request);
//! ```

pub mod compiler;
pub mod config;
pub mod container;
pub mod emit;
pub mod error;
pub mod events;
pub mod metadata;
pub mod middleware;
pub mod pass;
pub mod routing;
pub mod runtime;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use compiler::{Compilation, CompiledPlans, Compiler};
pub use config::CompilerConfig;
pub use emit::{Emitter, JsonEmitter, Manifest};
pub use error::{CompileError, Diagnostic, DiagnosticKind, RuntimeError, Severity};
pub use metadata::{Analyzer, ClassDescriptor, SourceAnalyzer, StaticAnalyzer};
pub use pass::{PassContext, PassEntry};
pub use runtime::{
    Args, Callable, Container, Event, EventDispatcher, Instance, Kernel, Registry, RegistryEntry,
    Request, Response, Router, Value,
};

pub use prewire_macros::{constructor, listener, middleware, route, route_prefix, service};

// Re-exported so applications can submit registry entries and passes
pub use inventory;
