//! Compiler and runtime error types
//!
//! Fatal problems are [`CompileError`]s and abort the compile. Problems that
//! only affect one identifier or one route are [`Diagnostic`]s: they are
//! recorded, the offending entry is omitted, and the compile carries on.

use crate::metadata::HttpMethod;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal compile error
#[derive(Debug, Error)]
pub enum CompileError {
    /// Malformed or inconsistent configuration
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong with the configuration
        message: String,
    },

    /// A manual service, route, middleware or listener declaration is invalid
    #[error("Invalid declaration '{subject}': {message}")]
    Declaration {
        /// Identifier or route the declaration is about
        subject: String,
        message: String,
    },

    /// Two routes terminate on the same method and path (strict mode only)
    #[error("Conflicting route {method} {path}: {existing} and {replacement}")]
    RouteConflict {
        method: HttpMethod,
        path: String,
        existing: String,
        replacement: String,
    },

    /// A route requirement is not a valid regular expression
    #[error("Invalid requirement for '{param}' in route {path}: {source}")]
    InvalidRequirement {
        path: String,
        param: String,
        #[source]
        source: regex::Error,
    },

    /// Configuration names a compiler pass that is not linked in
    #[error("Unknown compiler pass '{0}'")]
    UnknownPass(String),

    /// Project sources could not be analysed
    #[error("Source error in {}: {message}", .path.display())]
    Source { path: PathBuf, message: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl CompileError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn declaration(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Declaration {
            subject: subject.into(),
            message: message.into(),
        }
    }

    pub fn source(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Source {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// How serious a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// Why an identifier or a route was omitted (or merits a warning)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The identifier is implemented by several classes
    Ambiguous { candidates: Vec<String> },
    /// Resolving the identifier re-entered itself
    Cycle { path: Vec<String> },
    /// A parameter has no binding at all
    UnresolvableParameter { param: String },
    /// A required dependency is missing or cannot be constructed
    MissingDependency { param: String, dependency: String },
    /// A route target parameter could not be bound
    UnboundRouteParameter { param: String },
    /// The class behind a route, middleware or listener is not constructible
    MissingTarget { target: String },
    /// A later route registration replaced an earlier one
    RouteOverwritten { previous: String },
    /// A route name is used by more than one route
    DuplicateRouteName { name: String },
    /// Anything reported by a custom pass
    Custom { message: String },
}

/// Non-fatal compile finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Identifier, route or entry the finding is about
    pub subject: String,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn error(subject: impl Into<String>, kind: DiagnosticKind) -> Self {
        Self {
            severity: Severity::Error,
            subject: subject.into(),
            kind,
        }
    }

    pub fn warning(subject: impl Into<String>, kind: DiagnosticKind) -> Self {
        Self {
            severity: Severity::Warning,
            subject: subject.into(),
            kind,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.subject)?;
        match &self.kind {
            DiagnosticKind::Ambiguous { candidates } => {
                write!(f, "ambiguous, implemented by {}", candidates.join(", "))
            }
            DiagnosticKind::Cycle { path } => {
                write!(f, "circular dependency {}", path.join(" -> "))
            }
            DiagnosticKind::UnresolvableParameter { param } => {
                write!(f, "parameter '{}' cannot be resolved", param)
            }
            DiagnosticKind::MissingDependency { param, dependency } => write!(
                f,
                "parameter '{}' requires '{}' which cannot be constructed",
                param, dependency
            ),
            DiagnosticKind::UnboundRouteParameter { param } => {
                write!(f, "route parameter '{}' cannot be bound", param)
            }
            DiagnosticKind::MissingTarget { target } => {
                write!(f, "target '{}' is not constructible", target)
            }
            DiagnosticKind::RouteOverwritten { previous } => {
                write!(f, "replaces previous target {}", previous)
            }
            DiagnosticKind::DuplicateRouteName { name } => {
                write!(f, "route name '{}' is used more than once", name)
            }
            DiagnosticKind::Custom { message } => f.write_str(message),
        }
    }
}

/// Runtime error raised while serving from compiled artifacts
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Identifier is not part of the compiled container
    #[error("Service '{id}' not registered in container")]
    ServiceNotFound { id: String },

    /// Compiled plan references a class with no registered constructor
    #[error("No constructor registered for '{class}'")]
    MissingConstructor { class: String },

    /// Compiled plan references a handler, listener or middleware with no function
    #[error("No callable registered for '{target}'")]
    MissingCallable { target: String },

    #[error("Constant '{name}' is not registered")]
    MissingConstant { name: String },

    #[error("Environment variable '{key}' is not set")]
    MissingEnv { key: String },

    /// A constructor or handler asked for an argument that was not passed
    #[error("Missing argument '{name}'")]
    MissingArgument { name: String },

    /// An argument has a different shape than requested
    #[error("Argument '{name}' is not a {expected}")]
    ArgumentType { name: String, expected: &'static str },

    /// Boot-time artifact check failed
    #[error("Artifact {} is missing", .path.display())]
    ArtifactMissing { path: PathBuf },

    /// Artifact on disk does not match the manifest of the last compile
    #[error("Artifact {} is stale", .path.display())]
    ArtifactStale { path: PathBuf },

    #[error("Artifact {} is unreadable: {message}", .path.display())]
    ArtifactInvalid { path: PathBuf, message: String },

    /// Error returned by application code
    #[error("{message}")]
    Handler { message: String, status_code: u16 },
}

impl RuntimeError {
    pub fn handler(message: impl Into<String>, status_code: u16) -> Self {
        Self::Handler {
            message: message.into(),
            status_code,
        }
    }

    /// HTTP status code used when the error reaches the router
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Handler { status_code, .. } => *status_code,
            Self::MissingArgument { .. } | Self::ArgumentType { .. } => 400,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::error(
            "A",
            DiagnosticKind::Cycle {
                path: vec!["A".into(), "B".into(), "A".into()],
            },
        );
        assert_eq!(diag.to_string(), "A: circular dependency A -> B -> A");
    }

    #[test]
    fn test_runtime_status_codes() {
        assert_eq!(RuntimeError::handler("nope", 418).status_code(), 418);
        assert_eq!(
            RuntimeError::MissingArgument { name: "id".into() }.status_code(),
            400
        );
        assert_eq!(
            RuntimeError::ServiceNotFound { id: "Db".into() }.status_code(),
            500
        );
    }
}
