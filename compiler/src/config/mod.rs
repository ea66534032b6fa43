//! Compiler configuration
//!
//! Configuration is read from `prewire.toml` at the project root. Every field
//! has a default, so an empty file (or no file at all) is a valid
//! configuration. `.env` files are loaded first and a few `PREWIRE_*`
//! variables override the file:
//!
//! - `PREWIRE_PROJECT_ROOT` - project root
//! - `PREWIRE_OUTPUT_DIR` - artifact directory
//! - `PREWIRE_STRICT_ROUTES` - make duplicate routes fatal
//!
//! # Example
//!
//! ```toml
//! strict_routes = true
//! passes = ["unique-route-names"]
//!
//! [output]
//! dir = "target/prewire"
//!
//! [[services]]
//! id = "mailer"
//! class = "SmtpMailer"
//! aliases = ["Mailer"]
//!
//! [[routes]]
//! method = "GET"
//! path = "/health"
//! target = "HealthController::check"
//! ```

pub mod env;

pub use env::{env, env_optional, load_dotenv, Environment};

use crate::container::{NamedBinding, ParameterBinding};
use crate::error::CompileError;
use crate::metadata::HttpMethod;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up at the project root
pub const CONFIG_FILE: &str = "prewire.toml";

/// Everything the compiler needs besides the class descriptors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    pub project_root: PathBuf,
    pub output: OutputConfig,
    pub capabilities: CapabilityConfig,
    /// Singleton flag for services that do not say otherwise
    pub default_singleton: bool,
    /// Treat a duplicate (method, path) registration as a fatal error
    pub strict_routes: bool,
    /// Extra compiler passes, run in this order after the built-in ones
    pub passes: Vec<String>,
    pub services: Vec<ServiceDeclaration>,
    pub routes: Vec<RouteDeclaration>,
    pub middlewares: Vec<MiddlewareDeclaration>,
    pub listeners: Vec<ListenerDeclaration>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            output: OutputConfig::default(),
            capabilities: CapabilityConfig::default(),
            default_singleton: true,
            strict_routes: false,
            passes: Vec::new(),
            services: Vec::new(),
            routes: Vec::new(),
            middlewares: Vec::new(),
            listeners: Vec::new(),
        }
    }
}

/// Identifiers with a special meaning to the compiler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CapabilityConfig {
    /// Identifier the compiled container registers itself under
    pub container: String,
    /// Identifier the active configuration is registered under
    pub config: String,
    /// Parameter type that receives the inbound request in route targets
    pub request: String,
    /// Capability marking events whose propagation can be stopped
    pub stoppable_event: String,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            container: "prewire::Container".to_string(),
            config: "prewire::Config".to_string(),
            request: "Request".to_string(),
            stoppable_event: "StoppableEvent".to_string(),
        }
    }
}

/// Where artifacts go
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Artifact directory, relative to the project root
    pub dir: PathBuf,
    pub container: ArtifactConfig,
    pub router: ArtifactConfig,
    pub middleware: ArtifactConfig,
    pub listeners: ArtifactConfig,
    pub manifest: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("target/prewire"),
            container: ArtifactConfig::new("container.json", "app::container"),
            router: ArtifactConfig::new("router.json", "app::router"),
            middleware: ArtifactConfig::new("middleware.json", "app::middleware"),
            listeners: ArtifactConfig::new("listeners.json", "app::listeners"),
            manifest: "manifest.json".to_string(),
        }
    }
}

/// Location and logical module prefix of one artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactConfig {
    pub file: String,
    pub module: String,
}

impl ArtifactConfig {
    pub fn new(file: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            module: module.into(),
        }
    }
}

/// Manually declared service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDeclaration {
    pub id: String,
    /// Class to construct; defaults to `id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Static factory as `Class::method`, used instead of the constructor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<String>,
    /// Complete parameter list; replaces inference for this identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<NamedBinding>>,
    /// Per-parameter overrides, keyed by parameter name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, ParameterBinding>,
    /// Extra identifiers that resolve to this service
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub singleton: Option<bool>,
}

impl ServiceDeclaration {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            class: None,
            factory: None,
            arguments: None,
            params: BTreeMap::new(),
            aliases: Vec::new(),
            singleton: None,
        }
    }

    pub fn class_name(&self) -> &str {
        self.class.as_deref().unwrap_or(&self.id)
    }

    /// Factory split into (class, method)
    pub fn factory_ref(&self) -> Option<(&str, &str)> {
        self.factory.as_deref().and_then(split_target)
    }
}

/// Manually registered route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteDeclaration {
    pub method: HttpMethod,
    pub path: String,
    /// Target as `Class::method`
    pub target: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requirements: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Manually registered middleware
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MiddlewareDeclaration {
    pub class: String,
    #[serde(default)]
    pub priority: i32,
}

/// Manually registered listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerDeclaration {
    pub event: String,
    /// Target as `Class::method`
    pub target: String,
    /// Used when the target method is not known from the sources
    #[serde(default, rename = "static")]
    pub is_static: bool,
}

/// Split a `Class::method` reference
pub fn split_target(target: &str) -> Option<(&str, &str)> {
    target
        .rsplit_once("::")
        .filter(|(class, method)| !class.is_empty() && !method.is_empty())
}

impl CompilerConfig {
    /// Load configuration for a project
    ///
    /// Loads `.env` files, reads `prewire.toml` when present, applies
    /// environment overrides and validates the result.
    pub fn load(project_root: &Path) -> Result<Self, CompileError> {
        let environment = load_dotenv(project_root);
        let path = project_root.join(CONFIG_FILE);
        let mut config = if path.is_file() {
            Self::from_file(&path)?
        } else {
            tracing::debug!(path = %path.display(), "No configuration file, using defaults");
            Self::default()
        };
        if config.project_root == Path::new(".") {
            config.project_root = project_root.to_path_buf();
        }
        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(
            environment = %environment,
            root = %config.project_root.display(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Read a configuration file without validating it
    pub fn from_file(path: &Path) -> Result<Self, CompileError> {
        let content = std::fs::read_to_string(path).map_err(|e| CompileError::io(path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, CompileError> {
        toml::from_str(content).map_err(|e| CompileError::config(e.to_string()))
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(root) = env_optional::<PathBuf>("PREWIRE_PROJECT_ROOT") {
            self.project_root = root;
        }
        if let Some(dir) = env_optional::<PathBuf>("PREWIRE_OUTPUT_DIR") {
            self.output.dir = dir;
        }
        self.strict_routes = env("PREWIRE_STRICT_ROUTES", self.strict_routes);
    }

    /// Absolute location of the artifact directory
    pub fn output_dir(&self) -> PathBuf {
        self.project_root.join(&self.output.dir)
    }

    /// Paths of every artifact this configuration writes
    pub fn artifact_paths(&self) -> Vec<PathBuf> {
        let dir = self.output_dir();
        [
            &self.output.container.file,
            &self.output.router.file,
            &self.output.middleware.file,
            &self.output.listeners.file,
            &self.output.manifest,
        ]
        .iter()
        .map(|file| dir.join(file))
        .collect()
    }

    /// Check everything that can be checked without class descriptors
    pub fn validate(&self) -> Result<(), CompileError> {
        let caps = &self.capabilities;
        for (field, value) in [
            ("capabilities.container", &caps.container),
            ("capabilities.config", &caps.config),
            ("capabilities.request", &caps.request),
            ("capabilities.stoppable_event", &caps.stoppable_event),
        ] {
            if value.trim().is_empty() {
                return Err(CompileError::config(format!("{} must not be empty", field)));
            }
        }

        let mut files = HashSet::new();
        for file in [
            &self.output.container.file,
            &self.output.router.file,
            &self.output.middleware.file,
            &self.output.listeners.file,
            &self.output.manifest,
        ] {
            if file.is_empty() || !files.insert(file.as_str()) {
                return Err(CompileError::config(format!(
                    "artifact file name '{}' is empty or used twice",
                    file
                )));
            }
        }

        let mut ids = HashSet::new();
        for service in &self.services {
            if service.id.trim().is_empty() {
                return Err(CompileError::declaration("<service>", "empty identifier"));
            }
            if !ids.insert(service.id.as_str()) {
                return Err(CompileError::declaration(
                    &service.id,
                    "service declared more than once",
                ));
            }
            if service.factory.is_some() && service.factory_ref().is_none() {
                return Err(CompileError::declaration(
                    &service.id,
                    "factory must have the form Class::method",
                ));
            }
            let arguments = service.arguments.iter().flatten();
            for binding in arguments
                .map(|a| &a.binding)
                .chain(service.params.values())
            {
                binding
                    .validate()
                    .map_err(|message| CompileError::declaration(&service.id, message))?;
            }
        }

        for route in &self.routes {
            let subject = format!("{} {}", route.method, route.path);
            if !route.path.starts_with('/') {
                return Err(CompileError::declaration(subject, "path must start with '/'"));
            }
            if split_target(&route.target).is_none() {
                return Err(CompileError::declaration(
                    subject,
                    "target must have the form Class::method",
                ));
            }
        }

        for listener in &self.listeners {
            if split_target(&listener.target).is_none() {
                return Err(CompileError::declaration(
                    &listener.event,
                    "listener target must have the form Class::method",
                ));
            }
        }

        Ok(())
    }
}
