//! Class metadata consumed by every compiler pass
//!
//! A [`ClassDescriptor`] is a read-only fact about one type of the analysed
//! project: what it is, which capabilities it satisfies, how it is
//! constructed and which declarative annotations it carries. Descriptors are
//! produced once by an [`Analyzer`] and never mutated by the builders.
//!
//! Two analyzers ship with the crate:
//! - [`StaticAnalyzer`] - descriptors handed over in memory (tests, embedding)
//! - [`SourceAnalyzer`] - parses the project's Rust sources with `syn`

mod scanner;
mod types;

pub use scanner::SourceAnalyzer;
pub use types::parse_type;

use crate::error::CompileError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// What kind of type a descriptor describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassKind {
    /// A type that can be instantiated
    Concrete,
    /// A type that cannot be instantiated on its own (e.g. generic structs)
    Abstract,
    /// A capability contract (trait)
    Interface,
    /// A type that only exists to annotate other types
    Annotation,
    /// An error type
    Throwable,
    /// A compiler-generated type without a stable name
    Anonymous,
}

impl ClassKind {
    /// Whether the service graph builder may register this type
    pub fn is_instantiable(self) -> bool {
        matches!(self, Self::Concrete)
    }
}

/// A literal value as it appears in a default or a manual declaration
///
/// Serialized as the bare value (`3`, `"text"`, `[1, 2]`, `null`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Literal>),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Str(s) => write!(f, "{:?}", s),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Primitive parameter kinds a captured route segment can be coerced to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    String,
    Int,
    Float,
    Bool,
    Array,
}

/// Declared type of a parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum ParamType {
    /// No usable type information
    Untyped,
    Primitive(PrimitiveKind),
    /// A class or capability identifier
    Named(String),
}

impl ParamType {
    /// The identifier this type refers to, if it names a class
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            _ => None,
        }
    }

    pub fn primitive(&self) -> Option<PrimitiveKind> {
        match self {
            Self::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }
}

/// Default value of a parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DefaultValue {
    Literal(Literal),
    /// Reference to a named constant, e.g. `Self::MAX` or `Limits::PAGE`
    Constant(String),
}

/// Explicit wiring hint attached to a single parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "hint", content = "value", rename_all = "snake_case")]
pub enum ParamHint {
    /// Inject this service identifier
    Inject(String),
    /// Read this environment variable at construction time
    Env(String),
}

/// A constructor or method parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub ty: ParamType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<ParamHint>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
            default: None,
            hints: Vec::new(),
        }
    }

    pub fn inject_hint(&self) -> Option<&str> {
        self.hints.iter().find_map(|h| match h {
            ParamHint::Inject(id) => Some(id.as_str()),
            _ => None,
        })
    }

    pub fn env_hint(&self) -> Option<&str> {
        self.hints.iter().find_map(|h| match h {
            ParamHint::Env(key) => Some(key.as_str()),
            _ => None,
        })
    }
}

/// HTTP methods accepted in route annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "HEAD" => Some(Self::Head),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            "OPTIONS" => Some(Self::Options),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }

    /// Convert from the `http` crate's method type
    pub fn from_http(method: &http::Method) -> Option<Self> {
        Self::parse(method.as_str())
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative annotation found on a type or one of its methods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "annotation", rename_all = "snake_case")]
pub enum Annotation {
    /// Route on a method
    Route {
        method: HttpMethod,
        path: String,
        #[serde(default)]
        requirements: Vec<(String, String)>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Path prefix applied to every route of the type
    RoutePrefix { path: String },
    /// The type is a middleware with the given priority
    Middleware { priority: i32 },
    /// Method listens to the given event type
    Listener { event: String },
    /// Explicit service options on the type
    Service { singleton: bool },
    /// Any other attribute, kept by name for custom passes
    Other { name: String },
}

/// A method of a class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Parameter>,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            is_static: false,
            annotations: Vec::new(),
        }
    }
}

/// Read-only fact about one analysed type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    /// Identifier of the type
    pub name: String,
    pub kind: ClassKind,
    /// Parent chain, nearest first
    #[serde(default)]
    pub parents: Vec<String>,
    /// Transitive closure of implemented capabilities, in declaration order
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    /// Constructor parameters; empty for a parameterless constructor
    #[serde(default)]
    pub constructor: Vec<Parameter>,
    #[serde(default)]
    pub methods: Vec<MethodDescriptor>,
    /// File the descriptor was read from, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

impl ClassDescriptor {
    pub fn new(name: impl Into<String>, kind: ClassKind) -> Self {
        Self {
            name: name.into(),
            kind,
            parents: Vec::new(),
            capabilities: Vec::new(),
            annotations: Vec::new(),
            constructor: Vec::new(),
            methods: Vec::new(),
            source: None,
        }
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn implements(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
            || self.parents.iter().any(|p| p == capability)
    }

    /// Explicit singleton flag from a `Service` annotation
    pub fn singleton_hint(&self) -> Option<bool> {
        self.annotations.iter().find_map(|a| match a {
            Annotation::Service { singleton } => Some(*singleton),
            _ => None,
        })
    }

    pub fn route_prefix(&self) -> Option<&str> {
        self.annotations.iter().find_map(|a| match a {
            Annotation::RoutePrefix { path } => Some(path.as_str()),
            _ => None,
        })
    }

    pub fn middleware_priority(&self) -> Option<i32> {
        self.annotations.iter().find_map(|a| match a {
            Annotation::Middleware { priority } => Some(*priority),
            _ => None,
        })
    }
}

/// Source of class descriptors for a project root
///
/// The returned sequence is lazy, finite and forward-only. Taking `self` by
/// value makes a second pass impossible: compiling again requires a fresh
/// analyzer. Paths in `exclude` are artifacts already written this run and
/// must not be analysed.
pub trait Analyzer {
    type Classes: Iterator<Item = Result<ClassDescriptor, CompileError>>;

    fn used_classes(
        self,
        project_root: &Path,
        exclude: &[PathBuf],
    ) -> Result<Self::Classes, CompileError>;
}

/// Analyzer over descriptors that are already in memory
#[derive(Debug, Clone, Default)]
pub struct StaticAnalyzer {
    classes: Vec<ClassDescriptor>,
}

impl StaticAnalyzer {
    pub fn new(classes: Vec<ClassDescriptor>) -> Self {
        Self { classes }
    }

    pub fn push(&mut self, class: ClassDescriptor) {
        self.classes.push(class);
    }
}

impl Analyzer for StaticAnalyzer {
    type Classes = std::iter::Map<
        std::vec::IntoIter<ClassDescriptor>,
        fn(ClassDescriptor) -> Result<ClassDescriptor, CompileError>,
    >;

    fn used_classes(
        self,
        _project_root: &Path,
        exclude: &[PathBuf],
    ) -> Result<Self::Classes, CompileError> {
        let classes: Vec<ClassDescriptor> = self
            .classes
            .into_iter()
            .filter(|c| {
                c.source
                    .as_ref()
                    .map(|src| !exclude.iter().any(|ex| ex == src))
                    .unwrap_or(true)
            })
            .collect();
        Ok(classes
            .into_iter()
            .map(Ok as fn(ClassDescriptor) -> Result<ClassDescriptor, CompileError>))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_method_parse() {
        assert_eq!(HttpMethod::parse("get"), Some(HttpMethod::Get));
        assert_eq!(HttpMethod::parse("DELETE"), Some(HttpMethod::Delete));
        assert_eq!(HttpMethod::parse("TRACE"), None);
        assert_eq!(HttpMethod::from_http(&http::Method::PATCH), Some(HttpMethod::Patch));
    }

    #[test]
    fn test_only_concrete_is_instantiable() {
        assert!(ClassKind::Concrete.is_instantiable());
        for kind in [
            ClassKind::Abstract,
            ClassKind::Interface,
            ClassKind::Annotation,
            ClassKind::Throwable,
            ClassKind::Anonymous,
        ] {
            assert!(!kind.is_instantiable(), "{:?}", kind);
        }
    }

    #[test]
    fn test_static_analyzer_skips_excluded_sources() {
        let mut kept = ClassDescriptor::new("Kept", ClassKind::Concrete);
        kept.source = Some(PathBuf::from("src/kept.rs"));
        let mut emitted = ClassDescriptor::new("Emitted", ClassKind::Concrete);
        emitted.source = Some(PathBuf::from("out/container.json"));

        let analyzer = StaticAnalyzer::new(vec![kept, emitted]);
        let names: Vec<String> = analyzer
            .used_classes(Path::new("."), &[PathBuf::from("out/container.json")])
            .unwrap()
            .map(|c| c.unwrap().name)
            .collect();

        assert_eq!(names, vec!["Kept".to_string()]);
    }

    #[test]
    fn test_literal_display() {
        let list = Literal::List(vec![Literal::Int(1), Literal::Str("a".into()), Literal::Null]);
        assert_eq!(list.to_string(), "[1, \"a\", null]");
    }
}
