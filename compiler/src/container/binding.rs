//! Parameter bindings and their fallback chains

use crate::metadata::Literal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key of an array literal entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArrayKey {
    Index(i64),
    Name(String),
}

impl fmt::Display for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{}", i),
            Self::Name(name) => write!(f, "{:?}", name),
        }
    }
}

/// One entry of an [`ParameterBinding::ArrayLiteral`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<ArrayKey>,
    pub value: ParameterBinding,
}

/// A binding addressed by parameter name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedBinding {
    pub name: String,
    pub binding: ParameterBinding,
}

impl NamedBinding {
    pub fn new(name: impl Into<String>, binding: ParameterBinding) -> Self {
        Self {
            name: name.into(),
            binding,
        }
    }
}

type Fallback = Option<Box<ParameterBinding>>;

/// How one constructor parameter gets its value
///
/// Every variant except `Literal`, `NamedConstant` and `SkipIfAbsent` may
/// carry a fallback. The chain is evaluated greedily from the head: the first
/// satisfiable link wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterBinding {
    Literal {
        value: Literal,
    },
    NamedConstant {
        reference: String,
    },
    EnvLookup {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback: Fallback,
    },
    InjectedService {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback: Fallback,
    },
    /// Leave the parameter out of the construction call
    SkipIfAbsent,
    ArrayLiteral {
        entries: Vec<ArrayEntry>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback: Fallback,
    },
    /// A registered closure builder plus the bindings of its own parameters
    ClosureLiteral {
        source: String,
        #[serde(default)]
        params: Vec<NamedBinding>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback: Fallback,
    },
}

impl ParameterBinding {
    pub fn literal(value: Literal) -> Self {
        Self::Literal { value }
    }

    pub fn constant(reference: impl Into<String>) -> Self {
        Self::NamedConstant {
            reference: reference.into(),
        }
    }

    pub fn service(id: impl Into<String>) -> Self {
        Self::InjectedService {
            id: id.into(),
            fallback: None,
        }
    }

    pub fn env(key: impl Into<String>) -> Self {
        Self::EnvLookup {
            key: key.into(),
            fallback: None,
        }
    }

    pub fn fallback(&self) -> Option<&ParameterBinding> {
        match self {
            Self::EnvLookup { fallback, .. }
            | Self::InjectedService { fallback, .. }
            | Self::ArrayLiteral { fallback, .. }
            | Self::ClosureLiteral { fallback, .. } => fallback.as_deref(),
            _ => None,
        }
    }

    fn fallback_slot(&mut self) -> Option<&mut Fallback> {
        match self {
            Self::EnvLookup { fallback, .. }
            | Self::InjectedService { fallback, .. }
            | Self::ArrayLiteral { fallback, .. }
            | Self::ClosureLiteral { fallback, .. } => Some(fallback),
            _ => None,
        }
    }

    /// Append `next` at the end of the chain
    ///
    /// Links that cannot carry a fallback end the chain, so `next` is dropped
    /// when the tail is a literal, a constant or a skip.
    pub fn or(mut self, next: ParameterBinding) -> Self {
        self.push_fallback(next);
        self
    }

    fn push_fallback(&mut self, next: ParameterBinding) {
        match self.fallback_slot() {
            Some(Some(inner)) => inner.push_fallback(next),
            Some(slot) => *slot = Some(Box::new(next)),
            None => {}
        }
    }

    /// Iterate over the chain, head first
    pub fn chain(&self) -> impl Iterator<Item = &ParameterBinding> {
        std::iter::successors(Some(self), |b| b.fallback())
    }

    /// Whether the chain ends in `SkipIfAbsent`
    pub fn is_skippable(&self) -> bool {
        matches!(self.chain().last(), Some(Self::SkipIfAbsent))
    }

    /// Check the placement rules of `SkipIfAbsent`
    ///
    /// A skip is only legal as the fallback of an `InjectedService`, and
    /// never as a binding of its own.
    pub fn validate(&self) -> Result<(), String> {
        if matches!(self, Self::SkipIfAbsent) {
            return Err("skip_if_absent is only allowed as the fallback of a service".into());
        }
        self.validate_links()
    }

    fn validate_links(&self) -> Result<(), String> {
        if let Some(fallback) = self.fallback() {
            if matches!(fallback, Self::SkipIfAbsent) {
                if !matches!(self, Self::InjectedService { .. }) {
                    return Err(format!(
                        "skip_if_absent cannot be the fallback of {}",
                        self.kind_name()
                    ));
                }
            } else {
                fallback.validate_links()?;
            }
        }
        match self {
            Self::ArrayLiteral { entries, .. } => {
                for entry in entries {
                    entry.value.validate()?;
                }
            }
            Self::ClosureLiteral { params, .. } => {
                for param in params {
                    param.binding.validate()?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Literal { .. } => "literal",
            Self::NamedConstant { .. } => "named_constant",
            Self::EnvLookup { .. } => "env_lookup",
            Self::InjectedService { .. } => "injected_service",
            Self::SkipIfAbsent => "skip_if_absent",
            Self::ArrayLiteral { .. } => "array_literal",
            Self::ClosureLiteral { .. } => "closure_literal",
        }
    }
}

impl fmt::Display for ParameterBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal { value } => write!(f, "{}", value)?,
            Self::NamedConstant { reference } => write!(f, "const {}", reference)?,
            Self::EnvLookup { key, .. } => write!(f, "env({})", key)?,
            Self::InjectedService { id, .. } => write!(f, "@{}", id)?,
            Self::SkipIfAbsent => write!(f, "skip")?,
            Self::ArrayLiteral { entries, .. } => write!(f, "array[{}]", entries.len())?,
            Self::ClosureLiteral { source, .. } => write!(f, "closure {}", source)?,
        }
        if let Some(fallback) = self.fallback() {
            write!(f, " ?? {}", fallback)?;
        }
        Ok(())
    }
}
