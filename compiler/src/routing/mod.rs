//! Route tables
//!
//! Routes without captures go into an exact-match table keyed by method and
//! normalised path. Every other route is inserted into a per-method trie of
//! [`RouteNode`]s: literal children are keyed by their text, capture children
//! by parameter name and requirement.

mod compiler;
mod matcher;
pub mod path;

pub use compiler::RouteCompiler;
pub use matcher::{RouteMatch, RouteMatcher};

use crate::metadata::{DefaultValue, HttpMethod, PrimitiveKind};
use path::Segment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a route target parameter gets its value from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum RouteArgSource {
    /// Captured path segment, coerced to a primitive when `coerce` is set
    Captured {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        coerce: Option<PrimitiveKind>,
    },
    /// The inbound request itself
    Request,
    Default {
        value: DefaultValue,
    },
    Service {
        id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteArg {
    pub name: String,
    #[serde(flatten)]
    pub source: RouteArgSource,
}

/// Terminal call of a route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteCall {
    pub class: String,
    pub method: String,
    /// Container identifier of the target instance; `None` for static targets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default)]
    pub args: Vec<RouteArg>,
    /// Template the route was registered with
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl RouteCall {
    /// `Class::method`
    pub fn target(&self) -> String {
        format!("{}::{}", self.class, self.method)
    }
}

/// Key of a trie node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouteKey {
    Root,
    Literal {
        text: String,
    },
    Capture {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        requirement: Option<String>,
    },
}

/// One node of a dynamic-route trie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteNode {
    /// Index of the path segment this node matches; the root is 0
    pub segment: usize,
    pub key: RouteKey,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub literals: Vec<RouteNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub captures: Vec<RouteNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call: Option<RouteCall>,
}

impl RouteNode {
    pub fn root() -> Self {
        Self::new(0, RouteKey::Root)
    }

    fn new(segment: usize, key: RouteKey) -> Self {
        Self {
            segment,
            key,
            literals: Vec::new(),
            captures: Vec::new(),
            call: None,
        }
    }

    /// Insert a call, returning the call it replaced
    pub fn insert(
        &mut self,
        segments: &[Segment<'_>],
        requirements: &BTreeMap<String, String>,
        call: RouteCall,
    ) -> Option<RouteCall> {
        let Some((first, rest)) = segments.split_first() else {
            return self.call.replace(call);
        };
        let index = self.segment + 1;
        let key = match first {
            Segment::Literal(text) => RouteKey::Literal {
                text: text.to_string(),
            },
            Segment::Capture(name) => RouteKey::Capture {
                name: name.to_string(),
                requirement: requirements.get(*name).cloned(),
            },
        };
        let children = match first {
            Segment::Literal(_) => &mut self.literals,
            Segment::Capture(_) => &mut self.captures,
        };
        let pos = match children.iter().position(|child| child.key == key) {
            Some(pos) => pos,
            None => {
                children.push(RouteNode::new(index, key));
                children.len() - 1
            }
        };
        children[pos].insert(rest, requirements, call)
    }

    /// Every terminal call below this node, depth first, literals first
    pub fn calls(&self) -> Vec<&RouteCall> {
        let mut calls: Vec<&RouteCall> = self.call.iter().collect();
        for child in self.literals.iter().chain(self.captures.iter()) {
            calls.extend(child.calls());
        }
        calls
    }
}

/// Route registered in the exact-match table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticRoute {
    pub method: HttpMethod,
    /// Normalised path
    pub path: String,
    pub call: RouteCall,
}

/// Compiled router
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouterPlan {
    pub statics: Vec<StaticRoute>,
    /// One trie per method
    pub tries: BTreeMap<HttpMethod, RouteNode>,
}

impl RouterPlan {
    /// Every route as (method, call); statics first, in registration order
    pub fn routes(&self) -> Vec<(HttpMethod, &RouteCall)> {
        let mut routes: Vec<(HttpMethod, &RouteCall)> =
            self.statics.iter().map(|r| (r.method, &r.call)).collect();
        for (method, root) in &self.tries {
            routes.extend(root.calls().into_iter().map(|call| (*method, call)));
        }
        routes
    }

    pub fn len(&self) -> usize {
        self.routes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.statics.is_empty() && self.tries.is_empty()
    }
}
