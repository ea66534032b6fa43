use super::path::{anchored, normalize, segments};
use super::{RouteArgSource, RouteCall, RouteKey, RouteNode, RouterPlan};
use crate::metadata::{HttpMethod, PrimitiveKind};
use regex::Regex;
use std::collections::HashMap;

/// A matched route and its captured parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch<'a> {
    pub call: &'a RouteCall,
    pub params: Vec<(String, String)>,
}

impl RouteMatch<'_> {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Request-time matcher over a [`RouterPlan`]
///
/// Requirement patterns are compiled once, when the matcher is built.
pub struct RouteMatcher {
    plan: RouterPlan,
    statics: HashMap<(HttpMethod, String), usize>,
    patterns: HashMap<String, Regex>,
}

impl RouteMatcher {
    pub fn new(plan: RouterPlan) -> Result<Self, regex::Error> {
        let mut patterns = HashMap::new();
        for root in plan.tries.values() {
            collect_patterns(root, &mut patterns)?;
        }
        let statics = plan
            .statics
            .iter()
            .enumerate()
            .map(|(i, route)| ((route.method, route.path.clone()), i))
            .collect();
        Ok(Self {
            plan,
            statics,
            patterns,
        })
    }

    pub fn plan(&self) -> &RouterPlan {
        &self.plan
    }

    /// Find the route for a request path
    ///
    /// The static table is consulted first. The trie is then walked segment
    /// by segment, literal children before capture children, backtracking on
    /// dead ends.
    pub fn find(&self, method: HttpMethod, path: &str) -> Option<RouteMatch<'_>> {
        if let Some(&i) = self.statics.get(&(method, normalize(path))) {
            return Some(RouteMatch {
                call: &self.plan.statics[i].call,
                params: Vec::new(),
            });
        }

        let root = self.plan.tries.get(&method)?;
        let segments = segments(path);
        let mut params = Vec::new();
        let call = self.search(root, &segments, &mut params)?;
        Some(RouteMatch { call, params })
    }

    /// `Class::method` of the matching route
    pub fn match_target(&self, method: HttpMethod, path: &str) -> Option<String> {
        self.find(method, path).map(|m| m.call.target())
    }

    fn search<'a>(
        &'a self,
        node: &'a RouteNode,
        segments: &[&str],
        params: &mut Vec<(String, String)>,
    ) -> Option<&'a RouteCall> {
        let Some((segment, rest)) = segments.split_first() else {
            return node
                .call
                .as_ref()
                .filter(|call| captures_coerce(call, params));
        };

        for child in &node.literals {
            if matches!(&child.key, RouteKey::Literal { text } if text == segment) {
                if let Some(call) = self.search(child, rest, params) {
                    return Some(call);
                }
            }
        }

        for child in &node.captures {
            let RouteKey::Capture { name, requirement } = &child.key else {
                continue;
            };
            if let Some(requirement) = requirement {
                let accepted = self
                    .patterns
                    .get(requirement)
                    .map(|re| re.is_match(segment))
                    .unwrap_or(false);
                if !accepted {
                    continue;
                }
            }
            params.push((name.clone(), segment.to_string()));
            if let Some(call) = self.search(child, rest, params) {
                return Some(call);
            }
            params.pop();
        }

        None
    }
}

fn collect_patterns(
    node: &RouteNode,
    patterns: &mut HashMap<String, Regex>,
) -> Result<(), regex::Error> {
    if let RouteKey::Capture {
        requirement: Some(requirement),
        ..
    } = &node.key
    {
        if !patterns.contains_key(requirement) {
            patterns.insert(requirement.clone(), Regex::new(&anchored(requirement))?);
        }
    }
    for child in node.literals.iter().chain(node.captures.iter()) {
        collect_patterns(child, patterns)?;
    }
    Ok(())
}

/// Whether every captured value can be coerced to its parameter type
fn captures_coerce(call: &RouteCall, params: &[(String, String)]) -> bool {
    call.args.iter().all(|arg| match &arg.source {
        RouteArgSource::Captured {
            coerce: Some(kind),
        } => params
            .iter()
            .find(|(name, _)| name == &arg.name)
            .map(|(_, value)| coerces(*kind, value))
            .unwrap_or(false),
        _ => true,
    })
}

pub(crate) fn coerces(kind: PrimitiveKind, value: &str) -> bool {
    match kind {
        PrimitiveKind::Int => value.parse::<i64>().is_ok(),
        PrimitiveKind::Float => value.parse::<f64>().is_ok(),
        PrimitiveKind::Bool => matches!(value, "true" | "false" | "1" | "0"),
        PrimitiveKind::String | PrimitiveKind::Array => true,
    }
}
