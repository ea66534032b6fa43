//! Path template parsing

/// One segment of a path template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    /// `{name}`
    Capture(&'a str),
}

/// Split a path into its non-empty segments
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Parse a template such as `/users/{id}/posts`
pub fn parse_template(path: &str) -> Vec<Segment<'_>> {
    segments(path)
        .into_iter()
        .map(|segment| {
            match segment
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
                .filter(|name| !name.is_empty())
            {
                Some(name) => Segment::Capture(name),
                None => Segment::Literal(segment),
            }
        })
        .collect()
}

/// Canonical form of a path: leading slash, no empty segments, no trailing slash
pub fn normalize(path: &str) -> String {
    format!("/{}", segments(path).join("/"))
}

/// Apply a class-level prefix to a method path
pub fn join(prefix: &str, path: &str) -> String {
    normalize(&format!("{}/{}", prefix, path))
}

/// Anchor a requirement so it has to match the whole segment
pub fn anchored(requirement: &str) -> String {
    format!("^(?:{})$", requirement)
}
