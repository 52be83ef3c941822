//! Package filters: the import/export visibility rules between namespaces.

/// A set of package-filter patterns, e.g. `["com.foo.*", "com.bar.Baz"]`.
///
/// A pattern ending in `.*` matches any symbol whose name starts with the
/// prefix before the `*`; any other pattern matches a symbol name exactly.
/// An empty filter matches nothing — an explicit, opt-in visibility model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageFilter {
    patterns: Vec<String>,
}

impl PackageFilter {
    pub fn new(patterns: Vec<String>) -> Self {
        PackageFilter { patterns }
    }

    pub fn all() -> Self {
        PackageFilter {
            patterns: vec!["*".to_owned()],
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether `name` is visible under this filter.
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern_matches(pattern, name))
    }
}

fn pattern_matches(pattern: &str, name: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix(".*") {
        Some(prefix) => name.starts_with(prefix) && name.get(prefix.len()..prefix.len() + 1) == Some("."),
        None => pattern == name,
    }
}
