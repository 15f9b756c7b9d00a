//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up the matching route for a request path
//! - Return the matched route or an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) path prefix scan (acceptable for typical route counts)
//! - Longest prefix wins; ties keep configuration order

use crate::config::RouteConfig;
use crate::routing::matcher::PathPrefixMatcher;

#[derive(Debug, Clone)]
struct CompiledRoute {
    name: String,
    service: String,
    matcher: PathPrefixMatcher,
    upstream_prefix: Option<String>,
}

/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub route: &'a str,
    pub service: &'a str,
    /// Path to request on the upstream instance.
    pub target_path: String,
}

#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<CompiledRoute>,
}

impl Router {
    pub fn from_config(routes: &[RouteConfig]) -> Self {
        let mut compiled: Vec<CompiledRoute> = routes
            .iter()
            .map(|r| CompiledRoute {
                name: r.name.clone(),
                service: r.service.clone(),
                matcher: PathPrefixMatcher::new(r.path_prefix.as_str()),
                upstream_prefix: r.upstream_prefix.clone(),
            })
            .collect();
        // Stable sort keeps configuration order among equal prefixes.
        compiled.sort_by(|a, b| b.matcher.specificity().cmp(&a.matcher.specificity()));
        Self { routes: compiled }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn match_path(&self, path: &str) -> Option<RouteMatch<'_>> {
        self.routes.iter().find_map(|route| {
            let target_path = match &route.upstream_prefix {
                Some(replacement) => route.matcher.rewrite(path, replacement)?,
                None if route.matcher.matches(path) => path.to_string(),
                None => return None,
            };
            Some(RouteMatch {
                route: &route.name,
                service: &route.service,
                target_path,
            })
        })
    }
}
