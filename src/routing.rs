//! Priority-ranked route table.
//!
//! Routes are ranked by their shape, not by the order they were registered:
//! fully literal patterns first, then longer literal prefixes, then fewer
//! wildcards. A literal route such as `/leads/search` therefore always beats
//! `/leads/{lead_id}` for the path `/leads/search`, whichever was declared
//! first.
//!
//! Trailing slashes carry no meaning. `/leads/search/` and `/leads/search`
//! are the same pattern and the same request path.

use axum::http::Method;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed path pattern like `/api/v1/leads/{lead_id}/tracking`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    InvalidPattern { pattern: String, reason: String },
    Duplicate { method: Method, pattern: String },
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::InvalidPattern { pattern, reason } => {
                write!(f, "invalid route pattern `{}`: {}", pattern, reason)
            }
            RouteError::Duplicate { method, pattern } => {
                write!(f, "route {} {} registered twice", method, pattern)
            }
        }
    }
}

impl std::error::Error for RouteError {}

/// Splits a path into segments, ignoring the leading and any trailing slashes.
fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.trim_start_matches('/').trim_end_matches('/');
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> Result<Self, RouteError> {
        let invalid = |reason: &str| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if !pattern.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }

        let mut segments = Vec::new();
        for part in split_path(pattern) {
            if part.is_empty() {
                return Err(invalid("empty segment"));
            }
            let opens = part.matches('{').count();
            let closes = part.matches('}').count();
            if opens == 0 && closes == 0 {
                segments.push(Segment::Literal(part.to_string()));
                continue;
            }
            let name = part
                .strip_prefix('{')
                .and_then(|rest| rest.strip_suffix('}'))
                .filter(|_| opens == 1 && closes == 1)
                .ok_or_else(|| invalid("a wildcard must span the whole segment"))?;
            if name.is_empty() {
                return Err(invalid("wildcard name is empty"));
            }
            if segments
                .iter()
                .any(|s| matches!(s, Segment::Param(existing) if existing == name))
            {
                return Err(invalid("wildcard name used twice"));
            }
            segments.push(Segment::Param(name.to_string()));
        }

        let raw = if segments.is_empty() {
            "/".to_string()
        } else {
            let mut raw = String::new();
            for segment in &segments {
                raw.push('/');
                match segment {
                    Segment::Literal(lit) => raw.push_str(lit),
                    Segment::Param(name) => {
                        raw.push('{');
                        raw.push_str(name);
                        raw.push('}');
                    }
                }
            }
            raw
        };

        Ok(Self { raw, segments })
    }

    /// Normalized form, without a trailing slash.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn wildcard_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Param(_)))
            .count()
    }

    /// Number of literal segments before the first wildcard.
    pub fn fixed_prefix_len(&self) -> usize {
        self.segments
            .iter()
            .take_while(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    pub fn is_literal(&self) -> bool {
        self.wildcard_count() == 0
    }

    /// Priority against another pattern; `Less` means tried first.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .is_literal()
            .cmp(&self.is_literal())
            .then_with(|| other.fixed_prefix_len().cmp(&self.fixed_prefix_len()))
            .then_with(|| self.wildcard_count().cmp(&other.wildcard_count()))
    }

    /// Matches the already-split request path, returning captured wildcards.
    fn capture(&self, parts: &[&str]) -> Option<HashMap<String, String>> {
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), (*part).to_string());
                }
            }
        }
        Some(params)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

struct Route<H> {
    method: Method,
    pattern: RoutePattern,
    handler: H,
    seq: usize,
}

/// A resolved route: the handler plus its captured path parameters.
#[derive(Debug)]
pub struct RouteMatch<'a, H> {
    pub handler: &'a H,
    pub params: HashMap<String, String>,
}

#[derive(Debug)]
pub enum Resolution<'a, H> {
    Matched(RouteMatch<'a, H>),
    /// Some pattern has the path's shape but none accepts the method.
    MethodNotAllowed { allowed: Vec<Method> },
    NotFound,
}

/// Method + pattern routing table, kept sorted by rank.
pub struct RouteTable<H> {
    routes: Vec<Route<H>>,
}

impl<H> RouteTable<H> {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Registers a handler. Position in the table follows the pattern's rank.
    pub fn insert(&mut self, method: Method, pattern: &str, handler: H) -> Result<(), RouteError> {
        let pattern = RoutePattern::parse(pattern)?;
        if self
            .routes
            .iter()
            .any(|r| r.method == method && r.pattern == pattern)
        {
            return Err(RouteError::Duplicate {
                method,
                pattern: pattern.raw,
            });
        }

        let seq = self.routes.len();
        let at = self
            .routes
            .iter()
            .position(|r| pattern.rank_cmp(&r.pattern).then(seq.cmp(&r.seq)) == Ordering::Less)
            .unwrap_or(self.routes.len());
        self.routes.insert(
            at,
            Route {
                method,
                pattern,
                handler,
                seq,
            },
        );
        Ok(())
    }

    /// Chaining form of [`RouteTable::insert`].
    pub fn route(mut self, method: Method, pattern: &str, handler: H) -> Result<Self, RouteError> {
        self.insert(method, pattern, handler)?;
        Ok(self)
    }

    /// Finds the highest-ranked route for `method` and `path`. `HEAD` falls
    /// back to `GET` routes when no explicit `HEAD` route matches.
    pub fn resolve(&self, method: &Method, path: &str) -> Resolution<'_, H> {
        let resolution = self.resolve_exact(method, path);
        if *method == Method::HEAD {
            if let Resolution::MethodNotAllowed { allowed } = &resolution {
                if allowed.contains(&Method::GET) {
                    return self.resolve_exact(&Method::GET, path);
                }
            }
        }
        resolution
    }

    fn resolve_exact(&self, method: &Method, path: &str) -> Resolution<'_, H> {
        let parts = split_path(path);
        let mut allowed: Vec<Method> = Vec::new();

        for route in &self.routes {
            let Some(params) = route.pattern.capture(&parts) else {
                continue;
            };
            if route.method == *method {
                return Resolution::Matched(RouteMatch {
                    handler: &route.handler,
                    params,
                });
            }
            if !allowed.contains(&route.method) {
                allowed.push(route.method.clone());
            }
        }

        if allowed.is_empty() {
            Resolution::NotFound
        } else {
            Resolution::MethodNotAllowed { allowed }
        }
    }

    /// Registered routes in resolution order.
    pub fn iter(&self) -> impl Iterator<Item = (&Method, &RoutePattern)> {
        self.routes.iter().map(|r| (&r.method, &r.pattern))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<H> Default for RouteTable<H> {
    fn default() -> Self {
        Self::new()
    }
}
