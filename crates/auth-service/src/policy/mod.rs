//! Path-based authorization policy.
//!
//! An [`AuthorizationPolicy`] is an ordered list of [`PolicyRule`]s. The first
//! rule whose method and [`PathPattern`] match the request decides what the
//! caller needs:
//!
//! - [`Access::Public`] - nothing
//! - [`Access::Authenticated`] - any validated token
//! - [`Access::Roles`] - a validated token whose role is in the set
//!
//! A request that matches no rule needs [`Access::Authenticated`].
//!
//! # Rule syntax
//!
//! Rules can be configured as text, one rule per `;`:
//!
//! ```text
//! GET /patients/** DOCTOR,ADMIN; * /admin/** ADMIN; GET /docs/* public
//! ```
//!
//! Path patterns are `/`-separated. `*` matches exactly one segment and `**`
//! matches zero or more segments; a pattern may contain at most one `**`.

use crate::middleware::auth::AuthContext;
use axum::http::Method;
use common::jwt::Role;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing policy or exempt-path configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyParseError {
    #[error("Invalid path pattern '{0}': must start with '/', use '*' or '**' only as whole segments, and use '**' at most once")]
    InvalidPattern(String),

    #[error("Invalid HTTP method '{0}'")]
    InvalidMethod(String),

    #[error("Invalid access '{0}': expected 'public', 'authenticated' or a comma list of roles")]
    InvalidAccess(String),

    #[error("Invalid rule '{0}': expected 'METHOD PATTERN ACCESS'")]
    InvalidRule(String),
}

/// Why the policy refused a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyDenial {
    /// The path needs an authenticated caller and there is none.
    #[error("Authentication required")]
    Forbidden,

    /// The caller is authenticated but its role is not allowed.
    #[error("Insufficient role: required one of {required:?}, provided {provided}")]
    InsufficientRole { required: Vec<Role>, provided: Role },
}

// =============================================================================
// Path patterns
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    One,
    Many,
}

/// A `/`-separated path pattern with `*` and `**` wildcards.
#[derive(Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Whether `path` matches this pattern.
    ///
    /// Empty segments are ignored, so `/patients/` matches `/patients`.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = split_path(path).collect();
        match_segments(&self.segments, &parts)
    }

    /// Pattern text as configured.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathPattern").field(&self.raw).finish()
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for PathPattern {
    type Err = PolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if !raw.starts_with('/') {
            return Err(PolicyParseError::InvalidPattern(raw.to_string()));
        }

        let segments = split_path(raw)
            .map(|segment| match segment {
                "*" => Ok(Segment::One),
                "**" => Ok(Segment::Many),
                literal if literal.contains('*') => {
                    Err(PolicyParseError::InvalidPattern(raw.to_string()))
                }
                literal => Ok(Segment::Literal(literal.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Keeps matching linear in the path length
        if segments.iter().filter(|s| matches!(s, Segment::Many)).count() > 1 {
            return Err(PolicyParseError::InvalidPattern(raw.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((Segment::Many, rest)) => {
            (0..=path.len()).any(|skip| match_segments(rest, path.get(skip..).unwrap_or_default()))
        }
        Some((Segment::One, rest)) => path
            .split_first()
            .is_some_and(|(_, tail)| match_segments(rest, tail)),
        Some((Segment::Literal(literal), rest)) => path
            .split_first()
            .is_some_and(|(head, tail)| head == literal && match_segments(rest, tail)),
    }
}

/// Parse a comma-separated list of path patterns.
///
/// # Errors
///
/// Returns the first pattern that fails to parse.
pub fn parse_patterns(text: &str) -> Result<Vec<PathPattern>, PolicyParseError> {
    text.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::parse)
        .collect()
}

// =============================================================================
// Rules
// =============================================================================

/// What a matching request needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// No authentication needed.
    Public,
    /// Any authenticated caller.
    Authenticated,
    /// An authenticated caller whose role is in the set.
    Roles(BTreeSet<Role>),
}

impl FromStr for Access {
    type Err = PolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "public" | "permitall" => return Ok(Access::Public),
            "authenticated" => return Ok(Access::Authenticated),
            _ => {}
        }

        let roles = trimmed
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(|r| {
                r.parse::<Role>()
                    .map_err(|_| PolicyParseError::InvalidAccess(trimmed.to_string()))
            })
            .collect::<Result<BTreeSet<_>, _>>()?;

        if roles.is_empty() {
            return Err(PolicyParseError::InvalidAccess(trimmed.to_string()));
        }
        Ok(Access::Roles(roles))
    }
}

/// One ordered policy entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRule {
    /// `None` matches any method.
    pub method: Option<Method>,
    pub pattern: PathPattern,
    pub access: Access,
}

impl PolicyRule {
    /// Build a rule from parts.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPattern` if `pattern` does not parse.
    pub fn new(
        method: Option<Method>,
        pattern: &str,
        access: Access,
    ) -> Result<Self, PolicyParseError> {
        Ok(Self {
            method,
            pattern: pattern.parse()?,
            access,
        })
    }

    fn matches(&self, method: &Method, path: &str) -> bool {
        self.method.as_ref().map_or(true, |m| m == method) && self.pattern.matches(path)
    }
}

impl FromStr for PolicyRule {
    type Err = PolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let (Some(method), Some(pattern), Some(access), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(PolicyParseError::InvalidRule(s.trim().to_string()));
        };

        let method = match method {
            "*" => None,
            m if m.eq_ignore_ascii_case("ANY") => None,
            m => Some(
                Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                    .map_err(|_| PolicyParseError::InvalidMethod(m.to_string()))?,
            ),
        };

        Ok(Self {
            method,
            pattern: pattern.parse()?,
            access: access.parse()?,
        })
    }
}

/// Parse `;`-separated rules.
///
/// # Errors
///
/// Returns the first rule that fails to parse.
pub fn parse_rules(text: &str) -> Result<Vec<PolicyRule>, PolicyParseError> {
    text.split(';')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::parse)
        .collect()
}

// =============================================================================
// Policy
// =============================================================================

/// Ordered rule list with first-match semantics.
#[derive(Debug, Clone)]
pub struct AuthorizationPolicy {
    rules: Vec<PolicyRule>,
}

impl AuthorizationPolicy {
    /// Policy consisting of exactly `rules`.
    #[must_use]
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }

    /// `configured` rules followed by this service's built-in rules.
    #[must_use]
    pub fn with_defaults(configured: Vec<PolicyRule>) -> Self {
        let mut rules = configured;
        rules.extend(default_rules());
        Self { rules }
    }

    /// Rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Access requirement for a request.
    #[must_use]
    pub fn required_access(&self, method: &Method, path: &str) -> &Access {
        self.rules
            .iter()
            .find(|rule| rule.matches(method, path))
            .map_or(&Access::Authenticated, |rule| &rule.access)
    }

    /// Decide whether a request may proceed.
    ///
    /// # Errors
    ///
    /// - `Forbidden` - authentication needed and `context` is `None`
    /// - `InsufficientRole` - role-restricted and the caller's role is not listed
    pub fn authorize(
        &self,
        method: &Method,
        path: &str,
        context: Option<&AuthContext>,
    ) -> Result<(), PolicyDenial> {
        match (self.required_access(method, path), context) {
            (Access::Public, _) => Ok(()),
            (_, None) => Err(PolicyDenial::Forbidden),
            (Access::Authenticated, Some(_)) => Ok(()),
            (Access::Roles(roles), Some(ctx)) if roles.contains(&ctx.role()) => Ok(()),
            (Access::Roles(roles), Some(ctx)) => Err(PolicyDenial::InsufficientRole {
                required: roles.iter().copied().collect(),
                provided: ctx.role(),
            }),
        }
    }
}

impl Default for AuthorizationPolicy {
    fn default() -> Self {
        Self::with_defaults(Vec::new())
    }
}

/// Built-in rules for this service's own endpoints.
fn default_rules() -> Vec<PolicyRule> {
    let public = |method: Option<Method>, pattern: &'static str| PolicyRule {
        method,
        pattern: PathPattern {
            raw: pattern.to_string(),
            segments: split_path(pattern)
                .map(|s| Segment::Literal(s.to_string()))
                .collect(),
        },
        access: Access::Public,
    };

    let mut rules = vec![
        public(None, "/health"),
        public(None, "/ready"),
        public(None, "/metrics"),
        public(Some(Method::GET), "/.well-known/jwks.json"),
        public(Some(Method::GET), "/auth/jwks"),
        public(Some(Method::POST), "/auth/login"),
        public(Some(Method::POST), "/auth/register"),
        public(Some(Method::POST), "/auth/validate"),
        public(None, "/error"),
    ];

    let mut me = public(Some(Method::GET), "/auth/me");
    me.access = Access::Authenticated;
    rules.push(me);

    rules
}
