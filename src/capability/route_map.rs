//! Route classification
//!
//! Decides whether an operation becomes a tool, a static resource, a
//! resource template, or nothing. User rules are tried in order and the
//! first match wins; otherwise:
//!
//! | Method | Path placeholders | Kind |
//! |--------|-------------------|------|
//! | GET | one or more | resource template |
//! | GET | none | static resource |
//! | other | any | action |

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::definition::CapabilityKind;
use super::openapi::OperationDescriptor;
use crate::{Error, Result};

/// Target of a route rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    /// Invokable tool
    #[serde(alias = "tool")]
    Action,
    /// Fixed-URI resource
    #[serde(alias = "resource")]
    StaticResource,
    /// Parameterized resource
    #[serde(alias = "template")]
    ResourceTemplate,
    /// Drop the operation
    Exclude,
}

impl RouteKind {
    /// Capability kind, `None` for [`RouteKind::Exclude`]
    #[must_use]
    pub fn capability_kind(self) -> Option<CapabilityKind> {
        match self {
            Self::Action => Some(CapabilityKind::Action),
            Self::StaticResource => Some(CapabilityKind::StaticResource),
            Self::ResourceTemplate => Some(CapabilityKind::ResourceTemplate),
            Self::Exclude => None,
        }
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Action => "action",
            Self::StaticResource => "static_resource",
            Self::ResourceTemplate => "resource_template",
            Self::Exclude => "exclude",
        })
    }
}

/// HTTP methods a rule applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodSet {
    /// Every method (`*`)
    Any,
    /// Only these upper-case methods
    Only(Vec<String>),
}

impl MethodSet {
    /// Build from method names; `*` anywhere means every method
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut methods = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if name == "*" {
                return Self::Any;
            }
            methods.push(name.to_ascii_uppercase());
        }
        Self::Only(methods)
    }

    /// Returns `true` if `method` is in the set (case-insensitive)
    #[must_use]
    pub fn contains(&self, method: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(methods) => methods.iter().any(|m| m.eq_ignore_ascii_case(method)),
        }
    }
}

/// One ordered rule: methods + full-match path regex -> kind
#[derive(Debug, Clone)]
pub struct RouteMapRule {
    methods: MethodSet,
    pattern: Regex,
    kind: RouteKind,
}

impl RouteMapRule {
    /// Compile a rule. The pattern must match the whole path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid regular expression.
    pub fn new(methods: MethodSet, pattern: &str, kind: RouteKind) -> Result<Self> {
        let pattern = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| Error::Config(format!("Invalid route pattern '{pattern}': {e}")))?;
        Ok(Self {
            methods,
            pattern,
            kind,
        })
    }

    /// Target kind
    #[must_use]
    pub fn kind(&self) -> RouteKind {
        self.kind
    }

    /// Returns `true` if the rule applies to the operation
    #[must_use]
    pub fn matches(&self, op: &OperationDescriptor) -> bool {
        self.methods.contains(&op.method) && self.pattern.is_match(&op.path)
    }
}

/// Route rule as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteMapConfig {
    /// Method names, `*` for all
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,
    /// Path regular expression (full match)
    pub pattern: String,
    /// Target kind
    pub kind: RouteKind,
}

fn default_methods() -> Vec<String> {
    vec!["*".to_string()]
}

impl TryFrom<&RouteMapConfig> for RouteMapRule {
    type Error = Error;

    fn try_from(config: &RouteMapConfig) -> Result<Self> {
        Self::new(
            MethodSet::from_names(&config.methods),
            &config.pattern,
            config.kind,
        )
    }
}

/// Ordered rule list with the default fallback
#[derive(Debug, Clone, Default)]
pub struct RouteClassifier {
    rules: Vec<RouteMapRule>,
}

impl RouteClassifier {
    /// Classifier with user rules tried before the default
    #[must_use]
    pub fn new(rules: Vec<RouteMapRule>) -> Self {
        Self { rules }
    }

    /// Compile configured rules.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on the first invalid pattern.
    pub fn from_config(rules: &[RouteMapConfig]) -> Result<Self> {
        rules
            .iter()
            .map(RouteMapRule::try_from)
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }

    /// Classify one operation
    #[must_use]
    pub fn classify(&self, op: &OperationDescriptor) -> RouteKind {
        if let Some((index, rule)) = self.rules.iter().enumerate().find(|(_, r)| r.matches(op)) {
            trace!(operation = %op.id(), rule = index, kind = %rule.kind, "Route rule matched");
            return rule.kind;
        }
        Self::default_kind(op)
    }

    /// Classification when no user rule matches
    #[must_use]
    pub fn default_kind(op: &OperationDescriptor) -> RouteKind {
        if !op.method.eq_ignore_ascii_case("GET") {
            RouteKind::Action
        } else if op.path_placeholders().is_empty() {
            RouteKind::StaticResource
        } else {
            RouteKind::ResourceTemplate
        }
    }
}
