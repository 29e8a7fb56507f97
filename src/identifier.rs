//! Namespaced resource identifiers (`namespace:path`).

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::resource::ResourceError;

pub const NAMESPACE_SEP: char = ':';

fn namespace_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]+$").expect("valid namespace regex"))
}

fn path_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_/.]+$").expect("valid path regex"))
}

pub fn is_valid_namespace(namespace: &str) -> bool {
    namespace_pattern().is_match(namespace)
}

/// `.` is a literal filename character, so `.` and `..` segments are refused.
pub fn is_valid_path(path: &str) -> bool {
    path_pattern().is_match(path) && !path.split('/').any(|s| s == "." || s == "..")
}

/// A `namespace:path` pair addressing one resource.
///
/// Namespaces match `^[a-z][a-z0-9_]+$` and paths match `^[a-z][a-z0-9_/.]+$`.
/// The string form always round-trips through [`Identifier::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier {
    namespace: String,
    path: String,
}

impl Identifier {
    pub fn new(
        namespace: impl Into<String>,
        path: impl Into<String>,
    ) -> Result<Self, ResourceError> {
        let namespace = namespace.into();
        let path = path.into();

        if !is_valid_namespace(&namespace) {
            return Err(ResourceError::MalformedIdentifier {
                input: format!("{namespace}{NAMESPACE_SEP}{path}"),
                reason: format!("namespace '{namespace}' may only contain [a-z0-9_]"),
            });
        }
        if !is_valid_path(&path) {
            return Err(ResourceError::MalformedIdentifier {
                input: format!("{namespace}{NAMESPACE_SEP}{path}"),
                reason: format!("path '{path}' may only contain [a-z0-9_/.]"),
            });
        }

        Ok(Self { namespace, path })
    }

    pub fn parse(text: &str) -> Result<Self, ResourceError> {
        let mut parts = text.split(NAMESPACE_SEP);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(namespace), Some(path), None) => Self::new(namespace, path),
            _ => Err(ResourceError::MalformedIdentifier {
                input: text.to_string(),
                reason: format!("expected exactly one '{NAMESPACE_SEP}' separator"),
            }),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Same path under another namespace.
    pub fn with_namespace(&self, namespace: &str) -> Result<Self, ResourceError> {
        Self::new(namespace, self.path.clone())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.namespace, NAMESPACE_SEP, self.path)
    }
}

impl FromStr for Identifier {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = ResourceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.to_string()
    }
}
