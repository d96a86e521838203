//! Scheme-addressed resource locators.
//!
//! A [`Uri`] names a resource inside one logical filesystem. The scheme picks
//! the provider, the path is always absolute and normalized so that two URIs
//! naming the same resource compare equal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// The scheme used when none is given.
pub const DEFAULT_SCHEME: &str = "file";

/// A parsed `scheme://authority/path` locator with a normalized path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uri {
    scheme: String,
    authority: String,
    path: String,
}

impl Uri {
    /// Build a URI from its parts, normalizing the path.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidUri`] if the scheme is empty or contains
    /// characters other than ASCII alphanumerics, `+`, `-` and `.`.
    pub fn new(
        scheme: impl Into<String>,
        authority: impl Into<String>,
        path: &str,
    ) -> CoreResult<Self> {
        let scheme = scheme.into();
        validate_scheme(&scheme, &scheme)?;
        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            authority: authority.into(),
            path: normalize_path(path),
        })
    }

    /// Shorthand for a `file:` URI with an empty authority.
    #[must_use]
    pub fn file(path: &str) -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            authority: String::new(),
            path: normalize_path(path),
        }
    }

    /// Parse `scheme://authority/path` or `scheme:path`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidUri`] if no scheme separator is present or
    /// the scheme is malformed.
    pub fn parse(input: &str) -> CoreResult<Self> {
        let Some((scheme, rest)) = input.split_once(':') else {
            return Err(CoreError::InvalidUri {
                input: input.to_string(),
                reason: "missing scheme".into(),
            });
        };
        validate_scheme(scheme, input)?;

        let (authority, path) = if let Some(after) = rest.strip_prefix("//") {
            match after.find('/') {
                Some(idx) => (&after[..idx], &after[idx..]),
                None => (after, "/"),
            }
        } else {
            ("", rest)
        };

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            authority: authority.to_string(),
            path: normalize_path(path),
        })
    }

    /// The lowercase scheme.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The authority component, empty for most in-process schemes.
    #[must_use]
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// The normalized absolute path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// True if this URI names the root of its scheme.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.path == "/"
    }

    /// Last path segment, empty for the root.
    #[must_use]
    pub fn basename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    /// The parent directory, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let idx = self.path.rfind('/')?;
        let parent = if idx == 0 { "/" } else { &self.path[..idx] };
        Some(self.with_path(parent))
    }

    /// Append a relative segment (which may itself contain `/`).
    #[must_use]
    pub fn join(&self, segment: &str) -> Self {
        self.with_path(&format!("{}/{segment}", self.path))
    }

    /// Same scheme and authority with a different path.
    #[must_use]
    pub fn with_path(&self, path: &str) -> Self {
        Self {
            scheme: self.scheme.clone(),
            authority: self.authority.clone(),
            path: normalize_path(path),
        }
    }

    /// True if `self` is `other` or lies underneath it.
    #[must_use]
    pub fn is_equal_or_descendant_of(&self, other: &Self) -> bool {
        if self.scheme != other.scheme || self.authority != other.authority {
            return false;
        }
        if other.is_root() || self.path == other.path {
            return true;
        }
        self.path
            .strip_prefix(&other.path)
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

fn validate_scheme(scheme: &str, input: &str) -> CoreResult<()> {
    let valid = !scheme.is_empty()
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidUri {
            input: input.to_string(),
            reason: format!("invalid scheme '{scheme}'"),
        })
    }
}

/// Collapse `.`/`..`/empty segments into an absolute path without a trailing slash.
///
/// `..` never climbs above the root.
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                segments.pop();
            },
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return "/".to_string();
    }
    let mut out = String::with_capacity(path.len().saturating_add(1));
    for segment in segments {
        out.push('/');
        out.push_str(segment);
    }
    out
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.path)
    }
}

impl FromStr for Uri {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Uri {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Uri {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
