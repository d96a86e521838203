//! Extension identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// The logical identifier of one loaded extension (`publisher.name`).
///
/// Identities compare case-insensitively: `Acme.Tools` and `acme.tools`
/// key the same per-extension state.
#[derive(Debug, Clone)]
pub struct ExtensionIdentity {
    value: String,
    key: String,
}

impl Serialize for ExtensionIdentity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.value)
    }
}

impl<'de> Deserialize<'de> for ExtensionIdentity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl ExtensionIdentity {
    /// Validate and wrap an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidIdentity`] unless the id is two non-empty
    /// `.`-separated parts made of alphanumerics, `-` and `_`.
    pub fn new(id: impl Into<String>) -> CoreResult<Self> {
        let value = id.into();
        Self::validate(&value)?;
        let key = value.to_ascii_lowercase();
        Ok(Self { value, key })
    }

    /// The identifier as originally written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// The lowercase comparison key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The publisher half of the id.
    #[must_use]
    pub fn publisher(&self) -> &str {
        self.value.split_once('.').map_or("", |(p, _)| p)
    }

    fn validate(id: &str) -> CoreResult<()> {
        let Some((publisher, name)) = id.split_once('.') else {
            return Err(CoreError::InvalidIdentity(id.to_string()));
        };
        let part_ok = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        };
        if part_ok(publisher) && part_ok(name) {
            Ok(())
        } else {
            Err(CoreError::InvalidIdentity(id.to_string()))
        }
    }
}

impl PartialEq for ExtensionIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ExtensionIdentity {}

impl std::hash::Hash for ExtensionIdentity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for ExtensionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn valid_identity() {
        let id = ExtensionIdentity::new("acme.json-tools").unwrap();
        assert_eq!(id.publisher(), "acme");
        assert_eq!(id.to_string(), "acme.json-tools");
    }

    #[test]
    fn invalid_identities() {
        for bad in ["", "acme", ".tools", "acme.", "acme.to ols", "a/b.c"] {
            assert!(ExtensionIdentity::new(bad).is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn case_insensitive_equality() {
        let a = ExtensionIdentity::new("Acme.Tools").unwrap();
        let b = ExtensionIdentity::new("acme.tools").unwrap();
        assert_eq!(a, b);
        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }
}
