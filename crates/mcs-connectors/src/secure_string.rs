//! Zeroizing wrapper for credentials.
//!
//! Client secrets and cached access tokens are held in a [`SecureString`]
//! so the backing memory is cleared when the value is dropped and the
//! secret never leaks through `Debug` or `Display` formatting.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroizing;

/// A string whose contents are zeroized on drop and redacted in logs.
#[derive(Clone)]
pub struct SecureString(Zeroizing<String>);

impl SecureString {
    /// Wraps a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Borrows the secret for use. Avoid copying the returned slice;
    /// copies are not zeroized.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns true if the secret is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SecureString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SecureString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Default for SecureString {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl PartialEq for SecureString {
    fn eq(&self, other: &Self) -> bool {
        *self.0 == *other.0
    }
}

impl Eq for SecureString {}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureString(***)")
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl Serialize for SecureString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SecureString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::new(String::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_wrapped_value() {
        let secret = SecureString::new("hunter2");
        assert_eq!(secret.expose(), "hunter2");
        assert!(!secret.is_empty());
    }

    #[test]
    fn debug_and_display_are_redacted() {
        let secret = SecureString::new("topsecret");
        assert!(!format!("{:?}", secret).contains("topsecret"));
        assert!(!format!("{}", secret).contains("topsecret"));
    }

    #[test]
    fn serde_round_trip() {
        let secret = SecureString::new("roundtrip");
        let json = serde_json::to_string(&secret).unwrap();
        let back: SecureString = serde_json::from_str(&json).unwrap();
        assert_eq!(secret, back);
    }
}
