//! Secure string type for credential handling with automatic memory zeroization.
//!
//! Registry and exchange connector credentials (API keys, OAuth2 client
//! secrets) are wrapped in `SecureString` so the backing memory is cleared
//! when the value is dropped.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

/// A string wrapper that zeroizes its contents when dropped.
///
/// # Example
///
/// ```
/// use tb_connectors::SecureString;
///
/// let secret = SecureString::new("registry-api-key".to_string());
/// assert_eq!(secret.expose_secret(), "registry-api-key");
/// ```
#[derive(Clone)]
pub struct SecureString(Zeroizing<String>);

impl SecureString {
    /// Creates a new `SecureString` from a `String`.
    pub fn new(s: String) -> Self {
        Self(Zeroizing::new(s))
    }

    /// Exposes the secret string for use.
    ///
    /// Avoid copying the returned value; copies are not zeroized.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// Returns the length of the secret string.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the secret string is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

impl Default for SecureString {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureString([REDACTED])")
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl PartialEq for SecureString {
    fn eq(&self, other: &Self) -> bool {
        // Constant-time comparison to prevent timing attacks
        use subtle::ConstantTimeEq;
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl Eq for SecureString {}

impl Serialize for SecureString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SecureString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(SecureString::new(s))
    }
}

impl Drop for SecureString {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expose_secret() {
        let secret = SecureString::new("my-secret-key".to_string());
        assert_eq!(secret.expose_secret(), "my-secret-key");
    }

    #[test]
    fn test_from_str() {
        let secret: SecureString = "my-secret-key".into();
        assert_eq!(secret.expose_secret(), "my-secret-key");
    }

    #[test]
    fn test_len_and_empty() {
        let secret = SecureString::new("12345".to_string());
        assert_eq!(secret.len(), 5);
        assert!(!secret.is_empty());
        assert!(SecureString::default().is_empty());
    }

    #[test]
    fn test_debug_and_display_redacted() {
        let secret = SecureString::new("super-secret".to_string());
        assert!(!format!("{:?}", secret).contains("super-secret"));
        assert!(!format!("{}", secret).contains("super-secret"));
    }

    #[test]
    fn test_equality() {
        let a = SecureString::new("same".to_string());
        let b = SecureString::new("same".to_string());
        let c = SecureString::new("different".to_string());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_serde_round_trip() {
        let original = SecureString::new("serializable-secret".to_string());
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: SecureString = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original, deserialized);
    }
}
