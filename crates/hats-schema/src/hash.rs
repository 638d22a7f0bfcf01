//! Content hash newtype.

use serde::{Deserialize, Serialize};

/// Short content fingerprint of a pack: 7 lowercase hex characters, or
/// `"pending"` while the build is still acquiring components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    /// Number of hex characters kept from the digest.
    pub const LEN: usize = 7;

    const PENDING: &'static str = "pending";

    /// The placeholder used before the hash is computed.
    pub fn pending() -> Self {
        Self(Self::PENDING.to_string())
    }

    /// Whether this is still the placeholder.
    pub fn is_pending(&self) -> bool {
        self.0 == Self::PENDING
    }

    /// Truncate a full hex digest to a content hash.
    pub fn from_digest_hex(digest: &str) -> Self {
        Self(digest.chars().take(Self::LEN).collect::<String>().to_lowercase())
    }

    /// Return the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ContentHash {
    fn default() -> Self {
        Self::pending()
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_digest() {
        let hash = ContentHash::from_digest_hex("ABCDEF0123456789");
        assert_eq!(hash.as_str(), "abcdef0");
        assert!(!hash.is_pending());
    }

    #[test]
    fn default_is_pending() {
        assert!(ContentHash::default().is_pending());
        assert_eq!(ContentHash::pending().to_string(), "pending");
    }
}
