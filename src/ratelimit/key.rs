//! Username key normalization.

use std::fmt;

/// Key used when the supplied username is empty after trimming.
pub const UNKNOWN_USERNAME: &str = "unknown";

/// A normalized username used to key attempt records.
///
/// Construction trims surrounding whitespace and lowercases the name, so
/// `" Alice "` and `"alice"` always map to the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UsernameKey(String);

impl UsernameKey {
    /// Normalize a raw username into a key.
    pub fn new(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            Self(UNKNOWN_USERNAME.to_string())
        } else {
            Self(normalized)
        }
    }

    /// The normalized username.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UsernameKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl AsRef<str> for UsernameKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UsernameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_trimmed_and_lowercased() {
        let key = UsernameKey::new("  Alice@Example.COM ");
        assert_eq!(key.as_str(), "alice@example.com");
    }

    #[test]
    fn test_key_equality_after_normalization() {
        assert_eq!(UsernameKey::new("BOB"), UsernameKey::new(" bob"));
        assert_ne!(UsernameKey::new("bob"), UsernameKey::new("bobby"));
    }

    #[test]
    fn test_empty_username_maps_to_unknown() {
        assert_eq!(UsernameKey::new("").as_str(), UNKNOWN_USERNAME);
        assert_eq!(UsernameKey::new("   ").as_str(), UNKNOWN_USERNAME);
    }

    #[test]
    fn test_display_matches_key() {
        let key = UsernameKey::from("Carol");
        assert_eq!(key.to_string(), "carol");
    }
}
