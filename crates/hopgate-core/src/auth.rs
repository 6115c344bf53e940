//! Pre-shared authentication token.

use std::fmt;

/// Shared secret presented by a caller before its query.
///
/// The token is compared for exact byte equality in [`AuthToken::matches`];
/// every call site goes through that one function.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Raw bytes sent on the wire.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Check a presented token against this one.
    pub fn matches(&self, presented: &[u8]) -> bool {
        self.0.as_bytes() == presented
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_exact_bytes_only() {
        let token = AuthToken::new("pre_shared_key");
        assert!(token.matches(b"pre_shared_key"));
        assert!(!token.matches(b"pre_shared_key "));
        assert!(!token.matches(b"PRE_SHARED_KEY"));
        assert!(!token.matches(b""));
        assert!(!token.matches(&[0xff, 0xfe]));
    }

    #[test]
    fn test_debug_is_redacted() {
        let token = AuthToken::new("hunter2");
        let printed = format!("{:?}", token);
        assert!(!printed.contains("hunter2"));
    }
}
