//! Secure handling of the master secret
//!
//! The master secret is supplied once at startup, owned by the key store for
//! the process lifetime, zeroed on drop, and never persisted or printed.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// The high-entropy master secret that seals the key ring
///
/// Redacted in both `Debug` and `Display` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret {
    inner: String,
}

impl MasterSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            inner: secret.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<String> for MasterSecret {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for MasterSecret {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterSecret")
            .field("len", &self.inner.len())
            .finish()
    }
}

impl fmt::Display for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED {} bytes]", self.inner.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts() {
        let secret = MasterSecret::new("hunter2hunter2");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("MasterSecret"));
    }

    #[test]
    fn test_display_redacts() {
        let secret = MasterSecret::new("hunter2hunter2");
        let display = format!("{}", secret);
        assert!(!display.contains("hunter2"));
        assert!(display.contains("REDACTED"));
    }

    #[test]
    fn test_as_bytes() {
        let secret = MasterSecret::new("abc");
        assert_eq!(secret.as_bytes(), b"abc");
        assert!(!secret.is_empty());
    }
}
