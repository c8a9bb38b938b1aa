//! Content-addressed file identity.
//!
//! A [`Fingerprint`] is the SHA-256 digest of a file's content together with
//! its relative path and language tag, hex-encoded. It is the sole identity
//! mechanism for the analysis cache: identical content in the same context
//! always produces the same fingerprint, and any content change produces a
//! different one. Path and language are folded in so that byte-identical
//! files at different paths remain distinct cache entries.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest identifying one file's analyzed content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rehydrate a fingerprint from its stored hex form.
    pub fn from_hex(hex: String) -> Self {
        Fingerprint(hex)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the fingerprint of a file's content in its path/language context.
///
/// Pure and deterministic. Each field is length-prefixed before hashing so
/// adjacent fields cannot be reframed into a colliding input.
pub fn fingerprint(content: &[u8], relative_path: &str, language: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    for field in [relative_path.as_bytes(), language.as_bytes(), content] {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field);
    }
    Fingerprint(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = fingerprint(b"def foo(): pass", "a.py", "Python");
        let b = fingerprint(b"def foo(): pass", "a.py", "Python");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_content_sensitivity() {
        let original = fingerprint(b"def foo(): pass", "a.py", "Python");
        let mutated = fingerprint(b"def foo(): Pass", "a.py", "Python");
        assert_ne!(original, mutated);
    }

    #[test]
    fn test_path_and_language_context() {
        let base = fingerprint(b"x = 1", "a.py", "Python");
        assert_ne!(base, fingerprint(b"x = 1", "b.py", "Python"));
        assert_ne!(base, fingerprint(b"x = 1", "a.py", "Ruby"));
    }

    #[test]
    fn test_field_framing() {
        // Shifting bytes between adjacent fields must not collide.
        let a = fingerprint(b"c", "ab.py", "Python");
        let b = fingerprint(b"yc", "ab.p", "Python");
        assert_ne!(a, b);
    }
}
