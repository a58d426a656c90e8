use sha2::{Digest, Sha256};
use std::fmt;

/// Identifier of one user's isolated storage namespace.
///
/// Derived once per request from the user key and the dataset name and then
/// passed explicitly to every store and engine call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserScope(String);

impl UserScope {
    /// First 32 hex characters of `sha256(user || 0x00 || dataset)`.
    pub fn derive(user: &str, dataset: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(user.as_bytes());
        hasher.update([0u8]);
        hasher.update(dataset.as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(digest[..32].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
