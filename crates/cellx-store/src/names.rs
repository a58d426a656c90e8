use std::fmt;

use crate::StoreError;

const MAX_COLLECTION_LEN: usize = 128;
const MAX_EMBEDDING_LEN: usize = 200;

/// A caller-supplied collection name that is safe to use as a file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionName(String);

impl CollectionName {
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let ok = !raw.is_empty()
            && raw.len() <= MAX_COLLECTION_LEN
            && !raw.starts_with('.')
            && !raw.contains("..")
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if ok {
            Ok(Self(raw.to_string()))
        } else {
            Err(StoreError::UnsafeCollection(raw.to_string()))
        }
    }

    /// Parse an optional query value; absent means the default collection.
    pub fn parse_optional(raw: Option<&str>) -> Result<Option<Self>, StoreError> {
        raw.map(Self::parse).transpose()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// File stem for a collection-scoped document.
pub(crate) fn collection_stem(collection: Option<&CollectionName>) -> &str {
    collection.map_or("default", CollectionName::as_str)
}

/// Embedding names become file stems; reject anything that could escape the
/// embedding directory or collide with temp files.
pub(crate) fn check_embedding_name(name: &str) -> Result<(), StoreError> {
    let ok = !name.is_empty()
        && name.len() <= MAX_EMBEDDING_LEN
        && !name.starts_with('.')
        && !name.ends_with(".tmp")
        && !name
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '\0') || c.is_control());
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}
