//! Content identification
//!
//! A [`ContentIdentifier`] is the composite address of one piece of source
//! content. Its canonical id is a pure function of a business grouping and the
//! source name, and every piece of persisted state for that content is keyed
//! by a sanitized form of it: two identifiers with the same canonical id
//! always resolve to the same persisted state.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StateError};

/// Composite address of source content
///
/// # Identity
///
/// - `multipart_id`: ordered path segments (storage location, container,
///   object name, ...)
/// - `content_source_profile`: the profile used to read the raw content
/// - `canonical_id`: `"{group}/{name}"`, the stable persistence key
///
/// # Examples
///
/// ```rust
/// use vectorize_state::ContentIdentifier;
///
/// let id = ContentIdentifier::new(
///     vec![
///         "https://somesa.blob.core.windows.net".into(),
///         "vectorization-input".into(),
///         "somedata.pdf".into(),
///     ],
///     "SomePDFData",
///     "SomeBusinessUnit",
///     "SomePDFData",
/// );
/// assert_eq!(id.canonical_id, "SomeBusinessUnit/SomePDFData");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentIdentifier {
    /// Ordered path segments addressing the raw content
    pub multipart_id: Vec<String>,
    /// Content source profile name
    pub content_source_profile: String,
    /// Canonical id (`"{group}/{name}"`), the persistence key root
    pub canonical_id: String,
}

impl ContentIdentifier {
    /// Create an identifier, deriving the canonical id from a business
    /// grouping and the source name.
    pub fn new(
        multipart_id: Vec<String>,
        content_source_profile: impl Into<String>,
        group: impl AsRef<str>,
        name: impl AsRef<str>,
    ) -> Self {
        Self {
            multipart_id,
            content_source_profile: content_source_profile.into(),
            canonical_id: format!("{}/{}", group.as_ref(), name.as_ref()),
        }
    }

    /// Create an identifier from an already-derived canonical id.
    pub fn with_canonical_id(
        multipart_id: Vec<String>,
        content_source_profile: impl Into<String>,
        canonical_id: impl Into<String>,
    ) -> Self {
        Self {
            multipart_id,
            content_source_profile: content_source_profile.into(),
            canonical_id: canonical_id.into(),
        }
    }

    /// Multipart segments joined with `/`.
    ///
    /// Used as the prefix of indexed content-part ids
    /// (`"{unique_id}#{position:06}"`).
    pub fn unique_id(&self) -> String {
        self.multipart_id.join("/")
    }

    /// Storage-safe form of the canonical id.
    ///
    /// Every character outside `[A-Za-z0-9-]` collapses to `_`, so the result
    /// is usable as a single path segment. The mapping is deterministic:
    /// equal canonical ids produce equal persistence ids.
    pub fn persistence_id(&self) -> String {
        self.canonical_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Validate the identifier is well-formed.
    pub fn validate(&self) -> Result<()> {
        if self.multipart_id.is_empty() || self.multipart_id.iter().any(|s| s.trim().is_empty()) {
            return Err(StateError::config(
                "Content identifier requires non-empty multipart segments",
            ));
        }
        if self.canonical_id.trim().is_empty() {
            return Err(StateError::config(
                "Content identifier requires a canonical id",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ContentIdentifier {
        ContentIdentifier::new(
            vec![
                "https://somesa.blob.core.windows.net".to_string(),
                "vectorization-input".to_string(),
                "somedata.pdf".to_string(),
            ],
            "SomePDFData",
            "SomeBusinessUnit",
            "SomePDFData",
        )
    }

    #[test]
    fn test_canonical_id_derivation() {
        let id = sample();
        assert_eq!(id.canonical_id, "SomeBusinessUnit/SomePDFData");
    }

    #[test]
    fn test_canonical_id_is_deterministic() {
        let a = sample();
        let b = sample();
        assert_eq!(a.canonical_id, b.canonical_id);
        assert_eq!(a.persistence_id(), b.persistence_id());
    }

    #[test]
    fn test_unique_id_joins_segments() {
        let id = sample();
        assert_eq!(
            id.unique_id(),
            "https://somesa.blob.core.windows.net/vectorization-input/somedata.pdf"
        );
    }

    #[test]
    fn test_persistence_id_is_path_safe() {
        let id = sample();
        let pid = id.persistence_id();
        assert_eq!(pid, "SomeBusinessUnit_SomePDFData");
        assert!(pid.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_validate_rejects_empty_segments() {
        let id = ContentIdentifier::with_canonical_id(
            vec!["".to_string()],
            "profile",
            "group/name",
        );
        assert!(id.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_canonical_id() {
        let id = ContentIdentifier::with_canonical_id(vec!["a".to_string()], "profile", "  ");
        assert!(id.validate().is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let id = sample();
        let json = serde_json::to_string(&id).unwrap();
        let back: ContentIdentifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
