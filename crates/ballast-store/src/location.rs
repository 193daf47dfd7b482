//! Path and key arithmetic for the object store
//!
//! Pure string manipulation, no I/O. Checkpoint paths look like
//! `s3://bucket/prefix/...`; everything after the bucket is a flat key.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use ballast_core::{Error, Result};

/// URI scheme prefix for store paths
pub const SCHEME: &str = "s3://";

/// Characters escaped inside a path segment: everything except ASCII
/// alphanumerics and the unreserved `-_.~` set. `/` is handled separately
/// as the segment boundary.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Address of one object in the store
///
/// Immutable once constructed; the bucket is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageLocation {
    /// Bucket (container) name
    pub bucket: String,

    /// Object key; may be empty for the bucket root
    pub key: String,
}

impl StorageLocation {
    /// Parse a store URI into its bucket and key
    ///
    /// # Errors
    /// `Error::MalformedLocation` when the scheme is absent or the bucket
    /// is empty.
    pub fn parse(path: &str) -> Result<Self> {
        let rest = path
            .strip_prefix(SCHEME)
            .ok_or_else(|| Error::MalformedLocation {
                path: path.to_string(),
            })?;

        let (bucket, key) = match rest.split_once('/') {
            Some((bucket, key)) => (bucket, key),
            None => (rest, ""),
        };

        if bucket.is_empty() {
            return Err(Error::MalformedLocation {
                path: path.to_string(),
            });
        }

        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Render the location back as a store URI
    pub fn to_uri(&self) -> String {
        format!("{}{}/{}", SCHEME, self.bucket, self.key)
    }
}

impl std::fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

/// Join a base path and a relative suffix with exactly one separator
pub fn concat(base: &str, suffix: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), suffix)
}

/// Percent-encode each `/`-separated segment of a key
///
/// Separators are preserved, so the segment count is invariant. Applying
/// this to already escaped input encodes the `%` signs again; callers own
/// double-encoding awareness.
pub fn escape(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Non-throwing counterpart of [`StorageLocation::parse`]
pub fn validate(path: &str) -> bool {
    StorageLocation::parse(path).is_ok()
}

/// Whether `id` names a usable checkpoint destination
///
/// Filesystem-style local paths are accepted unconditionally; store URIs
/// must parse under the scheme.
pub fn validate_checkpoint_id(id: &str) -> bool {
    if !id.starts_with(SCHEME) {
        return true;
    }
    validate(id)
}
