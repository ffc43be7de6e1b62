//! Resource paths: `container/blob` parsing, normalization and naming rules.

use std::fmt;

use super::BindingError;

const MAX_BLOB_NAME_LEN: usize = 1024;

/// Unify directory separators to `/`. Idempotent.
pub fn normalize(name: &str) -> String {
    name.replace('\\', "/")
}

/// Container naming rules: 3-63 chars of lowercase letters, digits and `-`,
/// starting and ending with a letter or digit, no `--`. `$root` and `$logs`
/// are the two reserved names that are also accepted.
pub fn validate_container_name(name: &str) -> Result<(), BindingError> {
    let fail = |reason: &str| {
        Err(BindingError::InvalidContainerName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name == "$root" || name == "$logs" {
        return Ok(());
    }
    if !(3..=63).contains(&name.len()) {
        return fail("must be 3 to 63 characters long");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return fail("may only contain lowercase letters, digits and '-'");
    }
    if name.starts_with('-') || name.ends_with('-') {
        return fail("must start and end with a letter or digit");
    }
    if name.contains("--") {
        return fail("must not contain consecutive '-'");
    }
    Ok(())
}

/// Blob naming rules: 1-1024 characters, not ending in `.` or `/`.
pub fn validate_blob_name(name: &str) -> Result<(), BindingError> {
    let fail = |reason: &str| {
        Err(BindingError::InvalidBlobName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.is_empty() {
        return fail("must not be empty");
    }
    if name.chars().count() > MAX_BLOB_NAME_LEN {
        return fail("must be at most 1024 characters long");
    }
    if name.ends_with('.') || name.ends_with('/') {
        return fail("must not end with '.' or '/'");
    }
    Ok(())
}

/// A concrete `container/blob` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobPath {
    pub container: String,
    pub blob: String,
}

impl BlobPath {
    /// Normalize, split at the first `/` and validate both parts.
    pub fn parse(path: &str) -> Result<Self, BindingError> {
        let normalized = normalize(path);
        let Some((container, blob)) = normalized.split_once('/') else {
            return Err(BindingError::IncompletePath(path.to_string()));
        };
        if blob.is_empty() {
            return Err(BindingError::IncompletePath(path.to_string()));
        }
        Self::new(container, blob)
    }

    pub fn new(container: &str, blob: &str) -> Result<Self, BindingError> {
        let blob = normalize(blob);
        validate_container_name(container)?;
        validate_blob_name(&blob)?;
        Ok(Self {
            container: container.to_string(),
            blob,
        })
    }
}

impl fmt::Display for BlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.blob)
    }
}
