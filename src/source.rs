//! Text source resolution.
//!
//! Maps a logical reference (the configured default or a caller-supplied
//! relative path) to the UTF-8 content of a file under the storage root.

use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Errors resolving a text source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The reference is not a plain relative path inside the storage root
    #[error("invalid reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },
    /// No file exists at the reference
    #[error("source file not found: {reference}")]
    NotFound { reference: String },
    /// The file exists but cannot be read as UTF-8 text
    #[error("cannot read source file '{reference}': {message}")]
    Unreadable { reference: String, message: String },
}

impl SourceError {
    fn invalid(reference: &str, reason: &str) -> Self {
        SourceError::InvalidReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        }
    }

    fn unreadable(reference: &str, message: impl ToString) -> Self {
        SourceError::Unreadable {
            reference: reference.to_string(),
            message: message.to_string(),
        }
    }

    /// The reference this error is about.
    pub fn reference(&self) -> &str {
        match self {
            SourceError::InvalidReference { reference, .. }
            | SourceError::NotFound { reference }
            | SourceError::Unreadable { reference, .. } => reference,
        }
    }
}

/// Decoded text content together with the reference it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    pub reference: String,
    pub content: String,
}

/// Resolves references against a storage root.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    root: PathBuf,
    default_reference: String,
}

impl SourceResolver {
    pub fn new(root: impl Into<PathBuf>, default_reference: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            default_reference: default_reference.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn default_reference(&self) -> &str {
        &self.default_reference
    }

    /// Read the text behind `reference`, or the default when `None`.
    ///
    /// Never writes; every call reads the file fresh.
    pub async fn resolve(&self, reference: Option<&str>) -> Result<SourceText, SourceError> {
        let reference = reference.unwrap_or(&self.default_reference);
        let relative = validate_reference(reference)?;

        let canonical_root = match tokio::fs::canonicalize(&self.root).await {
            Ok(p) => p,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound {
                    reference: reference.to_string(),
                })
            }
            Err(e) => return Err(SourceError::unreadable(reference, e)),
        };

        let canonical_file = match tokio::fs::canonicalize(canonical_root.join(&relative)).await {
            Ok(p) => p,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound {
                    reference: reference.to_string(),
                })
            }
            Err(e) => return Err(SourceError::unreadable(reference, e)),
        };

        // Symlinks may point anywhere; the target has to stay under the root
        if !canonical_file.starts_with(&canonical_root) {
            return Err(SourceError::invalid(
                reference,
                "resolves outside the storage root",
            ));
        }

        let metadata = tokio::fs::metadata(&canonical_file)
            .await
            .map_err(|e| SourceError::unreadable(reference, e))?;
        if metadata.is_dir() {
            return Err(SourceError::unreadable(reference, "is a directory"));
        }

        let bytes = tokio::fs::read(&canonical_file)
            .await
            .map_err(|e| SourceError::unreadable(reference, e))?;
        let content = String::from_utf8(bytes)
            .map_err(|_| SourceError::unreadable(reference, "not valid UTF-8"))?;

        debug!(
            "Resolved {} to {} ({} chars)",
            reference,
            canonical_file.display(),
            content.chars().count()
        );

        Ok(SourceText {
            reference: reference.to_string(),
            content,
        })
    }
}

/// Lexically check that `reference` is a relative path with no parent hops.
pub(crate) fn validate_reference(reference: &str) -> Result<PathBuf, SourceError> {
    if reference.trim().is_empty() {
        return Err(SourceError::invalid(reference, "reference is empty"));
    }

    let mut relative = PathBuf::new();
    for component in Path::new(reference).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(SourceError::invalid(reference, "'..' segments are not allowed"))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(SourceError::invalid(
                    reference,
                    "absolute paths are not allowed",
                ))
            }
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(SourceError::invalid(reference, "reference names no file"));
    }
    Ok(relative)
}
