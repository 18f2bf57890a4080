//! Lazy classpath-entry wrapper.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::path::{self, Normalized};

/// Opaque class-loader handle passed through from the host, used only for
/// identity/equality and for carrying through to [`crate::linker::ClassInfo`].
/// The core never interprets this value.
#[derive(Debug, Clone)]
pub struct LoaderRef(pub Arc<str>);

impl PartialEq for LoaderRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}
impl Eq for LoaderRef {}

/// What kind of filesystem object an element resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Directory,
    Archive,
    Nonexistent,
    Invalid,
}

/// Result of a single memoized probe: success with a value, or a recorded
/// I/O failure. Never retried within a scan.
#[derive(Debug, Clone)]
enum Probe<T> {
    Ok(T),
    Err(Arc<str>),
}

/// A single classpath entry, lazily resolved and canonicalized at most once.
///
/// Identity and hashing are over `(ordering_key, parent_path, relative_path)`,
/// not over the resolved filesystem path — two elements can point at the
/// same canonical path while differing in where they were declared, and the
/// classpath order builder is what reconciles that.
#[derive(Debug, Clone)]
pub struct ClasspathElement {
    pub parent_path: String,
    pub relative_path: String,
    pub loaders: Vec<LoaderRef>,
    pub ordering_key: String,

    resolved: Arc<OnceLock<Probe<PathBuf>>>,
    canonical: Arc<OnceLock<Probe<PathBuf>>>,
    kind: Arc<OnceLock<ElementKind>>,
}

impl PartialEq for ClasspathElement {
    fn eq(&self, other: &Self) -> bool {
        self.ordering_key == other.ordering_key
            && self.parent_path == other.parent_path
            && self.relative_path == other.relative_path
    }
}
impl Eq for ClasspathElement {}

impl std::hash::Hash for ClasspathElement {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ordering_key.hash(state);
        self.parent_path.hash(state);
        self.relative_path.hash(state);
    }
}

impl fmt::Display for ClasspathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.parent_path, self.relative_path)
    }
}

impl ClasspathElement {
    pub fn new(parent_path: impl Into<String>, relative_path: impl Into<String>, ordering_key: impl Into<String>) -> Self {
        Self {
            parent_path: parent_path.into(),
            relative_path: relative_path.into(),
            loaders: Vec::new(),
            ordering_key: ordering_key.into(),
            resolved: Arc::new(OnceLock::new()),
            canonical: Arc::new(OnceLock::new()),
            kind: Arc::new(OnceLock::new()),
        }
    }

    pub fn with_loaders(mut self, loaders: Vec<LoaderRef>) -> Self {
        self.loaders = loaders;
        self
    }

    fn joined(&self) -> String {
        if self.relative_path.is_empty() {
            self.parent_path.clone()
        } else if self.parent_path.is_empty() {
            self.relative_path.clone()
        } else {
            format!("{}/{}", self.parent_path.trim_end_matches('/'), self.relative_path)
        }
    }

    /// Absolute path string, or `None` for a non-local scheme (spec.md §4.1
    /// "not-local" sentinel).
    pub fn resolved_path(&self) -> Option<&Path> {
        let probe = self.resolved.get_or_init(|| match path::normalize(&self.joined()) {
            Normalized::Local(local) => Probe::Ok(PathBuf::from(local)),
            Normalized::NotLocal => Probe::Err(Arc::from("not a local path")),
        });
        match probe {
            Probe::Ok(p) => Some(p.as_path()),
            Probe::Err(_) => None,
        }
    }

    pub fn exists(&self) -> bool {
        self.resolved_path().is_some_and(|p| p.exists())
    }

    pub fn is_file(&self) -> bool {
        self.resolved_path().is_some_and(|p| p.is_file())
    }

    pub fn is_directory(&self) -> bool {
        self.resolved_path().is_some_and(|p| p.is_dir())
    }

    /// Symlink-resolved absolute path. Memoized: a canonicalization failure
    /// is recorded once and never retried, and marks the element INVALID
    /// without aborting the scan.
    pub fn canonical_path(&self) -> Result<&Path, &str> {
        let probe = self.canonical.get_or_init(|| {
            let Some(resolved) = self.resolved_path() else {
                return Probe::Err(Arc::from("not a local path"));
            };
            match resolved.canonicalize() {
                Ok(canon) => Probe::Ok(canon),
                Err(err) => Probe::Err(Arc::from(err.to_string().as_str())),
            }
        });
        match probe {
            Probe::Ok(p) => Ok(p.as_path()),
            Probe::Err(e) => Err(e.as_ref()),
        }
    }

    /// Classify this element, memoizing the result. A canonicalization
    /// failure yields `Invalid` rather than aborting the scan.
    pub fn kind(&self) -> ElementKind {
        *self.kind.get_or_init(|| {
            let Some(resolved) = self.resolved_path() else {
                return ElementKind::Invalid;
            };
            if !resolved.exists() {
                return ElementKind::Nonexistent;
            }
            if self.canonical_path().is_err() {
                return ElementKind::Invalid;
            }
            if resolved.is_dir() {
                ElementKind::Directory
            } else if resolved.is_file() && path::is_archive_suffix(&resolved.to_string_lossy()) {
                ElementKind::Archive
            } else {
                ElementKind::Invalid
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonexistent_path_is_classified_nonexistent() {
        let element = ClasspathElement::new("/no/such/dir/xyz123", "", "0");
        assert_eq!(element.kind(), ElementKind::Nonexistent);
        assert!(!element.exists());
    }

    #[test]
    fn directory_is_classified_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let element = ClasspathElement::new(dir.path().to_string_lossy().to_string(), "", "0");
        assert_eq!(element.kind(), ElementKind::Directory);
        assert!(element.is_directory());
        assert!(element.canonical_path().is_ok());
    }

    #[test]
    fn non_archive_file_is_invalid() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file_path = dir.path().join("readme.txt");
        std::fs::write(&file_path, b"hi").expect("write");
        let element = ClasspathElement::new(file_path.to_string_lossy().to_string(), "", "0");
        assert_eq!(element.kind(), ElementKind::Invalid);
    }

    #[test]
    fn jar_file_is_classified_archive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file_path = dir.path().join("lib.jar");
        std::fs::write(&file_path, b"PK\x03\x04").expect("write");
        let element = ClasspathElement::new(file_path.to_string_lossy().to_string(), "", "0");
        assert_eq!(element.kind(), ElementKind::Archive);
    }

    #[test]
    fn kind_is_memoized_across_calls() {
        let dir = tempfile::tempdir().expect("tempdir");
        let element = ClasspathElement::new(dir.path().to_string_lossy().to_string(), "", "0");
        assert_eq!(element.kind(), element.kind());
    }

    #[test]
    fn equality_and_hash_use_key_parent_relative_not_resolved_path() {
        let a = ClasspathElement::new("/tmp", "a.jar", "0");
        let b = ClasspathElement::new("/tmp", "a.jar", "0");
        assert_eq!(a, b);
        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }
}
