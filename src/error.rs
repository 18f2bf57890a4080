use std::path::PathBuf;

/// Error taxonomy for the scan pipeline.
///
/// `Config` and `Internal` are fatal and surface immediately; `Resource` and
/// `Format` are local to a single element/class and are collected into a
/// [`crate::scan::ScanReport`] instead of aborting the scan; `Cancelled`
/// propagates upward and short-circuits the scan.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("invalid scan configuration: {0}")]
    Config(String),

    #[error("resource error at {path}: {source}")]
    Resource {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("format error in {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("scan cancelled")]
    Cancelled,

    #[error("internal invariant violation: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;

impl ScanError {
    pub fn resource(path: impl Into<PathBuf>, source: impl Into<anyhow::Error>) -> Self {
        ScanError::Resource {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn format(path: impl Into<PathBuf>, source: impl Into<anyhow::Error>) -> Self {
        ScanError::Format {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Whether this error should abort the whole scan rather than be logged
    /// and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScanError::Config(_) | ScanError::Internal(_))
    }
}
