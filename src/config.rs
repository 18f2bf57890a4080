//! External interface inputs: the scan configuration record and the
//! class-loader adapter extension point. Assembling this record from a host
//! application's higher-level scan-specification surface is out of scope —
//! this is the record itself, not the builder DSL around it, though a small
//! builder is included here for ergonomics.

use std::any::Any;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Whether to inspect `RuntimeInvisibleAnnotations` in addition to
/// `RuntimeVisibleAnnotations`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnotationVisibility {
    RuntimeOnly,
    RuntimeAndClass,
}

impl Default for AnnotationVisibility {
    fn default() -> Self {
        AnnotationVisibility::RuntimeOnly
    }
}

/// Per-path-prefix whitelist/blacklist status returned by the configured
/// matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhitelistMatchStatus {
    WithinWhitelistedPath,
    AtWhitelistedClassPackage,
    AncestorOfWhitelistedPath,
    NotWithinWhitelistedPath,
    WithinBlacklistedPath,
}

/// Duck-typed class-loader adapter: recognizes a subset of host-runtime
/// class-loader objects and knows how to enumerate their classpath
/// contributions. Registration is explicit — no auto-discovery.
pub trait ClassLoaderAdapter: Send + Sync {
    /// Whether this adapter knows how to handle `loader`.
    fn recognizes(&self, loader: &dyn Any) -> bool;

    /// Classpath root strings contributed by `loader`. Only called after
    /// [`ClassLoaderAdapter::recognizes`] returned `true`.
    fn classpath_of(&self, loader: &dyn Any) -> Vec<String>;
}

/// Full configuration record for a scan.
#[derive(Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub whitelist_paths: Vec<String>,
    pub blacklist_paths: Vec<String>,
    pub whitelist_archive_names: Vec<String>,
    pub scan_directories: bool,
    pub scan_archives: bool,
    pub honor_parent_classloaders: bool,
    pub ignore_field_visibility: bool,
    pub ignore_method_visibility: bool,
    pub enable_field_type_indexing: bool,
    pub enable_field_and_method_annotation_indexing: bool,
    pub annotation_visibility: AnnotationVisibility,
    pub include_system_archives: bool,
    pub classpath_override: Option<Vec<PathBuf>>,
    pub static_final_field_matches: Vec<(String, String)>,
    pub worker_count: usize,

    #[serde(skip)]
    pub adapters: Vec<std::sync::Arc<dyn ClassLoaderAdapter>>,

    /// User-supplied path matchers, each named for use in diagnostics and
    /// applied to every relative path accepted by the whitelist during
    /// directory/archive traversal.
    #[serde(skip)]
    pub file_matchers: Vec<FileMatcher>,
}

/// A named, user-supplied predicate over a resource's relative path.
#[derive(Clone)]
pub struct FileMatcher {
    pub name: String,
    pub predicate: std::sync::Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl FileMatcher {
    pub fn new(name: impl Into<String>, predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            predicate: std::sync::Arc::new(predicate),
        }
    }
}

impl std::fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanConfig")
            .field("whitelist_paths", &self.whitelist_paths)
            .field("blacklist_paths", &self.blacklist_paths)
            .field("whitelist_archive_names", &self.whitelist_archive_names)
            .field("scan_directories", &self.scan_directories)
            .field("scan_archives", &self.scan_archives)
            .field("honor_parent_classloaders", &self.honor_parent_classloaders)
            .field("ignore_field_visibility", &self.ignore_field_visibility)
            .field("ignore_method_visibility", &self.ignore_method_visibility)
            .field("enable_field_type_indexing", &self.enable_field_type_indexing)
            .field(
                "enable_field_and_method_annotation_indexing",
                &self.enable_field_and_method_annotation_indexing,
            )
            .field("annotation_visibility", &self.annotation_visibility)
            .field("include_system_archives", &self.include_system_archives)
            .field("classpath_override", &self.classpath_override)
            .field("static_final_field_matches", &self.static_final_field_matches)
            .field("worker_count", &self.worker_count)
            .field("adapters", &self.adapters.len())
            .field("file_matchers", &self.file_matchers.len())
            .finish()
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            whitelist_paths: Vec::new(),
            blacklist_paths: Vec::new(),
            whitelist_archive_names: Vec::new(),
            scan_directories: true,
            scan_archives: true,
            honor_parent_classloaders: false,
            ignore_field_visibility: false,
            ignore_method_visibility: false,
            enable_field_type_indexing: true,
            enable_field_and_method_annotation_indexing: true,
            annotation_visibility: AnnotationVisibility::RuntimeOnly,
            include_system_archives: false,
            classpath_override: None,
            static_final_field_matches: Vec::new(),
            worker_count: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            adapters: Vec::new(),
            file_matchers: Vec::new(),
        }
    }
}

impl ScanConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn whitelist(mut self, prefix: impl Into<String>) -> Self {
        self.whitelist_paths.push(prefix.into());
        self
    }

    pub fn blacklist(mut self, prefix: impl Into<String>) -> Self {
        self.blacklist_paths.push(prefix.into());
        self
    }

    pub fn with_adapter(mut self, adapter: std::sync::Arc<dyn ClassLoaderAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn with_classpath_override(mut self, paths: Vec<PathBuf>) -> Self {
        self.classpath_override = Some(paths);
        self
    }

    pub fn with_file_matcher(mut self, matcher: FileMatcher) -> Self {
        self.file_matchers.push(matcher);
        self
    }

    /// Classify `relative_path` (a `/`-separated path, directories carrying
    /// a trailing `/`) against the configured whitelist/blacklist prefixes.
    pub fn match_status(&self, relative_path: &str) -> WhitelistMatchStatus {
        for prefix in &self.blacklist_paths {
            if path_is_within(relative_path, prefix) {
                return WhitelistMatchStatus::WithinBlacklistedPath;
            }
        }

        if self.whitelist_paths.is_empty() {
            return WhitelistMatchStatus::WithinWhitelistedPath;
        }

        for prefix in &self.whitelist_paths {
            if path_is_within(relative_path, prefix) {
                return WhitelistMatchStatus::WithinWhitelistedPath;
            }
            if prefix.starts_with(relative_path.trim_end_matches('/')) {
                return WhitelistMatchStatus::AncestorOfWhitelistedPath;
            }
        }

        for name in &self.whitelist_archive_names {
            let package_prefix = format!("{}/", name.trim_end_matches('/'));
            if relative_path == package_prefix || relative_path == *name {
                return WhitelistMatchStatus::AtWhitelistedClassPackage;
            }
        }

        WhitelistMatchStatus::NotWithinWhitelistedPath
    }
}

fn path_is_within(relative_path: &str, prefix: &str) -> bool {
    let normalized_prefix = prefix.trim_end_matches('/');
    let trimmed = relative_path.trim_end_matches('/');
    trimmed == normalized_prefix || trimmed.starts_with(&format!("{normalized_prefix}/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_whitelists_everything() {
        let config = ScanConfig::default();
        assert_eq!(
            config.match_status("com/x/Foo.class"),
            WhitelistMatchStatus::WithinWhitelistedPath
        );
    }

    #[test]
    fn whitelist_and_blacklist_prefixes_interact() {
        let config = ScanConfig::new().whitelist("com/x").blacklist("com/x/internal");
        assert_eq!(
            config.match_status("com/x/internal/Bar.class"),
            WhitelistMatchStatus::WithinBlacklistedPath
        );
        assert_eq!(
            config.match_status("com/x/Baz.class"),
            WhitelistMatchStatus::WithinWhitelistedPath
        );
        assert_eq!(
            config.match_status("com/y/Qux.class"),
            WhitelistMatchStatus::NotWithinWhitelistedPath
        );
    }

    #[test]
    fn ancestor_directories_of_a_whitelisted_path_are_flagged() {
        let config = ScanConfig::new().whitelist("com/x/y");
        assert_eq!(
            config.match_status("com/x"),
            WhitelistMatchStatus::AncestorOfWhitelistedPath
        );
    }
}
