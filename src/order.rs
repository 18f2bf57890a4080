//! Classpath Order Builder.
//!
//! Turns a list of root path strings into a frozen, deduplicated, ordered
//! list of [`ClasspathElement`]s. Depth-first: each element may itself
//! enqueue manifest-referenced children, which sort immediately after their
//! parent but before the next sibling by construction of their ordering key.

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, warn};

use crate::concurrency::{CancellationToken, WorkQueue};
use crate::config::ScanConfig;
use crate::element::{ClasspathElement, ElementKind, LoaderRef};
use crate::error::{Result, ScanError};

const SYSTEM_ARCHIVE_MARKERS: [&str; 3] = ["rt.jar", "jrt-fs.jar", "jce.jar"];

/// Generates dotted, zero-padded ordering keys.
///
/// Roots get single-segment keys (`"0000"`, `"0001"`, ...); a manifest child
/// of element with key `K` gets `K.0000`, `K.0001`, ... Because segments are
/// fixed-width and zero-padded, lexicographic string comparison of the whole
/// key reproduces numeric, depth-first insertion order.
fn root_key(index: usize) -> String {
    format!("{index:06}")
}

fn child_key(parent_key: &str, index: usize) -> String {
    format!("{parent_key}.{index:06}")
}

struct WorkUnit {
    parent_path: String,
    relative_path: String,
    loaders: Vec<LoaderRef>,
    ordering_key: String,
}

/// Shared, scan-scoped state threaded through the work queue.
struct OrderContext<'a> {
    config: &'a ScanConfig,
    cancellation: &'a CancellationToken,
    earliest: DashMap<PathBuf, String>,
    known_system_dirs: DashMap<PathBuf, bool>,
    valid: std::sync::Mutex<Vec<ClasspathElement>>,
}

/// Build the ordered, deduplicated element list for a set of classpath roots.
///
/// `roots` pairs each root path string with the class-loader references that
/// contributed it (possibly more than one, if several loaders agree on the
/// same entry).
pub fn build_order(
    roots: Vec<(String, Vec<LoaderRef>)>,
    config: &ScanConfig,
    cancellation: &CancellationToken,
) -> Result<Vec<ClasspathElement>> {
    let queue: WorkQueue<WorkUnit> = WorkQueue::new();
    queue.seed(roots.into_iter().enumerate().map(|(index, (path, loaders))| WorkUnit {
        parent_path: path,
        relative_path: String::new(),
        loaders,
        ordering_key: root_key(index),
    }));

    let context = OrderContext {
        config,
        cancellation,
        earliest: DashMap::new(),
        known_system_dirs: DashMap::new(),
        valid: std::sync::Mutex::new(Vec::new()),
    };

    while !queue.is_drained() {
        if cancellation.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        let Some(unit) = queue.pop() else {
            std::thread::yield_now();
            continue;
        };
        process_unit(unit, &context, &queue);
        queue.complete();
    }

    let mut elements = context.valid.into_inner().expect("order builder mutex poisoned");

    // `claim_earliest` can flip its verdict for a canonical path after an
    // element for it has already been pushed (a later-processed, smaller
    // ordering key beats an earlier-processed, larger one): keep only the
    // element whose ordering key matches the map's final winner per
    // canonical path, so no canonical path surfaces twice.
    elements.retain(|element| match element.canonical_path() {
        Ok(path) => context.earliest.get(path).is_some_and(|winner| winner.as_str() == element.ordering_key.as_str()),
        Err(_) => true,
    });

    elements.sort_by(|a, b| {
        (&a.ordering_key, &a.parent_path, &a.relative_path).cmp(&(&b.ordering_key, &b.parent_path, &b.relative_path))
    });
    Ok(elements)
}

fn process_unit(unit: WorkUnit, context: &OrderContext<'_>, queue: &WorkQueue<WorkUnit>) {
    let element = ClasspathElement::new(unit.parent_path.clone(), unit.relative_path.clone(), unit.ordering_key.clone())
        .with_loaders(unit.loaders);

    match element.kind() {
        ElementKind::Nonexistent | ElementKind::Invalid => {
            debug!(element = %element, "dropping unresolvable classpath element");
            return;
        }
        ElementKind::Directory => {
            if !context.config.scan_directories {
                return;
            }
        }
        ElementKind::Archive => {
            if !context.config.scan_archives {
                return;
            }
        }
    }

    let canonical = match element.canonical_path() {
        Ok(path) => path.to_path_buf(),
        Err(reason) => {
            debug!(element = %element, reason, "dropping element with uncanonicalizable path");
            return;
        }
    };

    if element.kind() == ElementKind::Archive
        && !context.config.include_system_archives
        && is_system_archive(&canonical, &context.known_system_dirs)
    {
        debug!(element = %element, "dropping system archive");
        return;
    }

    if !claim_earliest(&context.earliest, &canonical, &unit.ordering_key) {
        debug!(element = %element, "dropping masked duplicate element");
        return;
    }

    if element.kind() == ElementKind::Archive {
        match read_manifest_classpath(&canonical) {
            Ok(children) => {
                for (index, child_relative) in children.into_iter().enumerate() {
                    let parent_dir = canonical.parent().map(|p| p.to_string_lossy().to_string()).unwrap_or_default();
                    queue.push(WorkUnit {
                        parent_path: parent_dir,
                        relative_path: child_relative,
                        loaders: element.loaders.clone(),
                        ordering_key: child_key(&unit.ordering_key, index),
                    });
                }
            }
            Err(err) => {
                warn!(element = %element, error = %err, "failed reading archive manifest");
            }
        }
    }

    context.valid.lock().expect("order builder mutex poisoned").push(element);
}

/// Attempt to claim `canonical` at `ordering_key` in the earliest-occurrence
/// map. Returns `true` if this occurrence should be kept (either the first
/// claim, or an earlier ordering key than what's currently recorded).
fn claim_earliest(map: &DashMap<PathBuf, String>, canonical: &Path, ordering_key: &str) -> bool {
    loop {
        match map.entry(canonical.to_path_buf()) {
            Entry::Vacant(slot) => {
                slot.insert(ordering_key.to_string());
                return true;
            }
            Entry::Occupied(mut slot) => {
                if ordering_key < slot.get().as_str() {
                    slot.insert(ordering_key.to_string());
                    return true;
                }
                return false;
            }
        }
    }
}

/// Heuristic: an archive is a system archive if it sits in a directory that
/// also contains one of the well-known runtime marker archives. The
/// containing directory's verdict is cached since many archives share a lib
/// directory.
fn is_system_archive(canonical: &Path, known_dirs: &DashMap<PathBuf, bool>) -> bool {
    let Some(dir) = canonical.parent() else {
        return false;
    };
    if let Some(cached) = known_dirs.get(dir) {
        return *cached;
    }
    let is_system = SYSTEM_ARCHIVE_MARKERS.iter().any(|marker| dir.join(marker).is_file());
    known_dirs.insert(dir.to_path_buf(), is_system);
    is_system
}

/// Parse the `Class-Path` attribute (if any) out of an archive's
/// `META-INF/MANIFEST.MF`, resolving each reference against the archive's
/// own containing directory, per the archive manifest spec (space-separated
/// relative paths).
fn read_manifest_classpath(archive_path: &Path) -> anyhow::Result<Vec<String>> {
    let file = std::fs::File::open(archive_path)?;
    let mut zip = zip::ZipArchive::new(file)?;
    let mut manifest_text = match zip.by_name("META-INF/MANIFEST.MF") {
        Ok(mut entry) => {
            let mut buf = String::new();
            entry.read_to_string(&mut buf)?;
            buf
        }
        Err(zip::result::ZipError::FileNotFound) => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    manifest_text = unfold_manifest_lines(&manifest_text);

    for line in manifest_text.lines() {
        if let Some(value) = line.strip_prefix("Class-Path:") {
            return Ok(value.trim().split(' ').filter(|s| !s.is_empty()).map(|s| s.to_string()).collect());
        }
    }
    Ok(Vec::new())
}

/// Manifest files fold long lines: a continuation line begins with exactly
/// one space, which must be removed and joined to the previous line.
fn unfold_manifest_lines(raw: &str) -> String {
    let mut unfolded = String::new();
    for line in raw.split("\r\n").flat_map(|l| l.split('\n')) {
        if let Some(continuation) = line.strip_prefix(' ') {
            unfolded.push_str(continuation);
        } else {
            if !unfolded.is_empty() {
                unfolded.push('\n');
            }
            unfolded.push_str(line);
        }
    }
    unfolded
}

/// A flat set of all canonical paths already visited, for ordering-agnostic
/// callers that only need membership (e.g. tests verifying no duplicates).
pub fn canonical_paths(elements: &[ClasspathElement]) -> HashSet<PathBuf> {
    elements.iter().filter_map(|e| e.canonical_path().ok().map(Path::to_path_buf)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_jar(path: &Path, manifest_class_path: Option<&str>) {
        let file = std::fs::File::create(path).expect("create jar");
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        if let Some(cp) = manifest_class_path {
            zip.start_file("META-INF/MANIFEST.MF", options).expect("start manifest");
            let manifest = format!("Manifest-Version: 1.0\nClass-Path: {cp}\n");
            zip.write_all(manifest.as_bytes()).expect("write manifest");
        }
        zip.start_file("com/x/Foo.class", options).expect("start entry");
        zip.write_all(b"\xCA\xFE\xBA\xBE").expect("write entry");
        zip.finish().expect("finish jar");
    }

    #[test]
    fn ordering_keys_sort_children_immediately_after_parent() {
        let parent = root_key(0);
        let child = child_key(&parent, 0);
        let sibling = root_key(1);
        let mut keys = vec![sibling.clone(), child.clone(), parent.clone()];
        keys.sort();
        assert_eq!(keys, vec![parent, child, sibling]);
    }

    #[test]
    fn build_order_follows_manifest_class_path_before_next_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a.jar");
        let b = dir.path().join("b.jar");
        let c = dir.path().join("c.jar");
        write_jar(&c, None);
        write_jar(&a, Some("c.jar"));
        write_jar(&b, None);

        let config = ScanConfig::default();
        let cancellation = CancellationToken::new();
        let roots = vec![
            (a.to_string_lossy().to_string(), Vec::new()),
            (b.to_string_lossy().to_string(), Vec::new()),
        ];
        let elements = build_order(roots, &config, &cancellation).expect("build order");
        let names: Vec<String> = elements.iter().map(|e| e.to_string()).collect();

        assert_eq!(names.len(), 3, "expected a.jar, c.jar, b.jar: {names:?}");
        assert!(names[0].ends_with("a.jar"));
        assert!(names[1].ends_with("c.jar"));
        assert!(names[2].ends_with("b.jar"));
    }

    #[test]
    fn manifest_referenced_archive_listed_again_directly_appears_once() {
        // spec.md §8 boundary scenario 1: roots [a.jar, c.jar, b.jar] where
        // a.jar's manifest references c.jar, and c.jar is *also* listed
        // directly. Expected order a, c, b with c appearing exactly once,
        // at its earliest (manifest-child) ordering key.
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a.jar");
        let b = dir.path().join("b.jar");
        let c = dir.path().join("c.jar");
        write_jar(&c, None);
        write_jar(&a, Some("c.jar"));
        write_jar(&b, None);

        let config = ScanConfig::default();
        let cancellation = CancellationToken::new();
        let roots = vec![
            (a.to_string_lossy().to_string(), Vec::new()),
            (c.to_string_lossy().to_string(), Vec::new()),
            (b.to_string_lossy().to_string(), Vec::new()),
        ];
        let elements = build_order(roots, &config, &cancellation).expect("build order");
        let names: Vec<String> = elements.iter().map(|e| e.to_string()).collect();

        assert_eq!(names.len(), 3, "expected a.jar, c.jar, b.jar exactly once each: {names:?}");
        assert!(names[0].ends_with("a.jar"));
        assert!(names[1].ends_with("c.jar"));
        assert!(names[2].ends_with("b.jar"));

        let canonical_c = c.canonicalize().expect("canonicalize c.jar");
        let occurrences = elements.iter().filter(|e| e.canonical_path().ok() == Some(canonical_c.as_path())).count();
        assert_eq!(occurrences, 1, "c.jar must appear exactly once: {names:?}");
    }

    #[test]
    fn duplicate_roots_are_deduplicated_by_canonical_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a.jar");
        write_jar(&a, None);

        let config = ScanConfig::default();
        let cancellation = CancellationToken::new();
        let roots = vec![
            (a.to_string_lossy().to_string(), Vec::new()),
            (a.to_string_lossy().to_string(), Vec::new()),
        ];
        let elements = build_order(roots, &config, &cancellation).expect("build order");
        assert_eq!(elements.len(), 1);
    }

    #[test]
    fn system_archive_is_excluded_by_default() {
        let system_dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(system_dir.path().join("rt.jar"), b"\xCA\xFE\xBA\xBE").expect("write rt.jar");
        let app_dir = tempfile::tempdir().expect("tempdir");
        let app_jar = app_dir.path().join("other.jar");
        write_jar(&app_jar, None);

        let config = ScanConfig::default();
        let cancellation = CancellationToken::new();
        let roots = vec![
            (system_dir.path().join("rt.jar").to_string_lossy().to_string(), Vec::new()),
            (app_jar.to_string_lossy().to_string(), Vec::new()),
        ];
        let elements = build_order(roots, &config, &cancellation).expect("build order");
        assert_eq!(elements.len(), 1);
        assert!(elements[0].to_string().ends_with("other.jar"));
    }
}
