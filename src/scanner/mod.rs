//! Recursive directory/archive traversal that produces the two resource
//! lists consumed downstream: class-file matches (fed to the parser pool)
//! and generic file matches (handed back to user matchers verbatim).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::concurrency::CancellationToken;
use crate::config::{ScanConfig, WhitelistMatchStatus};
use crate::element::{ClasspathElement, ElementKind};

/// A single discovered resource (spec.md glossary "unlinked record" input).
#[derive(Debug, Clone)]
pub struct ClasspathResource {
    pub relative_path: String,
    pub last_modified: Option<SystemTime>,
}

/// A generic file match handed back to a user-supplied matcher.
#[derive(Debug, Clone)]
pub struct FileMatch {
    pub relative_path: String,
    pub matcher_name: String,
}

/// Per-element scan output, before cross-element masking is applied.
#[derive(Debug, Clone, Default)]
pub struct ElementScanResult {
    pub classfile_matches: Vec<ClasspathResource>,
    pub file_matches: Vec<FileMatch>,
    pub directory_timestamps: Vec<(String, SystemTime)>,
}

/// Scan a single ordered element, producing its (unmasked) resource lists.
/// Returns `Ok(None)` if cancelled mid-scan.
pub fn scan_element(
    element: &ClasspathElement,
    config: &ScanConfig,
    cancellation: &CancellationToken,
) -> anyhow::Result<Option<ElementScanResult>> {
    match element.kind() {
        ElementKind::Directory => scan_directory(element, config, cancellation),
        ElementKind::Archive => scan_archive(element, config, cancellation),
        ElementKind::Nonexistent | ElementKind::Invalid => Ok(Some(ElementScanResult::default())),
    }
}

fn scan_directory(
    element: &ClasspathElement,
    config: &ScanConfig,
    cancellation: &CancellationToken,
) -> anyhow::Result<Option<ElementScanResult>> {
    let Some(root) = element.resolved_path() else {
        return Ok(Some(ElementScanResult::default()));
    };
    let mut result = ElementScanResult::default();
    let mut visited_canonical = HashSet::new();
    walk_directory(root, root, "", config, cancellation, &mut result, &mut visited_canonical)?;
    Ok(Some(result))
}

fn walk_directory(
    root: &Path,
    dir: &Path,
    relative_dir: &str,
    config: &ScanConfig,
    cancellation: &CancellationToken,
    result: &mut ElementScanResult,
    visited_canonical: &mut HashSet<PathBuf>,
) -> anyhow::Result<()> {
    if cancellation.is_cancelled() {
        return Ok(());
    }

    if let Ok(canonical) = dir.canonicalize() {
        if !visited_canonical.insert(canonical) {
            debug!(dir = %dir.display(), "symlink cycle detected, stopping descent");
            return Ok(());
        }
    }

    let dir_relative_with_slash = if relative_dir.is_empty() {
        String::new()
    } else {
        format!("{relative_dir}/")
    };
    let status = config.match_status(&dir_relative_with_slash);
    if matches!(
        status,
        WhitelistMatchStatus::WithinBlacklistedPath | WhitelistMatchStatus::NotWithinWhitelistedPath
    ) {
        return Ok(());
    }
    if let Ok(metadata) = std::fs::metadata(dir) {
        if let Ok(modified) = metadata.modified() {
            result.directory_timestamps.push((dir_relative_with_slash.clone(), modified));
        }
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "failed reading directory");
            return Ok(());
        }
    };

    for entry in entries {
        if cancellation.is_cancelled() {
            return Ok(());
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "failed reading directory entry");
                continue;
            }
        };
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().to_string();
        let child_relative = if relative_dir.is_empty() {
            file_name.clone()
        } else {
            format!("{relative_dir}/{file_name}")
        };

        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed reading file type");
                continue;
            }
        };

        if file_type.is_dir() || file_type.is_symlink() {
            if matches!(status, WhitelistMatchStatus::NotWithinWhitelistedPath | WhitelistMatchStatus::WithinBlacklistedPath) {
                continue;
            }
            walk_directory(root, &path, &child_relative, config, cancellation, result, visited_canonical)?;
            continue;
        }

        if !file_type.is_file() {
            continue;
        }

        accept_resource(&child_relative, status, config, result, || std::fs::metadata(&path).ok().and_then(|m| m.modified().ok()));
    }

    Ok(())
}

fn accept_resource(
    relative_path: &str,
    dir_status: WhitelistMatchStatus,
    config: &ScanConfig,
    result: &mut ElementScanResult,
    last_modified: impl Fn() -> Option<SystemTime>,
) {
    let status = match dir_status {
        WhitelistMatchStatus::AncestorOfWhitelistedPath => return,
        other => other,
    };

    let file_status = match status {
        WhitelistMatchStatus::WithinWhitelistedPath => WhitelistMatchStatus::WithinWhitelistedPath,
        _ => config.match_status(relative_path),
    };

    let accepted = matches!(
        file_status,
        WhitelistMatchStatus::WithinWhitelistedPath | WhitelistMatchStatus::AtWhitelistedClassPackage
    );
    if !accepted {
        return;
    }

    if relative_path.ends_with(".class") {
        result.classfile_matches.push(ClasspathResource {
            relative_path: relative_path.to_string(),
            last_modified: last_modified(),
        });
    }

    for matcher in &config.file_matchers {
        if (matcher.predicate)(relative_path) {
            result.file_matches.push(FileMatch {
                relative_path: relative_path.to_string(),
                matcher_name: matcher.name.clone(),
            });
        }
    }
}

fn scan_archive(
    element: &ClasspathElement,
    config: &ScanConfig,
    cancellation: &CancellationToken,
) -> anyhow::Result<Option<ElementScanResult>> {
    let Some(path) = element.resolved_path() else {
        return Ok(Some(ElementScanResult::default()));
    };
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut result = ElementScanResult::default();

    let mut status_cache: std::collections::HashMap<String, WhitelistMatchStatus> = std::collections::HashMap::new();

    for index in 0..archive.len() {
        if cancellation.is_cancelled() {
            break;
        }
        let entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(archive = %path.display(), error = %err, "failed reading archive entry");
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }
        let name = normalize_archive_entry_name(entry.name());
        let parent = name.rsplit_once('/').map(|(parent, _)| format!("{parent}/")).unwrap_or_default();
        let status = *status_cache.entry(parent.clone()).or_insert_with(|| config.match_status(&parent));

        if matches!(status, WhitelistMatchStatus::WithinBlacklistedPath | WhitelistMatchStatus::NotWithinWhitelistedPath) {
            continue;
        }

        let last_modified = entry.last_modified().and_then(archive_timestamp_to_system_time);

        accept_resource(&name, status, config, &mut result, || last_modified);
    }

    Ok(Some(result))
}

/// Strip exactly one leading `/` from an archive entry name. Archive tools
/// disagree on whether entry names carry a leading slash; this crate always
/// strips exactly one.
fn normalize_archive_entry_name(name: &str) -> String {
    name.strip_prefix('/').unwrap_or(name).to_string()
}

/// Convert a DOS-epoch zip timestamp (2-second resolution, no timezone) to a
/// [`SystemTime`] via the civil-calendar day count, since the `zip` crate's
/// `DateTime` does not implement this conversion itself.
fn archive_timestamp_to_system_time(dt: zip::DateTime) -> Option<SystemTime> {
    let year = dt.year() as i64;
    let month = dt.month() as i64;
    let day = dt.day() as i64;

    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    let days_since_epoch = era * 146097 + doe - 719468;

    let seconds = days_since_epoch * 86_400 + dt.hour() as i64 * 3_600 + dt.minute() as i64 * 60 + dt.second() as i64;
    if seconds < 0 {
        return None;
    }
    SystemTime::UNIX_EPOCH.checked_add(std::time::Duration::from_secs(seconds as u64))
}

/// Cross-element masking: later elements lose any relative path already
/// claimed by an earlier one. `results` must already be in final classpath
/// order.
pub fn mask_across_elements(results: &mut [ElementScanResult]) {
    let mut seen: HashSet<String> = HashSet::new();
    for result in results.iter_mut() {
        result.classfile_matches.retain(|resource| seen.insert(resource.relative_path.clone()));
        result.file_matches.retain(|file_match| seen.insert(file_match.relative_path.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileMatcher;
    use std::io::Write as _;

    #[test]
    fn directory_scan_collects_class_files_and_skips_blacklisted() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("com/x/internal")).expect("mkdir");
        std::fs::write(dir.path().join("com/x/Foo.class"), b"\xCA\xFE\xBA\xBE").expect("write");
        std::fs::write(dir.path().join("com/x/internal/Bar.class"), b"\xCA\xFE\xBA\xBE").expect("write");

        let config = ScanConfig::new().whitelist("com/x").blacklist("com/x/internal");
        let element = ClasspathElement::new(dir.path().to_string_lossy().to_string(), "", "0");
        let cancellation = CancellationToken::new();
        let result = scan_directory(&element, &config, &cancellation).expect("scan").expect("some");

        let paths: Vec<&str> = result.classfile_matches.iter().map(|r| r.relative_path.as_str()).collect();
        assert!(paths.contains(&"com/x/Foo.class"));
        assert!(!paths.contains(&"com/x/internal/Bar.class"));
    }

    #[test]
    fn directory_scan_detects_symlink_cycle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).expect("mkdir");
        #[cfg(unix)]
        std::os::unix::fs::symlink(dir.path(), sub.join("loop")).expect("symlink");

        let config = ScanConfig::default();
        let element = ClasspathElement::new(dir.path().to_string_lossy().to_string(), "", "0");
        let cancellation = CancellationToken::new();
        let result = scan_directory(&element, &config, &cancellation);
        assert!(result.is_ok());
    }

    #[test]
    fn user_file_matcher_is_applied_to_whitelisted_resources() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("readme.txt"), b"hi").expect("write");

        let config = ScanConfig::new().with_file_matcher(FileMatcher::new("txt", |p| p.ends_with(".txt")));
        let element = ClasspathElement::new(dir.path().to_string_lossy().to_string(), "", "0");
        let cancellation = CancellationToken::new();
        let result = scan_directory(&element, &config, &cancellation).expect("scan").expect("some");

        assert_eq!(result.file_matches.len(), 1);
        assert_eq!(result.file_matches[0].matcher_name, "txt");
    }

    #[test]
    fn archive_scan_strips_leading_slash_from_entry_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let jar_path = dir.path().join("lib.jar");
        let file = std::fs::File::create(&jar_path).expect("create");
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("/com/x/Foo.class", options).expect("start");
        zip.write_all(b"\xCA\xFE\xBA\xBE").expect("write");
        zip.finish().expect("finish");

        let config = ScanConfig::default();
        let element = ClasspathElement::new(jar_path.to_string_lossy().to_string(), "", "0");
        let cancellation = CancellationToken::new();
        let result = scan_archive(&element, &config, &cancellation).expect("scan").expect("some");
        assert_eq!(result.classfile_matches[0].relative_path, "com/x/Foo.class");
    }

    #[test]
    fn masking_keeps_only_the_first_occurrence_across_elements() {
        let mut first = ElementScanResult::default();
        first.classfile_matches.push(ClasspathResource {
            relative_path: "com/x/Foo.class".to_string(),
            last_modified: None,
        });
        let mut second = ElementScanResult::default();
        second.classfile_matches.push(ClasspathResource {
            relative_path: "com/x/Foo.class".to_string(),
            last_modified: None,
        });

        let mut results = vec![first, second];
        mask_across_elements(&mut results);

        assert_eq!(results[0].classfile_matches.len(), 1);
        assert!(results[1].classfile_matches.is_empty());
    }
}
