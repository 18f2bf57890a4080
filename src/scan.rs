//! Top-level pipeline: wires the classpath order builder (§4.3), recursive
//! scanner (§4.4), class-file parser (§4.5), and graph linker (§4.6) behind
//! a single [`scan`] entry point, following the three-phase pipeline of
//! spec.md §5 (order building, discovery+parsing, linking).

use std::any::Any;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{instrument, warn};

use crate::concurrency::{CancellationToken, Recycler};
use crate::config::{ClassLoaderAdapter, ScanConfig};
use crate::element::{ClasspathElement, ElementKind, LoaderRef};
use crate::error::{Result, ScanError};
use crate::linker::{self, TypeGraph};
use crate::order;
use crate::parser::reader::ClassBuffer;
use crate::parser::{self, record::ClassInfoUnlinked};
use crate::scanner::{self, ClasspathResource, ElementScanResult, FileMatch};

/// One classpath element's entry in the final manifest: the element itself
/// plus every whitelisted/ancestor directory (or archive) timestamp seen
/// under it, for caller-side change detection.
#[derive(Debug, Clone)]
pub struct ClasspathManifestEntry {
    pub element: String,
    pub directory_timestamps: Vec<(String, std::time::SystemTime)>,
}

/// Non-fatal diagnostics collected during a scan: per spec.md §7, a
/// resource or format error is local to one element/class and does not
/// abort the scan, but callers still need to see what was skipped.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub resource_errors: Vec<(String, String)>,
    pub format_errors: Vec<(String, String)>,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.resource_errors.is_empty() && self.format_errors.is_empty()
    }
}

/// The full output of a scan: the linked type graph, every generic
/// file-path match handed back for user matchers, the ordered classpath
/// manifest, and a diagnostics report.
pub struct ScanResult {
    pub graph: TypeGraph,
    pub file_matches: Vec<FileMatch>,
    pub classpath: Vec<ClasspathManifestEntry>,
    pub report: ScanReport,
}

/// Resolve classpath root strings from host-supplied class-loader
/// references via the registered [`ClassLoaderAdapter`]s (spec.md §6, §9).
///
/// `loaders` pairs each loader object with a caller-chosen label used only
/// to build a [`LoaderRef`] identity for masking/back-reference purposes;
/// the loader object itself is never interpreted by this crate beyond
/// being handed to each adapter's `recognizes`/`classpath_of`.
///
/// Whether a given loader's parent contributes roots at all is the
/// caller's decision (made before this call, by including or omitting it
/// from `loaders`); `config.honor_parent_classloaders` only governs whether
/// this crate treats parent-contributed entries as first-class scan roots
/// or folds them into the masking set alone (see DESIGN.md's resolution of
/// spec.md §9's open question on this point).
pub fn resolve_roots_from_loaders(loaders: &[(String, Arc<dyn Any + Send + Sync>)], config: &ScanConfig) -> Vec<(String, Vec<LoaderRef>)> {
    let mut roots = Vec::new();
    for (label, loader) in loaders {
        let loader_ref = LoaderRef(Arc::from(label.as_str()));
        for adapter in &config.adapters {
            if adapter.recognizes(loader.as_ref()) {
                for path in adapter.classpath_of(loader.as_ref()) {
                    roots.push((path, vec![loader_ref.clone()]));
                }
            }
        }
    }
    roots
}

/// Run a full scan: build the ordered element list, discover and parse
/// class files concurrently, then link the results into a [`TypeGraph`].
///
/// `roots` is ignored in favor of `config.classpath_override` when the
/// latter is set (spec.md §6: "an optional classpath override (replaces
/// discovery)").
#[instrument(skip(roots, config, cancellation))]
pub fn scan(roots: Vec<(String, Vec<LoaderRef>)>, config: &ScanConfig, cancellation: &CancellationToken) -> Result<ScanResult> {
    let effective_roots = match &config.classpath_override {
        Some(paths) => paths.iter().map(|p| (p.to_string_lossy().to_string(), Vec::new())).collect(),
        None => roots,
    };

    let elements = order::build_order(effective_roots, config, cancellation)?;
    if cancellation.is_cancelled() {
        return Err(ScanError::Cancelled);
    }

    // spec.md §5: "user-selectable worker count N ≥ 1 ... a caller-supplied
    // thread pool runs all workers". Scope discovery and parsing to a pool
    // sized by config.worker_count rather than rayon's global pool.
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_count.max(1))
        .build()
        .map_err(|err| ScanError::Config(format!("failed to build a {}-thread worker pool: {err}", config.worker_count)))?;

    let mut report = ScanReport::default();

    let discovery_outcomes: Vec<(ElementScanResult, Option<(String, String)>)> = pool.install(|| {
        elements
            .par_iter()
            .map(|element| match scanner::scan_element(element, config, cancellation) {
                Ok(Some(result)) => (result, None),
                Ok(None) => (ElementScanResult::default(), None),
                Err(err) => {
                    warn!(element = %element, error = %err, "resource error scanning element");
                    (ElementScanResult::default(), Some((element.to_string(), err.to_string())))
                }
            })
            .collect()
    });
    if cancellation.is_cancelled() {
        return Err(ScanError::Cancelled);
    }

    let mut scan_results: Vec<ElementScanResult> = Vec::with_capacity(discovery_outcomes.len());
    for (result, error) in discovery_outcomes {
        if let Some(error) = error {
            report.resource_errors.push(error);
        }
        scan_results.push(result);
    }

    scanner::mask_across_elements(&mut scan_results);

    let classpath: Vec<ClasspathManifestEntry> = elements
        .iter()
        .zip(scan_results.iter())
        .map(|(element, result)| ClasspathManifestEntry {
            element: element.to_string(),
            directory_timestamps: result.directory_timestamps.clone(),
        })
        .collect();

    let buffer_pool = parser::new_buffer_pool();
    let chunk_outcomes: Vec<(Vec<ClassInfoUnlinked>, Vec<(String, String)>)> = pool.install(|| {
        elements
            .iter()
            .zip(scan_results.iter())
            .collect::<Vec<_>>()
            .par_iter()
            .map(|(element, result)| parse_element_chunk(element, &result.classfile_matches, config, cancellation, &buffer_pool))
            .collect()
    });

    if cancellation.is_cancelled() {
        return Err(ScanError::Cancelled);
    }

    let mut records = Vec::new();
    for (recs, errs) in chunk_outcomes {
        records.extend(recs);
        report.format_errors.extend(errs);
    }

    let file_matches: Vec<FileMatch> = scan_results.into_iter().flat_map(|result| result.file_matches).collect();

    let graph = linker::link_all(records);

    Ok(ScanResult {
        graph,
        file_matches,
        classpath,
        report,
    })
}

/// Parse every classfile resource discovered under one element. Each
/// element is processed as a single "chunk": its archive (if any) is opened
/// once and its buffer reused across every class file in it, matching
/// spec.md §4.7's recycling intent without needing a cross-element archive
/// handle pool (an element is only ever opened by the one worker chunk
/// processing it).
fn parse_element_chunk(
    element: &ClasspathElement,
    resources: &[ClasspathResource],
    config: &ScanConfig,
    cancellation: &CancellationToken,
    buffer_pool: &Arc<Recycler<ClassBuffer>>,
) -> (Vec<ClassInfoUnlinked>, Vec<(String, String)>) {
    let mut records = Vec::new();
    let mut errors = Vec::new();
    if resources.is_empty() {
        return (records, errors);
    }

    match element.kind() {
        ElementKind::Directory => {
            let Some(root) = element.resolved_path() else {
                return (records, errors);
            };
            for resource in resources {
                if cancellation.is_cancelled() {
                    break;
                }
                let path = root.join(&resource.relative_path);
                match parse_one_from_reader(&path, resource, element.loaders.clone(), config, buffer_pool) {
                    Ok(Some(record)) => records.push(record),
                    Ok(None) => {}
                    Err(err) => errors.push((format!("{element}!{}", resource.relative_path), err.to_string())),
                }
            }
        }
        ElementKind::Archive => {
            let Some(path) = element.resolved_path() else {
                return (records, errors);
            };
            let archive_file = match File::open(path) {
                Ok(f) => f,
                Err(err) => {
                    errors.push((element.to_string(), err.to_string()));
                    return (records, errors);
                }
            };
            let mut archive = match zip::ZipArchive::new(archive_file) {
                Ok(a) => a,
                Err(err) => {
                    errors.push((element.to_string(), err.to_string()));
                    return (records, errors);
                }
            };
            for resource in resources {
                if cancellation.is_cancelled() {
                    break;
                }
                let entry = archive.by_name(&resource.relative_path).or_else(|_| archive.by_name(&format!("/{}", resource.relative_path)));
                let mut entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        errors.push((format!("{element}!{}", resource.relative_path), err.to_string()));
                        continue;
                    }
                };
                let mut guard = buffer_pool.acquire();
                if let Err(err) = guard.load_all(&mut entry) {
                    errors.push((format!("{element}!{}", resource.relative_path), err.to_string()));
                    continue;
                }
                match parser::parse_class_file(guard.filled(), &resource.relative_path, element.loaders.clone(), config) {
                    Ok(Some(record)) => records.push(record),
                    Ok(None) => {}
                    Err(err) => errors.push((format!("{element}!{}", resource.relative_path), err.to_string())),
                }
            }
        }
        ElementKind::Nonexistent | ElementKind::Invalid => {}
    }

    (records, errors)
}

fn parse_one_from_reader(
    path: &Path,
    resource: &ClasspathResource,
    loaders: Vec<LoaderRef>,
    config: &ScanConfig,
    buffer_pool: &Arc<Recycler<ClassBuffer>>,
) -> anyhow::Result<Option<ClassInfoUnlinked>> {
    let mut file = File::open(path)?;
    let mut guard = buffer_pool.acquire();
    guard.load_all(&mut file)?;
    parser::parse_class_file(guard.filled(), &resource.relative_path, loaders, config)
}
