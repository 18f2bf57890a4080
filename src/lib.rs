//! `classgrove`: concurrent classpath discovery and JVM type-graph linker.
//!
//! Discovers class files reachable from a configurable set of classpath
//! roots (directories, archives, archives' `Class-Path` manifest
//! references), parses their binary class-file format, and links the
//! results into a queryable in-memory type graph: subclass/superclass,
//! interface implementation, annotation/meta-annotation, and field/method
//! annotation relationships, plus generic file-path matching during the
//! same traversal.
//!
//! Callers assemble a [`ScanConfig`], resolve a set of classpath roots
//! (directly, or via [`resolve_roots_from_loaders`] and a registered
//! [`ClassLoaderAdapter`]), and call [`scan`]:
//!
//! ```no_run
//! use classgrove::{CancellationToken, ScanConfig, scan};
//!
//! let config = ScanConfig::new().whitelist("com.example");
//! let cancellation = CancellationToken::new();
//! let roots = vec![("/path/to/classes".to_string(), Vec::new())];
//! let result = scan(roots, &config, &cancellation).expect("scan");
//! for class in result.graph.classes() {
//!     println!("{}", class.name);
//! }
//! ```

pub mod concurrency;
pub mod config;
pub mod element;
pub mod error;
pub mod linker;
pub mod order;
pub mod parser;
pub mod path;
pub mod scan;
pub mod scanner;
pub mod telemetry;

pub use concurrency::CancellationToken;
pub use config::{AnnotationVisibility, ClassLoaderAdapter, FileMatcher, ScanConfig, WhitelistMatchStatus};
pub use element::{ClasspathElement, ElementKind, LoaderRef};
pub use error::{Result, ScanError};
pub use linker::{ClassInfo, ClassKind, TypeGraph};
pub use parser::record::{
    Annotation, ClassInfoUnlinked, ConstantValue, ElementValue, EnclosingMethodLink, FieldRecord, InnerClassLink, MethodParameter, MethodRecord,
};
pub use scan::{ClasspathManifestEntry, ScanReport, ScanResult, resolve_roots_from_loaders, scan};
pub use scanner::{ClasspathResource, ElementScanResult, FileMatch};
