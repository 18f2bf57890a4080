//! Pure string operations over classpath path fragments.
//!
//! Nothing here touches the filesystem; [`crate::element`] owns the I/O.

const ARCHIVE_SUFFIXES: [&str; 4] = [".jar", ".zip", ".war", ".car"];

/// Result of [`normalize`] for a single path fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// A local filesystem path, with host separators converted to `/` and
    /// any nested-archive suffix (`!...`) stripped off.
    Local(String),
    /// A scheme this resolver does not treat as a local path (e.g. `http:`).
    NotLocal,
}

/// Normalize a single classpath fragment.
///
/// - Strips a URL scheme prefix (`file:`) when present.
/// - For nested-archive notation (`outer.jar!inner/path`), keeps only the
///   fragment preceding the first `!`.
/// - Converts host path separators to `/` for use as an internal relative
///   path.
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(fragment: &str) -> Normalized {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return Normalized::Local(String::new());
    }

    if let Some(rest) = fragment.strip_prefix("file:") {
        return normalize(rest.trim_start_matches("//"));
    }
    if let Some(scheme_end) = fragment.find("://") {
        let scheme = &fragment[..scheme_end];
        if scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-') {
            return Normalized::NotLocal;
        }
    }

    let outer = fragment.split('!').next().unwrap_or(fragment);
    let slashed = to_forward_slashes(outer);
    Normalized::Local(slashed)
}

/// Convert host path separators to `/`. A no-op on Unix; swaps `\` for `/`
/// elsewhere, leaving any drive letter (`C:`) untouched.
pub fn to_forward_slashes(path: &str) -> String {
    if cfg!(windows) {
        path.replace('\\', "/")
    } else {
        path.to_string()
    }
}

/// Case-insensitive suffix match against the known archive extensions.
pub fn is_archive_suffix(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    ARCHIVE_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

/// Split a composite classpath string (as found in `CLASSPATH` or a
/// `-cp` argument) on the host's path-list separator, preserving Windows
/// drive letters (`C:\foo;D:\bar` must not split at `C:`).
pub fn split_composite(composite: &str) -> Vec<String> {
    if composite.is_empty() {
        return Vec::new();
    }

    if cfg!(windows) {
        split_windows_composite(composite)
    } else {
        composite
            .split(':')
            .filter(|entry| !entry.is_empty())
            .map(|entry| entry.to_string())
            .collect()
    }
}

fn split_windows_composite(composite: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = composite.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == ';' {
            if !current.is_empty() {
                entries.push(std::mem::take(&mut current));
            }
            i += 1;
            continue;
        }
        // A single ASCII letter followed by ':' is a drive letter, not a
        // separator, when at the very start of an entry.
        current.push(c);
        i += 1;
    }
    if !current.is_empty() {
        entries.push(current);
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_idempotent() {
        let inputs = ["file:///tmp/a.jar", "/tmp/a.jar!com/x/Foo.class", "  /tmp/a  "];
        for input in inputs {
            let once = normalize(input);
            let twice = match &once {
                Normalized::Local(s) => normalize(s),
                Normalized::NotLocal => Normalized::NotLocal,
            };
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn normalize_strips_nested_archive_suffix() {
        assert_eq!(
            normalize("/tmp/a.jar!com/x/Foo.class"),
            Normalized::Local("/tmp/a.jar".to_string())
        );
    }

    #[test]
    fn normalize_rejects_remote_schemes() {
        assert_eq!(normalize("http://example.com/a.jar"), Normalized::NotLocal);
    }

    #[test]
    fn normalize_strips_file_scheme() {
        assert_eq!(
            normalize("file:///tmp/a.jar"),
            Normalized::Local("/tmp/a.jar".to_string())
        );
    }

    #[test]
    fn archive_suffix_is_case_insensitive() {
        assert!(is_archive_suffix("/tmp/A.JAR"));
        assert!(is_archive_suffix("/tmp/a.war"));
        assert!(!is_archive_suffix("/tmp/a.txt"));
    }

    #[test]
    fn split_composite_preserves_windows_drive_letters() {
        if cfg!(windows) {
            assert_eq!(
                split_composite("C:\\foo;D:\\bar"),
                vec!["C:\\foo".to_string(), "D:\\bar".to_string()]
            );
        } else {
            assert_eq!(
                split_composite("/foo:/bar"),
                vec!["/foo".to_string(), "/bar".to_string()]
            );
        }
    }
}
