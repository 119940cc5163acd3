//! Include path search and cycle detection.

use std::path::{Path, PathBuf};

/// An ordered search list: current-file directory (for `"..."` includes
/// only), then `-I` dirs, then environment-derived dirs, then system dirs.
#[derive(Debug, Clone, Default)]
pub struct SearchPath {
    pub dirs: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new() -> Self {
        SearchPath::default()
    }

    pub fn push(&mut self, dir: impl Into<PathBuf>) {
        self.dirs.push(dir.into());
    }

    /// Resolves `#include "name"`: search the including file's directory
    /// first, then the rest of the path.
    pub fn resolve_quoted(&self, name: &str, including_file: &Path) -> Option<PathBuf> {
        if let Some(dir) = including_file.parent() {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        self.resolve_angled(name)
    }

    /// Resolves `#include <name>`: skip the including file's directory.
    pub fn resolve_angled(&self, name: &str) -> Option<PathBuf> {
        self.resolve_from(name, 0)
    }

    /// Resolves `#include_next <name>`: start searching after the directory
    /// index that produced the *current* file.
    pub fn resolve_next(&self, name: &str, after_index: usize) -> Option<PathBuf> {
        self.resolve_from(name, after_index + 1)
    }

    fn resolve_from(&self, name: &str, start_index: usize) -> Option<PathBuf> {
        for dir in self.dirs.iter().skip(start_index) {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    /// The index of the search-path directory that produced `path`, used to
    /// resume an `#include_next` from the right place.
    pub fn index_of_provider(&self, path: &Path) -> Option<usize> {
        let canonical_path = canonicalize(path);
        self.dirs.iter().position(|d| {
            canonicalize(d)
                .map(|cd| canonical_path.as_ref().map(|cp| cp.starts_with(&cd)).unwrap_or(false))
                .unwrap_or(false)
        })
    }
}

/// Canonicalizes a path (symlink-resolved, `.`/`..` eliminated). Falls back
/// to a lexical cleanup when the filesystem call fails (e.g. the path
/// doesn't exist yet, as happens in unit tests), so cycle detection still
/// has a stable identity to compare against.
pub fn canonicalize(path: &Path) -> Option<PathBuf> {
    std::fs::canonicalize(path).ok().or_else(|| Some(lexical_clean(path)))
}

fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Builds the environment-derived portion of the search path: `VCPATH`,
/// `VCINC`, `CPATH`, `C_INCLUDE_PATH`, colon-separated (semicolon on
/// Windows), in that order, per SPEC_FULL.md §6.
pub fn env_search_dirs() -> Vec<PathBuf> {
    let separator = if cfg!(windows) { ';' } else { ':' };
    let mut dirs = Vec::new();
    for var in ["VCPATH", "VCINC", "CPATH", "C_INCLUDE_PATH"] {
        if let Ok(value) = std::env::var(var) {
            for entry in value.split(separator) {
                if !entry.is_empty() {
                    dirs.push(PathBuf::from(entry));
                }
            }
        }
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn quoted_include_prefers_including_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("inc.h");
        fs::write(&sub, "").unwrap();
        let main_file = dir.path().join("main.c");
        fs::write(&main_file, "").unwrap();

        let search = SearchPath::new();
        let resolved = search.resolve_quoted("inc.h", &main_file).unwrap();
        assert_eq!(resolved, sub);
    }

    #[test]
    fn angled_include_skips_including_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("only_local.h"), "").unwrap();
        let main_file = dir.path().join("main.c");
        fs::write(&main_file, "").unwrap();

        let search = SearchPath::new();
        assert!(search.resolve_angled("only_local.h").is_none());
    }

    #[test]
    fn angled_include_searches_explicit_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hdr.h"), "").unwrap();
        let mut search = SearchPath::new();
        search.push(dir.path());
        assert!(search.resolve_angled("hdr.h").is_some());
    }
}
