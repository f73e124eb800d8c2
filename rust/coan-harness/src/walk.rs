//! Directory traversal as lazy iterators.
//!
//! Callers fold over the entries themselves; nothing here accumulates into
//! shared state.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// C and C++ source extensions the suites feed to the subject.
pub const SOURCE_EXTENSIONS: [&str; 3] = ["c", "cpp", "h"];

/// Every regular file beneath `root`, in sorted order.
pub fn files(root: &Path) -> impl Iterator<Item = PathBuf> + use<> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
}

/// Every directory beneath `root`, excluding `root` itself.
pub fn dirs(root: &Path) -> impl Iterator<Item = PathBuf> + use<> {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
}

/// Whether `path` has one of `extensions` (without the dot).
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.contains(&e))
}

/// Every file beneath `root` with one of `extensions`.
pub fn files_with_extensions<'a>(
    root: &Path,
    extensions: &'a [&'a str],
) -> impl Iterator<Item = PathBuf> + use<'a> {
    files(root).filter(move |p| has_extension(p, extensions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn walks_files_and_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("top.c"), "").unwrap();
        fs::write(dir.path().join("a/x.h"), "").unwrap();
        fs::write(dir.path().join("a/b/y.cpp"), "").unwrap();
        fs::write(dir.path().join("a/b/notes.txt"), "").unwrap();

        assert_eq!(files(dir.path()).count(), 4);
        let sources: Vec<_> = files_with_extensions(dir.path(), &SOURCE_EXTENSIONS).collect();
        assert_eq!(sources.len(), 3);
        assert!(sources.iter().all(|p| !p.ends_with("notes.txt")));

        let headers = files_with_extensions(dir.path(), &["h"]).count();
        assert_eq!(headers, 1);

        let d: Vec<_> = dirs(dir.path()).collect();
        assert_eq!(d, vec![dir.path().join("a"), dir.path().join("a/b")]);
    }
}
