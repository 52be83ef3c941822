//! Filesystem helpers shared by the archive sources and repository.

use std::path::{Component, Path, PathBuf};

use crate::error::UtilError;

/// Create a directory and all parent directories if they do not exist.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> Result<(), UtilError> {
    std::fs::create_dir_all(path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Copy `src` to `dest`, preferring a hard link for speed.
///
/// Falls back to a regular copy if hard linking fails (e.g. cross-device).
///
/// # Errors
/// Returns an error if both hard linking and copying fail.
pub fn materialize(src: &Path, dest: &Path) -> Result<(), UtilError> {
    if let Some(parent) = dest.parent() {
        ensure_dir(parent)?;
    }

    if dest.exists() {
        std::fs::remove_file(dest).map_err(|source| UtilError::Io {
            path: dest.display().to_string(),
            source,
        })?;
    }

    if std::fs::hard_link(src, dest).is_err() {
        std::fs::copy(src, dest).map_err(|source| UtilError::Io {
            path: dest.display().to_string(),
            source,
        })?;
    }

    Ok(())
}

/// Remove a directory and all its contents. No error if the directory is absent.
///
/// # Errors
/// Returns an error if the directory exists but cannot be removed.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<(), UtilError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(UtilError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Join an archive entry name onto `root`, rejecting any entry that would
/// resolve outside of `root` (the "zip-slip" attack: entries named
/// `../../etc/passwd` or containing an absolute path).
///
/// # Errors
/// Returns [`UtilError::PathEscape`] if the entry contains a `..` component,
/// an absolute path, or a prefix/root component (Windows drive letters).
pub fn safe_join(root: &Path, entry: &str) -> Result<PathBuf, UtilError> {
    let entry_path = Path::new(entry);
    let mut joined = root.to_path_buf();

    for component in entry_path.components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(UtilError::PathEscape {
                    entry: entry.to_owned(),
                    root: root.display().to_string(),
                });
            }
        }
    }

    Ok(joined)
}

/// Collect all files under `dir`, recursively, sorted by path, yielded as
/// paths relative to `dir` using forward-slash separators.
///
/// # Errors
/// Returns an error if `dir` cannot be read.
pub fn collect_relative_files(dir: &Path) -> Result<Vec<String>, UtilError> {
    let mut files = Vec::new();
    collect_relative_files_recursive(dir, dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_relative_files_recursive(
    root: &Path,
    dir: &Path,
    out: &mut Vec<String>,
) -> Result<(), UtilError> {
    let entries = std::fs::read_dir(dir).map_err(|source| UtilError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| UtilError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let path = entry.path();

        if path.is_dir() {
            collect_relative_files_recursive(root, &path, out)?;
        } else {
            let relative = path.strip_prefix(root).unwrap_or(&path);
            let components: Vec<&str> = relative.iter().filter_map(|c| c.to_str()).collect();
            out.push(components.join("/"));
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn ensure_dir_creates_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b").join("c");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn materialize_hardlink() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src.txt");
        let dest = tmp.path().join("dest.txt");
        fs::write(&src, b"data").unwrap();

        materialize(&src, &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"data");
    }

    #[test]
    fn materialize_overwrites_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src.txt");
        let dest = tmp.path().join("dest.txt");
        fs::write(&src, b"new").unwrap();
        fs::write(&dest, b"old").unwrap();

        materialize(&src, &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn remove_dir_all_if_exists_absent_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        remove_dir_all_if_exists(&tmp.path().join("nonexistent")).unwrap();
    }

    #[test]
    fn safe_join_accepts_nested_relative_entry() {
        let root = Path::new("/archives/hello.v1");
        let joined = safe_join(root, "com/foo/Bar.class").unwrap();
        assert_eq!(joined, root.join("com").join("foo").join("Bar.class"));
    }

    #[test]
    fn safe_join_rejects_parent_traversal() {
        let root = Path::new("/archives/hello.v1");
        assert!(safe_join(root, "../../etc/passwd").is_err());
    }

    #[test]
    fn safe_join_rejects_absolute_entry() {
        let root = Path::new("/archives/hello.v1");
        assert!(safe_join(root, "/etc/passwd").is_err());
    }

    #[test]
    fn safe_join_ignores_current_dir_components() {
        let root = Path::new("/archives/hello.v1");
        let joined = safe_join(root, "./a/./b.txt").unwrap();
        assert_eq!(joined, root.join("a").join("b.txt"));
    }

    #[test]
    fn collect_relative_files_sorted_with_forward_slashes() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub").join("b.txt"), b"").unwrap();
        fs::write(tmp.path().join("a.txt"), b"").unwrap();

        let files = collect_relative_files(tmp.path()).unwrap();
        assert_eq!(files, vec!["a.txt".to_owned(), "sub/b.txt".to_owned()]);
    }

    #[test]
    fn collect_relative_files_empty_dir() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(collect_relative_files(tmp.path()).unwrap().is_empty());
    }
}
