//! Filesystem utilities.
//!
//! Framework bundles are full of relative symlinks (`Versions/Current`,
//! `Headers -> Versions/Current/Headers`), so copies here preserve links
//! instead of following them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use glob::glob;
use walkdir::WalkDir;

/// Recursively copy a directory, recreating symlinks as symlinks.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)
        .with_context(|| format!("failed to create directory: {}", dst.display()))?;

    for entry in fs::read_dir(src)
        .with_context(|| format!("failed to read directory: {}", src.display()))?
    {
        let entry = entry?;
        let ty = entry.file_type()?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if ty.is_symlink() {
            let target = fs::read_link(&src_path)
                .with_context(|| format!("failed to read link: {}", src_path.display()))?;
            symlink(&target, &dst_path).with_context(|| {
                format!("failed to create link: {}", dst_path.display())
            })?;
        } else if ty.is_dir() {
            copy_dir_all(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path).with_context(|| {
                format!(
                    "failed to copy {} to {}",
                    src_path.display(),
                    dst_path.display()
                )
            })?;
        }
    }
    Ok(())
}

/// Copy a file or directory to a destination that must not exist yet.
pub fn copy_item(src: &Path, dst: &Path) -> Result<()> {
    if dst.symlink_metadata().is_ok() {
        bail!("cannot copy {}: {} already exists", src.display(), dst.display());
    }
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }
    let meta = fs::symlink_metadata(src)
        .with_context(|| format!("failed to stat {}", src.display()))?;
    if meta.is_dir() {
        copy_dir_all(src, dst)
    } else {
        fs::copy(src, dst)
            .with_context(|| format!("failed to copy {} to {}", src.display(), dst.display()))?;
        Ok(())
    }
}

/// Move a file or directory, falling back to copy-and-delete across devices.
pub fn move_item(src: &Path, dst: &Path) -> Result<()> {
    if dst.symlink_metadata().is_ok() {
        bail!("cannot move {}: {} already exists", src.display(), dst.display());
    }
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    copy_item(src, dst)?;
    remove_if_exists(src)
}

/// Remove a file, symlink or directory tree if it exists.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to stat {}", path.display()));
        }
    };
    if meta.is_dir() {
        fs::remove_dir_all(path)
            .with_context(|| format!("failed to remove directory: {}", path.display()))
    } else {
        fs::remove_file(path)
            .with_context(|| format!("failed to remove file: {}", path.display()))
    }
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Remove a directory if present and recreate it empty.
pub fn recreate_dir(path: &Path) -> Result<()> {
    remove_if_exists(path)?;
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

/// Read a file to string, with nice error messages.
pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("failed to read file: {}", path.display()))
}

/// Write a string to a file, creating parent directories if needed.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, contents)
        .with_context(|| format!("failed to write file: {}", path.display()))
}

/// Is `path` a directory, following symlinks.
pub fn is_dir(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

/// Entries of a directory sorted by file name.
pub fn list_dir(path: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)
        .with_context(|| format!("failed to read directory: {}", path.display()))?
    {
        entries.push(entry?.path());
    }
    entries.sort();
    Ok(entries)
}

/// Resolve symlinks in a path, returning the path unchanged if it can't be resolved.
pub fn resolve_symlinks(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// File name of a path as a `String` (empty if there is none).
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Recursively find directories whose name ends with `.{extension}`.
///
/// Matches are not descended into, so a `.framework` nested inside another
/// `.framework` is reported once through its parent.
pub fn find_dirs_with_extension(root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let suffix = format!(".{}", extension);
    find_dirs(root, |name| name.ends_with(&suffix))
}

/// Like [`find_dirs_with_extension`] for any of several extensions.
pub fn find_dirs_with_extensions(root: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let suffixes: Vec<String> = extensions.iter().map(|e| format!(".{}", e)).collect();
    find_dirs(root, |name| suffixes.iter().any(|s| name.ends_with(s.as_str())))
}

/// Recursively find directories with exactly the given name.
pub fn find_dirs_named(root: &Path, name: &str) -> Result<Vec<PathBuf>> {
    find_dirs(root, |candidate| candidate == name)
}

fn find_dirs(root: &Path, matches: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name().into_iter();

    while let Some(entry) = walker.next() {
        let entry =
            entry.with_context(|| format!("failed to search directory: {}", root.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if matches(&name) {
            found.push(entry.path().to_path_buf());
            walker.skip_current_dir();
        }
    }

    Ok(found)
}

/// Recursively find files with the given extension.
pub fn find_files_with_extension(root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry =
            entry.with_context(|| format!("failed to search directory: {}", root.display()))?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == extension)
        {
            found.push(entry.path().to_path_buf());
        }
    }
    Ok(found)
}

/// Find entries matching a glob pattern relative to a base directory, sorted.
pub fn glob_paths(base: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full_pattern = base.join(pattern);
    let pattern_str = full_pattern.to_string_lossy();

    let mut results = Vec::new();
    for entry in glob(&pattern_str).with_context(|| format!("invalid glob pattern: {}", pattern))? {
        match entry {
            Ok(path) => results.push(path),
            Err(e) => {
                tracing::warn!("glob error: {}", e);
            }
        }
    }

    results.sort();
    Ok(results)
}

/// Get the relative path from `base` to `path`.
pub fn relative_path(base: &Path, path: &Path) -> PathBuf {
    pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf())
}

/// Create a symlink (platform-aware).
#[cfg(unix)]
pub fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
pub fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    if src.is_dir() {
        std::os::windows::fs::symlink_dir(src, dst)
    } else {
        std::os::windows::fs::symlink_file(src, dst)
    }
}
