//! Zip archive creation.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::util::fs::{ensure_dir, relative_path};

/// How entries are named inside the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveLayout {
    /// Entries are nested under the directory's own name (`Firebase/README.md`).
    WithRoot,
    /// Entries start at the directory's contents (`README.md`).
    ContentsOnly,
}

/// Zip the directory `dir` into `dest`, preserving symlinks and unix modes.
pub fn zip_dir(dir: &Path, dest: &Path, layout: ArchiveLayout) -> Result<()> {
    if let Some(parent) = dest.parent() {
        ensure_dir(parent)?;
    }
    let file = File::create(dest)
        .with_context(|| format!("failed to create archive: {}", dest.display()))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    let base = match layout {
        ArchiveLayout::WithRoot => dir.parent().unwrap_or(dir),
        ArchiveLayout::ContentsOnly => dir,
    };

    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        let path = entry.path();
        let name = relative_path(base, path)
            .to_string_lossy()
            .replace('\\', "/");
        let options = entry_options(path)?;
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            let target = fs::read_link(path)
                .with_context(|| format!("failed to read link: {}", path.display()))?;
            zip.add_symlink(name, target.to_string_lossy().into_owned(), options)
                .with_context(|| format!("failed to add link {}", path.display()))?;
        } else if file_type.is_dir() {
            zip.add_directory(name, options)
                .with_context(|| format!("failed to add directory {}", path.display()))?;
        } else {
            zip.start_file(name, options)
                .with_context(|| format!("failed to add file {}", path.display()))?;
            let mut reader = BufReader::new(
                File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
            );
            io::copy(&mut reader, &mut zip)
                .with_context(|| format!("failed to compress {}", path.display()))?;
        }
    }

    let mut writer = zip
        .finish()
        .with_context(|| format!("failed to finish archive: {}", dest.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to flush archive: {}", dest.display()))?;
    tracing::info!("wrote {}", dest.display());
    Ok(())
}

fn entry_options(path: &Path) -> Result<SimpleFileOptions> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    #[cfg(unix)]
    let options = {
        use std::os::unix::fs::PermissionsExt;
        let meta = fs::symlink_metadata(path)
            .with_context(|| format!("failed to stat {}", path.display()))?;
        options.unix_permissions(meta.permissions().mode())
    };
    #[cfg(not(unix))]
    let _ = path;

    Ok(options)
}
