//! Hashing utilities for deterministic artifact names.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::util::fs::relative_path;

/// Compute SHA256 hash of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn update_with_file(hasher: &mut Sha256, path: &Path) -> Result<()> {
    let file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::new(file);
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(())
}

/// Hash the relative path and contents of every entry below `dir`.
///
/// Entries are visited in path order so the digest only depends on the tree
/// itself, not where it lives. Symlinks contribute their target path rather than the file they
/// point at, which keeps dangling links inside frameworks from failing the hash.
pub fn sha256_dir_contents(dir: &Path) -> Result<String> {
    let mut hasher = Sha256::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        let file_type = entry.file_type();
        if entry.depth() > 0 {
            let relative = relative_path(dir, entry.path());
            hasher.update(relative.to_string_lossy().as_bytes());
            hasher.update([0u8]);
        }

        if file_type.is_symlink() {
            let target = fs::read_link(entry.path())
                .with_context(|| format!("failed to read link: {}", entry.path().display()))?;
            hasher.update(target.to_string_lossy().as_bytes());
        } else if file_type.is_file() {
            update_with_file(&mut hasher, entry.path())?;
        }
    }

    Ok(hex::encode(hasher.finalize()))
}
