//! Resource bundle handling.
//!
//! Packages ship resources either as ready `.bundle` directories or as loose
//! folders under a `Resources` directory. Loose folders are turned into
//! bundles and everything ends up inside the framework that uses it, or in
//! the `Resources` directory of an xcframework.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::builder::toolchain::Toolchain;
use crate::util::fs::{
    copy_item, ensure_dir, file_name, find_dirs_named, find_dirs_with_extension,
    find_files_with_extension, is_dir, list_dir, move_item, remove_if_exists,
};

const RESOURCES_DIR: &str = "Resources";

/// Outcome of [`package_all_resources`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourcePackaging {
    /// Nothing outside a framework needed packaging. The tree is untouched.
    NoResourcesFound,
    /// Bundles were moved into frameworks, listed by their new location.
    Packaged(Vec<PathBuf>),
}

/// Whether bundles are moved or copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    Move,
    Copy,
}

/// Does `dir` contain any `.bundle` or a non-empty `Resources` directory.
pub fn directory_contains_resources(dir: &Path) -> Result<bool> {
    if !find_dirs_with_extension(dir, "bundle")?.is_empty() {
        return Ok(true);
    }
    for resources in find_dirs_named(dir, RESOURCES_DIR)? {
        if !list_dir(&resources)?.is_empty() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Move every resource outside a framework into the framework it belongs to.
///
/// `Resources` directories must sit next to a `Frameworks` directory. With a
/// single framework every bundle goes into it, otherwise bundles are matched
/// to frameworks by name.
pub fn package_all_resources(
    toolchain: &dyn Toolchain,
    dir: &Path,
    bundles_to_ignore: &[String],
) -> Result<ResourcePackaging> {
    let loose: Vec<PathBuf> = find_dirs_named(dir, RESOURCES_DIR)?
        .into_iter()
        .filter(|resources| {
            let in_framework = resources
                .parent()
                .and_then(Path::extension)
                .is_some_and(|ext| ext == "framework");
            if in_framework {
                tracing::debug!("{} is already inside a framework", resources.display());
            }
            !in_framework
        })
        .collect();

    let mut loose_with_contents = Vec::new();
    for resources in loose {
        if !list_dir(&resources)?.is_empty() {
            loose_with_contents.push(resources);
        }
    }
    if loose_with_contents.is_empty() {
        return Ok(ResourcePackaging::NoResourcesFound);
    }

    let mut packaged = Vec::new();
    for resources in loose_with_contents {
        let mut bundles = find_dirs_with_extension(&resources, "bundle")?;
        bundles.extend(create_bundles(toolchain, &resources)?);
        bundles.retain(|bundle| !bundles_to_ignore.contains(&file_name(bundle)));

        let parent = resources.parent().unwrap_or(dir);
        let frameworks_dir = parent.join("Frameworks");
        if !is_dir(&frameworks_dir) {
            bail!(
                "could not package resources in {}: {} doesn't exist",
                resources.display(),
                frameworks_dir.display()
            );
        }

        let frameworks = list_dir(&frameworks_dir)?;
        match frameworks.as_slice() {
            [] => bail!(
                "could not package resources in {}: {} is empty",
                resources.display(),
                frameworks_dir.display()
            ),
            [framework] => {
                packaged.extend(transfer_all(
                    &bundles,
                    &framework.join(RESOURCES_DIR),
                    Transfer::Move,
                )?);
            }
            _ => {
                for bundle in &bundles {
                    let name = file_name(bundle);
                    let name = name.trim_end_matches(".bundle");
                    let Some(framework) = frameworks.iter().find(|f| {
                        let candidate = file_name(f);
                        candidate == name || candidate == format!("{}.framework", name)
                    }) else {
                        bail!(
                            "cannot embed {}.bundle: no matching framework among {} in {}",
                            name,
                            frameworks.len(),
                            frameworks_dir.display()
                        );
                    };
                    packaged.extend(transfer_all(
                        std::slice::from_ref(bundle),
                        &framework.join(RESOURCES_DIR),
                        Transfer::Move,
                    )?);
                }
            }
        }
    }

    Ok(ResourcePackaging::Packaged(packaged))
}

/// Move or copy every bundle under `dir` into `resource_dir`.
///
/// `Resources` directories left empty are removed afterwards.
pub fn move_all_bundles(dir: &Path, resource_dir: &Path, transfer: Transfer) -> Result<Vec<PathBuf>> {
    let bundles = find_dirs_with_extension(dir, "bundle")?;
    if bundles.is_empty() {
        return Ok(Vec::new());
    }

    let moved = transfer_all(&bundles, resource_dir, transfer)?;
    remove_empty_resources_dirs(dir);
    Ok(moved)
}

/// Remove empty `Resources` directories. Failures are only logged.
pub fn remove_empty_resources_dirs(dir: &Path) {
    let resource_dirs = match find_dirs_named(dir, RESOURCES_DIR) {
        Ok(dirs) => dirs,
        Err(e) => {
            tracing::warn!("could not search {} for empty Resources: {:#}", dir.display(), e);
            return;
        }
    };

    for resources in resource_dirs {
        match list_dir(&resources) {
            Ok(contents) if contents.is_empty() => {
                if let Err(e) = remove_if_exists(&resources) {
                    tracing::warn!("failed to remove {}: {:#}", resources.display(), e);
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("failed to list {}: {:#}", resources.display(), e),
        }
    }
}

/// Turn every loose folder of a `Resources` directory into a `.bundle` copy.
fn create_bundles(toolchain: &dyn Toolchain, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut bundles = Vec::new();
    for entry in list_dir(dir)? {
        if !is_dir(&entry) {
            tracing::warn!("found a file in a Resources directory: {}", entry.display());
            continue;
        }
        let name = file_name(&entry);
        if name.ends_with("bundle") {
            continue;
        }

        let bundle = dir.join(format!("{}.bundle", name));
        copy_item(&entry, &bundle)?;
        compile_storyboards(toolchain, &bundle)?;
        bundles.push(bundle);
    }
    Ok(bundles)
}

fn compile_storyboards(toolchain: &dyn Toolchain, dir: &Path) -> Result<()> {
    for storyboard in find_files_with_extension(dir, "storyboard")? {
        let compiled = storyboard.with_extension("storyboardc");
        toolchain.compile_storyboard(&storyboard, &compiled)?;
        remove_if_exists(&storyboard).with_context(|| {
            format!("could not remove {} after compiling it", storyboard.display())
        })?;
    }
    Ok(())
}

fn transfer_all(files: &[PathBuf], dest_dir: &Path, transfer: Transfer) -> Result<Vec<PathBuf>> {
    ensure_dir(dest_dir)?;
    let mut transferred = Vec::new();
    for file in files {
        let dest = dest_dir.join(file_name(file));
        match transfer {
            Transfer::Copy => copy_item(file, &dest)?,
            Transfer::Move => move_item(file, &dest)?,
        }
        transferred.push(dest);
    }
    Ok(transferred)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockToolchain;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_contains_resources() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("Pkg/Resources")).unwrap();
        assert!(!directory_contains_resources(tmp.path()).unwrap());

        fs::write(tmp.path().join("Pkg/Resources/strings.json"), "{}").unwrap();
        assert!(directory_contains_resources(tmp.path()).unwrap());

        let other = TempDir::new().unwrap();
        fs::create_dir_all(other.path().join("A/B/Assets.bundle")).unwrap();
        assert!(directory_contains_resources(other.path()).unwrap());
    }

    #[test]
    fn test_already_bundled_resources_are_left_alone() {
        let tmp = TempDir::new().unwrap();
        let fw = tmp.path().join("Pkg/Frameworks/Pkg.framework");
        fs::create_dir_all(fw.join("Resources/Pkg.bundle")).unwrap();
        fs::write(fw.join("Resources/Pkg.bundle/image.png"), "png").unwrap();

        let toolchain = MockToolchain::new();
        let outcome = package_all_resources(&toolchain, tmp.path(), &[]).unwrap();
        assert_eq!(outcome, ResourcePackaging::NoResourcesFound);
        assert!(fw.join("Resources/Pkg.bundle/image.png").exists());
        assert!(toolchain.commands().is_empty());
    }

    #[test]
    fn test_loose_folders_become_bundles() {
        let tmp = TempDir::new().unwrap();
        let pkg = tmp.path().join("GoogleSignIn");
        fs::create_dir_all(pkg.join("Frameworks/GoogleSignIn.framework")).unwrap();
        fs::create_dir_all(pkg.join("Resources/GoogleSignIn.bundle")).unwrap();
        fs::create_dir_all(pkg.join("Resources/Auth")).unwrap();
        fs::write(pkg.join("Resources/Auth/Login.storyboard"), "<xml/>").unwrap();

        let toolchain = MockToolchain::new();
        let outcome = package_all_resources(&toolchain, tmp.path(), &[]).unwrap();

        let dest = pkg.join("Frameworks/GoogleSignIn.framework/Resources");
        match outcome {
            ResourcePackaging::Packaged(bundles) => assert_eq!(bundles.len(), 2),
            other => panic!("expected packaged bundles, got {:?}", other),
        }
        assert!(dest.join("GoogleSignIn.bundle").is_dir());
        assert!(dest.join("Auth.bundle/Login.storyboardc").exists());
        assert!(!dest.join("Auth.bundle/Login.storyboard").exists());
        assert_eq!(toolchain.commands().len(), 1);
    }

    #[test]
    fn test_ambiguous_bundle_fails() {
        let tmp = TempDir::new().unwrap();
        let pkg = tmp.path().join("Pkg");
        fs::create_dir_all(pkg.join("Frameworks/A.framework")).unwrap();
        fs::create_dir_all(pkg.join("Frameworks/B.framework")).unwrap();
        fs::create_dir_all(pkg.join("Resources/C.bundle")).unwrap();

        let toolchain = MockToolchain::new();
        assert!(package_all_resources(&toolchain, tmp.path(), &[]).is_err());
    }

    #[test]
    fn test_move_all_bundles_removes_empty_resources() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("FirebaseInAppMessaging");
        fs::create_dir_all(src.join("Resources/InAppMessagingDisplayResources.bundle")).unwrap();
        let dest = tmp.path().join("out/Resources");

        let moved = move_all_bundles(&src, &dest, Transfer::Move).unwrap();
        assert_eq!(moved, vec![dest.join("InAppMessagingDisplayResources.bundle")]);
        assert!(!src.join("Resources").exists());

        let copy_src = tmp.path().join("copy");
        fs::create_dir_all(copy_src.join("X.bundle")).unwrap();
        move_all_bundles(&copy_src, &tmp.path().join("copied"), Transfer::Copy).unwrap();
        assert!(copy_src.join("X.bundle").exists());
        assert!(tmp.path().join("copied/X.bundle").exists());
    }
}
