//! Multi-platform container creation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::builder::resources::{move_all_bundles, Transfer};
use crate::builder::toolchain::Toolchain;
use crate::util::fs::{is_dir, remove_if_exists, resolve_symlinks};

/// Bundle shipped by gRPC that no release needs.
const GRPC_CERTIFICATES: &str = "gRPCCertificates-Cpp.bundle";

/// Clean up frameworks before they are put into a container.
///
/// Removal failures are ignored: every path here is optional.
pub fn post_process(frameworks: &[PathBuf]) -> &[PathBuf] {
    for framework in frameworks {
        for dir in ["", "Versions/A"] {
            let signature = resolve_symlinks(&framework.join(dir).join("_CodeSignature"));
            let _ = remove_if_exists(&signature);
        }

        // At the root, or in the symlinked `Resources` of macOS and Catalyst slices.
        for dir in ["", "Resources"] {
            let certificates = resolve_symlinks(&framework.join(dir).join(GRPC_CERTIFICATES));
            let _ = remove_if_exists(&certificates);
        }

        // macOS slices may carry a `PrivateHeaders` link pointing nowhere.
        let private_headers = framework.join("PrivateHeaders");
        if !is_dir(&resolve_symlinks(&private_headers)) {
            let _ = remove_if_exists(&private_headers);
        }

        for dir in ["Headers", "PrivateHeaders"] {
            let nested = resolve_symlinks(&framework.join(dir)).join(dir);
            let _ = remove_if_exists(&nested);
        }
    }
    frameworks
}

/// Create `<dir>/<name>.xcframework` and move the package's resource bundles
/// into its top-level `Resources` directory.
pub fn make_xcframework(
    toolchain: &dyn Toolchain,
    name: &str,
    frameworks: &[PathBuf],
    dir: &Path,
    resource_contents: Option<&Path>,
) -> Result<PathBuf> {
    let xcframework = dir.join(format!("{}.xcframework", name));
    remove_if_exists(&xcframework)?;

    tracing::debug!("creating {} from {} frameworks", xcframework.display(), frameworks.len());
    toolchain
        .create_xcframework(frameworks, &xcframework)
        .with_context(|| format!("could not build the xcframework for {}", name))?;

    if let Some(contents) = resource_contents {
        move_all_bundles(contents, &xcframework.join("Resources"), Transfer::Move).with_context(
            || format!("could not move the resource bundles of {}", name),
        )?;
    }

    Ok(xcframework)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockToolchain;
    use crate::util::fs::symlink;
    use std::fs;
    use tempfile::TempDir;

    #[cfg(unix)]
    #[test]
    fn test_post_process_cleans_framework() {
        let tmp = TempDir::new().unwrap();
        let fw = tmp.path().join("Foo.framework");
        fs::create_dir_all(fw.join("_CodeSignature")).unwrap();
        fs::create_dir_all(fw.join("Versions/A/_CodeSignature")).unwrap();
        fs::create_dir_all(fw.join(GRPC_CERTIFICATES)).unwrap();
        fs::create_dir_all(fw.join("Headers")).unwrap();
        fs::write(fw.join("Headers/Foo.h"), "").unwrap();
        symlink(Path::new("Versions/Current/Headers"), &fw.join("Headers/Headers")).unwrap();
        symlink(Path::new("Versions/Current/PrivateHeaders"), &fw.join("PrivateHeaders")).unwrap();

        post_process(&[fw.clone()]);

        assert!(!fw.join("_CodeSignature").exists());
        assert!(!fw.join("Versions/A/_CodeSignature").exists());
        assert!(!fw.join(GRPC_CERTIFICATES).exists());
        assert!(fw.join("PrivateHeaders").symlink_metadata().is_err());
        assert!(fw.join("Headers/Headers").symlink_metadata().is_err());
        assert!(fw.join("Headers/Foo.h").exists());
    }

    #[test]
    fn test_make_xcframework_moves_resources() {
        let tmp = TempDir::new().unwrap();
        let fw = tmp.path().join("ios-device/Foo.framework");
        fs::create_dir_all(&fw).unwrap();
        let resources = tmp.path().join("products/Foo");
        fs::create_dir_all(resources.join("Foo.bundle")).unwrap();
        fs::write(resources.join("Foo.bundle/strings.json"), "{}").unwrap();

        let toolchain = MockToolchain::new();
        let out = tmp.path().join("xcframeworks");
        let xcframework =
            make_xcframework(&toolchain, "Foo", &[fw], &out, Some(&resources)).unwrap();

        assert_eq!(xcframework, out.join("Foo.xcframework"));
        assert!(xcframework.join("Resources/Foo.bundle/strings.json").exists());
        assert!(!resources.join("Foo.bundle").exists());
    }
}
