//! Compiling one package into per-platform frameworks.
//!
//! Every slice of every target platform is compiled separately. In static
//! mode the slices are then regrouped into one framework per target
//! platform, built from a shared skeleton holding the headers, `Info.plist`
//! and a synthesized module map. Slices of the same target platform have to
//! be merged with lipo first since `-create-xcframework` rejects two
//! frameworks for the same platform.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};

use crate::builder::errors::BuildError;
use crate::builder::modulemap::ModuleMapContents;
use crate::builder::plist::FrameworkInfo;
use crate::builder::toolchain::{BuildChannel, SliceBuild, Toolchain};
use crate::core::platform::SliceSpec;
use crate::core::{InstalledPackage, Platform, PlatformConfig, TargetPlatform};
use crate::util::config::BundleConfig;
use crate::util::fs::{
    copy_item, ensure_dir, file_name, glob_paths, is_dir, list_dir, recreate_dir,
    remove_if_exists, resolve_symlinks, write_string,
};

/// Packages whose module map names the CocoaPods generated umbrella without
/// looking for it.
const FIXED_UMBRELLA: [&str; 2] = ["gRPC-Core", "TensorFlowLiteObjC"];

/// A compiled package, ready for container creation.
#[derive(Debug, Clone)]
pub struct CompiledFramework {
    /// One framework per target platform.
    pub frameworks: Vec<PathBuf>,
    /// Directory holding the resource bundles produced by the build.
    pub resource_contents: Option<PathBuf>,
    /// Whether any slice carries a Swift module.
    pub swift_module: bool,
}

/// A framework built for one slice.
#[derive(Debug, Clone)]
struct BuiltSlice {
    spec: SliceSpec,
    framework: PathBuf,
}

/// Builds frameworks for one platform of one project.
pub struct FrameworkBuilder<'a> {
    pub toolchain: &'a dyn Toolchain,
    pub project_dir: &'a Path,
    pub platform: Platform,
    pub platforms: &'a PlatformConfig,
    pub bundle: &'a BundleConfig,
    pub logs_dir: &'a Path,
    /// Scratch space for framework skeletons and regrouped frameworks.
    pub work_dir: &'a Path,
    pub dynamic: bool,
}

impl FrameworkBuilder<'_> {
    /// Compile `package` for every target platform of this builder's platform.
    pub fn compile(
        &self,
        package: &InstalledPackage,
        channel: BuildChannel,
    ) -> Result<CompiledFramework> {
        let name = package.name.as_str();
        let slices = self.build_all_slices(name, channel)?;
        let Some(first) = slices.first().cloned() else {
            bail!("no targets to build {} for on {}", name, self.platform);
        };

        let (frameworks, swift_module) = if self.dynamic {
            self.group_dynamic(name, &slices, channel)?
        } else {
            self.group_static(package, &slices, channel)?
        };

        let products = self
            .project_dir
            .join(first.spec.build_name())
            .join(first.spec.target.build_dir_name())
            .join(name);
        let resource_contents = match list_dir(&products) {
            Ok(contents) if !contents.is_empty() => Some(products),
            _ => None,
        };

        Ok(CompiledFramework {
            frameworks,
            resource_contents,
            swift_module,
        })
    }

    fn build_all_slices(&self, name: &str, channel: BuildChannel) -> Result<Vec<BuiltSlice>> {
        let mut slices = Vec::new();
        for target in self.platforms.targets(self.platform) {
            for spec in self.platforms.slices(target) {
                let framework = self.build_slice(name, &spec, channel)?;
                slices.push(BuiltSlice { spec, framework });
            }
        }
        Ok(slices)
    }

    /// Run the toolchain for one slice and locate the framework it produced.
    fn build_slice(&self, name: &str, spec: &SliceSpec, channel: BuildChannel) -> Result<PathBuf> {
        let build_name = spec.build_name();
        let build_dir = self.project_dir.join(&build_name);
        tracing::debug!("compiling {} for {} ({})", name, build_name, spec.archs_string());

        let outcome = self.toolchain.build_slice(&SliceBuild {
            project_dir: self.project_dir,
            scheme: name,
            slice: spec,
            build_dir: &build_dir,
            channel,
        })?;

        // The log is kept whether or not the build succeeded.
        let log = self.logs_dir.join(format!("{}-{}.txt", name, build_name));
        let written = write_string(&log, &outcome.output);
        if !outcome.success() {
            written?;
            return Err(BuildError::ToolchainFailed {
                package: name.to_string(),
                target: build_name,
                code: outcome.code,
                log,
            }
            .into());
        }
        if let Err(e) = written {
            tracing::warn!("could not write build log {}: {:#}", log.display(), e);
        }

        // The framework may be named after a podspec `module_name` rather than the package.
        let products = build_dir.join(spec.target.build_dir_name()).join(name);
        let framework = glob_paths(&products, "*.framework")?
            .into_iter()
            .next()
            .ok_or_else(|| BuildError::MissingOutput {
                package: name.to_string(),
                path: products.clone(),
            })?;
        tracing::debug!("built {}", framework.display());
        Ok(framework)
    }

    /// Dynamic frameworks are passed through, merging split slices if needed.
    fn group_dynamic(
        &self,
        name: &str,
        slices: &[BuiltSlice],
        channel: BuildChannel,
    ) -> Result<(Vec<PathBuf>, bool)> {
        let mut frameworks = Vec::new();
        let mut swift_module = false;

        for (target, members) in clusters(slices) {
            swift_module |= members
                .iter()
                .any(|slice| has_swift_module(&slice.framework));

            // Zip builds of unsplit slices are used in place. Anything else is
            // copied out since a rebuild for another channel reuses the build dir.
            if let ([single], BuildChannel::Zip) = (members.as_slice(), channel) {
                frameworks.push(single.framework.clone());
                continue;
            }

            let first = &members[0].framework;
            let dest = self.cluster_dir(channel, target).join(file_name(first));
            remove_if_exists(&dest)?;
            copy_item(first, &dest)?;

            if members.len() > 1 {
                let binary = dest.join(binary_name(first));
                remove_if_exists(&binary)?;
                let inputs: Vec<PathBuf> =
                    members.iter().map(|s| slice_binary(&s.framework)).collect();
                self.toolchain.lipo_create(&inputs, &binary)?;
            }
            frameworks.push(dest);
        }

        tracing::debug!("{} dynamic frameworks for {}", frameworks.len(), name);
        Ok((frameworks, swift_module))
    }

    fn group_static(
        &self,
        package: &InstalledPackage,
        slices: &[BuiltSlice],
        channel: BuildChannel,
    ) -> Result<(Vec<PathBuf>, bool)> {
        let name = package.name.as_str();
        let first = &slices[0];

        let skeleton = self
            .work_dir
            .join("frameworks_being_built")
            .join(channel.dir_name())
            .join(format!("{}.framework", name));
        recreate_dir(&skeleton)?;

        // Headers are the same for every slice. On macOS `Headers` is a symlink.
        let headers_dir = resolve_symlinks(&first.framework.join("Headers"));
        let umbrella = umbrella_header(name, &headers_dir)?;
        copy_item(&headers_dir, &skeleton.join("Headers"))
            .with_context(|| format!("could not copy the headers of {}", name))?;

        FrameworkInfo {
            name,
            version: &package.version,
            minimum_os: self.platforms.minimum_version(self.platform),
        }
        .write(self.bundle, &skeleton)?;

        let links = package
            .synthesized()
            .ok_or_else(|| anyhow!("module map contents missing for {}", name))?;
        let module_map = ModuleMapContents::new(name, &links.direct).get(&umbrella);

        let mut frameworks = Vec::new();
        let mut swift_module = false;
        for (target, members) in clusters(slices) {
            let dest = self
                .cluster_dir(channel, target)
                .join(format!("{}.framework", name));
            remove_if_exists(&dest)?;
            copy_item(&skeleton, &dest)?;

            let binary = dest.join(name);
            let inputs: Vec<PathBuf> = members.iter().map(|s| slice_binary(&s.framework)).collect();
            if let [single] = inputs.as_slice() {
                copy_item(single, &binary)?;
            } else {
                self.toolchain.lipo_create(&inputs, &binary)?;
            }

            let thin: Vec<PathBuf> = members.iter().map(|s| s.framework.clone()).collect();
            swift_module |= package_module_maps(&thin, &module_map, &dest)?;
            frameworks.push(dest);
        }

        for slice in slices {
            if let Err(e) = remove_if_exists(&slice.framework) {
                tracing::warn!(
                    "failed to remove temporary framework {}: {:#}",
                    slice.framework.display(),
                    e
                );
            }
        }

        Ok((frameworks, swift_module))
    }

    fn cluster_dir(&self, channel: BuildChannel, target: TargetPlatform) -> PathBuf {
        self.work_dir
            .join("platform_frameworks")
            .join(channel.dir_name())
            .join(target.build_name())
    }
}

/// Slices grouped by target platform, in target order.
fn clusters(slices: &[BuiltSlice]) -> BTreeMap<TargetPlatform, Vec<&BuiltSlice>> {
    let mut clusters: BTreeMap<TargetPlatform, Vec<&BuiltSlice>> = BTreeMap::new();
    for slice in slices {
        clusters.entry(slice.spec.target).or_default().push(slice);
    }
    clusters
}

fn binary_name(framework: &Path) -> String {
    file_name(framework).replace(".framework", "")
}

/// The binary inside a built framework, with symlinks resolved.
fn slice_binary(framework: &Path) -> PathBuf {
    resolve_symlinks(&framework.join(binary_name(framework)))
}

fn has_explicit_umbrella(name: &str) -> bool {
    (name.starts_with("Firebase") || name == "GoogleDataTransport")
        && name != "FirebaseCoreDiagnostics"
        && name != "FirebaseUI"
        && !name.ends_with("Swift")
}

/// Find the umbrella header of a built framework.
///
/// Firebase frameworks ship a hand written `<Name>.h`, which replaces the
/// CocoaPods generated umbrella (the generated one is deleted).
pub fn umbrella_header(name: &str, headers_dir: &Path) -> Result<String> {
    if FIXED_UMBRELLA.contains(&name) {
        return Ok(format!("{}-umbrella.h", name));
    }

    let umbrellas: Vec<PathBuf> = list_dir(headers_dir)?
        .into_iter()
        .filter(|header| file_name(header).ends_with("umbrella.h"))
        .collect();
    let [generated] = umbrellas.as_slice() else {
        return Err(BuildError::UmbrellaHeader {
            framework: name.to_string(),
            dir: headers_dir.to_path_buf(),
        }
        .into());
    };

    if !has_explicit_umbrella(name) {
        return Ok(file_name(generated));
    }

    remove_if_exists(generated)?;
    let explicit = format!("{}.h", name);
    if !headers_dir.join(&explicit).is_file() {
        bail!(
            "missing explicit umbrella header {} for {} in {}",
            explicit,
            name,
            headers_dir.display()
        );
    }
    Ok(explicit)
}

fn has_swift_module(framework: &Path) -> bool {
    let modules = resolve_symlinks(&framework.join("Modules"));
    list_dir(&modules)
        .map(|entries| {
            entries
                .iter()
                .any(|entry| file_name(entry).ends_with(".swiftmodule"))
        })
        .unwrap_or(false)
}

/// Write the module map into `dest`, or copy the Swift modules of the thin
/// frameworks if they have any. Returns whether Swift modules were used.
fn package_module_maps(thin: &[PathBuf], module_map: &str, dest: &Path) -> Result<bool> {
    if merge_swift_modules(thin, dest)? {
        return Ok(true);
    }
    write_string(&dest.join("Modules").join("module.modulemap"), module_map)?;
    Ok(false)
}

/// Copy the `Modules` directory of the first thin framework, then only the
/// architecture specific files of the others.
fn merge_swift_modules(thin: &[PathBuf], dest: &Path) -> Result<bool> {
    let dest_modules = dest.join("Modules");

    for framework in thin {
        // The Catalyst `Modules` is a symlink.
        let modules = resolve_symlinks(&framework.join("Modules"));
        if !is_dir(&modules) {
            return Ok(false);
        }
        let Some(swift_module) = list_dir(&modules)?
            .into_iter()
            .find(|entry| file_name(entry).ends_with(".swiftmodule"))
        else {
            return Ok(false);
        };

        if !dest_modules.exists() {
            copy_item(&modules, &dest_modules)?;
            continue;
        }

        let dest_swift_module = dest_modules.join(file_name(&swift_module));
        ensure_dir(&dest_swift_module)?;
        for entry in list_dir(&swift_module)? {
            let entry_name = file_name(&entry);
            if entry_name == "Project" && is_dir(&entry) {
                let dest_project = dest_swift_module.join("Project");
                ensure_dir(&dest_project)?;
                for project_file in list_dir(&entry)? {
                    copy_if_missing(&project_file, &dest_project.join(file_name(&project_file)))?;
                }
            } else {
                copy_if_missing(&entry, &dest_swift_module.join(entry_name))?;
            }
        }
    }

    Ok(true)
}

fn copy_if_missing(src: &Path, dest: &Path) -> Result<()> {
    if dest.symlink_metadata().is_ok() {
        tracing::debug!("{} already present", dest.display());
        return Ok(());
    }
    copy_item(src, dest)
}
