//! Building every requested package for every platform.
//!
//! Packages are installed once per platform into `project-<platform>` so
//! that every subspec any package needs is present, then compiled one by
//! one. After the last platform the per-platform frameworks of each package
//! are merged into one xcframework.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};

use crate::builder::resources::{directory_contains_resources, package_all_resources, ResourcePackaging};
use crate::builder::xcframework::{make_xcframework, post_process};
use crate::builder::{
    BuildChannel, FrameworkBuilder, InstallRequest, LinkSynthesizer, LinkageType,
    PackageInstaller, Toolchain,
};
use crate::core::package::base_name;
use crate::core::{InstalledPackage, PackageKind, Platform, PlatformConfig, VersionedPackage};
use crate::resolver::PackageStore;
use crate::util::config::Config;
use crate::util::fs::{copy_item, ensure_dir, file_name, recreate_dir, remove_if_exists};
use crate::util::shell::{Shell, Status};

/// Directories used during a build.
#[derive(Debug, Clone)]
pub struct BuildPaths {
    /// Directory holding the `FrameworkMaker` project template.
    pub template_dir: PathBuf,
    /// Scratch root for projects, intermediate frameworks and containers.
    pub build_root: PathBuf,
    /// Directory of local podspecs to build instead of published versions.
    pub local_podspec_path: Option<PathBuf>,
    /// Where a log is written for every slice build.
    pub logs_dir: PathBuf,
}

impl BuildPaths {
    pub fn project_dir(&self, platform: Platform) -> PathBuf {
        self.build_root.join(format!("project-{}", platform.name()))
    }

    /// Scratch project used for the isolated installs of link synthesis.
    pub fn module_project_dir(&self) -> PathBuf {
        self.build_root.join("module")
    }

    pub fn xcframeworks_dir(&self) -> PathBuf {
        self.build_root.join("xcframeworks")
    }

    pub fn carthage_xcframeworks_dir(&self) -> PathBuf {
        self.build_root.join("xcf-carthage")
    }

    pub fn binary_zip_dir(&self) -> PathBuf {
        self.build_root.join("binary_zip")
    }
}

/// What to build besides the primary channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Build dynamic frameworks instead of static ones.
    pub dynamic: bool,
    /// Also build what the Carthage channel needs.
    pub include_carthage: bool,
    /// Build every installed package, not only the requested ones.
    pub include_dependencies: bool,
}

/// Result of [`ZipBuilder::build_and_assemble`].
#[derive(Debug)]
pub struct BuildOutput {
    /// Every package installed on any platform, as first seen.
    pub packages: PackageStore,
    /// Containers per package name. Binary packages may have several.
    pub xcframeworks: BTreeMap<String, Vec<PathBuf>>,
    /// The diagnostics package rebuilt with the Carthage compile flag.
    pub carthage_diagnostics: Option<PathBuf>,
    /// Packages with Swift modules, which the Carthage channel can't ship.
    pub carthage_disqualified: BTreeSet<String>,
}

/// Drives installation, compilation and container creation.
pub struct ZipBuilder<'a> {
    pub installer: &'a dyn PackageInstaller,
    pub toolchain: &'a dyn Toolchain,
    pub paths: &'a BuildPaths,
    pub platforms: &'a PlatformConfig,
    pub config: &'a Config,
    pub shell: Arc<Shell>,
}

/// Accumulated across platforms.
#[derive(Default)]
struct Collected {
    grouped: BTreeMap<String, Vec<PathBuf>>,
    carthage_diagnostics: Vec<PathBuf>,
    packages: PackageStore,
    xcframeworks: BTreeMap<String, Vec<PathBuf>>,
    resources: BTreeMap<String, PathBuf>,
    disqualified: BTreeSet<String>,
}

impl ZipBuilder<'_> {
    /// Build `pods` for every configured platform and merge the results.
    pub fn build_and_assemble(
        &self,
        pods: &[VersionedPackage],
        options: BuildOptions,
    ) -> Result<BuildOutput> {
        let start = Instant::now();

        // A release may rebuild a version that is already cached.
        self.installer
            .clean_cache()
            .context("could not clean the CocoaPods cache")?;
        ensure_dir(&self.paths.logs_dir)?;

        let mut collected = Collected::default();
        for &platform in self.platforms.platforms() {
            self.build_platform(platform, pods, options, &mut collected)?;
        }

        let xcframeworks_dir = self.paths.xcframeworks_dir();
        recreate_dir(&xcframeworks_dir)?;
        for (name, frameworks) in &collected.grouped {
            self.shell.status(
                Status::Merging,
                format!("{} ({} frameworks)", name, frameworks.len()),
            );
            let xcframework = make_xcframework(
                self.toolchain,
                name,
                post_process(frameworks),
                &xcframeworks_dir,
                collected.resources.get(name).map(PathBuf::as_path),
            )?;
            collected.xcframeworks.insert(name.clone(), vec![xcframework]);
        }
        for (name, paths) in &collected.xcframeworks {
            tracing::debug!("frameworks for {}: {:?}", name, paths);
        }

        let mut carthage_diagnostics = None;
        if options.include_carthage && !collected.carthage_diagnostics.is_empty() {
            let dir = self.paths.carthage_xcframeworks_dir();
            recreate_dir(&dir)?;
            carthage_diagnostics = Some(make_xcframework(
                self.toolchain,
                &self.config.packages.diagnostics,
                post_process(&collected.carthage_diagnostics),
                &dir,
                None,
            )?);
        }

        self.shell.status(
            Status::Finished,
            format!(
                "{} package(s) for {} platform(s) in {:.2}s",
                collected.xcframeworks.len(),
                self.platforms.platforms().len(),
                start.elapsed().as_secs_f64()
            ),
        );

        Ok(BuildOutput {
            packages: collected.packages,
            xcframeworks: collected.xcframeworks,
            carthage_diagnostics,
            carthage_disqualified: collected.disqualified,
        })
    }

    fn build_platform(
        &self,
        platform: Platform,
        pods: &[VersionedPackage],
        options: BuildOptions,
        collected: &mut Collected,
    ) -> Result<()> {
        let roles = &self.config.packages;
        let platform_pods: Vec<VersionedPackage> =
            pods.iter().filter(|p| p.supports(platform)).cloned().collect();
        if platform_pods.is_empty() {
            self.shell
                .status(Status::Skipped, format!("{} (no package supports it)", platform));
            return Ok(());
        }

        let project_dir = self.paths.project_dir(platform);
        remove_if_exists(&project_dir)?;
        self.installer.prepare(&project_dir)?;

        // Installing everything at once gets the superset of subspecs that
        // the requested packages need between them.
        self.shell.status(
            Status::Installing,
            format!("{} package(s) ({})", platform_pods.len(), platform),
        );
        let linkage = if options.dynamic {
            LinkageType::Dynamic
        } else {
            LinkageType::StandardStatic
        };
        let mut installed = self.installer.install(&InstallRequest {
            pods: &platform_pods,
            project_dir: &project_dir,
            platform,
            platforms: self.platforms,
            linkage,
        })?;

        // Static frameworks carry a module map listing what they link against.
        if !options.dynamic {
            self.shell
                .status(Status::Synthesizing, format!("module maps ({})", platform));
            LinkSynthesizer::new(
                self.installer,
                self.paths.module_project_dir(),
                platform,
                self.platforms,
                &roles.anchor,
            )
            .build(&mut installed)?;
        }

        let requested: BTreeSet<&str> = platform_pods.iter().map(|p| base_name(&p.name)).collect();
        let names: Vec<String> = installed
            .names()
            .into_iter()
            .filter(|name| options.include_dependencies || requested.contains(name.as_str()))
            .collect();

        let builder = FrameworkBuilder {
            toolchain: self.toolchain,
            project_dir: &project_dir,
            platform,
            platforms: self.platforms,
            bundle: &self.config.bundle,
            logs_dir: &self.paths.logs_dir,
            work_dir: &self.paths.build_root,
            dynamic: options.dynamic,
        };

        let order = build_order(names, &roles.pinned_last);
        let mut progress = self.shell.progress(order.len() as u64, platform);
        for name in order {
            let Some(package) = installed.get(&name) else {
                continue;
            };

            if name == roles.anchor {
                // Only provides headers and the version; nothing to compile.
            } else if package.is_source() {
                progress.status(
                    Status::Compiling,
                    format!("{} v{} ({})", name, package.version, platform),
                );
                let compiled = builder.compile(package, BuildChannel::Zip)?;
                collected
                    .grouped
                    .entry(name.clone())
                    .or_default()
                    .extend(compiled.frameworks);

                if options.include_carthage {
                    if compiled.swift_module {
                        collected.disqualified.insert(name.clone());
                    }
                    if name == roles.diagnostics {
                        progress.status(
                            Status::Compiling,
                            format!("{} v{} ({}, carthage)", name, package.version, platform),
                        );
                        let rebuilt = builder.compile(package, BuildChannel::Carthage)?;
                        collected.carthage_diagnostics.extend(rebuilt.frameworks);
                    }
                }

                if let Some(contents) = compiled.resource_contents {
                    collected.resources.insert(name.clone(), contents);
                }
            } else if !collected.packages.contains(&name) {
                // Binary frameworks already cover every platform.
                let frameworks = self.collect_binary_frameworks(package)?;
                collected.xcframeworks.insert(name.clone(), frameworks);
            }

            if !collected.packages.contains(&name) {
                collected.packages.insert(package.clone());
            }
            progress.inc(1);
        }
        progress.finish();

        Ok(())
    }

    /// Copy the prebuilt frameworks of a binary package into `binary_zip`.
    fn collect_binary_frameworks(&self, package: &InstalledPackage) -> Result<Vec<PathBuf>> {
        let PackageKind::PrebuiltBinary { frameworks } = &package.kind else {
            return Ok(Vec::new());
        };

        // Plain frameworks get their loose resources moved inside them.
        let plain = frameworks
            .iter()
            .all(|f| f.extension().is_some_and(|ext| ext == "framework"));
        if plain && directory_contains_resources(&package.location)? {
            match package_all_resources(self.toolchain, &package.location, &[])
                .with_context(|| format!("could not package the resources of {}", package.name))?
            {
                ResourcePackaging::NoResourcesFound => {}
                ResourcePackaging::Packaged(bundles) => {
                    tracing::debug!("packaged {} bundle(s) for {}", bundles.len(), package.name)
                }
            }
        }

        let dir = self.paths.binary_zip_dir();
        ensure_dir(&dir)?;
        let mut collected = Vec::new();
        for framework in frameworks {
            let dest = dir.join(file_name(framework));
            // A previous run may have left an outdated copy.
            remove_if_exists(&dest)?;
            copy_item(framework, &dest).with_context(|| {
                format!(
                    "cannot copy framework {} of {}",
                    framework.display(),
                    package.name
                )
            })?;
            collected.push(dest);
        }
        Ok(collected)
    }
}

/// Lexicographic build order with `pinned_last` moved to the end.
///
/// The pinned package restricts its architectures, which must not leak into
/// the packages it depends on.
pub fn build_order(mut names: Vec<String>, pinned_last: &str) -> Vec<String> {
    names.sort();
    names.dedup();
    if let Some(pos) = names.iter().position(|n| n == pinned_last) {
        let pinned = names.remove(pos);
        names.push(pinned);
    }
    names
}
