//! The two top-level runs.
//!
//! A release builds every package of a [`ReleaseManifest`], assembles the
//! zip and Carthage distributions and packages both. A custom build puts the
//! containers of whatever was built into a flat `Frameworks.zip`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::builder::{BuildChannel, BuildError};
use crate::core::{Platform, VersionedPackage};
use crate::util::archive::{zip_dir, ArchiveLayout};
use crate::util::fs::{copy_item, ensure_dir, read_to_string, recreate_dir, remove_if_exists};
use crate::util::shell::Status;

use super::assemble::{copy_frameworks, Assembler, Assembly, AssemblyInput};
use super::carthage::{CarthagePackager, ProductOutcome};
use super::zip_build::{BuildOptions, ZipBuilder};

pub const RELEASE_ZIP: &str = "Firebase.zip";
pub const FRAMEWORKS_ZIP: &str = "Frameworks.zip";

/// Packages shipped in one release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseManifest {
    /// Version of the anchor package, used for packages without their own.
    pub version: String,

    #[serde(default, rename = "package")]
    pub packages: Vec<ReleasePackage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleasePackage {
    pub name: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default = "default_release_platforms")]
    pub platforms: Vec<String>,

    /// Whether the package gets its own folder in the distributions.
    #[serde(default)]
    pub zip: bool,
}

fn default_release_platforms() -> Vec<String> {
    vec!["ios".to_string(), "macos".to_string(), "tvos".to_string()]
}

impl ReleaseManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = read_to_string(path)?;
        Self::parse(&contents)
            .with_context(|| format!("failed to parse release manifest: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let manifest: ReleaseManifest = toml::from_str(contents)?;
        if manifest.packages.is_empty() {
            anyhow::bail!("the release manifest lists no packages");
        }
        for package in &manifest.packages {
            for platform in &package.platforms {
                platform
                    .parse::<Platform>()
                    .with_context(|| format!("in the platforms of {}", package.name))?;
            }
        }
        Ok(manifest)
    }

    /// Every package pinned to its release version.
    pub fn versioned_packages(&self) -> Vec<VersionedPackage> {
        self.packages
            .iter()
            .map(|p| {
                let version = p.version.clone().unwrap_or_else(|| self.version.clone());
                VersionedPackage::new(&p.name, Some(version)).with_platforms(p.platforms.iter().cloned())
            })
            .collect()
    }

    /// Packages that get a product folder.
    pub fn released(&self) -> BTreeSet<String> {
        self.packages
            .iter()
            .filter(|p| p.zip)
            .map(|p| p.name.clone())
            .collect()
    }
}

/// Everything a release run produced.
#[derive(Debug)]
pub struct ReleaseArtifacts {
    pub version: String,
    pub zip: PathBuf,
    pub zip_assembly: Assembly,
    pub carthage_assembly: Assembly,
    /// Root holding `<version>/` with the Carthage zips and manifests.
    pub carthage_dir: PathBuf,
    pub carthage_products: BTreeMap<String, ProductOutcome>,
    /// Packages left out of the Carthage channel.
    pub carthage_disqualified: BTreeSet<String>,
}

/// Build, assemble and package a full release.
pub fn release(
    builder: &ZipBuilder<'_>,
    manifest: &ReleaseManifest,
    dynamic: bool,
    output_dir: Option<&Path>,
) -> Result<ReleaseArtifacts> {
    let config = builder.config;
    let roles = &config.packages;

    let mut requested = manifest.versioned_packages();
    // Not released with the rest, but shipped at their latest version.
    for extra in &roles.extra {
        requested.push(VersionedPackage::new(extra, None).with_platforms(["ios"]));
    }
    tracing::info!(
        "expected versions: {}",
        requested
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let output = builder.build_and_assemble(
        &requested,
        BuildOptions {
            dynamic,
            include_carthage: true,
            include_dependencies: true,
        },
    )?;

    let anchor = output
        .packages
        .get(&roles.anchor)
        .ok_or_else(|| BuildError::MissingAnchor {
            package: roles.anchor.clone(),
        })?;
    let version = anchor.version.clone();

    let released = manifest.released();
    let assembler = Assembler {
        config,
        template_dir: &builder.paths.template_dir,
        shell: builder.shell.clone(),
    };
    let build_root = &builder.paths.build_root;

    let zip_assembly = assembler.assemble(
        BuildChannel::Zip,
        &build_root.join("Firebase"),
        &AssemblyInput {
            requested: &requested,
            released: &released,
            packages: &output.packages,
            xcframeworks: &output.xcframeworks,
            excluded: &BTreeSet::new(),
        },
    )?;

    let mut carthage_frameworks = output.xcframeworks.clone();
    if let Some(diagnostics) = &output.carthage_diagnostics {
        carthage_frameworks.insert(roles.diagnostics.clone(), vec![diagnostics.clone()]);
    }
    for name in &output.carthage_disqualified {
        builder.shell.warn(format!(
            "{} ships a Swift module and is left out of the Carthage distribution",
            name
        ));
    }
    let carthage_assembly = assembler.assemble(
        BuildChannel::Carthage,
        &build_root.join("CarthageFirebase"),
        &AssemblyInput {
            requested: &requested,
            released: &released,
            packages: &output.packages,
            xcframeworks: &carthage_frameworks,
            excluded: &output.carthage_disqualified,
        },
    )?;

    let destination = output_dir.unwrap_or(build_root);
    ensure_dir(destination)?;
    let zip = destination.join(RELEASE_ZIP);
    remove_if_exists(&zip)?;
    zip_dir(&zip_assembly.dir, &zip, ArchiveLayout::WithRoot)
        .context("could not zip the release distribution")?;
    builder
        .shell
        .status(Status::Packaged, format!("{}", zip.display()));

    let packager = CarthagePackager {
        config,
        template_dir: &builder.paths.template_dir,
        minimum_os: builder.platforms.minimum_version(Platform::Ios),
        shell: builder.shell.clone(),
    };
    let (mut carthage_dir, carthage_products) =
        packager.package(&carthage_assembly.dir, &version)?;

    if let Some(output_dir) = output_dir {
        let dest = output_dir.join("carthage");
        remove_if_exists(&dest)?;
        copy_item(&carthage_dir, &dest).context("could not copy the Carthage release")?;
        carthage_dir = dest;
    }

    Ok(ReleaseArtifacts {
        version,
        zip,
        zip_assembly,
        carthage_assembly,
        carthage_dir,
        carthage_products,
        carthage_disqualified: output.carthage_disqualified,
    })
}

/// Build `pods` and zip every built container into `Frameworks.zip`.
pub fn build_frameworks_zip(
    builder: &ZipBuilder<'_>,
    pods: &[VersionedPackage],
    options: BuildOptions,
    output_dir: Option<&Path>,
) -> Result<PathBuf> {
    let output = builder.build_and_assemble(pods, options)?;

    let staging = builder.paths.build_root.join("Binaries");
    recreate_dir(&staging)?;
    let installed: BTreeSet<String> = output.packages.names().into_iter().collect();
    copy_frameworks(
        &installed,
        &staging,
        &output.xcframeworks,
        &[],
        &builder.config.packages.anchor,
    )?;

    let destination = output_dir.unwrap_or(&builder.paths.build_root);
    let zip = destination.join(FRAMEWORKS_ZIP);
    remove_if_exists(&zip)?;
    zip_dir(&staging, &zip, ArchiveLayout::ContentsOnly)
        .with_context(|| format!("could not write {}", zip.display()))?;
    builder
        .shell
        .status(Status::Packaged, format!("{}", zip.display()));
    Ok(zip)
}
