//! Laying out a release directory from built containers.
//!
//! The bundling package goes first and claims its whole closure. Every
//! other released package gets a folder with its own closure minus what the
//! bundling package already ships. `METADATA.md` lists what each folder
//! holds and the versions of every installed package.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::builder::resources::{move_all_bundles, Transfer};
use crate::builder::{BuildChannel, BuildError};
use crate::core::VersionedPackage;
use crate::resolver::PackageStore;
use crate::util::config::Config;
use crate::util::fs::{
    copy_item, ensure_dir, file_name, is_dir, list_dir, read_to_string, recreate_dir,
    remove_if_exists, resolve_symlinks, write_string,
};
use crate::util::shell::{Shell, Status};

pub const METADATA_FILE: &str = "METADATA.md";
pub const README_FILE: &str = "README.md";
pub const NOTICES_FILE: &str = "NOTICES";
pub const MODULE_MAP_FILE: &str = "module.modulemap";

const INTEGRATION_PLACEHOLDER: &str = "__INTEGRATION__";
const VERSIONS_PLACEHOLDER: &str = "__VERSIONS__";

const RESOURCES_REQUIRED_TEXT: &str = "You'll also need to add the resources in the Resources\n\
directory into your target's main bundle.\n";

/// One product folder of the release, as listed in `METADATA.md`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub folder: String,
    /// Framework names, `.xcframework` stripped and `.framework` kept.
    pub frameworks: Vec<String>,
    /// Whether consumers have to add bundles from a `Resources` directory.
    pub has_resources: bool,
}

impl ManifestEntry {
    /// Header line, one bullet per framework and the resources note.
    pub fn render(&self, config: &Config) -> String {
        let mut result = format!("## {}", self.folder);
        if config.requires_bundling(&self.folder) {
            result.push_str(&format!(" (~> {})", config.packages.bundling));
        }
        result.push('\n');

        let mut frameworks = self.frameworks.clone();
        frameworks.sort();
        for framework in frameworks {
            if framework.ends_with(".framework") {
                result.push_str(&format!("- {}\n", framework));
            } else {
                result.push_str(&format!("- {}.xcframework\n", framework));
            }
        }
        result.push('\n');

        if self.has_resources {
            result.push_str(RESOURCES_REQUIRED_TEXT);
            result.push('\n');
        }
        result
    }
}

/// An assembled release directory.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub dir: PathBuf,
    pub version: String,
    pub entries: Vec<ManifestEntry>,
}

/// What the assembler works from.
pub struct AssemblyInput<'a> {
    /// Packages the release asked for, including the configured extras.
    pub requested: &'a [VersionedPackage],
    /// Packages that get their own product folder.
    pub released: &'a BTreeSet<String>,
    pub packages: &'a PackageStore,
    pub xcframeworks: &'a BTreeMap<String, Vec<PathBuf>>,
    /// Packages left out of this distribution.
    pub excluded: &'a BTreeSet<String>,
}

pub struct Assembler<'a> {
    pub config: &'a Config,
    pub template_dir: &'a Path,
    pub shell: Arc<Shell>,
}

impl Assembler<'_> {
    /// Assemble the release for `channel` into `dir`, replacing its contents.
    pub fn assemble(
        &self,
        channel: BuildChannel,
        dir: &Path,
        input: &AssemblyInput<'_>,
    ) -> Result<Assembly> {
        let roles = &self.config.packages;
        self.shell.status(
            Status::Assembling,
            format!("{} distribution in {}", channel.dir_name(), dir.display()),
        );
        recreate_dir(dir)?;

        let anchor = input
            .packages
            .get(&roles.anchor)
            .ok_or_else(|| BuildError::MissingAnchor {
                package: roles.anchor.clone(),
            })?;
        self.copy_anchor_files(&anchor.location, dir)?;

        // The bundling package claims its whole closure first.
        let (bundling_dir, bundled) = install_and_copy_frameworks(
            &roles.bundling,
            &roles.bundling,
            input,
            dir,
            &[],
            &roles.anchor,
        )
        .with_context(|| {
            format!(
                "could not copy the frameworks of {} into the release",
                roles.bundling
            )
        })?;
        let mut entries = vec![ManifestEntry {
            folder: roles.bundling.clone(),
            has_resources: has_resources(&bundling_dir)?,
            frameworks: bundled.clone(),
        }];
        let bundled_packages: Vec<String> = bundled
            .iter()
            .map(|name| name.replace(".framework", ""))
            .collect();

        let requested: BTreeSet<&str> = input.requested.iter().map(|p| p.name.as_str()).collect();
        let remaining: Vec<String> = input
            .packages
            .names()
            .into_iter()
            .filter(|name| {
                roles.extra.contains(name)
                    || (input.released.contains(name)
                        && *name != roles.bundling
                        && *name != roles.anchor
                        && requested.contains(name.as_str()))
            })
            .filter(|name| !input.excluded.contains(name))
            .collect();

        for name in remaining {
            if !input.xcframeworks.contains_key(&name) {
                tracing::debug!("{} wasn't built, leaving it out", name);
                continue;
            }
            let folder = folder_name(&name);
            let (product_dir, frameworks) = install_and_copy_frameworks(
                &name,
                &folder,
                input,
                dir,
                &bundled_packages,
                &roles.anchor,
            )
            .with_context(|| format!("could not copy the frameworks of {} into the release", name))?;

            // Resources are still at the root of the xcframeworks here.
            entries.push(ManifestEntry {
                has_resources: has_resources(&product_dir)?,
                folder: folder.clone(),
                frameworks,
            });

            relocate_resources(channel, &product_dir)
                .with_context(|| format!("could not set up the resources of {}", name))?;

            self.copy_tools(&name, input.packages, &product_dir)?;
        }

        let integration: String = entries.iter().map(|e| e.render(self.config)).collect();
        let template_path = self.template_dir.join(METADATA_FILE);
        let template = read_to_string(&template_path)
            .context("could not get the contents of the METADATA template")?;
        let metadata = template
            .replace(INTEGRATION_PLACEHOLDER, &integration)
            .replace(VERSIONS_PLACEHOLDER, &versions_string(input.packages));
        write_string(&dir.join(METADATA_FILE), &metadata)?;

        copy_item(&self.template_dir.join(README_FILE), &dir.join(README_FILE))
            .context("could not copy the README template")?;

        self.shell.status(
            Status::Created,
            format!("{} distribution at {}", channel.dir_name(), dir.display()),
        );
        Ok(Assembly {
            dir: dir.to_path_buf(),
            version: anchor.version.clone(),
            entries,
        })
    }

    /// Copy the license notices, umbrella header and module map of the anchor.
    fn copy_anchor_files(&self, anchor_dir: &Path, dir: &Path) -> Result<()> {
        let files_dir = anchor_dir.join("CoreOnly");
        let header = format!("{}.h", self.config.packages.anchor);
        let files = [
            files_dir.join(NOTICES_FILE),
            files_dir.join("Sources").join(header),
            files_dir.join("Sources").join(MODULE_MAP_FILE),
        ];

        for file in files {
            let dest = dir.join(file_name(&file));
            if dest.exists() {
                continue;
            }
            tracing::debug!("copying {} to {}", file.display(), dest.display());
            copy_item(&file, &dest).with_context(|| {
                format!(
                    "could not copy the distribution file {} from the {} package",
                    file.display(),
                    self.config.packages.anchor
                )
            })?;
        }
        Ok(())
    }

    /// Copy developer tools shipped next to a package's frameworks.
    fn copy_tools(&self, name: &str, packages: &PackageStore, product_dir: &Path) -> Result<()> {
        let Some(carrier) = self
            .config
            .packages
            .tool_carriers
            .iter()
            .find(|c| c.package == name)
        else {
            return Ok(());
        };
        let Some(package) = packages.get(name) else {
            return Ok(());
        };

        for file in &carrier.files {
            let source = package.location.join(file);
            let target = product_dir.join(file);
            copy_item(&source, &target).with_context(|| {
                format!(
                    "error copying {} tools from {} to {}",
                    name,
                    source.display(),
                    target.display()
                )
            })?;
        }
        Ok(())
    }
}

/// Product folder name of a package.
pub fn folder_name(package: &str) -> String {
    if package == "GoogleSignInSwiftSupport" {
        return "GoogleSignIn".to_string();
    }
    package.replace("Swift", "")
}

/// Copy the containers of `package` and its closure into `root/folder`.
///
/// Returns the product directory and the names of the copied frameworks,
/// without those in `ignore`.
fn install_and_copy_frameworks(
    package: &str,
    folder: &str,
    input: &AssemblyInput<'_>,
    root: &Path,
    ignore: &[String],
    anchor: &str,
) -> Result<(PathBuf, Vec<String>)> {
    let mut to_copy: BTreeSet<String> = input.packages.transitive_base_dependencies(package);
    to_copy.insert(package.to_string());

    let product_dir = root.join(folder);
    let copied = copy_frameworks(&to_copy, &product_dir, input.xcframeworks, ignore, anchor)?;
    let copied = copied
        .into_iter()
        .filter(|name| !ignore.contains(name) && name != anchor)
        .collect();
    Ok((product_dir, copied))
}

/// Copy every container of `packages` into `dir`.
pub fn copy_frameworks(
    packages: &BTreeSet<String>,
    dir: &Path,
    locations: &BTreeMap<String, Vec<PathBuf>>,
    ignore: &[String],
    anchor: &str,
) -> Result<Vec<String>> {
    ensure_dir(dir)?;

    let mut copied = Vec::new();
    for package in packages {
        if package == anchor {
            continue;
        }
        let Some(containers) = locations.get(package) else {
            bail!(
                "unable to find frameworks for {} in the frameworks built for the release",
                package
            );
        };

        for container in containers {
            let container_name = file_name(container);
            let stem = container
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            if ignore.contains(&stem) {
                continue;
            }
            copy_item(container, &dir.join(&container_name))?;
            copied.push(container_name.replace(".xcframework", ""));
        }
    }
    Ok(copied)
}

/// Does any container in `product_dir` have a `Resources` directory.
fn has_resources(product_dir: &Path) -> Result<bool> {
    for entry in list_dir(product_dir)? {
        if !is_dir(&entry) {
            continue;
        }
        if list_dir(&entry)?
            .iter()
            .any(|child| file_name(child) == "Resources")
        {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Move container-level resources where the channel expects them.
///
/// The zip distribution pulls them up into `<product>/Resources`. Carthage
/// has no shared resources, so every framework slice gets a copy.
fn relocate_resources(channel: BuildChannel, product_dir: &Path) -> Result<()> {
    for container in list_dir(product_dir)? {
        let xc_resources = container.join("Resources");
        if !is_dir(&container)
            || !file_name(&container).ends_with("xcframework")
            || !is_dir(&xc_resources)
        {
            continue;
        }

        match channel {
            BuildChannel::Zip => {
                move_all_bundles(&xc_resources, &product_dir.join("Resources"), Transfer::Move)?;
            }
            BuildChannel::Carthage => {
                for slice in list_dir(&container)? {
                    if !is_dir(&slice) || slice == xc_resources {
                        continue;
                    }
                    for framework in list_dir(&slice)? {
                        if !is_dir(&framework) || !file_name(&framework).ends_with("framework") {
                            continue;
                        }
                        // On macOS `Resources` already exists as a symlink.
                        let resources = resolve_symlinks(&framework.join("Resources"));
                        ensure_dir(&resources)?;
                        for file in list_dir(&xc_resources)? {
                            copy_item(&file, &resources.join(file_name(&file)))?;
                        }
                    }
                }
            }
        }
        remove_if_exists(&xc_resources)?;
    }
    Ok(())
}

/// Table of every installed package and its version, sorted by name.
pub fn versions_string(packages: &PackageStore) -> String {
    const TITLE: &str = "CocoaPod";

    // Room for a space after the longest name.
    let max_length = packages
        .iter()
        .map(|p| p.name.chars().count())
        .max()
        .map(|len| len + 1)
        .unwrap_or(30);

    let to_pad = max_length.saturating_sub(TITLE.len());
    let half = " ".repeat(to_pad / 2);
    let mut result = format!("{}{}{}", half, TITLE, half);
    if to_pad % 2 != 0 {
        result.push(' ');
    }
    result.push_str("| Version\n");
    result.push_str(&format!("{}|{}\n", "-".repeat(max_length), "-".repeat(9)));

    for package in packages.iter() {
        let padding = max_length.saturating_sub(package.name.chars().count());
        result.push_str(&format!(
            "{}{}| {}\n",
            package.name,
            " ".repeat(padding),
            package.version
        ));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{InstalledPackage, LinkState, PackageKind};
    use crate::test_support::fixtures::store_from_deps;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_folder_name() {
        assert_eq!(folder_name("FirebaseStorageSwift"), "FirebaseStorage");
        assert_eq!(folder_name("GoogleSignInSwiftSupport"), "GoogleSignIn");
        assert_eq!(folder_name("FirebaseAuth"), "FirebaseAuth");
    }

    #[test]
    fn test_manifest_entry_render() {
        let config = Config::default();
        let entry = ManifestEntry {
            folder: "FirebaseFirestore".to_string(),
            frameworks: vec![
                "leveldb-library".to_string(),
                "BoringSSL-GRPC".to_string(),
                "FirebaseFirestore".to_string(),
            ],
            has_resources: true,
        };

        assert_eq!(
            entry.render(&config),
            "## FirebaseFirestore (~> FirebaseAnalytics)\n\
             - BoringSSL-GRPC.xcframework\n\
             - FirebaseFirestore.xcframework\n\
             - leveldb-library.xcframework\n\
             \n\
             You'll also need to add the resources in the Resources\n\
             directory into your target's main bundle.\n\
             \n"
        );
    }

    #[test]
    fn test_bundling_header_has_no_requirement() {
        let config = Config::default();
        for folder in ["FirebaseAnalytics", "GoogleSignIn"] {
            let entry = ManifestEntry {
                folder: folder.to_string(),
                frameworks: vec!["Binary.framework".to_string()],
                has_resources: false,
            };
            assert_eq!(
                entry.render(&config),
                format!("## {}\n- Binary.framework\n\n", folder)
            );
        }
    }

    #[test]
    fn test_versions_string() {
        let mut store = PackageStore::new();
        for (name, version) in [("nanopb", "2.30908.0"), ("FirebaseCore", "8.0.0")] {
            store.insert(InstalledPackage {
                name: name.to_string(),
                version: version.to_string(),
                dependencies: BTreeSet::new(),
                location: PathBuf::new(),
                kind: PackageKind::SourceBuilt,
                subspecs: BTreeSet::new(),
                link: LinkState::Pending,
            });
        }

        let expected = [
            "  CocoaPod   | Version",
            "-------------|---------",
            "FirebaseCore | 8.0.0",
            "nanopb       | 2.30908.0",
        ];
        assert_eq!(versions_string(&store), format!("{}\n", expected.join("\n")));
    }

    #[test]
    fn test_versions_string_empty() {
        let table = versions_string(&PackageStore::new());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], format!("{}|{}", "-".repeat(30), "-".repeat(9)));
    }

    struct Release {
        tmp: TempDir,
        template: PathBuf,
        store: PackageStore,
        xcframeworks: BTreeMap<String, Vec<PathBuf>>,
    }

    fn container(dir: &Path, name: &str, resources: bool) -> PathBuf {
        let xc = dir.join(format!("{}.xcframework", name));
        let framework = xc.join("ios-arm64").join(format!("{}.framework", name));
        fs::create_dir_all(&framework).unwrap();
        fs::write(framework.join(name), "binary").unwrap();
        if resources {
            let bundle = xc.join("Resources").join(format!("{}.bundle", name));
            fs::create_dir_all(&bundle).unwrap();
            fs::write(bundle.join("strings.json"), "{}").unwrap();
        }
        xc
    }

    /// Analytics bundles Installations; Auth and Firestore also need it.
    fn release() -> Release {
        let tmp = TempDir::new().unwrap();
        let template = tmp.path().join("template");
        fs::create_dir_all(&template).unwrap();
        fs::write(
            template.join(METADATA_FILE),
            "# Release\n__INTEGRATION__\n## Versions\n__VERSIONS__",
        )
        .unwrap();
        fs::write(template.join(README_FILE), "readme").unwrap();

        let mut store = store_from_deps(&[
            ("Firebase", &["FirebaseCore"]),
            ("FirebaseAnalytics", &["FirebaseInstallations"]),
            ("FirebaseInstallations", &[]),
            ("FirebaseAuth", &["FirebaseInstallations", "GTMSessionFetcher/Core"]),
            ("GTMSessionFetcher", &[]),
            ("FirebaseFirestore", &["FirebaseInstallations"]),
            ("FirebaseCrashlytics", &[]),
            ("FirebaseCore", &[]),
        ]);

        let anchor_dir = tmp.path().join("Pods/Firebase/CoreOnly");
        fs::create_dir_all(anchor_dir.join("Sources")).unwrap();
        fs::write(anchor_dir.join(NOTICES_FILE), "notices").unwrap();
        fs::write(anchor_dir.join("Sources/Firebase.h"), "header").unwrap();
        fs::write(anchor_dir.join("Sources/module.modulemap"), "map").unwrap();
        store.get_mut("Firebase").unwrap().location = tmp.path().join("Pods/Firebase");

        let crashlytics = tmp.path().join("Pods/FirebaseCrashlytics");
        fs::create_dir_all(&crashlytics).unwrap();
        fs::write(crashlytics.join("upload-symbols"), "tool").unwrap();
        fs::write(crashlytics.join("run"), "script").unwrap();
        store.get_mut("FirebaseCrashlytics").unwrap().location = crashlytics;

        let built = tmp.path().join("xcframeworks");
        let mut xcframeworks = BTreeMap::new();
        for name in [
            "FirebaseAnalytics",
            "FirebaseInstallations",
            "FirebaseAuth",
            "GTMSessionFetcher",
            "FirebaseCrashlytics",
            "FirebaseCore",
        ] {
            xcframeworks.insert(name.to_string(), vec![container(&built, name, false)]);
        }
        xcframeworks.insert(
            "FirebaseFirestore".to_string(),
            vec![container(&built, "FirebaseFirestore", true)],
        );

        Release {
            tmp,
            template,
            store,
            xcframeworks,
        }
    }

    fn requested() -> Vec<VersionedPackage> {
        ["FirebaseAnalytics", "FirebaseAuth", "FirebaseFirestore", "FirebaseCrashlytics"]
            .into_iter()
            .map(|name| VersionedPackage::new(name, None))
            .collect()
    }

    fn released() -> BTreeSet<String> {
        [
            "Firebase",
            "FirebaseAnalytics",
            "FirebaseAuth",
            "FirebaseFirestore",
            "FirebaseCrashlytics",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    fn assemble(r: &Release, channel: BuildChannel, dir: &Path) -> Result<Assembly> {
        let config = Config::default();
        let requested = requested();
        let released = released();
        Assembler {
            config: &config,
            template_dir: &r.template,
            shell: Arc::new(Shell::quiet()),
        }
        .assemble(
            channel,
            dir,
            &AssemblyInput {
                requested: &requested,
                released: &released,
                packages: &r.store,
                xcframeworks: &r.xcframeworks,
                excluded: &BTreeSet::new(),
            },
        )
    }

    #[test]
    fn test_zip_layout() {
        let r = release();
        let dir = r.tmp.path().join("Firebase");
        let assembly = assemble(&r, BuildChannel::Zip, &dir).unwrap();

        assert_eq!(assembly.version, "1.0.0");
        for file in [NOTICES_FILE, "Firebase.h", MODULE_MAP_FILE, README_FILE, METADATA_FILE] {
            assert!(dir.join(file).is_file(), "{} is missing", file);
        }

        // Analytics ships its closure; the others skip what it already has.
        assert!(dir.join("FirebaseAnalytics/FirebaseInstallations.xcframework").is_dir());
        assert!(dir.join("FirebaseAuth/GTMSessionFetcher.xcframework").is_dir());
        assert!(!dir.join("FirebaseAuth/FirebaseInstallations.xcframework").exists());

        // Zip resources move up to the product folder.
        assert!(dir
            .join("FirebaseFirestore/Resources/FirebaseFirestore.bundle/strings.json")
            .is_file());
        assert!(!dir
            .join("FirebaseFirestore/FirebaseFirestore.xcframework/Resources")
            .exists());

        assert!(dir.join("FirebaseCrashlytics/upload-symbols").is_file());
        assert!(dir.join("FirebaseCrashlytics/run").is_file());

        let folders: Vec<&str> = assembly.entries.iter().map(|e| e.folder.as_str()).collect();
        assert_eq!(
            folders,
            vec![
                "FirebaseAnalytics",
                "FirebaseAuth",
                "FirebaseCrashlytics",
                "FirebaseFirestore"
            ]
        );
        assert!(assembly.entries[3].has_resources);
        assert!(!assembly.entries[1].has_resources);

        let metadata = fs::read_to_string(dir.join(METADATA_FILE)).unwrap();
        assert!(metadata.starts_with("# Release\n## FirebaseAnalytics\n- FirebaseAnalytics.xcframework\n"));
        assert!(metadata.contains("## FirebaseAuth (~> FirebaseAnalytics)\n- FirebaseAuth.xcframework\n- GTMSessionFetcher.xcframework\n"));
        assert!(metadata.contains("FirebaseInstallations | 1.0.0\n"));
        assert!(!metadata.contains(INTEGRATION_PLACEHOLDER));
    }

    #[test]
    fn test_carthage_layout_copies_resources_into_frameworks() {
        let r = release();
        let dir = r.tmp.path().join("CarthageFirebase");
        assemble(&r, BuildChannel::Carthage, &dir).unwrap();

        let product = dir.join("FirebaseFirestore");
        assert!(product
            .join("FirebaseFirestore.xcframework/ios-arm64/FirebaseFirestore.framework/Resources/FirebaseFirestore.bundle/strings.json")
            .is_file());
        assert!(!product.join("Resources").exists());
        assert!(!product.join("FirebaseFirestore.xcframework/Resources").exists());
    }

    #[test]
    fn test_missing_anchor_is_fatal() {
        let mut r = release();
        let mut store = PackageStore::new();
        for package in r.store.iter().filter(|p| p.name != "Firebase") {
            store.insert(package.clone());
        }
        r.store = store;

        let err = assemble(&r, BuildChannel::Zip, &r.tmp.path().join("out")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingAnchor { .. })
        ));
    }

    #[test]
    fn test_unbuilt_dependency_is_fatal() {
        let mut r = release();
        r.xcframeworks.remove("GTMSessionFetcher");

        let err = assemble(&r, BuildChannel::Zip, &r.tmp.path().join("out")).unwrap_err();
        assert!(format!("{:#}", err).contains("unable to find frameworks for GTMSessionFetcher"));
    }
}
