//! CocoaPods integration.
//!
//! Packages are installed into a throwaway Xcode project so the toolchain can
//! build them. The `Podfile` is generated for each install and the resulting
//! `Podfile.lock` is read back into a [`PackageStore`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Context, Result};
use semver::Version;

use crate::builder::errors::BuildError;
use crate::core::package::base_name;
use crate::core::{Platform, PlatformConfig, VersionedPackage};
use crate::resolver::PackageStore;
use crate::util::fs::{copy_item, is_dir, write_string};
use crate::util::process::{find_tool, ProcessBuilder};

/// Xcode target every generated Podfile installs into.
pub const TARGET_NAME: &str = "FrameworkMaker";

/// Files copied from the template directory into every project.
const PROJECT_TEMPLATE_FILES: [&str; 2] = ["FrameworkMaker.xcodeproj", "Info.plist"];

/// Podspecs from a local checkout added when no versions are pinned, so the
/// core packages come from the same checkout as the requested ones.
const LOCAL_CORE_PODSPECS: [&str; 5] = [
    "FirebaseInstallations",
    "FirebaseCoreDiagnostics",
    "FirebaseCore",
    "FirebaseRemoteConfig",
    "FirebaseABTesting",
];

/// How the generated Podfile links the installed packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkageType {
    /// Static libraries with modular headers, so the generated xcconfig
    /// spells out every link dependency.
    ForcedStatic,
    Dynamic,
    StandardStatic,
}

impl LinkageType {
    fn directive(self) -> &'static str {
        match self {
            LinkageType::ForcedStatic => "use_modular_headers!",
            LinkageType::Dynamic => "use_frameworks!",
            LinkageType::StandardStatic => "use_frameworks! :linkage => :static",
        }
    }
}

/// Settings that shape every generated Podfile.
#[derive(Debug, Clone, Default)]
pub struct PodfileSettings {
    /// Spec repositories searched before the CDN.
    pub custom_spec_repos: Vec<String>,
    pub cdn: String,
    /// Directory holding podspecs that override published versions.
    pub local_podspec_path: Option<PathBuf>,
    /// Release version used to relax Firebase package requirements.
    pub release_version: Option<String>,
    /// Package whose requirement is never relaxed.
    pub anchor: String,
}

/// Render a Podfile installing `pods` for `platform`.
pub fn generate_podfile(
    pods: &[VersionedPackage],
    settings: &PodfileSettings,
    platform: Platform,
    minimum_version: &str,
    linkage: LinkageType,
) -> String {
    let mut podfile = String::new();

    for repo in &settings.custom_spec_repos {
        podfile.push_str(&format!("source '{}'\n", repo));
    }
    podfile.push_str(&format!("source '{}'\n\n", settings.cdn));

    podfile.push_str(&format!("  {}\n", linkage.directive()));
    podfile.push_str(&format!(
        "platform :{}, '{}'\ntarget '{}' do\n",
        platform.name(),
        minimum_version,
        TARGET_NAME
    ));

    let local = settings.local_podspec_path.as_deref();
    let mut versions_specified = false;
    for pod in pods {
        podfile.push_str("  ");
        podfile.push_str(&pod_line(pod, settings, local, &mut versions_specified));
        podfile.push('\n');
    }

    // Without pinned versions, take the core packages from the local checkout too.
    if !versions_specified {
        if let Some(local) = local {
            for name in LOCAL_CORE_PODSPECS {
                let podspec = local.join(format!("{}.podspec", name));
                if podspec.is_file() {
                    podfile.push_str(&format!(
                        "  pod '{}', :path => '{}'\n",
                        name,
                        podspec.display()
                    ));
                }
            }
        }
    }

    podfile.push_str("end");
    podfile
}

fn pod_line(
    pod: &VersionedPackage,
    settings: &PodfileSettings,
    local: Option<&Path>,
    versions_specified: &mut bool,
) -> String {
    let name = &pod.name;
    if pod.version.is_some() {
        *versions_specified = true;
    }

    if let Some(local) = local {
        if local.join(format!("{}.podspec", base_name(name))).is_file() {
            return format!("pod '{}', :path => '{}'", name, local.display());
        }
    }

    if let Some(version) = &pod.version {
        return format!("pod '{}', '{}'", name, relaxed_requirement(name, version, settings));
    }

    if let Some(local) = local {
        if name.starts_with("Firebase") && local.join("Firebase.podspec").is_file() {
            let subspec = name.trim_start_matches("Firebase");
            return format!("pod 'Firebase/{}', :path => '{}'", subspec, local.display());
        }
    }

    format!("pod '{}'", name)
}

/// Firebase packages track the release's minor version so patch releases of
/// individual packages can be picked up.
fn relaxed_requirement(name: &str, version: &str, settings: &PodfileSettings) -> String {
    let relaxable = name.starts_with("Firebase")
        && !name.ends_with("Swift")
        && name != settings.anchor
        && name != "FirebaseCore";

    match (&settings.release_version, relaxable) {
        (Some(release), true) => {
            let mut parts = release.split('.');
            let minor_floor = match (parts.next(), parts.next()) {
                (Some(major), Some(minor)) => format!("{}.{}.0", major, minor),
                _ => release.clone(),
            };
            format!("~> {}", version.replace(release.as_str(), &minor_floor))
        }
        _ => version.to_string(),
    }
}

/// What to install into a project directory.
#[derive(Debug, Clone, Copy)]
pub struct InstallRequest<'a> {
    pub pods: &'a [VersionedPackage],
    pub project_dir: &'a Path,
    pub platform: Platform,
    pub platforms: &'a PlatformConfig,
    pub linkage: LinkageType,
}

/// Installs packages into a project directory.
pub trait PackageInstaller: Send + Sync {
    /// Create the project directory and its Xcode project template.
    fn prepare(&self, project_dir: &Path) -> Result<()>;

    /// Install packages and report what was installed.
    fn install(&self, request: &InstallRequest<'_>) -> Result<PackageStore>;

    /// Drop cached downloads so every run builds fresh sources.
    fn clean_cache(&self) -> Result<()>;
}

/// The `pod` command line tool.
#[derive(Debug)]
pub struct CocoaPods {
    pod: PathBuf,
    template_dir: PathBuf,
    settings: PodfileSettings,
    minimum_version: String,
    unfolded_bases: Vec<String>,
    version_checked: AtomicBool,
}

impl CocoaPods {
    pub fn new(
        template_dir: impl Into<PathBuf>,
        settings: PodfileSettings,
        minimum_version: impl Into<String>,
        unfolded_bases: Vec<String>,
    ) -> Self {
        CocoaPods {
            pod: find_tool("pod"),
            template_dir: template_dir.into(),
            settings,
            minimum_version: minimum_version.into(),
            unfolded_bases,
            version_checked: AtomicBool::new(false),
        }
    }

    /// Update the local copy of the spec repositories.
    pub fn update_repos(&self) -> Result<()> {
        ProcessBuilder::new(&self.pod)
            .args(["repo", "update"])
            .exec_and_check()
            .context("could not update the CocoaPods spec repos")?;
        Ok(())
    }

    /// Fail if the installed CocoaPods is older than the configured minimum.
    fn check_version(&self) -> Result<()> {
        if self.version_checked.load(Ordering::SeqCst) {
            return Ok(());
        }

        let output = ProcessBuilder::new(&self.pod)
            .arg("--version")
            .exec_stdout()
            .context("could not determine the CocoaPods version")?;
        let found = output.trim().to_string();
        check_pod_version(&found, &self.minimum_version)?;
        tracing::debug!("using CocoaPods {}", found);

        self.version_checked.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Compare a `pod --version` output against a minimum release.
fn check_pod_version(found: &str, minimum: &str) -> Result<()> {
    let minimum_version = Version::parse(minimum)
        .with_context(|| format!("invalid minimum CocoaPods version `{}`", minimum))?;
    let found_version = Version::parse(found)
        .with_context(|| format!("could not parse CocoaPods version `{}`", found))?;
    if found_version < minimum_version {
        return Err(BuildError::UnsupportedPodVersion {
            minimum: minimum.to_string(),
            found: found.to_string(),
        }
        .into());
    }
    Ok(())
}

impl PackageInstaller for CocoaPods {
    fn prepare(&self, project_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(project_dir).with_context(|| {
            format!("could not create project directory {}", project_dir.display())
        })?;

        for file in PROJECT_TEMPLATE_FILES {
            let dest = project_dir.join(file);
            if dest.exists() {
                continue;
            }
            copy_item(&self.template_dir.join(file), &dest).with_context(|| {
                format!("could not copy {} into the project template", file)
            })?;
        }
        Ok(())
    }

    fn install(&self, request: &InstallRequest<'_>) -> Result<PackageStore> {
        if request.pods.is_empty() {
            bail!("no packages requested for {}", request.platform);
        }
        if !is_dir(request.project_dir) {
            bail!(
                "project directory {} doesn't exist, prepare it before installing",
                request.project_dir.display()
            );
        }

        let podfile = generate_podfile(
            request.pods,
            &self.settings,
            request.platform,
            request.platforms.minimum_version(request.platform),
            request.linkage,
        );
        write_string(&request.project_dir.join("Podfile"), &podfile)?;
        tracing::debug!("generated Podfile:\n{}", podfile);

        self.check_version()?;

        let packages = request
            .pods
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        tracing::debug!("pod install {} ({})", packages, request.platform);

        let outcome = ProcessBuilder::new(&self.pod)
            .arg("install")
            .cwd(request.project_dir)
            .exec_captured()?;
        if !outcome.success() {
            return Err(BuildError::InstallFailed {
                command: "pod install".to_string(),
                packages,
                code: outcome.code,
                output: outcome.output,
            }
            .into());
        }
        tracing::debug!("pod install output:\n{}", outcome.output);

        PackageStore::load(
            request.project_dir,
            self.settings.local_podspec_path.as_deref(),
            &self.unfolded_bases,
        )
    }

    fn clean_cache(&self) -> Result<()> {
        ProcessBuilder::new(&self.pod)
            .args(["cache", "clean", "--all"])
            .exec_and_check()
            .context("could not clean the CocoaPods cache")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings() -> PodfileSettings {
        PodfileSettings {
            cdn: "https://cdn.cocoapods.org/".to_string(),
            anchor: "Firebase".to_string(),
            ..PodfileSettings::default()
        }
    }

    #[test]
    fn test_podfile_layout() {
        let pods = vec![
            VersionedPackage::new("FirebaseAuth", None),
            VersionedPackage::new("GoogleUtilities/Environment", Some("7.4.1".into())),
        ];
        let podfile = generate_podfile(
            &pods,
            &settings(),
            Platform::Ios,
            "10.0",
            LinkageType::ForcedStatic,
        );

        assert_eq!(
            podfile,
            "source 'https://cdn.cocoapods.org/'\n\n  use_modular_headers!\n\
             platform :ios, '10.0'\ntarget 'FrameworkMaker' do\n\
             \x20 pod 'FirebaseAuth'\n\
             \x20 pod 'GoogleUtilities/Environment', '7.4.1'\nend"
        );
    }

    #[test]
    fn test_custom_repos_and_linkage() {
        let mut settings = settings();
        settings.custom_spec_repos = vec!["https://github.com/acme/Specs.git".to_string()];
        let pods = vec![VersionedPackage::new("FirebaseAuth", None)];

        let podfile = generate_podfile(
            &pods,
            &settings,
            Platform::Macos,
            "10.12",
            LinkageType::StandardStatic,
        );
        assert!(podfile.starts_with(
            "source 'https://github.com/acme/Specs.git'\nsource 'https://cdn.cocoapods.org/'\n"
        ));
        assert!(podfile.contains("  use_frameworks! :linkage => :static\n"));
        assert!(podfile.contains("platform :macos, '10.12'\n"));

        let dynamic = generate_podfile(&pods, &settings, Platform::Ios, "10.0", LinkageType::Dynamic);
        assert!(dynamic.contains("  use_frameworks!\n"));
    }

    #[test]
    fn test_firebase_versions_are_relaxed() {
        let mut settings = settings();
        settings.release_version = Some("8.1.1".to_string());
        let pods = vec![
            VersionedPackage::new("FirebaseAuth", Some("8.1.1".into())),
            VersionedPackage::new("FirebaseCore", Some("8.1.1".into())),
            VersionedPackage::new("FirebaseStorageSwift", Some("8.1.1-beta".into())),
            VersionedPackage::new("Firebase", Some("8.1.1".into())),
        ];

        let podfile = generate_podfile(&pods, &settings, Platform::Ios, "10.0", LinkageType::Dynamic);
        assert!(podfile.contains("  pod 'FirebaseAuth', '~> 8.1.0'\n"));
        assert!(podfile.contains("  pod 'FirebaseCore', '8.1.1'\n"));
        assert!(podfile.contains("  pod 'FirebaseStorageSwift', '8.1.1-beta'\n"));
        assert!(podfile.contains("  pod 'Firebase', '8.1.1'\n"));
    }

    #[test]
    fn test_local_podspecs() {
        let tmp = TempDir::new().unwrap();
        let local = tmp.path();
        for podspec in ["FirebaseAuth", "Firebase", "FirebaseCore"] {
            std::fs::write(local.join(format!("{}.podspec", podspec)), "").unwrap();
        }
        let mut settings = settings();
        settings.local_podspec_path = Some(local.to_path_buf());

        let pods = vec![
            VersionedPackage::new("FirebaseAuth", None),
            VersionedPackage::new("FirebaseFirestore", None),
            VersionedPackage::new("GTMSessionFetcher", None),
        ];
        let podfile = generate_podfile(&pods, &settings, Platform::Ios, "10.0", LinkageType::Dynamic);

        let local = local.display();
        assert!(podfile.contains(&format!("  pod 'FirebaseAuth', :path => '{}'\n", local)));
        assert!(podfile.contains(&format!("  pod 'Firebase/Firestore', :path => '{}'\n", local)));
        assert!(podfile.contains("  pod 'GTMSessionFetcher'\n"));
        assert!(podfile.contains(&format!(
            "  pod 'FirebaseCore', :path => '{}/FirebaseCore.podspec'\n",
            local
        )));
        assert!(!podfile.contains("FirebaseInstallations.podspec"));
    }

    #[test]
    fn test_versioned_local_podspecs_skip_core_podspecs() {
        let tmp = TempDir::new().unwrap();
        let local = tmp.path();
        std::fs::write(local.join("FirebaseCore.podspec"), "").unwrap();
        let mut settings = settings();
        settings.local_podspec_path = Some(local.to_path_buf());

        let pods = vec![VersionedPackage::new("FirebaseCore", Some("8.0.0".into()))];
        let podfile = generate_podfile(&pods, &settings, Platform::Ios, "10.0", LinkageType::Dynamic);

        assert!(podfile.contains(&format!(
            "  pod 'FirebaseCore', :path => '{}'\n",
            local.display()
        )));
        assert_eq!(podfile.matches("pod 'FirebaseCore'").count(), 1);
        assert!(!podfile.contains("FirebaseCore.podspec"));
    }

    #[test]
    fn test_pod_version_check() {
        assert!(check_pod_version("1.10.1", "1.9.0").is_ok());
        assert!(check_pod_version("1.9.0", "1.9.0").is_ok());

        let err = check_pod_version("1.8.4", "1.9.0").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::UnsupportedPodVersion { .. })
        ));
    }

    #[test]
    fn test_prepare_copies_template_once() {
        let tmp = TempDir::new().unwrap();
        let template = tmp.path().join("Template");
        std::fs::create_dir_all(template.join("FrameworkMaker.xcodeproj")).unwrap();
        std::fs::write(template.join("FrameworkMaker.xcodeproj/project.pbxproj"), "{}").unwrap();
        std::fs::write(template.join("Info.plist"), "<plist/>").unwrap();

        let pods = CocoaPods::new(&template, settings(), "1.9.0", Vec::new());
        let project = tmp.path().join("project-ios");
        pods.prepare(&project).unwrap();
        assert!(project.join("FrameworkMaker.xcodeproj/project.pbxproj").exists());
        assert!(project.join("Info.plist").exists());

        // A second preparation leaves the existing files alone.
        pods.prepare(&project).unwrap();
    }
}
