//! Module maps and link dependency synthesis.
//!
//! Static frameworks don't carry their link dependencies, so each source
//! package is installed on its own with [`LinkageType::ForcedStatic`] and the
//! `OTHER_LDFLAGS` line CocoaPods generates is read back. Flags naming other
//! installed packages are replaced by those packages' own synthesized sets,
//! leaving only system frameworks and libraries.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::builder::cocoapods::{InstallRequest, LinkageType, PackageInstaller, TARGET_NAME};
use crate::core::{
    LinkDependencySet, LinkState, Platform, PlatformConfig, SynthesizedLinks, VersionedPackage,
};
use crate::resolver::{PackageStore, ResolveError};

/// Replaced by the real umbrella header once it is known.
pub const UMBRELLA_PLACEHOLDER: &str = "UMBRELLA_PLACEHOLDER";

const LINKER_FLAGS_KEY: &str = "OTHER_LDFLAGS =";

/// Contents of a framework's `Modules/module.modulemap`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMapContents {
    contents: String,
}

impl ModuleMapContents {
    pub fn new(module: &str, links: &LinkDependencySet) -> Self {
        let mut contents = format!(
            "framework module {} {{\numbrella header \"{}\"\nexport *\nmodule * {{ export * }}\n\n",
            module, UMBRELLA_PLACEHOLDER
        );
        for framework in &links.frameworks {
            contents.push_str(&format!("  link framework \"{}\"\n", framework));
        }
        for library in &links.libraries {
            contents.push_str(&format!("  link \"{}\"\n", library));
        }
        contents.push_str("}\n");
        ModuleMapContents { contents }
    }

    /// Render with the umbrella header filled in.
    pub fn get(&self, umbrella_header: &str) -> String {
        self.contents.replace(UMBRELLA_PLACEHOLDER, umbrella_header)
    }
}

/// Extract frameworks and libraries from the `OTHER_LDFLAGS` line of an xcconfig.
pub fn parse_linker_flags(xcconfig: &str) -> LinkDependencySet {
    let mut links = LinkDependencySet::default();
    let Some(line) = xcconfig
        .lines()
        .find(|line| line.starts_with(LINKER_FLAGS_KEY))
    else {
        return links;
    };

    let mut tokens = line.split(' ').filter(|t| !t.is_empty());
    while let Some(token) = tokens.next() {
        if token == "-framework" {
            if let Some(name) = tokens.next() {
                links.frameworks.insert(unquote(name).to_string());
            }
        } else if let Some(name) = token.strip_prefix("-l") {
            let name = unquote(name);
            if !name.is_empty() {
                links.libraries.insert(name.to_string());
            }
        }
    }
    links
}

fn unquote(name: &str) -> &str {
    name.trim_matches('"')
}

/// Where CocoaPods writes the release xcconfig of the generated target.
pub fn xcconfig_path(project_dir: &Path) -> PathBuf {
    let target = format!("Pods-{}", TARGET_NAME);
    project_dir
        .join("Pods")
        .join("Target Support Files")
        .join(&target)
        .join(format!("{}.release.xcconfig", target))
}

/// Fills in [`LinkState::Synthesized`] for the source packages of a store.
pub struct LinkSynthesizer<'a> {
    installer: &'a dyn PackageInstaller,
    project_dir: PathBuf,
    platform: Platform,
    platforms: &'a PlatformConfig,
    anchor: &'a str,
}

impl<'a> LinkSynthesizer<'a> {
    /// `project_dir` is a scratch project reused for every isolated install.
    pub fn new(
        installer: &'a dyn PackageInstaller,
        project_dir: impl Into<PathBuf>,
        platform: Platform,
        platforms: &'a PlatformConfig,
        anchor: &'a str,
    ) -> Self {
        LinkSynthesizer {
            installer,
            project_dir: project_dir.into(),
            platform,
            platforms,
            anchor,
        }
    }

    /// Synthesize every source package except the anchor.
    pub fn build(&self, store: &mut PackageStore) -> Result<()> {
        self.installer.prepare(&self.project_dir)?;

        for name in store.names() {
            let Some(package) = store.get(&name) else { continue };
            if !package.is_source() || package.synthesized().is_some() || name == self.anchor {
                continue;
            }
            self.synthesize(store, &name)?;
        }
        Ok(())
    }

    /// Transitive link dependencies of one package, memoized in the store.
    pub fn synthesize(&self, store: &mut PackageStore, name: &str) -> Result<LinkDependencySet> {
        let mut chain = Vec::new();
        self.synthesize_inner(store, name, &mut chain)
    }

    fn synthesize_inner(
        &self,
        store: &mut PackageStore,
        name: &str,
        chain: &mut Vec<String>,
    ) -> Result<LinkDependencySet> {
        let package = store
            .get_mut(name)
            .ok_or_else(|| ResolveError::PackageNotFound {
                package: name.to_string(),
                required_by: chain.last().cloned().unwrap_or_default(),
            })?;

        match &package.link {
            LinkState::Synthesized(links) => return Ok(links.transitive.clone()),
            LinkState::InProgress => {
                let mut packages = chain.clone();
                packages.push(name.to_string());
                return Err(ResolveError::CycleDetected { packages }.into());
            }
            LinkState::Pending => package.link = LinkState::InProgress,
        }

        // Pinned to the installed version, like the dependencies.
        let version = Some(package.version.clone());
        let mut pods: Vec<VersionedPackage> = if package.subspecs.is_empty() {
            vec![VersionedPackage::new(package.name.clone(), version)]
        } else {
            package
                .qualified_subspecs()
                .into_iter()
                .map(|subspec| VersionedPackage::new(subspec, version.clone()))
                .collect()
        };
        pods.extend(store.transitive_versioned_dependencies(name));

        chain.push(name.to_string());
        let outcome = self.link_package(store, name, &pods, chain);
        chain.pop();

        let Some(package) = store.get_mut(name) else {
            return outcome.map(|links| links.transitive);
        };
        match outcome {
            Ok(links) => {
                let transitive = links.transitive.clone();
                package.link = LinkState::Synthesized(links);
                Ok(transitive)
            }
            Err(e) => {
                // Back to pending so a retry isn't reported as a cycle.
                package.link = LinkState::Pending;
                Err(e)
            }
        }
    }

    /// Install `pods` in isolation and fold the linker flags of `name`.
    fn link_package(
        &self,
        store: &mut PackageStore,
        name: &str,
        pods: &[VersionedPackage],
        chain: &mut Vec<String>,
    ) -> Result<SynthesizedLinks> {
        tracing::debug!("synthesizing link dependencies of {}", name);
        self.installer.install(&InstallRequest {
            pods,
            project_dir: &self.project_dir,
            platform: self.platform,
            platforms: self.platforms,
            linkage: LinkageType::ForcedStatic,
        })?;

        let xcconfig = xcconfig_path(&self.project_dir);
        let flags = std::fs::read_to_string(&xcconfig).with_context(|| {
            format!(
                "could not read the linker flags of {} at {}",
                name,
                xcconfig.display()
            )
        })?;
        let parsed = parse_linker_flags(&flags);

        let mut direct = parsed.clone();
        let mut transitive = LinkDependencySet::default();
        for dep in parsed.names() {
            if !store.contains(dep) {
                continue;
            }
            direct.remove(dep);
            if dep == name {
                continue;
            }
            let dep_links = self.synthesize_inner(store, dep, chain)?;
            transitive.merge(&dep_links);
        }
        transitive.merge(&direct);

        Ok(SynthesizedLinks { direct, transitive })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixtures::store_from_deps;
    use crate::test_support::MockInstaller;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_linker_flags() {
        let links = parse_linker_flags(
            "GCC_PREPROCESSOR_DEFINITIONS = $(inherited) COCOAPODS=1\n\
             OTHER_LDFLAGS = -framework Foo -framework P -lbar\n",
        );
        assert_eq!(links.frameworks, set(&["Foo", "P"]));
        assert_eq!(links.libraries, set(&["bar"]));
    }

    #[test]
    fn test_parse_quoted_linker_flags() {
        let links = parse_linker_flags(
            r#"OTHER_LDFLAGS = $(inherited) -ObjC -l"c++" -l"z" -framework "FirebaseCore" -framework "Security""#,
        );
        assert_eq!(links.frameworks, set(&["FirebaseCore", "Security"]));
        assert_eq!(links.libraries, set(&["c++", "z"]));
    }

    #[test]
    fn test_parse_without_flags_line() {
        assert!(parse_linker_flags("OTHER_CFLAGS = -Wall\n").is_empty());
    }

    #[test]
    fn test_module_map_contents() {
        let links = LinkDependencySet {
            frameworks: set(&["Security", "Foundation"]),
            libraries: set(&["z", "c++"]),
        };
        let map = ModuleMapContents::new("FirebaseCore", &links);

        assert_eq!(
            map.get("FirebaseCore-umbrella.h"),
            "framework module FirebaseCore {\n\
             umbrella header \"FirebaseCore-umbrella.h\"\n\
             export *\n\
             module * { export * }\n\n\
             \x20 link framework \"Foundation\"\n\
             \x20 link framework \"Security\"\n\
             \x20 link \"c++\"\n\
             \x20 link \"z\"\n\
             }\n"
        );
    }

    #[test]
    fn test_self_link_is_dropped() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_from_deps(&[("P", &[])]);
        let installer = MockInstaller::new().with_flags("P", "-framework Foo -framework P -lbar");
        let platforms = PlatformConfig::default();
        let synth = LinkSynthesizer::new(&installer, tmp.path(), Platform::Ios, &platforms, "Firebase");

        let links = synth.synthesize(&mut store, "P").unwrap();
        assert_eq!(links.frameworks, set(&["Foo"]));
        assert_eq!(links.libraries, set(&["bar"]));

        let stored = store.get("P").unwrap().synthesized().unwrap();
        assert_eq!(stored.direct.frameworks, set(&["Foo"]));
    }

    #[test]
    fn test_synthesis_is_memoized() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_from_deps(&[("P", &[])]);
        let installer = MockInstaller::new().with_flags("P", "-framework Foo");
        let platforms = PlatformConfig::default();
        let synth = LinkSynthesizer::new(&installer, tmp.path(), Platform::Ios, &platforms, "Firebase");

        let first = synth.synthesize(&mut store, "P").unwrap();
        let second = synth.synthesize(&mut store, "P").unwrap();
        assert_eq!(first, second);
        assert_eq!(installer.install_count(), 1);
    }

    #[test]
    fn test_isolated_install_pins_installed_versions() {
        let tmp = TempDir::new().unwrap();
        let mut store =
            store_from_deps(&[("FirebaseAuth", &["FirebaseCore"]), ("FirebaseCore", &[])]);
        store.get_mut("FirebaseAuth").unwrap().version = "8.1.0".to_string();
        let installer = MockInstaller::new();
        let platforms = PlatformConfig::default();
        let synth = LinkSynthesizer::new(&installer, tmp.path(), Platform::Ios, &platforms, "Firebase");

        synth.synthesize(&mut store, "FirebaseAuth").unwrap();

        let requests = installer.requests();
        assert_eq!(
            requests[0],
            vec![
                VersionedPackage::new("FirebaseAuth", Some("8.1.0".into())),
                VersionedPackage::new("FirebaseCore", Some("1.0.0".into())),
            ]
        );
    }

    #[test]
    fn test_failed_install_can_be_retried() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_from_deps(&[("P", &[])]);
        let installer = MockInstaller::new().failing("P");
        let platforms = PlatformConfig::default();
        let synth = LinkSynthesizer::new(&installer, tmp.path(), Platform::Ios, &platforms, "Firebase");

        assert!(synth.synthesize(&mut store, "P").is_err());
        assert_eq!(store.get("P").unwrap().link, LinkState::Pending);

        // The retry fails on the install again, not on a bogus cycle.
        let err = synth.synthesize(&mut store, "P").unwrap_err();
        assert!(err.downcast_ref::<ResolveError>().is_none());
        assert_eq!(installer.install_count(), 2);
    }

    #[test]
    fn test_dependency_sets_are_flattened() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_from_deps(&[
            ("FirebaseAuth", &["FirebaseCore"]),
            ("FirebaseCore", &["GoogleUtilities/Logger"]),
            ("GoogleUtilities", &[]),
        ]);
        let installer = MockInstaller::new()
            .with_flags("FirebaseAuth", "-framework FirebaseCore -framework SafariServices")
            .with_flags("FirebaseCore", "-framework GoogleUtilities -framework Foundation")
            .with_flags("GoogleUtilities", "-framework Security -lz");
        let platforms = PlatformConfig::default();
        let synth = LinkSynthesizer::new(&installer, tmp.path(), Platform::Ios, &platforms, "Firebase");

        synth.build(&mut store).unwrap();

        let auth = store.get("FirebaseAuth").unwrap().synthesized().unwrap();
        assert_eq!(auth.direct.frameworks, set(&["SafariServices"]));
        assert_eq!(
            auth.transitive.frameworks,
            set(&["Foundation", "SafariServices", "Security"])
        );
        assert_eq!(auth.transitive.libraries, set(&["z"]));
        // Each package was installed once.
        assert_eq!(installer.install_count(), 3);
    }

    #[test]
    fn test_cycle_is_detected() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_from_deps(&[("A", &["B"]), ("B", &["A"])]);
        let installer = MockInstaller::new()
            .with_flags("A", "-framework B")
            .with_flags("B", "-framework A");
        let platforms = PlatformConfig::default();
        let synth = LinkSynthesizer::new(&installer, tmp.path(), Platform::Ios, &platforms, "Firebase");

        let err = synth.synthesize(&mut store, "A").unwrap_err();
        match err.downcast_ref::<ResolveError>() {
            Some(ResolveError::CycleDetected { packages }) => {
                assert_eq!(packages, &["A", "B", "A"]);
            }
            other => panic!("expected a cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_binary_packages_and_anchor_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_from_deps(&[("Firebase", &[]), ("P", &[])]);
        store.get_mut("P").unwrap().kind = crate::core::PackageKind::PrebuiltBinary {
            frameworks: vec![PathBuf::from("P.framework")],
        };
        let installer = MockInstaller::new();
        let platforms = PlatformConfig::default();
        let synth = LinkSynthesizer::new(&installer, tmp.path(), Platform::Ios, &platforms, "Firebase");

        synth.build(&mut store).unwrap();
        assert_eq!(installer.install_count(), 0);
        assert!(store.get("Firebase").unwrap().synthesized().is_none());
    }
}
