//! Test utilities and mocks for podzip unit tests.
//!
//! The mocks stand in for the two external tools the pipeline drives:
//! CocoaPods and the Xcode toolchain. Both write plausible outputs to disk
//! so the real filesystem code downstream can run unchanged.
//!
//! # Example
//!
//! ```rust,ignore
//! use podzip::test_support::{MockInstaller, MockToolchain};
//!
//! #[test]
//! fn test_example() {
//!     let installer = MockInstaller::new().with_flags("FirebaseCore", "-framework Foundation");
//!     let toolchain = MockToolchain::new().failing("FirebaseAuth");
//!
//!     // Use mocks in tests...
//! }
//! ```

pub mod fixtures;

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;

use crate::builder::cocoapods::{InstallRequest, PackageInstaller};
use crate::builder::modulemap::xcconfig_path;
use crate::builder::toolchain::{SliceBuild, Toolchain};
use crate::core::package::base_name;
use crate::core::VersionedPackage;
use crate::resolver::store::install_path;
use crate::resolver::{Lockfile, PackageStore, LOCKFILE_NAME};
use crate::util::fs::{copy_item, ensure_dir, file_name, write_string};
use crate::util::process::ProcessOutcome;

// Re-export fixtures for convenience
pub use fixtures::*;

/// Mock package installer.
///
/// Every install writes the xcconfig CocoaPods would generate, with the
/// linker flags registered for the first requested package. With a lock
/// file configured it also lays out `Pods/` and returns the parsed store.
#[derive(Debug, Default)]
pub struct MockInstaller {
    flags: HashMap<String, String>,
    lock: Option<(String, Vec<String>)>,
    files: Vec<(String, String, String)>,
    failing: BTreeSet<String>,
    installs: Mutex<Vec<Vec<VersionedPackage>>>,
    cache_cleans: Mutex<usize>,
}

impl MockInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Linker flags reported when `package` is installed first.
    pub fn with_flags(mut self, package: &str, flags: &str) -> Self {
        self.flags.insert(package.to_string(), flags.to_string());
        self
    }

    /// Lock file written by every install; `binaries` ship prebuilt frameworks.
    pub fn with_lock(mut self, lock: &str, binaries: &[&str]) -> Self {
        self.lock = Some((
            lock.to_string(),
            binaries.iter().map(|b| b.to_string()).collect(),
        ));
        self
    }

    /// Extra file written to `Pods/<package>/<path>` on every install.
    pub fn with_file(mut self, package: &str, path: &str, contents: &str) -> Self {
        self.files
            .push((package.to_string(), path.to_string(), contents.to_string()));
        self
    }

    /// Fail every install whose first requested package is `package`.
    pub fn failing(mut self, package: &str) -> Self {
        self.failing.insert(package.to_string());
        self
    }

    /// Number of install calls so far.
    pub fn install_count(&self) -> usize {
        self.installs.lock().map(|i| i.len()).unwrap_or(0)
    }

    /// Requested package names of every install call.
    pub fn installs(&self) -> Vec<Vec<String>> {
        self.requests()
            .into_iter()
            .map(|pods| pods.into_iter().map(|p| p.name).collect())
            .collect()
    }

    /// Full requests, versions included, of every install call.
    pub fn requests(&self) -> Vec<Vec<VersionedPackage>> {
        self.installs.lock().map(|i| i.clone()).unwrap_or_default()
    }

    pub fn cache_cleans(&self) -> usize {
        self.cache_cleans.lock().map(|c| *c).unwrap_or(0)
    }
}

impl PackageInstaller for MockInstaller {
    fn prepare(&self, project_dir: &Path) -> Result<()> {
        ensure_dir(project_dir)
    }

    fn install(&self, request: &InstallRequest<'_>) -> Result<PackageStore> {
        let first = request
            .pods
            .first()
            .map(|p| base_name(&p.name).to_string())
            .unwrap_or_default();
        if let Ok(mut installs) = self.installs.lock() {
            installs.push(request.pods.to_vec());
        }
        if self.failing.contains(&first) {
            anyhow::bail!("pod install failed for {}", first);
        }

        let flags = self.flags.get(&first).map(String::as_str).unwrap_or("");
        write_string(
            &xcconfig_path(request.project_dir),
            &format!(
                "FRAMEWORK_SEARCH_PATHS = $(inherited)\nOTHER_LDFLAGS = $(inherited) -ObjC {}\n",
                flags
            ),
        )?;

        let Some((lock, binaries)) = &self.lock else {
            return Ok(PackageStore::new());
        };
        write_string(&request.project_dir.join(LOCKFILE_NAME), lock)?;
        let parsed = Lockfile::parse(lock);
        let binaries: Vec<&str> = binaries.iter().map(String::as_str).collect();
        write_installed_project(request.project_dir, &parsed, &binaries);
        for (package, path, contents) in &self.files {
            write_string(
                &install_path(request.project_dir, package).join(path),
                contents,
            )?;
        }
        PackageStore::load(request.project_dir, None, &["abseil".to_string()])
    }

    fn clean_cache(&self) -> Result<()> {
        if let Ok(mut cleans) = self.cache_cleans.lock() {
            *cleans += 1;
        }
        Ok(())
    }
}

/// Mock Xcode toolchain.
///
/// Slice builds fabricate the framework xcodebuild would produce. Container
/// creation copies the input frameworks into the output directory.
#[derive(Debug, Default)]
pub struct MockToolchain {
    failing: BTreeSet<String>,
    swift: BTreeSet<String>,
    resources: BTreeSet<String>,
    commands: Mutex<Vec<String>>,
}

impl MockToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slice builds of `scheme` fail.
    pub fn failing(mut self, scheme: &str) -> Self {
        self.failing.insert(scheme.to_string());
        self
    }

    /// Slices of `scheme` carry a Swift module.
    pub fn with_swift_module(mut self, scheme: &str) -> Self {
        self.swift.insert(scheme.to_string());
        self
    }

    /// Builds of `scheme` also produce a resource bundle.
    pub fn with_resources(mut self, scheme: &str) -> Self {
        self.resources.insert(scheme.to_string());
        self
    }

    /// Every command run so far.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, command: String) {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command);
        }
    }
}

impl Toolchain for MockToolchain {
    fn build_slice(&self, build: &SliceBuild<'_>) -> Result<ProcessOutcome> {
        let scheme = build.scheme;
        let archs = build.slice.archs_string();
        self.record(format!(
            "xcodebuild -scheme {} -sdk {} ARCHS={}",
            scheme,
            build.slice.target.sdk_name(),
            archs
        ));

        if self.failing.contains(scheme) {
            return Ok(ProcessOutcome {
                code: Some(65),
                output: format!("error: {} does not compile\n** BUILD FAILED **\n", scheme),
            });
        }

        let products = build
            .build_dir
            .join(build.slice.target.build_dir_name())
            .join(scheme);
        let framework = products.join(format!("{}.framework", scheme));
        write_string(&framework.join(scheme), &format!("{} {}\n", scheme, archs))?;
        write_string(
            &framework.join("Headers").join(format!("{}-umbrella.h", scheme)),
            "#import <Foundation/Foundation.h>\n",
        )?;
        write_string(
            &framework.join("Headers").join(format!("{}.h", scheme)),
            "#import <Foundation/Foundation.h>\n",
        )?;

        let modules = framework.join("Modules");
        if self.swift.contains(scheme) {
            for arch in &build.slice.archs {
                write_string(
                    &modules
                        .join(format!("{}.swiftmodule", scheme))
                        .join(format!("{}.swiftinterface", arch)),
                    "// swift-interface-format-version: 1.0\n",
                )?;
            }
        } else {
            write_string(
                &modules.join("module.modulemap"),
                &format!("framework module {} {{}}\n", scheme),
            )?;
        }

        if self.resources.contains(scheme) {
            write_string(
                &products
                    .join(format!("{}Resources.bundle", scheme))
                    .join("strings.json"),
                "{}",
            )?;
        }

        Ok(ProcessOutcome {
            code: Some(0),
            output: "** BUILD SUCCEEDED **\n".to_string(),
        })
    }

    fn create_xcframework(&self, frameworks: &[PathBuf], output: &Path) -> Result<()> {
        self.record(format!(
            "xcodebuild -create-xcframework {} -output {}",
            frameworks.len(),
            output.display()
        ));
        ensure_dir(output)?;
        for (i, framework) in frameworks.iter().enumerate() {
            copy_item(
                framework,
                &output.join(format!("slice-{}", i)).join(file_name(framework)),
            )?;
        }
        write_string(&output.join("Info.plist"), "<plist/>")
    }

    fn lipo_create(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        self.record(format!("lipo -create {} -output {}", inputs.len(), output.display()));
        let mut merged = String::new();
        for input in inputs {
            merged.push_str(&std::fs::read_to_string(input)?);
        }
        write_string(output, &merged)
    }

    fn compile_storyboard(&self, storyboard: &Path, output: &Path) -> Result<()> {
        self.record(format!(
            "ibtool --compile {} {}",
            output.display(),
            storyboard.display()
        ));
        ensure_dir(output)
    }
}
