//! Apple developer toolchain abstraction.
//!
//! Every external build tool the pipeline drives sits behind [`Toolchain`]:
//! `xcodebuild` for slice builds and container creation, `lipo` for merging
//! thin binaries and `ibtool` for storyboards. Tests substitute a mock that
//! fabricates the outputs on disk.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::core::platform::SliceSpec;
use crate::util::process::{find_tool, ProcessBuilder, ProcessOutcome};

/// Name of the generated workspace every package manager install writes.
pub const WORKSPACE_NAME: &str = "FrameworkMaker.xcworkspace";

/// Distribution channel a slice is compiled for.
///
/// Sources can tell the two apart through a preprocessor define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildChannel {
    /// The general `Firebase.zip` archive.
    Zip,
    /// The Carthage binary channel.
    Carthage,
}

impl BuildChannel {
    pub fn cflag(self) -> &'static str {
        match self {
            BuildChannel::Zip => "-DFIREBASE_BUILD_ZIP_FILE",
            BuildChannel::Carthage => "-DFIREBASE_BUILD_CARTHAGE",
        }
    }

    /// Directory name used to keep the channels' intermediate outputs apart.
    pub fn dir_name(self) -> &'static str {
        match self {
            BuildChannel::Zip => "zip",
            BuildChannel::Carthage => "carthage",
        }
    }
}

/// One `xcodebuild` invocation: a scheme compiled for a slice.
#[derive(Debug, Clone)]
pub struct SliceBuild<'a> {
    /// Directory holding the generated workspace.
    pub project_dir: &'a Path,
    pub scheme: &'a str,
    pub slice: &'a SliceSpec,
    pub build_dir: &'a Path,
    pub channel: BuildChannel,
}

impl SliceBuild<'_> {
    /// Full `xcodebuild` argument list.
    pub fn args(&self) -> Vec<String> {
        let archs = self.slice.archs_string();
        let workspace = self.project_dir.join(WORKSPACE_NAME);
        let catalyst = self.slice.target.is_catalyst();

        let mut args = vec![
            "build".to_string(),
            "-configuration".to_string(),
            "release".to_string(),
            "-workspace".to_string(),
            workspace.display().to_string(),
            "-scheme".to_string(),
            self.scheme.to_string(),
            "GCC_GENERATE_DEBUGGING_SYMBOLS=NO".to_string(),
            format!("ARCHS={}", archs),
            format!("VALID_ARCHS={}", archs),
            "ONLY_ACTIVE_ARCH=NO".to_string(),
            // Required for ABI stable Swift interfaces.
            "BUILD_LIBRARY_FOR_DISTRIBUTION=YES".to_string(),
            format!("SUPPORTS_MACCATALYST={}", if catalyst { "YES" } else { "NO" }),
            format!("BUILD_DIR={}", self.build_dir.display()),
            "-sdk".to_string(),
            self.slice.target.sdk_name().to_string(),
            format!("OTHER_CFLAGS=$(value) {}", self.channel.cflag()),
        ];
        if catalyst {
            args.push("CODE_SIGN_IDENTITY=-".to_string());
        }
        args
    }
}

/// Interface to the external build tools.
pub trait Toolchain: Send + Sync {
    /// Compile one slice. The outcome is returned whatever the exit status
    /// so the caller can persist the log before judging it.
    fn build_slice(&self, build: &SliceBuild<'_>) -> Result<ProcessOutcome>;

    /// Combine per-platform frameworks into one multi-platform container.
    fn create_xcframework(&self, frameworks: &[PathBuf], output: &Path) -> Result<()>;

    /// Merge thin binaries of one platform into a fat binary.
    fn lipo_create(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;

    /// Compile a `.storyboard` into a `.storyboardc` bundle.
    fn compile_storyboard(&self, storyboard: &Path, output: &Path) -> Result<()>;
}

/// The toolchain shipped with Xcode.
#[derive(Debug, Clone)]
pub struct Xcode {
    xcodebuild: PathBuf,
    lipo: PathBuf,
    ibtool: PathBuf,
}

impl Xcode {
    /// Locate the Xcode command line tools.
    pub fn detect() -> Self {
        let xcode = Xcode {
            xcodebuild: find_tool("xcodebuild"),
            lipo: find_tool("lipo"),
            ibtool: find_tool("ibtool"),
        };
        tracing::debug!("using xcodebuild at {}", xcode.xcodebuild.display());
        xcode
    }

    fn run(&self, process: ProcessBuilder, what: &str) -> Result<()> {
        tracing::debug!("running {}", process.display_command());
        let outcome = process.exec_captured()?;
        if !outcome.success() {
            bail!(
                "{} failed with exit code {:?}\n{}",
                what,
                outcome.code,
                outcome.output.trim_end()
            );
        }
        Ok(())
    }
}

impl Toolchain for Xcode {
    fn build_slice(&self, build: &SliceBuild<'_>) -> Result<ProcessOutcome> {
        let process = ProcessBuilder::new(&self.xcodebuild)
            .args(build.args())
            .cwd(build.project_dir);
        tracing::debug!("running {}", process.display_command());
        process.exec_captured()
    }

    fn create_xcframework(&self, frameworks: &[PathBuf], output: &Path) -> Result<()> {
        let mut process = ProcessBuilder::new(&self.xcodebuild).arg("-create-xcframework");
        for framework in frameworks {
            process = process.arg("-framework").arg(framework);
        }
        process = process.arg("-output").arg(output);
        self.run(
            process,
            &format!("creating {}", output.display()),
        )
    }

    fn lipo_create(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let process = ProcessBuilder::new(&self.lipo)
            .arg("-create")
            .arg("-output")
            .arg(output)
            .args(inputs);
        self.run(process, &format!("merging binaries into {}", output.display()))
    }

    fn compile_storyboard(&self, storyboard: &Path, output: &Path) -> Result<()> {
        let process = ProcessBuilder::new(&self.ibtool)
            .arg("--compile")
            .arg(output)
            .arg(storyboard);
        self.run(process, &format!("compiling {}", storyboard.display()))
    }
}
