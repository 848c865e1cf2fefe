//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};
use clap_complete::Shell as CompletionShell;
use podzip::core::Platform;
use podzip::util::config::CONFIG_FILE;
use podzip::util::shell::ColorChoice;

/// podzip - builds binary framework releases from CocoaPods packages
#[derive(Parser)]
#[command(name = "podzip")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Coloring: auto, always, never
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Path to the configuration file
    #[arg(long, global = true, env = "PODZIP_CONFIG", default_value = CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a list of pods into Frameworks.zip
    Build(BuildArgs),

    /// Build, assemble and package a full release
    Release(ReleaseArgs),

    /// Display the dependency tree of a Podfile.lock
    Tree(TreeArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Options shared by every run that builds frameworks.
#[derive(Args)]
pub struct CommonArgs {
    /// Directory containing the FrameworkMaker project template
    #[arg(long)]
    pub template_dir: PathBuf,

    /// Build podspecs from this directory instead of published versions
    #[arg(long)]
    pub local_podspec_path: Option<PathBuf>,

    /// Root directory for build artifacts (a temporary directory by default)
    #[arg(long)]
    pub build_root: Option<PathBuf>,

    /// Directory to write the zip files and build logs to
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Platforms to build for (all by default)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub platforms: Vec<Platform>,

    /// Build dynamic frameworks instead of static ones
    #[arg(long)]
    pub dynamic: bool,

    /// Build the Mac Catalyst slice
    #[arg(long)]
    pub include_catalyst: bool,

    /// Build arm64 simulator and macOS slices
    #[arg(long)]
    pub apple_silicon: bool,

    /// Compile each architecture separately and merge with lipo
    #[arg(long)]
    pub split_architectures: bool,

    /// Private spec repos searched before the CocoaPods CDN
    #[arg(long, num_args = 1..)]
    pub custom_spec_repos: Vec<String>,

    /// Run `pod repo update` before building
    #[arg(long)]
    pub update_pod_repo: bool,

    /// Minimum supported iOS version
    #[arg(long, default_value = "10.0")]
    pub minimum_ios_version: String,

    /// Minimum supported macOS version
    #[arg(long, default_value = "10.12")]
    pub minimum_macos_version: String,

    /// Minimum supported tvOS version
    #[arg(long, default_value = "10.0")]
    pub minimum_tvos_version: String,

    /// Minimum supported watchOS version
    #[arg(long, default_value = "6.0")]
    pub minimum_watchos_version: String,

    /// Keep the build root after finishing
    #[arg(long)]
    pub keep_build_artifacts: bool,
}

#[derive(Args)]
#[command(group(ArgGroup::new("pod_list").required(true).args(["pods", "zip_pods"])))]
pub struct BuildArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Pods to build
    #[arg(long, num_args = 1..)]
    pub pods: Vec<String>,

    /// JSON file listing the pods (with optional versions) to build
    #[arg(long)]
    pub zip_pods: Option<PathBuf>,

    /// Also build every dependency of the listed pods (default)
    #[arg(long, overrides_with = "no_build_dependencies")]
    pub build_dependencies: bool,

    /// Only build the listed pods
    #[arg(long, requires = "pod_list")]
    pub no_build_dependencies: bool,
}

impl BuildArgs {
    pub fn include_dependencies(&self) -> bool {
        !self.no_build_dependencies
    }
}

#[derive(Args)]
pub struct ReleaseArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Release manifest listing the version and packages
    pub manifest: PathBuf,
}

#[derive(Args)]
pub struct TreeArgs {
    /// Lock file to read
    #[arg(default_value = "Podfile.lock")]
    pub lockfile: PathBuf,

    /// Maximum depth to display
    #[arg(short, long)]
    pub depth: Option<usize>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: CompletionShell,
}
