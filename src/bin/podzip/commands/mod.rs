//! Command implementations

pub mod build;
pub mod completions;
pub mod release;
pub mod tree;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use tempfile::TempDir;

use crate::cli::CommonArgs;
use podzip::builder::{CocoaPods, PodfileSettings};
use podzip::core::{Platform, PlatformConfig, PlatformOptions};
use podzip::ops::BuildPaths;
use podzip::util::config::Config;
use podzip::util::fs::{ensure_dir, is_dir};
use podzip::util::shell::{Shell, Status};

/// State shared by every command.
pub struct Context {
    pub config: Config,
    pub shell: Arc<Shell>,
}

/// Directories and tools for one build run.
pub struct Session {
    pub paths: BuildPaths,
    pub installer: CocoaPods,
    pub output_dir: Option<PathBuf>,
    /// Removed on drop unless artifacts are kept.
    _scratch: Option<TempDir>,
}

impl Session {
    /// Validate the shared options and set up the build directories.
    ///
    /// `release_version` relaxes Firebase package requirements in the Podfile.
    pub fn prepare(
        common: &CommonArgs,
        ctx: &Context,
        release_version: Option<String>,
    ) -> Result<Self> {
        if !is_dir(&common.template_dir) {
            bail!(
                "`--template-dir` does not exist: {}",
                common.template_dir.display()
            );
        }
        if let Some(local) = &common.local_podspec_path {
            if !is_dir(local) {
                bail!("`--local-podspec-path` does not exist: {}", local.display());
            }
        }

        let mut scratch = None;
        let build_root = match &common.build_root {
            Some(root) => {
                ensure_dir(root)?;
                root.clone()
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("podzip-")
                    .tempdir()
                    .context("could not create a temporary build root")?;
                if common.keep_build_artifacts {
                    dir.keep()
                } else {
                    let path = dir.path().to_path_buf();
                    scratch = Some(dir);
                    path
                }
            }
        };
        tracing::debug!("build root: {}", build_root.display());

        if let Some(output) = &common.output_dir {
            ensure_dir(output)?;
        }
        let logs_dir = common
            .output_dir
            .as_ref()
            .unwrap_or(&build_root)
            .join("build_logs");

        let settings = PodfileSettings {
            custom_spec_repos: common.custom_spec_repos.clone(),
            cdn: ctx.config.pods.cdn.clone(),
            local_podspec_path: common.local_podspec_path.clone(),
            release_version,
            anchor: ctx.config.packages.anchor.clone(),
        };
        let installer = CocoaPods::new(
            &common.template_dir,
            settings,
            &ctx.config.pods.minimum_cocoapods,
            ctx.config.packages.unfolded_bases.clone(),
        );
        if common.update_pod_repo {
            ctx.shell.status(Status::Updating, "CocoaPods spec repos");
            installer.update_repos()?;
        }

        Ok(Session {
            paths: BuildPaths {
                template_dir: common.template_dir.clone(),
                build_root,
                local_podspec_path: common.local_podspec_path.clone(),
                logs_dir,
            },
            installer,
            output_dir: common.output_dir.clone(),
            _scratch: scratch,
        })
    }
}

/// Platform options from the command line.
pub fn platform_options(common: &CommonArgs) -> PlatformOptions {
    let minimum_versions = BTreeMap::from([
        (Platform::Ios, common.minimum_ios_version.clone()),
        (Platform::Macos, common.minimum_macos_version.clone()),
        (Platform::Tvos, common.minimum_tvos_version.clone()),
        (Platform::Watchos, common.minimum_watchos_version.clone()),
    ]);
    PlatformOptions {
        platforms: common.platforms.clone(),
        minimum_versions,
        include_catalyst: common.include_catalyst,
        apple_silicon: common.apple_silicon,
        split_architectures: common.split_architectures,
    }
}

/// Platform settings honoring the minimum version flags.
pub fn platform_config(common: &CommonArgs) -> Result<PlatformConfig> {
    Ok(PlatformConfig::new(platform_options(common))?)
}
