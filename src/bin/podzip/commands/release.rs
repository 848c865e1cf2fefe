//! `podzip release` command

use anyhow::Result;

use super::{platform_options, Context, Session};
use crate::cli::ReleaseArgs;
use podzip::builder::Xcode;
use podzip::core::PlatformConfig;
use podzip::ops::{release, ReleaseManifest, ZipBuilder};

pub fn execute(args: ReleaseArgs, ctx: &Context) -> Result<()> {
    let manifest = ReleaseManifest::load(&args.manifest)?;
    // Releases let each podspec decide its real minimum.
    let platforms = PlatformConfig::recent(platform_options(&args.common));
    let session = Session::prepare(&args.common, ctx, Some(manifest.version.clone()))?;
    let toolchain = Xcode::detect();

    let builder = ZipBuilder {
        installer: &session.installer,
        toolchain: &toolchain,
        paths: &session.paths,
        platforms: &platforms,
        config: &ctx.config,
        shell: ctx.shell.clone(),
    };

    let span = ctx.shell.span();
    let artifacts = release(
        &builder,
        &manifest,
        args.common.dynamic,
        session.output_dir.as_deref(),
    )?;
    span.finish_with_message(format!("release {}", artifacts.version));

    println!("{}", artifacts.zip.display());
    println!("{}", artifacts.carthage_dir.display());
    Ok(())
}
