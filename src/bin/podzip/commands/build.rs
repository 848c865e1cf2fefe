//! `podzip build` command

use anyhow::{Context as _, Result};

use super::{platform_config, Context, Session};
use crate::cli::BuildArgs;
use podzip::builder::Xcode;
use podzip::core::VersionedPackage;
use podzip::ops::{build_frameworks_zip, BuildOptions, ZipBuilder};
use podzip::util::fs::read_to_string;

pub fn execute(args: BuildArgs, ctx: &Context) -> Result<()> {
    let pods = requested_pods(&args)?;
    let platforms = platform_config(&args.common)?;
    let session = Session::prepare(&args.common, ctx, None)?;
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
    let zip = build_frameworks_zip(
        &builder,
        &pods,
        BuildOptions {
            dynamic: args.common.dynamic,
            include_carthage: false,
            include_dependencies: args.include_dependencies(),
        },
        session.output_dir.as_deref(),
    )?;
    span.finish_with_message(format!("build, zip written to {}", zip.display()));

    println!("{}", zip.display());
    Ok(())
}

fn requested_pods(args: &BuildArgs) -> Result<Vec<VersionedPackage>> {
    if let Some(path) = &args.zip_pods {
        let contents = read_to_string(path)?;
        return serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse pod list: {}", path.display()));
    }
    Ok(args
        .pods
        .iter()
        .map(|name| VersionedPackage::new(name, None))
        .collect())
}
