//! Packaging the Carthage binary channel.
//!
//! Every product folder of the assembled Carthage distribution becomes one
//! zip named after a hash of its contents, and the product's binary-project
//! JSON manifest gains an entry pointing at it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use url::Url;

use crate::builder::plist::FrameworkInfo;
use crate::util::archive::{zip_dir, ArchiveLayout};
use crate::util::config::Config;
use crate::util::fs::{copy_item, ensure_dir, file_name, is_dir, list_dir, read_to_string, write_string};
use crate::util::hash::sha256_dir_contents;
use crate::util::shell::{Shell, Status};

use super::assemble::NOTICES_FILE;

/// Template file standing in for the anchor's library inside the shim framework.
pub const DUMMY_LIB: &str = "dummy_Firebase_lib";

/// Length of the hash prefix in zip names.
const HASH_PREFIX_LEN: usize = 16;

/// Release versions mapped to download URLs.
pub type CarthageManifest = BTreeMap<String, String>;

/// Result of packaging one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductOutcome {
    /// A zip and a manifest were written.
    Packaged { zip: PathBuf, manifest: PathBuf },
    /// The manifest already lists this version.
    AlreadyReleased,
}

pub struct CarthagePackager<'a> {
    pub config: &'a Config,
    pub template_dir: &'a Path,
    /// Minimum OS version written into the shim framework.
    pub minimum_os: &'a str,
    pub shell: Arc<Shell>,
}

impl CarthagePackager<'_> {
    /// Package every product of the assembled `packaged_dir`.
    ///
    /// Output goes to `<parent of packaged_dir>/carthage/<version>`, which is
    /// returned.
    pub fn package(
        &self,
        packaged_dir: &Path,
        version: &str,
    ) -> Result<(PathBuf, BTreeMap<String, ProductOutcome>)> {
        let Some(json_dir) = &self.config.carthage.json_dir else {
            bail!("the Carthage channel needs `carthage.json_dir` to point at the existing manifests");
        };

        let carthage_dir = packaged_dir
            .parent()
            .unwrap_or(packaged_dir)
            .join("carthage");
        let output = carthage_dir.join(version);
        ensure_dir(&output)?;

        let mut outcomes = BTreeMap::new();
        for product_dir in list_dir(packaged_dir)? {
            if !is_dir(&product_dir) {
                continue;
            }
            let product = file_name(&product_dir);
            let outcome = self
                .package_product(&product, &product_dir, packaged_dir, json_dir, version, &output)
                .with_context(|| format!("could not package {} for Carthage", product))?;
            outcomes.insert(product, outcome);
        }

        self.shell.status(
            Status::Packaged,
            format!("Carthage release at {}", output.display()),
        );
        Ok((carthage_dir, outcomes))
    }

    fn package_product(
        &self,
        product: &str,
        product_dir: &Path,
        packaged_dir: &Path,
        json_dir: &Path,
        version: &str,
        output: &Path,
    ) -> Result<ProductOutcome> {
        let mut manifest = parse_manifest(&json_dir.join(manifest_file_name(product)))?;

        if self.config.carthage.version_check && manifest.contains_key(version) {
            self.shell.status(
                Status::Skipped,
                format!("Carthage release for {} {} already exists", product, version),
            );
            return Ok(ProductOutcome::AlreadyReleased);
        }

        // The bundling product carries the anchor module.
        if product == self.config.packages.bundling {
            self.create_shim_framework(version, product_dir, packaged_dir)?;
            copy_item(
                &packaged_dir.join(NOTICES_FILE),
                &product_dir.join("FirebaseCore.xcframework").join(NOTICES_FILE),
            )
            .context("could not copy NOTICES into FirebaseCore")?;
        }

        let hash = sha256_dir_contents(product_dir)?;
        let zip_name = format!("{}-{}.zip", product, &hash[..HASH_PREFIX_LEN.min(hash.len())]);
        let zip = output.join(&zip_name);
        zip_dir(product_dir, &zip, ArchiveLayout::ContentsOnly)?;

        let url = download_url(&self.config.carthage.url_base, version, &zip_name)?;
        manifest.insert(version.to_string(), url.to_string());

        let manifest_path = output.join(manifest_file_name(product));
        write_string(&manifest_path, &render_manifest(&manifest)?)?;
        tracing::info!("wrote Carthage manifest for {}", product);

        Ok(ProductOutcome::Packaged {
            zip,
            manifest: manifest_path,
        })
    }

    /// A headers-and-module-map framework so `import Firebase` keeps working.
    fn create_shim_framework(&self, version: &str, dest: &Path, root: &Path) -> Result<()> {
        let anchor = &self.config.packages.anchor;
        let framework_dir = dest.join(format!("{}.framework", anchor));
        let header = format!("{}.h", anchor);

        copy_item(&root.join(&header), &framework_dir.join("Headers").join(&header))
            .context("could not copy the umbrella header into the shim framework")?;

        let module_map = format!(
            "framework module {} {{\n  header \"{}\"\n  export *\n}}",
            anchor, header
        );
        write_string(&framework_dir.join("Modules").join("module.modulemap"), &module_map)?;

        copy_item(&self.template_dir.join(DUMMY_LIB), &framework_dir.join(anchor))
            .context("could not copy the dummy library into the shim framework")?;

        FrameworkInfo {
            name: anchor,
            version,
            minimum_os: self.minimum_os,
        }
        .write(&self.config.bundle, &framework_dir)
    }
}

/// Name of a product's manifest file.
pub fn manifest_file_name(product: &str) -> String {
    let name = match product {
        "GoogleSignIn" => "FirebaseGoogleSignIn",
        "Google-Mobile-Ads-SDK" => "FirebaseAdMob",
        other => other,
    };
    format!("{}Binary.json", name)
}

/// Read an existing manifest. The file has to exist.
pub fn parse_manifest(path: &Path) -> Result<CarthageManifest> {
    if !path.is_file() {
        bail!("could not find the JSON manifest at {}", path.display());
    }
    let contents = read_to_string(path)?;
    serde_json::from_str(&contents)
        .with_context(|| format!("could not parse the JSON manifest at {}", path.display()))
}

/// Render a manifest with sorted keys and unescaped slashes.
pub fn render_manifest(manifest: &CarthageManifest) -> Result<String> {
    let json =
        serde_json::to_string_pretty(manifest).context("could not serialize the JSON manifest")?;
    Ok(json + "\n")
}

fn download_url(base: &str, version: &str, zip_name: &str) -> Result<Url> {
    let base = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{}/", base)
    };
    Url::parse(&base)
        .and_then(|base| base.join(&format!("{}/{}", version, zip_name)))
        .with_context(|| format!("invalid Carthage url base: {}", base))
}
