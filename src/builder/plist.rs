//! `Info.plist` generation for assembled frameworks.

use std::path::Path;

use anyhow::{Context, Result};
use plist::{Dictionary, Value};

use crate::util::config::BundleConfig;

/// Metadata describing one framework bundle.
#[derive(Debug, Clone)]
pub struct FrameworkInfo<'a> {
    pub name: &'a str,
    pub version: &'a str,
    pub minimum_os: &'a str,
}

impl FrameworkInfo<'_> {
    /// The plist dictionary for this framework.
    pub fn to_dictionary(&self, bundle: &BundleConfig) -> Dictionary {
        // Prerelease suffixes aren't valid bundle versions.
        let version = self.version.split('-').next().unwrap_or(self.version);

        let mut dict = Dictionary::new();
        let mut set = |key: &str, value: String| {
            dict.insert(key.to_string(), Value::String(value));
        };
        set(
            "CFBundleIdentifier",
            format!("{}{}", bundle.identifier_prefix, self.name),
        );
        set("CFBundleInfoDictionaryVersion", "6.0".to_string());
        set("CFBundlePackageType", "FMWK".to_string());
        set("CFBundleVersion", version.to_string());
        set("CFBundleShortVersionString", version.to_string());
        set("MinimumOSVersion", self.minimum_os.to_string());
        set("DTSDKName", bundle.sdk_name.clone());
        set("CFBundleExecutable", self.name.to_string());
        set("CFBundleName", self.name.to_string());
        dict
    }

    /// Write `Info.plist` into a framework directory.
    pub fn write(&self, bundle: &BundleConfig, framework_dir: &Path) -> Result<()> {
        let path = framework_dir.join("Info.plist");
        Value::Dictionary(self.to_dictionary(bundle))
            .to_file_xml(&path)
            .with_context(|| format!("could not write {}", path.display()))
    }
}
