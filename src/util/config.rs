//! Configuration file support for podzip.
//!
//! Tool-wide settings live in `podzip.toml` (or the file passed with
//! `--config`). Every section is optional; missing keys fall back to the
//! values used for Firebase releases.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default configuration file name looked up in the working directory.
pub const CONFIG_FILE: &str = "podzip.toml";

/// podzip configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Packages with special roles during the build and assembly.
    pub packages: PackageRoles,

    /// Metadata written into generated `Info.plist` files.
    pub bundle: BundleConfig,

    /// Secondary distribution channel settings.
    pub carthage: CarthageConfig,

    /// Package manager settings.
    pub pods: PodsConfig,
}

/// Names of packages that the pipeline treats specially.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageRoles {
    /// Package providing the release version, shared header and module map.
    /// It is never compiled itself.
    pub anchor: String,

    /// Package whose closure is assembled into one shared folder first.
    pub bundling: String,

    /// Package rebuilt with the secondary channel's compile flag.
    pub diagnostics: String,

    /// Package always built after every other package.
    pub pinned_last: String,

    /// Packages added to every release although they aren't part of it.
    pub extra: Vec<String>,

    /// Namespaced packages that are never folded into subspecs.
    pub unfolded_bases: Vec<String>,

    /// Released packages that don't require the bundling package.
    pub standalone: Vec<String>,

    /// Packages that ship developer tools next to their frameworks.
    pub tool_carriers: Vec<ToolCarrier>,
}

impl Default for PackageRoles {
    fn default() -> Self {
        PackageRoles {
            anchor: "Firebase".to_string(),
            bundling: "FirebaseAnalytics".to_string(),
            diagnostics: "GoogleUtilities".to_string(),
            pinned_last: "FirebaseAppCheck".to_string(),
            extra: vec!["Google-Mobile-Ads-SDK".to_string(), "GoogleSignIn".to_string()],
            unfolded_bases: vec!["abseil".to_string()],
            standalone: vec!["GoogleSignIn".to_string()],
            tool_carriers: vec![ToolCarrier {
                package: "FirebaseCrashlytics".to_string(),
                files: vec!["upload-symbols".to_string(), "run".to_string()],
            }],
        }
    }
}

/// A package whose install directory carries extra files for the release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCarrier {
    pub package: String,
    pub files: Vec<String>,
}

/// Bundle metadata settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Prefix of `CFBundleIdentifier`; the framework name is appended.
    pub identifier_prefix: String,

    /// Value of `DTSDKName`.
    pub sdk_name: String,
}

impl Default for BundleConfig {
    fn default() -> Self {
        BundleConfig {
            identifier_prefix: "com.firebase.Firebase-".to_string(),
            sdk_name: "iphonesimulator11.2".to_string(),
        }
    }
}

/// Carthage channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CarthageConfig {
    /// Base URL under which `<version>/<zip>` is published.
    pub url_base: String,

    /// Directory containing the existing `<product>Binary.json` manifests.
    pub json_dir: Option<PathBuf>,

    /// Skip products whose manifest already lists the release version.
    pub version_check: bool,
}

impl Default for CarthageConfig {
    fn default() -> Self {
        CarthageConfig {
            url_base: "https://dl.google.com/dl/firebase/ios/carthage/".to_string(),
            json_dir: None,
            version_check: true,
        }
    }
}

/// CocoaPods settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PodsConfig {
    /// Trunk CDN source always appended after custom spec repos.
    pub cdn: String,

    /// Oldest `pod` release supporting static framework linkage.
    pub minimum_cocoapods: String,
}

impl Default for PodsConfig {
    fn default() -> Self {
        PodsConfig {
            cdn: "https://cdn.cocoapods.org/".to_string(),
            minimum_cocoapods: "1.9.0".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Does the product in `folder` need the bundling package to be integrated too.
    pub fn requires_bundling(&self, folder: &str) -> bool {
        folder != self.packages.bundling && !self.packages.standalone.iter().any(|s| s == folder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [packages]
            anchor = "Acme"

            [carthage]
            version_check = false
            "#,
        )
        .unwrap();

        assert_eq!(config.packages.anchor, "Acme");
        assert_eq!(config.packages.bundling, "FirebaseAnalytics");
        assert!(!config.carthage.version_check);
        assert_eq!(config.pods.minimum_cocoapods, "1.9.0");
    }

    #[test]
    fn test_load_or_default_on_malformed_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        std::fs::write(&path, "packages = [").unwrap();

        let config = Config::load_or_default(&path);
        assert_eq!(config.packages.anchor, "Firebase");
    }
}
