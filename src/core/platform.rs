//! Platform and architecture model.
//!
//! `Platform` is what a package declares support for, `TargetPlatform` is one
//! SDK a platform is compiled against, and `PlatformConfig` fixes the
//! minimum OS versions and optional slices for a whole run.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An operating system family packages are released for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Macos,
    Tvos,
    Watchos,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Ios,
        Platform::Macos,
        Platform::Tvos,
        Platform::Watchos,
    ];

    /// Name used in Podfiles and release manifests.
    pub fn name(self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Macos => "macos",
            Platform::Tvos => "tvos",
            Platform::Watchos => "watchos",
        }
    }

    fn default_minimum(self) -> &'static str {
        match self {
            Platform::Ios => "10.0",
            Platform::Macos => "10.12",
            Platform::Tvos => "10.0",
            Platform::Watchos => "6.0",
        }
    }

    fn recent_minimum(self) -> &'static str {
        match self {
            Platform::Ios => "14.0",
            Platform::Macos => "11.0",
            Platform::Tvos => "14.0",
            Platform::Watchos => "7.0",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
#[error("unknown platform `{0}` (expected one of ios, macos, tvos, watchos)")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownPlatform(s.to_string()))
    }
}

/// A CPU architecture slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Architecture {
    Arm64,
    Arm64_32,
    Armv7,
    Armv7k,
    I386,
    X86_64,
}

impl Architecture {
    pub fn as_str(self) -> &'static str {
        match self {
            Architecture::Arm64 => "arm64",
            Architecture::Arm64_32 => "arm64_32",
            Architecture::Armv7 => "armv7",
            Architecture::Armv7k => "armv7k",
            Architecture::I386 => "i386",
            Architecture::X86_64 => "x86_64",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One SDK a platform is compiled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetPlatform {
    IosDevice,
    IosSimulator,
    Catalyst,
    MacOs,
    TvosDevice,
    TvosSimulator,
    WatchosDevice,
    WatchosSimulator,
}

impl TargetPlatform {
    /// Short name used for build directories and log files.
    pub fn build_name(self) -> &'static str {
        match self {
            TargetPlatform::IosDevice => "ios-device",
            TargetPlatform::IosSimulator => "ios-simulator",
            TargetPlatform::Catalyst => "catalyst",
            TargetPlatform::MacOs => "macos",
            TargetPlatform::TvosDevice => "tvos-device",
            TargetPlatform::TvosSimulator => "tvos-simulator",
            TargetPlatform::WatchosDevice => "watchos-device",
            TargetPlatform::WatchosSimulator => "watchos-simulator",
        }
    }

    /// The `-sdk` argument for xcodebuild.
    pub fn sdk_name(self) -> &'static str {
        match self {
            TargetPlatform::IosDevice => "iphoneos",
            TargetPlatform::IosSimulator => "iphonesimulator",
            TargetPlatform::Catalyst | TargetPlatform::MacOs => "macosx",
            TargetPlatform::TvosDevice => "appletvos",
            TargetPlatform::TvosSimulator => "appletvsimulator",
            TargetPlatform::WatchosDevice => "watchos",
            TargetPlatform::WatchosSimulator => "watchsimulator",
        }
    }

    /// Directory xcodebuild writes products to under `BUILD_DIR`.
    pub fn build_dir_name(self) -> &'static str {
        match self {
            TargetPlatform::IosDevice => "Release-iphoneos",
            TargetPlatform::IosSimulator => "Release-iphonesimulator",
            TargetPlatform::Catalyst => "Release-maccatalyst",
            TargetPlatform::MacOs => "Release",
            TargetPlatform::TvosDevice => "Release-appletvos",
            TargetPlatform::TvosSimulator => "Release-appletvsimulator",
            TargetPlatform::WatchosDevice => "Release-watchos",
            TargetPlatform::WatchosSimulator => "Release-watchsimulator",
        }
    }

    pub fn platform(self) -> Platform {
        match self {
            TargetPlatform::IosDevice | TargetPlatform::IosSimulator | TargetPlatform::Catalyst => {
                Platform::Ios
            }
            TargetPlatform::MacOs => Platform::Macos,
            TargetPlatform::TvosDevice | TargetPlatform::TvosSimulator => Platform::Tvos,
            TargetPlatform::WatchosDevice | TargetPlatform::WatchosSimulator => Platform::Watchos,
        }
    }

    pub fn is_catalyst(self) -> bool {
        self == TargetPlatform::Catalyst
    }

    pub fn is_simulator(self) -> bool {
        matches!(
            self,
            TargetPlatform::IosSimulator
                | TargetPlatform::TvosSimulator
                | TargetPlatform::WatchosSimulator
        )
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.build_name())
    }
}

/// A single toolchain invocation: one target platform and the architectures
/// compiled together in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceSpec {
    pub target: TargetPlatform,
    pub archs: Vec<Architecture>,
    /// Part of a target platform that is compiled one architecture at a time.
    pub split: bool,
}

impl SliceSpec {
    /// Unique name of this slice, used for its build directory and log file.
    pub fn build_name(&self) -> String {
        if self.split {
            format!("{}-{}", self.target.build_name(), self.archs_string().replace(' ', "-"))
        } else {
            self.target.build_name().to_string()
        }
    }

    pub fn archs_string(&self) -> String {
        self.archs
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Knobs used to construct a [`PlatformConfig`].
#[derive(Debug, Clone, Default)]
pub struct PlatformOptions {
    /// Platforms to build; empty means all.
    pub platforms: Vec<Platform>,
    /// Minimum OS versions overriding the defaults.
    pub minimum_versions: BTreeMap<Platform, String>,
    /// Build the Mac Catalyst slice for iOS.
    pub include_catalyst: bool,
    /// Build arm64 slices for simulators and macOS.
    pub apple_silicon: bool,
    /// Compile each architecture separately and merge them with lipo.
    pub split_architectures: bool,
}

/// Immutable platform settings for one run.
///
/// Built once from the command line and passed by reference to every stage.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    platforms: Vec<Platform>,
    minimum_versions: BTreeMap<Platform, String>,
    include_catalyst: bool,
    apple_silicon: bool,
    include_32bit: bool,
    split_architectures: bool,
}

#[derive(Debug, Error)]
#[error("invalid minimum {platform} version `{version}`")]
pub struct InvalidMinimumVersion {
    pub platform: Platform,
    pub version: String,
}

impl PlatformConfig {
    pub fn new(options: PlatformOptions) -> Result<Self, InvalidMinimumVersion> {
        let mut minimum_versions = BTreeMap::new();
        for platform in Platform::ALL {
            let version = options
                .minimum_versions
                .get(&platform)
                .cloned()
                .unwrap_or_else(|| platform.default_minimum().to_string());
            if major_version(&version).is_none() {
                return Err(InvalidMinimumVersion { platform, version });
            }
            minimum_versions.insert(platform, version);
        }

        // 32-bit iOS slices only make sense below iOS 11.
        let include_32bit = minimum_versions
            .get(&Platform::Ios)
            .and_then(|v| major_version(v))
            .is_some_and(|major| major < 11);

        let platforms = if options.platforms.is_empty() {
            Platform::ALL.to_vec()
        } else {
            let mut platforms = options.platforms;
            platforms.sort();
            platforms.dedup();
            platforms
        };

        Ok(PlatformConfig {
            platforms,
            minimum_versions,
            include_catalyst: options.include_catalyst,
            apple_silicon: options.apple_silicon,
            include_32bit,
            split_architectures: options.split_architectures,
        })
    }

    /// Release builds use recent minimums and let each podspec decide the real floor.
    pub fn recent(options: PlatformOptions) -> Self {
        let minimum_versions = Platform::ALL
            .into_iter()
            .map(|p| (p, p.recent_minimum().to_string()))
            .collect();
        PlatformConfig {
            minimum_versions,
            include_32bit: false,
            ..PlatformConfig::from_defaults(options)
        }
    }

    fn from_defaults(options: PlatformOptions) -> Self {
        let platforms = if options.platforms.is_empty() {
            Platform::ALL.to_vec()
        } else {
            options.platforms
        };
        PlatformConfig {
            platforms,
            minimum_versions: Platform::ALL
                .into_iter()
                .map(|p| (p, p.default_minimum().to_string()))
                .collect(),
            include_catalyst: options.include_catalyst,
            apple_silicon: options.apple_silicon,
            include_32bit: major_version(Platform::Ios.default_minimum())
                .is_some_and(|major| major < 11),
            split_architectures: options.split_architectures,
        }
    }

    /// Platforms selected for this run, in a stable order.
    pub fn platforms(&self) -> &[Platform] {
        &self.platforms
    }

    pub fn minimum_version(&self, platform: Platform) -> &str {
        self.minimum_versions
            .get(&platform)
            .map(String::as_str)
            .unwrap_or_else(|| platform.default_minimum())
    }

    pub fn includes_32bit(&self) -> bool {
        self.include_32bit
    }

    /// Target platforms compiled for `platform`.
    pub fn targets(&self, platform: Platform) -> Vec<TargetPlatform> {
        match platform {
            Platform::Ios => {
                let mut targets = vec![TargetPlatform::IosDevice, TargetPlatform::IosSimulator];
                if self.include_catalyst {
                    targets.push(TargetPlatform::Catalyst);
                }
                targets
            }
            Platform::Macos => vec![TargetPlatform::MacOs],
            Platform::Tvos => vec![TargetPlatform::TvosDevice, TargetPlatform::TvosSimulator],
            Platform::Watchos => vec![
                TargetPlatform::WatchosDevice,
                TargetPlatform::WatchosSimulator,
            ],
        }
    }

    /// Architectures compiled for a target platform.
    pub fn archs(&self, target: TargetPlatform) -> Vec<Architecture> {
        use Architecture::*;

        let mut archs = match target {
            TargetPlatform::IosDevice => vec![Arm64],
            TargetPlatform::TvosDevice => vec![Arm64],
            TargetPlatform::WatchosDevice => vec![Armv7k, Arm64_32],
            TargetPlatform::IosSimulator
            | TargetPlatform::Catalyst
            | TargetPlatform::MacOs
            | TargetPlatform::TvosSimulator
            | TargetPlatform::WatchosSimulator => vec![X86_64],
        };

        if self.include_32bit {
            match target {
                TargetPlatform::IosDevice => archs.push(Armv7),
                TargetPlatform::IosSimulator => archs.push(I386),
                _ => {}
            }
        }

        let runs_on_mac = target.is_simulator()
            || matches!(target, TargetPlatform::Catalyst | TargetPlatform::MacOs);
        if self.apple_silicon && runs_on_mac {
            archs.push(Arm64);
        }

        archs
    }

    /// The toolchain invocations needed for a target platform.
    pub fn slices(&self, target: TargetPlatform) -> Vec<SliceSpec> {
        let archs = self.archs(target);
        if self.split_architectures {
            archs
                .into_iter()
                .map(|arch| SliceSpec {
                    target,
                    archs: vec![arch],
                    split: true,
                })
                .collect()
        } else {
            vec![SliceSpec {
                target,
                archs,
                split: false,
            }]
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig::from_defaults(PlatformOptions::default())
    }
}

/// Leading integer of a dotted version string.
fn major_version(version: &str) -> Option<u32> {
    version.split('.').next()?.trim().parse().ok()
}
