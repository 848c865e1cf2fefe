//! Core data structures for podzip.
//!
//! - Platforms, target SDKs and architectures
//! - Requested and installed packages

pub mod package;
pub mod platform;

pub use package::{
    InstalledPackage, LinkDependencySet, LinkState, PackageKind, SynthesizedLinks,
    VersionedPackage,
};
pub use platform::{Architecture, Platform, PlatformConfig, PlatformOptions, TargetPlatform};
