//! podzip - builds binary framework distributions from CocoaPods packages
//!
//! This crate provides the library behind the `podzip` binary: lock-file
//! resolution, framework and xcframework builds, and assembly of the zip
//! and Carthage release distributions.

pub mod builder;
pub mod core;
pub mod ops;
pub mod resolver;
pub mod util;

/// Test utilities and mocks for podzip unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides mock implementations of the package
/// installer and the Xcode toolchain.
#[cfg(test)]
pub mod test_support;

pub use core::{InstalledPackage, Platform, PlatformConfig, VersionedPackage};
pub use resolver::PackageStore;
pub use util::config::Config;
