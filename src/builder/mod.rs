//! Building packages into frameworks and xcframeworks.
//!
//! - [`cocoapods`] installs packages into a throwaway Xcode project
//! - [`modulemap`] synthesizes link dependencies for static frameworks
//! - [`framework`] compiles every slice and regroups them per target platform
//! - [`xcframework`] combines the per-platform frameworks into one container

pub mod cocoapods;
pub mod errors;
pub mod framework;
pub mod modulemap;
pub mod plist;
pub mod resources;
pub mod toolchain;
pub mod xcframework;

pub use cocoapods::{CocoaPods, InstallRequest, LinkageType, PackageInstaller, PodfileSettings};
pub use errors::BuildError;
pub use framework::{CompiledFramework, FrameworkBuilder};
pub use modulemap::{LinkSynthesizer, ModuleMapContents};
pub use toolchain::{BuildChannel, Toolchain, Xcode};
