//! High-level operations.
//!
//! This module contains the implementation of podzip commands.

pub mod assemble;
pub mod carthage;
pub mod release;
pub mod zip_build;

pub use assemble::{Assembler, Assembly, AssemblyInput, ManifestEntry};
pub use carthage::{CarthagePackager, ProductOutcome};
pub use release::{build_frameworks_zip, release, ReleaseArtifacts, ReleaseManifest};
pub use zip_build::{BuildOptions, BuildOutput, BuildPaths, ZipBuilder};
