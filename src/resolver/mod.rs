//! Installed package resolution.
//!
//! Reads the lock file the package manager wrote, folds subspecs into their
//! base packages and answers closure queries over the result.

pub mod errors;
pub mod lockfile;
pub mod store;

pub use errors::ResolveError;
pub use lockfile::Lockfile;
pub use store::{DependencyGraph, PackageStore, LOCKFILE_NAME};
