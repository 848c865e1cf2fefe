//! Package records.
//!
//! A `VersionedPackage` is a request made to the package manager. An
//! `InstalledPackage` is what the package manager reported back, folded to
//! one record per base package.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::platform::Platform;

/// Separator between a base package and one of its subspecs (`Base/Feature`).
pub const SUBSPEC_SEPARATOR: char = '/';

/// Base package name of a possibly subspec-qualified name.
pub fn base_name(name: &str) -> &str {
    name.split(SUBSPEC_SEPARATOR).next().unwrap_or(name)
}

fn default_platforms() -> BTreeSet<String> {
    ["ios", "macos", "tvos"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// A package requested from the package manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedPackage {
    /// Public name, possibly subspec-qualified.
    pub name: String,

    /// Requested version. `None` lets the package manager pick.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Platforms the package is released for.
    #[serde(default = "default_platforms")]
    pub platforms: BTreeSet<String>,
}

impl VersionedPackage {
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        VersionedPackage {
            name: name.into(),
            version,
            platforms: default_platforms(),
        }
    }

    pub fn with_platforms<I, S>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.platforms = platforms.into_iter().map(Into::into).collect();
        self
    }

    /// Is this package released for `platform`.
    pub fn supports(&self, platform: Platform) -> bool {
        self.platforms.contains(platform.name())
    }
}

impl fmt::Display for VersionedPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{} v{}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}

/// How an installed package gets its binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageKind {
    /// Compiled from source by the toolchain.
    SourceBuilt,
    /// Ships prebuilt frameworks that are copied as-is.
    PrebuiltBinary { frameworks: Vec<PathBuf> },
}

impl PackageKind {
    pub fn is_source(&self) -> bool {
        matches!(self, PackageKind::SourceBuilt)
    }
}

/// Frameworks and libraries a binary must be linked against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkDependencySet {
    pub frameworks: BTreeSet<String>,
    pub libraries: BTreeSet<String>,
}

impl LinkDependencySet {
    pub fn is_empty(&self) -> bool {
        self.frameworks.is_empty() && self.libraries.is_empty()
    }

    /// Remove `name` from both sets. Returns whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let framework = self.frameworks.remove(name);
        let library = self.libraries.remove(name);
        framework || library
    }

    pub fn contains(&self, name: &str) -> bool {
        self.frameworks.contains(name) || self.libraries.contains(name)
    }

    /// Every framework and library name, frameworks first.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.frameworks
            .iter()
            .chain(self.libraries.iter())
            .map(String::as_str)
    }

    pub fn merge(&mut self, other: &LinkDependencySet) {
        self.frameworks.extend(other.frameworks.iter().cloned());
        self.libraries.extend(other.libraries.iter().cloned());
    }
}

/// Result of link synthesis for one package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesizedLinks {
    /// The package's own system frameworks and libraries, package names removed.
    pub direct: LinkDependencySet,
    /// `direct` merged with every dependency package's transitive set.
    pub transitive: LinkDependencySet,
}

/// Memoization state of link synthesis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LinkState {
    #[default]
    Pending,
    InProgress,
    Synthesized(SynthesizedLinks),
}

/// A package installed by the package manager, with all subspecs folded in.
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    /// Base package name.
    pub name: String,
    pub version: String,
    /// Direct dependencies of every installed subspec.
    pub dependencies: BTreeSet<String>,
    /// Where the package's sources or binaries live on disk.
    pub location: PathBuf,
    pub kind: PackageKind,
    pub subspecs: BTreeSet<String>,
    pub link: LinkState,
}

impl InstalledPackage {
    pub fn is_source(&self) -> bool {
        self.kind.is_source()
    }

    /// Subspec-qualified names of everything installed for this package.
    pub fn qualified_subspecs(&self) -> Vec<String> {
        self.subspecs
            .iter()
            .map(|s| format!("{}{}{}", self.name, SUBSPEC_SEPARATOR, s))
            .collect()
    }

    pub fn synthesized(&self) -> Option<&SynthesizedLinks> {
        match &self.link {
            LinkState::Synthesized(links) => Some(links),
            _ => None,
        }
    }
}
