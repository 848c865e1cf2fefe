//! Resolution error types and diagnostics.

use std::path::PathBuf;

use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// Error while reading what the package manager installed.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("different installed versions for `{package}`: {version} versus {previous}")]
    SubspecVersionConflict {
        package: String,
        version: String,
        previous: String,
    },

    #[error("multi-layered subspecs are not supported: `{name}`")]
    NestedSubspec { name: String },

    #[error("directory for `{package}` doesn't exist at {}", path.display())]
    MissingInstall { package: String, path: PathBuf },

    #[error("package not found: `{package}`")]
    PackageNotFound { package: String, required_by: String },

    #[error("cycle detected while synthesizing link dependencies")]
    CycleDetected { packages: Vec<String> },
}

impl ResolveError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ResolveError::SubspecVersionConflict {
                package,
                version,
                previous,
            } => Diagnostic::error(format!("subspecs of `{}` resolved to different versions", package))
                .with_context(format!("found {} after {}", version, previous))
                .with_suggestion(suggestions::SUBSPEC_CONFLICT),

            ResolveError::NestedSubspec { name } => {
                Diagnostic::error(format!("`{}` nests subspecs more than one level deep", name))
                    .with_suggestion(
                        "Add the base package to `packages.unfolded_bases` in podzip.toml",
                    )
            }

            ResolveError::MissingInstall { package, path } => {
                Diagnostic::error(format!("`{}` was locked but not installed", package))
                    .with_location(path)
                    .with_suggestion("Pass `--local-podspec-path` if the package is built from a local podspec")
            }

            ResolveError::PackageNotFound {
                package,
                required_by,
            } => Diagnostic::error(format!("could not find package `{}`", package))
                .with_context(format!("required by `{}`", required_by))
                .with_suggestion(suggestions::PACKAGE_NOT_FOUND),

            ResolveError::CycleDetected { packages } => {
                Diagnostic::error("cycle detected while synthesizing link dependencies")
                    .with_context(format!("cycle: {}", packages.join(" -> ")))
                    .with_suggestion(
                        "Break the cycle by removing or restructuring dependencies".to_string(),
                    )
            }
        }
    }
}
