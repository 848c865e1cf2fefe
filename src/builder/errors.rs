//! Build error types and diagnostics.

use std::path::PathBuf;

use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// Error while installing, compiling or packaging a package.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to build `{package}` for {target}")]
    ToolchainFailed {
        package: String,
        target: String,
        code: Option<i32>,
        log: PathBuf,
    },

    #[error("`{command}` failed while installing {packages}")]
    InstallFailed {
        command: String,
        packages: String,
        code: Option<i32>,
        output: String,
    },

    #[error("no umbrella header found for `{framework}` in {}", dir.display())]
    UmbrellaHeader { framework: String, dir: PathBuf },

    #[error("expected build output for `{package}` is missing: {}", path.display())]
    MissingOutput { package: String, path: PathBuf },

    #[error("CocoaPods version must be at least {minimum}, found {found}")]
    UnsupportedPodVersion { minimum: String, found: String },

    #[error("the `{package}` package was not found in the installed packages")]
    MissingAnchor { package: String },
}

impl BuildError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            BuildError::ToolchainFailed {
                package,
                target,
                code,
                log,
            } => {
                let mut diag = Diagnostic::error(format!("failed to build `{}` for {}", package, target))
                    .with_location(log);
                if let Some(code) = code {
                    diag = diag.with_context(format!("xcodebuild exited with code {}", code));
                }
                diag.with_suggestion(suggestions::BUILD_FAILED)
            }

            BuildError::InstallFailed {
                command,
                packages,
                code,
                output,
            } => {
                let mut diag = Diagnostic::error(format!("`{}` failed", command))
                    .with_context(format!("installing {}", packages));
                if let Some(code) = code {
                    diag = diag.with_context(format!("exit code {}", code));
                }
                if !output.trim().is_empty() {
                    diag = diag.with_context(format!("output:\n{}", output.trim_end()));
                }
                diag.with_suggestion(suggestions::INSTALL_FAILED)
            }

            BuildError::UmbrellaHeader { framework, dir } => {
                Diagnostic::error(format!("no umbrella header found for `{}`", framework))
                    .with_location(dir)
                    .with_context("expected exactly one header ending in `umbrella.h`")
            }

            BuildError::MissingOutput { package, path } => Diagnostic::error(format!(
                "build output for `{}` is missing",
                package
            ))
            .with_location(path)
            .with_suggestion(suggestions::BUILD_FAILED),

            BuildError::UnsupportedPodVersion { minimum, found } => Diagnostic::error(format!(
                "CocoaPods {} is too old, at least {} is required",
                found, minimum
            ))
            .with_suggestion("Update CocoaPods: `gem install cocoapods`"),

            BuildError::MissingAnchor { package } => {
                Diagnostic::error(format!("`{}` was not installed", package))
                    .with_context("its version is used for the whole release")
                    .with_suggestion(suggestions::MISSING_ANCHOR)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toolchain_failure_diagnostic() {
        let err = BuildError::ToolchainFailed {
            package: "FirebaseCore".to_string(),
            target: "ios-simulator".to_string(),
            code: Some(65),
            log: PathBuf::from("/tmp/logs/FirebaseCore-ios-simulator.txt"),
        };

        let output = err.to_diagnostic().format(false);
        assert!(output.contains("failed to build `FirebaseCore` for ios-simulator"));
        assert!(output.contains("--> /tmp/logs/FirebaseCore-ios-simulator.txt"));
        assert!(output.contains("exited with code 65"));
    }

    #[test]
    fn test_install_failure_keeps_output() {
        let err = BuildError::InstallFailed {
            command: "pod install".to_string(),
            packages: "FirebaseCore v8.0.0".to_string(),
            code: Some(1),
            output: "[!] Unable to find a specification\n".to_string(),
        };

        let output = err.to_diagnostic().format(false);
        assert!(output.contains("`pod install` failed"));
        assert!(output.contains("Unable to find a specification"));
    }
}
