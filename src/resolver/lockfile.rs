//! `Podfile.lock` parsing.
//!
//! Only the `PODS:` section is read. Each root entry carries a name and a
//! resolved version; the indented entries below it are its dependencies.
//!
//! ```text
//! PODS:
//!   - FirebaseCore (8.0.0):
//!     - FirebaseCoreDiagnostics (~> 8.0)
//!     - GoogleUtilities/Environment (~> 7.4)
//!   - "GoogleUtilities/Environment (7.4.1)":
//!     - PromisesObjC (~> 1.2)
//!
//! DEPENDENCIES:
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

/// Header of the section that ends the installed package list.
const DEPENDENCIES_HEADER: &str = "DEPENDENCIES:";

// Matches something like `  - GTMSessionFetcher/Full (= 1.3.0)`.
static DEPENDENCY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" - (.+).*").expect("dependency pattern is valid"));

/// One root entry of the lock file, before subspec folding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEntry {
    pub version: String,
    pub dependencies: BTreeSet<String>,
}

/// Raw lock-file contents keyed by (possibly subspec-qualified) name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lockfile {
    pub entries: BTreeMap<String, LockEntry>,
}

impl Lockfile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("could not read lock file {}", path.display()))?;
        Ok(Self::parse(&contents))
    }

    pub fn parse(contents: &str) -> Self {
        let mut entries: BTreeMap<String, LockEntry> = BTreeMap::new();
        let mut current: Option<String> = None;

        for line in contents.lines() {
            if line.starts_with(DEPENDENCIES_HEADER) {
                break;
            }

            if let Some((name, version)) = detect_version(line) {
                entries.insert(
                    name.clone(),
                    LockEntry {
                        version,
                        dependencies: BTreeSet::new(),
                    },
                );
                current = Some(name);
                continue;
            }

            let Some(ref pod) = current else { continue };
            let Some(found) = DEPENDENCY_LINE.find(line) else {
                continue;
            };
            // `found` starts with a space, so the name is the third component.
            let Some(dep) = found.as_str().split(' ').nth(2) else {
                continue;
            };
            let dep = dep.trim_matches('"');
            if dep.is_empty() || dep == pod {
                continue;
            }
            if let Some(entry) = entries.get_mut(pod) {
                entry.dependencies.insert(dep.to_string());
            }
        }

        Lockfile { entries }
    }
}

/// Parse a root entry such as `  - "GoogleUtilities/Logger (7.4.1)":`.
///
/// Root entries have exactly three components. Dependency lines with
/// constraints like `(~> 3.2.1)` have four and are rejected here.
fn detect_version(line: &str) -> Option<(String, String)> {
    let components: Vec<&str> = line.split(' ').filter(|c| !c.is_empty()).collect();
    if components.len() != 3 || components[0] != "-" {
        return None;
    }

    let name = components[1].trim_matches('"').to_string();
    let version = components[2]
        .trim_matches(|c| matches!(c, '(' | ')' | ':' | '"'))
        .to_string();
    Some((name, version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixtures::FIREBASE_CORE_LOCK;

    #[test]
    fn test_detect_version() {
        assert_eq!(
            detect_version("  - FirebaseCore (8.0.0):"),
            Some(("FirebaseCore".to_string(), "8.0.0".to_string()))
        );
        assert_eq!(
            detect_version(r#"  - "GoogleUtilities/Logger (7.4.1)":"#),
            Some(("GoogleUtilities/Logger".to_string(), "7.4.1".to_string()))
        );
        assert_eq!(detect_version("    - PromisesObjC (~> 1.2)"), None);
        assert_eq!(detect_version("PODS:"), None);
    }

    #[test]
    fn test_parse_lockfile() {
        let lock = Lockfile::parse(FIREBASE_CORE_LOCK);

        let core = &lock.entries["FirebaseCore"];
        assert_eq!(core.version, "8.0.0");
        assert!(core.dependencies.contains("FirebaseCoreDiagnostics"));
        assert!(core.dependencies.contains("GoogleUtilities/Environment"));

        let logger = &lock.entries["GoogleUtilities/Logger"];
        assert_eq!(logger.version, "7.4.1");
        // Self references are dropped.
        assert!(!logger.dependencies.contains("GoogleUtilities/Logger"));
        assert!(logger.dependencies.contains("GoogleUtilities/Environment"));

        // Nothing after DEPENDENCIES: is read.
        assert!(!lock.entries.contains_key("FirebaseAnalytics"));
    }

    #[test]
    fn test_parse_empty() {
        assert!(Lockfile::parse("").entries.is_empty());
    }
}
