//! Test fixtures for common test scenarios.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::core::{InstalledPackage, LinkState, PackageKind};
use crate::resolver::store::{fold_subspecs, install_path};
use crate::resolver::{Lockfile, PackageStore};

/// A `Podfile.lock` for FirebaseCore and its dependencies.
pub const FIREBASE_CORE_LOCK: &str = r#"PODS:
  - FirebaseCore (8.0.0):
    - FirebaseCoreDiagnostics (~> 8.0)
    - GoogleUtilities/Environment (~> 7.4)
    - GoogleUtilities/Logger (~> 7.4)
  - FirebaseCoreDiagnostics (8.0.0):
    - GoogleDataTransport (~> 9.0)
    - GoogleUtilities/Environment (~> 7.4)
    - GoogleUtilities/Logger (~> 7.4)
    - nanopb (~> 2.30908.0)
  - GoogleDataTransport (9.0.0):
    - nanopb (~> 2.30908.0)
    - PromisesObjC (< 3.0, >= 1.2)
  - GoogleUtilities/Environment (7.4.1):
    - PromisesObjC (< 3.0, >= 1.2)
  - "GoogleUtilities/Logger (7.4.1)":
    - GoogleUtilities/Environment
    - GoogleUtilities/Logger
  - nanopb (2.30908.0):
    - nanopb/decode (= 2.30908.0)
    - nanopb/encode (= 2.30908.0)
  - nanopb/decode (2.30908.0)
  - nanopb/encode (2.30908.0)
  - PromisesObjC (1.2.12)

DEPENDENCIES:
  - FirebaseAnalytics (8.0.0)
  - FirebaseCore
"#;

/// A store of source packages at version 1.0.0 with the given direct dependencies.
pub fn store_from_deps(packages: &[(&str, &[&str])]) -> PackageStore {
    let mut store = PackageStore::new();
    for (name, deps) in packages {
        store.insert(InstalledPackage {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            dependencies: deps.iter().map(|d| d.to_string()).collect::<BTreeSet<_>>(),
            location: PathBuf::from("/Pods").join(name),
            kind: PackageKind::SourceBuilt,
            subspecs: BTreeSet::new(),
            link: LinkState::Pending,
        });
    }
    store
}

/// Lay out `Pods/<name>` for every package of a lock file, as `pod install` would.
///
/// Packages listed in `binaries` get a prebuilt `Frameworks/<name>.framework`.
pub fn write_installed_project(project_dir: &Path, lock: &Lockfile, binaries: &[&str]) {
    let folded = fold_subspecs(lock, &["abseil".to_string()]).unwrap();
    for name in folded.keys() {
        let location = install_path(project_dir, name);
        std::fs::create_dir_all(location.join("Sources")).unwrap();
        std::fs::write(location.join("Sources").join(format!("{}.m", name)), "").unwrap();

        if binaries.contains(&name.as_str()) {
            let framework = location
                .join("Frameworks")
                .join(format!("{}.framework", name));
            std::fs::create_dir_all(&framework).unwrap();
            std::fs::write(framework.join(name), "binary").unwrap();
        }
    }
}
