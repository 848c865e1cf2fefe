//! The installed package store.
//!
//! One record per base package, kept in an arena and addressed by name or
//! index. Link synthesis memoizes into the records in place, so the store is
//! passed by `&mut` to the stages that fill it in and by `&` everywhere else.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::core::package::{base_name, SUBSPEC_SEPARATOR};
use crate::core::{InstalledPackage, LinkState, PackageKind, VersionedPackage};
use crate::resolver::errors::ResolveError;
use crate::resolver::lockfile::Lockfile;
use crate::util::fs::{find_dirs_with_extensions, is_dir};

/// Name of the lock file written by `pod install`.
pub const LOCKFILE_NAME: &str = "Podfile.lock";

/// A base package after its subspecs were folded together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldedPackage {
    pub version: String,
    pub dependencies: BTreeSet<String>,
    pub subspecs: BTreeSet<String>,
}

/// Fold subspec entries (`Base/Feature`) into one record per base package.
///
/// Packages in `unfolded_bases` have two-level names but no external
/// dependencies and are recorded as a single unit without subspecs.
pub fn fold_subspecs(
    lock: &Lockfile,
    unfolded_bases: &[String],
) -> Result<BTreeMap<String, FoldedPackage>, ResolveError> {
    let mut folded: BTreeMap<String, FoldedPackage> = BTreeMap::new();

    for (name, entry) in &lock.entries {
        let components: Vec<&str> = name.split(SUBSPEC_SEPARATOR).collect();
        let base = components[0];

        if components.len() == 1 || unfolded_bases.iter().any(|b| b == base) {
            let record = folded.entry(base.to_string()).or_default();
            record.version = entry.version.clone();
            record.dependencies.extend(
                entry
                    .dependencies
                    .iter()
                    .filter(|dep| components.len() == 1 || base_name(dep) != base)
                    .cloned(),
            );
            continue;
        }

        if components.len() > 2 {
            return Err(ResolveError::NestedSubspec { name: name.clone() });
        }

        let record = folded.entry(base.to_string()).or_default();
        if !record.version.is_empty() && record.version != entry.version {
            return Err(ResolveError::SubspecVersionConflict {
                package: base.to_string(),
                version: entry.version.clone(),
                previous: record.version.clone(),
            });
        }
        record.version = entry.version.clone();
        record.subspecs.insert(components[1].to_string());
        record.dependencies.extend(entry.dependencies.iter().cloned());
    }

    Ok(folded)
}

/// Arena of installed packages.
#[derive(Debug, Clone, Default)]
pub struct PackageStore {
    packages: Vec<InstalledPackage>,
    index: HashMap<String, usize>,
}

impl PackageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `Podfile.lock` from a project directory and locate every package.
    pub fn load(
        project_dir: &Path,
        local_podspec_path: Option<&Path>,
        unfolded_bases: &[String],
    ) -> Result<Self> {
        let lock = Lockfile::load(&project_dir.join(LOCKFILE_NAME)).with_context(|| {
            format!(
                "could not get installed package info in {}",
                project_dir.display()
            )
        })?;
        Self::from_lockfile(&lock, project_dir, local_podspec_path, unfolded_bases)
    }

    /// Build the store from a parsed lock file.
    ///
    /// Every package must be installed under `<project>/Pods/<name>` unless a
    /// local podspec directory is given, which is used as the fallback.
    pub fn from_lockfile(
        lock: &Lockfile,
        project_dir: &Path,
        local_podspec_path: Option<&Path>,
        unfolded_bases: &[String],
    ) -> Result<Self> {
        let folded = fold_subspecs(lock, unfolded_bases)?;

        let mut store = PackageStore::new();
        for (name, record) in folded {
            let mut location = install_path(project_dir, &name);
            if !is_dir(&location) {
                location = match local_podspec_path {
                    Some(local) => local.to_path_buf(),
                    None => {
                        return Err(ResolveError::MissingInstall {
                            package: name,
                            path: location,
                        }
                        .into())
                    }
                };
            }

            let kind = detect_kind(&location, local_podspec_path)?;
            store.insert(InstalledPackage {
                name,
                version: record.version,
                dependencies: record.dependencies,
                location,
                kind,
                subspecs: record.subspecs,
                link: LinkState::Pending,
            });
        }

        tracing::debug!("loaded {} installed packages", store.len());
        Ok(store)
    }

    /// Packages as a lock file declares them, without looking for installs.
    pub fn declared(lock: &Lockfile, unfolded_bases: &[String]) -> Result<Self> {
        let mut store = PackageStore::new();
        for (name, record) in fold_subspecs(lock, unfolded_bases)? {
            store.insert(InstalledPackage {
                name,
                version: record.version,
                dependencies: record.dependencies,
                location: PathBuf::new(),
                kind: PackageKind::SourceBuilt,
                subspecs: record.subspecs,
                link: LinkState::Pending,
            });
        }
        Ok(store)
    }

    /// Insert a package, replacing any record with the same name.
    pub fn insert(&mut self, package: InstalledPackage) -> usize {
        if let Some(&idx) = self.index.get(&package.name) {
            self.packages[idx] = package;
            return idx;
        }
        let idx = self.packages.len();
        self.index.insert(package.name.clone(), idx);
        self.packages.push(package);
        idx
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&InstalledPackage> {
        self.index_of(name).map(|idx| &self.packages[idx])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut InstalledPackage> {
        self.index_of(name).map(move |idx| &mut self.packages[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Package names in lexicographic order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.index.keys().cloned().collect();
        names.sort();
        names
    }

    /// Packages in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = &InstalledPackage> {
        let mut packages: Vec<&InstalledPackage> = self.packages.iter().collect();
        packages.sort_by(|a, b| a.name.cmp(&b.name));
        packages.into_iter()
    }

    /// Every name reachable from `seed` through declared dependencies.
    ///
    /// Iterates until an iteration adds no new names, so cycles terminate.
    /// The seed itself is only included if something depends back on it.
    pub fn transitive_dependencies(&self, seed: &str) -> BTreeSet<String> {
        let mut new_deps: BTreeSet<String> = BTreeSet::from([seed.to_string()]);
        let mut found: BTreeSet<String> = BTreeSet::new();

        loop {
            let mut discovered = BTreeSet::new();
            for dep in &new_deps {
                if let Some(package) = self.get(dep) {
                    discovered.extend(package.dependencies.iter().cloned());
                }
            }
            new_deps = discovered.difference(&found).cloned().collect();
            if new_deps.is_empty() {
                break;
            }
            found.extend(new_deps.iter().cloned());
        }

        found
    }

    /// Like [`transitive_dependencies`](Self::transitive_dependencies) with
    /// subspec names collapsed to their base package.
    pub fn transitive_base_dependencies(&self, seed: &str) -> BTreeSet<String> {
        self.transitive_dependencies(seed)
            .iter()
            .map(|dep| base_name(dep).to_string())
            .collect()
    }

    /// The transitive closure with each name pinned to its installed version.
    ///
    /// Subspec-qualified names take the version of their base package.
    pub fn transitive_versioned_dependencies(&self, seed: &str) -> Vec<VersionedPackage> {
        self.transitive_dependencies(seed)
            .into_iter()
            .map(|dep| {
                let version = self
                    .get(&dep)
                    .or_else(|| self.get(base_name(&dep)))
                    .map(|package| package.version.clone());
                VersionedPackage::new(dep, version)
            })
            .collect()
    }

    /// Dependency graph between base packages.
    pub fn dependency_graph(&self) -> DependencyGraph {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();

        for name in self.names() {
            let node = graph.add_node(name.clone());
            nodes.insert(name, node);
        }

        for package in &self.packages {
            let from = nodes[&package.name];
            for dep in &package.dependencies {
                let dep = base_name(dep);
                if dep == package.name {
                    continue;
                }
                if let Some(&to) = nodes.get(dep) {
                    if !graph.contains_edge(from, to) {
                        graph.add_edge(from, to, ());
                    }
                }
            }
        }

        DependencyGraph { graph, nodes }
    }
}

/// Search a package's install location for prebuilt frameworks.
fn detect_kind(location: &Path, local_podspec_path: Option<&Path>) -> Result<PackageKind> {
    if local_podspec_path == Some(location) {
        return Ok(PackageKind::SourceBuilt);
    }

    let frameworks = find_dirs_with_extensions(location, &["framework", "xcframework"])
        .with_context(|| {
            format!(
                "cannot search for framework directories in {}",
                location.display()
            )
        })?;

    if frameworks.is_empty() {
        Ok(PackageKind::SourceBuilt)
    } else {
        Ok(PackageKind::PrebuiltBinary { frameworks })
    }
}

/// Base-package dependency graph used for display.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Packages nothing else depends on, sorted by name.
    pub fn roots(&self) -> Vec<String> {
        let mut roots: Vec<String> = self
            .graph
            .node_indices()
            .filter(|&n| {
                self.graph
                    .neighbors_directed(n, petgraph::Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|n| self.graph[n].clone())
            .collect();
        roots.sort();
        roots
    }

    /// Direct dependencies of a package, sorted by name.
    pub fn deps(&self, name: &str) -> Vec<String> {
        let Some(&node) = self.nodes.get(name) else {
            return Vec::new();
        };
        let mut deps: Vec<String> = self
            .graph
            .neighbors(node)
            .map(|n| self.graph[n].clone())
            .collect();
        deps.sort();
        deps
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

/// Where `pod install` puts a package inside a project.
pub fn install_path(project_dir: &Path, name: &str) -> PathBuf {
    project_dir.join("Pods").join(name)
}
