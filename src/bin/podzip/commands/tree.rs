//! `podzip tree` command

use std::collections::HashSet;

use anyhow::{Context as _, Result};

use super::Context;
use crate::cli::TreeArgs;
use podzip::resolver::{DependencyGraph, Lockfile, PackageStore};

pub fn execute(args: TreeArgs, ctx: &Context) -> Result<()> {
    let lock = Lockfile::load(&args.lockfile)?;
    let store = PackageStore::declared(&lock, &ctx.config.packages.unfolded_bases)
        .with_context(|| format!("could not read packages from {}", args.lockfile.display()))?;
    let graph = store.dependency_graph();

    let max_depth = args.depth.unwrap_or(usize::MAX);
    let mut seen = HashSet::new();
    for root in graph.roots() {
        print_tree(&store, &graph, &root, 0, max_depth, &mut seen);
    }

    Ok(())
}

fn print_tree(
    store: &PackageStore,
    graph: &DependencyGraph,
    name: &str,
    depth: usize,
    max_depth: usize,
    seen: &mut HashSet<String>,
) {
    if depth > max_depth {
        return;
    }

    let is_duplicate = !seen.insert(name.to_string());

    let prefix = if depth == 0 {
        String::new()
    } else {
        format!("{}├── ", "│   ".repeat(depth - 1))
    };

    let version = store
        .get(name)
        .map(|p| format!(" v{}", p.version))
        .unwrap_or_default();
    let dup_marker = if is_duplicate { " (*)" } else { "" };

    println!("{}{}{}{}", prefix, name, version, dup_marker);

    // Repeated subtrees are printed once.
    if is_duplicate {
        return;
    }

    for dep in graph.deps(name) {
        print_tree(store, graph, &dep, depth + 1, max_depth, seen);
    }
}
