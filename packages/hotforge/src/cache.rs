//! Shared store of compiled units and their graph edges.

use std::collections::HashMap;
use std::time::SystemTime;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::warn;

use crate::artifact::Artifact;

/// One cached compilation result with its recorded graph edges.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub name: String,
    pub artifact: Artifact,
    /// Publication stamp, compared against source mtimes for staleness.
    pub compiled_at: SystemTime,
    /// Units this unit's source referenced when last compiled.
    pub dependencies: FxHashSet<String>,
    /// Units whose last compilation referenced this unit.
    pub dependents: FxHashSet<String>,
}

impl CompiledUnit {
    fn new(name: String, artifact: Artifact, compiled_at: SystemTime) -> Self {
        CompiledUnit {
            name,
            artifact,
            compiled_at,
            dependencies: FxHashSet::default(),
            dependents: FxHashSet::default(),
        }
    }
}

/// Cache shape counters, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub units: usize,
    pub dependency_edges: usize,
    pub dependent_edges: usize,
}

/// Concurrency-safe mapping of unit name to [`CompiledUnit`].
///
/// Every mutation runs under one write lock, so a published batch becomes
/// visible to readers all at once or not at all. Unrelated resolutions
/// mutate the store concurrently; the per-container serialization lives in
/// the engine, not here.
#[derive(Debug, Default)]
pub struct UnitCache {
    store: RwLock<FxHashMap<String, CompiledUnit>>,
}

impl UnitCache {
    pub fn new() -> Self {
        UnitCache::default()
    }

    /// Cloned snapshot of one entry.
    pub fn lookup(&self, name: &str) -> Option<CompiledUnit> {
        self.store.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.store.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }

    /// Drops every entry. The next resolution recompiles from sources.
    pub fn clear(&self) {
        self.store.write().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let store = self.store.read();
        let mut stats = CacheStats {
            units: store.len(),
            dependency_edges: 0,
            dependent_edges: 0,
        };
        for unit in store.values() {
            stats.dependency_edges += unit.dependencies.len();
            stats.dependent_edges += unit.dependents.len();
        }
        stats
    }

    /// Removes an entry ahead of its recompilation, returning the captured
    /// state so a failed batch can restore it.
    pub(crate) fn remove_for_rebuild(&self, name: &str) -> Option<CompiledUnit> {
        self.store.write().remove(name)
    }

    /// Puts captured entries back after a failed batch.
    pub(crate) fn restore(&self, entries: impl IntoIterator<Item = (String, CompiledUnit)>) {
        let mut store = self.store.write();
        for (name, unit) in entries {
            store.insert(name, unit);
        }
    }

    /// Publishes one compiled batch atomically.
    ///
    /// Every artifact receives the same publication stamp. Each batch
    /// unit's dependency set becomes the edges recorded during assembly;
    /// a unit that was pulled in by the dependent cascade without being
    /// re-scanned additionally keeps its previously recorded dependencies,
    /// since the cascade alone cannot see them. Dependent edges are then
    /// mirrored from every dependency set, replaced entries keep their
    /// dependents from outside the batch, and reverse edges that a fresh
    /// scan no longer justifies are dropped. `superseded` carries the
    /// prior state of entries removed during assembly.
    pub(crate) fn publish(
        &self,
        artifacts: HashMap<String, Artifact>,
        edges: &FxHashMap<String, FxHashSet<String>>,
        extracted: &FxHashSet<String>,
        superseded: &HashMap<String, CompiledUnit>,
    ) {
        let stamp = SystemTime::now();
        let batch: FxHashSet<String> = artifacts.keys().cloned().collect();
        let mut store = self.store.write();

        // Reverse edges invalidated by a fresh scan: (dependency, dependent).
        let mut obsolete: Vec<(String, String)> = Vec::new();
        // Final dependency sets of the batch, for mirroring below.
        let mut mirror: Vec<(String, FxHashSet<String>)> = Vec::new();

        for (name, artifact) in artifacts {
            let mut fresh = CompiledUnit::new(name.clone(), artifact, stamp);
            if let Some(recorded) = edges.get(&name) {
                fresh.dependencies = recorded.clone();
            }

            let prior = store
                .remove(&name)
                .or_else(|| superseded.get(&name).cloned());
            if let Some(prior) = prior {
                // Batch units re-declare their own edges below; only
                // dependents outside the batch survive the replacement.
                fresh.dependents = prior
                    .dependents
                    .into_iter()
                    .filter(|dependent| !batch.contains(dependent))
                    .collect();
                if extracted.contains(&name) {
                    for old_dep in &prior.dependencies {
                        if !fresh.dependencies.contains(old_dep) {
                            obsolete.push((old_dep.clone(), name.clone()));
                        }
                    }
                } else {
                    fresh.dependencies.extend(prior.dependencies);
                }
            }

            mirror.push((name.clone(), fresh.dependencies.clone()));
            store.insert(name, fresh);
        }

        for (dependent, dependencies) in &mirror {
            for dependency in dependencies {
                match store.get_mut(dependency) {
                    Some(entry) => {
                        entry.dependents.insert(dependent.clone());
                    }
                    None => {
                        warn!(
                            "Dependency {} of {} has no cache entry after publication",
                            dependency, dependent
                        );
                    }
                }
            }
        }
        for (dependency, dependent) in obsolete {
            if let Some(entry) = store.get_mut(&dependency) {
                entry.dependents.remove(&dependent);
            }
        }
    }
}
