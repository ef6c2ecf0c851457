//! Batch assembly: the forward dependency closure and the reverse
//! dependent cascade that together decide what one compile submits.

use std::collections::HashMap;
use std::mem;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::cache::{CompiledUnit, UnitCache};
use crate::error::Result;
use crate::extract::referenced_units;
use crate::scope::CompileScope;
use crate::source::SourceLocator;

/// Sources and edges assembled for one compiler invocation.
///
/// Holds the source texts to submit, the dependency edges discovered
/// while assembling them, and the ledger of cache entries speculatively
/// removed by the dependent cascade. The caller either restores the
/// ledger (failed compile) or discards it after the batch supersedes the
/// removed entries.
pub struct SourceBatch<'a> {
    cache: &'a UnitCache,
    locator: &'a dyn SourceLocator,
    sources: HashMap<String, String>,
    /// dependent -> dependencies, as discovered during assembly.
    edges: FxHashMap<String, FxHashSet<String>>,
    /// Units whose source text was scanned for references this batch.
    extracted: FxHashSet<String>,
    removed: HashMap<String, CompiledUnit>,
}

impl<'a> SourceBatch<'a> {
    pub fn new(cache: &'a UnitCache, locator: &'a dyn SourceLocator) -> Self {
        SourceBatch {
            cache,
            locator,
            sources: HashMap::new(),
            edges: FxHashMap::default(),
            extracted: FxHashSet::default(),
            removed: HashMap::new(),
        }
    }

    /// Loads the root source and runs both assembly passes.
    ///
    /// On error the ledger may already hold removed entries; the caller
    /// restores them.
    pub fn assemble(&mut self, root: &str, text: String) -> Result<()> {
        self.sources.insert(root.to_string(), text);
        self.collect_dependencies(root)?;
        self.collect_for_compilation(root)
    }

    pub fn sources(&self) -> &HashMap<String, String> {
        &self.sources
    }

    pub fn edges(&self) -> &FxHashMap<String, FxHashSet<String>> {
        &self.edges
    }

    pub fn extracted(&self) -> &FxHashSet<String> {
        &self.extracted
    }

    pub fn removed(&self) -> &HashMap<String, CompiledUnit> {
        &self.removed
    }

    pub fn take_removed(&mut self) -> HashMap<String, CompiledUnit> {
        mem::take(&mut self.removed)
    }

    /// Forgets the ledger once a published batch has superseded every
    /// removed entry.
    pub fn discard_removed(&mut self) {
        self.removed.clear();
    }

    /// Forward pass: scans a loaded unit's text and recursively pulls
    /// every referenced source into the batch. The sources map doubles as
    /// the visited set, so mutually referencing units terminate.
    fn collect_dependencies(&mut self, unit: &str) -> Result<()> {
        let text = match self.sources.get(unit) {
            Some(text) => text.clone(),
            None => return Ok(()),
        };
        self.extracted.insert(unit.to_string());
        for reference in referenced_units(unit, &text, self.locator) {
            if self.sources.contains_key(&reference) {
                self.add_edge(unit, &reference);
            } else {
                let dep_text = self.locator.read_source(&reference)?;
                self.sources.insert(reference.clone(), dep_text);
                self.add_edge(unit, &reference);
                self.collect_dependencies(&reference)?;
            }
        }
        Ok(())
    }

    /// Reverse driver: cascades from the root unconditionally, then from
    /// every unit the forward pass loaded that is itself stale.
    fn collect_for_compilation(&mut self, root: &str) -> Result<()> {
        self.collect_dependents_of(root)?;
        let loaded: Vec<String> = self.sources.keys().cloned().collect();
        for unit in loaded {
            if unit == root {
                continue;
            }
            let mut scope = CompileScope::new(self.cache, self.locator, &unit);
            if scope.compilation_needed()? {
                self.collect_dependents_of(&unit)?;
            }
        }
        Ok(())
    }

    /// Reverse pass: removes a unit's cache entry (capturing it in the
    /// ledger) and pulls every recorded dependent's current source into
    /// the batch, recursively. A unit already removed, or never cached,
    /// ends the recursion.
    fn collect_dependents_of(&mut self, name: &str) -> Result<()> {
        let entry = match self.cache.remove_for_rebuild(name) {
            Some(entry) => entry,
            None => return Ok(()),
        };
        let dependents: Vec<String> = entry.dependents.iter().cloned().collect();
        self.removed.insert(name.to_string(), entry);
        if !dependents.is_empty() {
            debug!(
                "Cascading recompilation of {} to {} dependent(s)",
                name,
                dependents.len()
            );
        }
        for dependent in dependents {
            let text = self.locator.read_source(&dependent)?;
            self.sources.insert(dependent.clone(), text);
            self.add_edge(&dependent, name);
            self.collect_dependents_of(&dependent)?;
        }
        Ok(())
    }

    fn add_edge(&mut self, dependent: &str, dependency: &str) {
        if dependent != dependency {
            self.edges
                .entry(dependent.to_string())
                .or_default()
                .insert(dependency.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::{Duration, SystemTime};

    use crate::artifact::Artifact;
    use crate::error::EngineError;
    use crate::source::MemorySourceLocator;

    use super::*;

    fn seed_cache(cache: &UnitCache, units: &[&str], edges: &[(&str, &str)]) {
        let artifacts: HashMap<String, Artifact> = units
            .iter()
            .map(|unit| (unit.to_string(), Artifact::new(unit.to_string())))
            .collect();
        let mut edge_map: FxHashMap<String, FxHashSet<String>> = FxHashMap::default();
        for (dependent, dependency) in edges {
            edge_map
                .entry(dependent.to_string())
                .or_default()
                .insert(dependency.to_string());
        }
        let extracted: FxHashSet<String> = units.iter().map(|unit| unit.to_string()).collect();
        cache.publish(artifacts, &edge_map, &extracted, &HashMap::new());
    }

    #[test]
    fn test_forward_pass_pulls_transitive_references() {
        let cache = UnitCache::new();
        let locator = MemorySourceLocator::new();
        locator.insert("a.A", "import b.B;");
        locator.insert("b.B", "import c.C;");
        locator.insert("c.C", "class C {}");

        let mut batch = SourceBatch::new(&cache, &locator);
        batch
            .assemble("a.A", locator.read_source("a.A").unwrap())
            .unwrap();

        let mut loaded: Vec<&str> = batch.sources().keys().map(String::as_str).collect();
        loaded.sort_unstable();
        assert_eq!(loaded, ["a.A", "b.B", "c.C"]);
        assert!(batch.edges()["a.A"].contains("b.B"));
        assert!(batch.edges()["b.B"].contains("c.C"));
        assert!(batch.extracted().contains("b.B"));
    }

    #[test]
    fn test_mutual_references_terminate() {
        let cache = UnitCache::new();
        let locator = MemorySourceLocator::new();
        locator.insert("a.A", "import b.B;");
        locator.insert("b.B", "import a.A;");

        let mut batch = SourceBatch::new(&cache, &locator);
        batch
            .assemble("a.A", locator.read_source("a.A").unwrap())
            .unwrap();

        assert_eq!(batch.sources().len(), 2);
        assert!(batch.edges()["a.A"].contains("b.B"));
        assert!(batch.edges()["b.B"].contains("a.A"));
    }

    #[test]
    fn test_same_group_neighbor_joins_batch() {
        let cache = UnitCache::new();
        let locator = MemorySourceLocator::new();
        locator.insert("a.A", "class A {}");
        locator.insert("a.Neighbor", "class Neighbor {}");

        let mut batch = SourceBatch::new(&cache, &locator);
        batch
            .assemble("a.A", locator.read_source("a.A").unwrap())
            .unwrap();

        assert!(batch.sources().contains_key("a.Neighbor"));
        assert!(batch.edges()["a.A"].contains("a.Neighbor"));
        // No self edge from the implicit group reference.
        assert!(!batch.edges().contains_key("a.Neighbor") || !batch.edges()["a.Neighbor"].contains("a.Neighbor"));
    }

    #[test]
    fn test_reverse_pass_cascades_through_dependents() {
        let cache = UnitCache::new();
        let locator = MemorySourceLocator::new();
        let old = SystemTime::now() - Duration::from_secs(60);
        locator.insert_at("a.A", "import b.B;", old);
        locator.insert_at("b.B", "class B {}", old);
        locator.insert_at("t.Top", "import a.A;", old);
        seed_cache(
            &cache,
            &["a.A", "b.B", "t.Top"],
            &[("a.A", "b.B"), ("t.Top", "a.A")],
        );

        // B goes stale and is resolved directly.
        locator.insert_at("b.B", "class B { int v; }", SystemTime::now() + Duration::from_secs(30));
        let mut batch = SourceBatch::new(&cache, &locator);
        batch
            .assemble("b.B", locator.read_source("b.B").unwrap())
            .unwrap();

        let mut loaded: Vec<&str> = batch.sources().keys().map(String::as_str).collect();
        loaded.sort_unstable();
        assert_eq!(loaded, ["a.A", "b.B", "t.Top"]);

        // Every previously cached unit in the batch was removed and is in
        // the ledger; cascade edges were recorded.
        assert_eq!(batch.removed().len(), 3);
        assert!(!cache.contains("a.A"));
        assert!(batch.edges()["a.A"].contains("b.B"));
        assert!(batch.edges()["t.Top"].contains("a.A"));
        // Pulled dependents are not re-scanned.
        assert!(!batch.extracted().contains("a.A"));
    }

    #[test]
    fn test_stale_forward_dependency_triggers_its_own_cascade() {
        let cache = UnitCache::new();
        let locator = MemorySourceLocator::new();
        let old = SystemTime::now() - Duration::from_secs(60);
        locator.insert_at("a.A", "import b.B;\nimport c.C;", old);
        locator.insert_at("b.B", "class B {}", old);
        locator.insert_at("c.C", "class C {}", old);
        locator.insert_at("o.Other", "import c.C;", old);
        seed_cache(
            &cache,
            &["a.A", "b.B", "c.C", "o.Other"],
            &[("a.A", "b.B"), ("a.A", "c.C"), ("o.Other", "c.C")],
        );

        // C goes stale; resolving A must also sweep in C's other
        // dependent even though it is nowhere near A.
        locator.insert_at("c.C", "class C { int v; }", SystemTime::now() + Duration::from_secs(30));
        let mut batch = SourceBatch::new(&cache, &locator);
        batch
            .assemble("a.A", locator.read_source("a.A").unwrap())
            .unwrap();

        assert!(batch.sources().contains_key("o.Other"));
        assert!(batch.edges()["o.Other"].contains("c.C"));
        assert!(batch.removed().contains_key("c.C"));
        assert!(batch.removed().contains_key("o.Other"));
    }

    #[test]
    fn test_vanished_dependent_source_aborts_assembly() {
        let cache = UnitCache::new();
        let locator = MemorySourceLocator::new();
        let old = SystemTime::now() - Duration::from_secs(60);
        locator.insert_at("a.A", "class A {}", old);
        locator.insert_at("t.Top", "import a.A;", old);
        seed_cache(&cache, &["a.A", "t.Top"], &[("t.Top", "a.A")]);

        locator.remove("t.Top");
        locator.insert_at("a.A", "class A { int v; }", SystemTime::now() + Duration::from_secs(30));

        let mut batch = SourceBatch::new(&cache, &locator);
        let err = batch
            .assemble("a.A", locator.read_source("a.A").unwrap())
            .unwrap_err();
        assert!(matches!(err, EngineError::UnitNotFound(ref name) if name == "t.Top"));
        // The root's entry is already in the ledger; the engine restores it.
        assert!(batch.removed().contains_key("a.A"));
        assert!(!cache.contains("a.A"));
    }

    #[test]
    fn test_take_removed_empties_ledger() {
        let cache = UnitCache::new();
        let locator = MemorySourceLocator::new();
        locator.insert("a.A", "class A {}");
        seed_cache(&cache, &["a.A"], &[]);

        let mut batch = SourceBatch::new(&cache, &locator);
        batch
            .assemble("a.A", locator.read_source("a.A").unwrap())
            .unwrap();
        assert_eq!(batch.removed().len(), 1);

        let captured = batch.take_removed();
        assert_eq!(captured.len(), 1);
        assert!(batch.removed().is_empty());
    }
}
