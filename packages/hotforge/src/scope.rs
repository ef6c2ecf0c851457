//! Staleness resolution over recorded dependency edges.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::cache::UnitCache;
use crate::error::{EngineError, Result};
use crate::source::SourceLocator;

/// Decides whether a unit, or anything in its recorded dependency
/// closure, needs recompilation.
///
/// The walk follows the dependency edges recorded at previous compile
/// time and never re-extracts references; discovery of new references
/// belongs to batch assembly. Each unit is checked once per walk, so
/// dependency cycles terminate.
pub struct CompileScope<'a> {
    cache: &'a UnitCache,
    locator: &'a dyn SourceLocator,
    root: String,
    stale: Vec<String>,
    visited: FxHashSet<String>,
}

impl<'a> CompileScope<'a> {
    pub fn new(cache: &'a UnitCache, locator: &'a dyn SourceLocator, root: &str) -> Self {
        CompileScope {
            cache,
            locator,
            root: root.to_string(),
            stale: Vec::new(),
            visited: FxHashSet::default(),
        }
    }

    /// Walks the closure and reports whether anything in it is stale.
    ///
    /// A unit with no cache entry and no source fails `UnitNotFound`, as
    /// does a cached unit whose source has disappeared: compiling without
    /// a tracked source would publish an inconsistent artifact, so the
    /// vanished source is a hard failure rather than a silent skip.
    pub fn compilation_needed(&mut self) -> Result<bool> {
        let mut queue = VecDeque::new();
        queue.push_back(self.root.clone());

        while let Some(unit) = queue.pop_front() {
            if !self.visited.insert(unit.clone()) {
                continue;
            }
            match self.cache.lookup(&unit) {
                None => {
                    if !self.locator.exists(&unit) {
                        return Err(EngineError::UnitNotFound(unit));
                    }
                    // First access: nothing recorded yet.
                    self.stale.push(unit);
                }
                Some(entry) => {
                    if !self.locator.exists(&unit) {
                        return Err(EngineError::UnitNotFound(unit));
                    }
                    if self.locator.modified_since(&unit, entry.compiled_at) {
                        self.stale.push(unit);
                    }
                    queue.extend(entry.dependencies.iter().cloned());
                }
            }
        }
        Ok(!self.stale.is_empty())
    }

    /// Units found stale, in discovery order. Meaningful after
    /// [`CompileScope::compilation_needed`] returned.
    pub fn stale_units(&self) -> &[String] {
        &self.stale
    }

    /// Every unit the walk examined.
    pub fn visited_units(&self) -> &FxHashSet<String> {
        &self.visited
    }
}
