//! Resolution orchestrator: per-container serialization, staleness
//! checks, compiler invocation, publication and rollback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::artifact::Artifact;
use crate::batch::SourceBatch;
use crate::cache::UnitCache;
use crate::error::{EngineError, Result};
use crate::ports::{ArtifactLookup, CompilerService, NoFallback, NoRefresh, RefreshHook};
use crate::scope::CompileScope;
use crate::source::SourceLocator;

/// Container portion of a unit name. Nested names (`Outer$Inner`,
/// `Outer$Inner$Deeper`) compile through their outermost unit.
fn container_of(full_name: &str) -> &str {
    full_name
        .split_once('$')
        .map_or(full_name, |(container, _)| container)
}

/// Keeps compiled units synchronized with their sources.
///
/// One engine value owns the unit cache and the per-container lock
/// registry; collaborators are injected at construction. All methods take
/// `&self`, so a single engine is shared freely across threads.
pub struct ReloadEngine {
    cache: UnitCache,
    locator: Arc<dyn SourceLocator>,
    compiler: Arc<dyn CompilerService>,
    fallback: Arc<dyn ArtifactLookup>,
    refresh: Arc<dyn RefreshHook>,
    /// Per-container locks, created on first use and never removed.
    locks: DashMap<String, Arc<Mutex<()>>>,
    refreshing: AtomicBool,
}

impl ReloadEngine {
    pub fn new(locator: Arc<dyn SourceLocator>, compiler: Arc<dyn CompilerService>) -> Self {
        ReloadEngine {
            cache: UnitCache::new(),
            locator,
            compiler,
            fallback: Arc::new(NoFallback),
            refresh: Arc::new(NoRefresh),
            locks: DashMap::new(),
            refreshing: AtomicBool::new(false),
        }
    }

    /// Installs a lookup consulted for units that have no source
    /// (precompiled/library units).
    pub fn with_fallback(mut self, fallback: Arc<dyn ArtifactLookup>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Installs the host callback fired after each published batch.
    pub fn with_refresh(mut self, refresh: Arc<dyn RefreshHook>) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn cache(&self) -> &UnitCache {
        &self.cache
    }

    /// Drops every compiled unit; subsequent resolutions behave as first
    /// access.
    pub fn reset(&self) {
        info!("Clearing compiled-unit cache ({} entries)", self.cache.len());
        self.cache.clear();
    }

    /// Returns an up-to-date artifact for `full_name`, recompiling its
    /// container and everything affected by the change first if needed.
    ///
    /// Only one resolution per container runs at a time; unrelated
    /// containers proceed in parallel. A compile failure leaves the cache
    /// exactly as it was before the call.
    pub fn resolve(&self, full_name: &str) -> Result<Artifact> {
        let container = container_of(full_name).to_string();
        let lock = self.locks.entry(container.clone()).or_default().clone();
        let _guard = lock.lock();

        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        // Units without a source are externally supplied; delegate.
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        if !self.locator.exists(&container) {
            debug!("No source for {}, delegating to fallback lookup", container);
            return self
                .fallback
                .lookup(full_name)
                .ok_or_else(|| EngineError::UnitNotFound(full_name.to_string()));
        }

        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        // Staleness check over recorded edges.
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        let mut scope = CompileScope::new(&self.cache, self.locator.as_ref(), &container);
        if !scope.compilation_needed()? {
            return self
                .cache
                .lookup(full_name)
                .map(|unit| unit.artifact)
                .ok_or_else(|| {
                    EngineError::Inconsistent(format!(
                        "{full_name} reported fresh but has no cache entry"
                    ))
                });
        }
        debug!(
            "Recompiling {}: {} stale unit(s) in scope",
            container,
            scope.stale_units().len()
        );

        self.compile_and_publish(&container, full_name)
    }

    fn compile_and_publish(&self, container: &str, full_name: &str) -> Result<Artifact> {
        let started = Instant::now();
        let text = self.locator.read_source(container)?;

        let mut batch = SourceBatch::new(&self.cache, self.locator.as_ref());
        if let Err(err) = batch.assemble(container, text) {
            warn!(
                "Batch assembly for {} failed ({}), restoring removed entries",
                container,
                err.kind()
            );
            self.cache.restore(batch.take_removed());
            return Err(err);
        }

        debug!(
            "Invoking compiler for {} with a batch of {} unit(s)",
            container,
            batch.sources().len()
        );
        match self.compiler.compile(batch.sources()) {
            Ok(artifacts) => {
                let produced = artifacts.len();
                self.cache
                    .publish(artifacts, batch.edges(), batch.extracted(), batch.removed());
                batch.discard_removed();
                info!(
                    "Published {} compiled unit(s) for {} in {} ms",
                    produced,
                    container,
                    started.elapsed().as_millis()
                );
                self.notify_refresh();
                self.cache
                    .lookup(full_name)
                    .map(|unit| unit.artifact)
                    .ok_or_else(|| EngineError::UnitNotFound(full_name.to_string()))
            }
            Err(diagnostics) => {
                warn!(
                    "Compilation of {} failed with {} diagnostic(s), rolling back",
                    container,
                    diagnostics.len()
                );
                self.cache.restore(batch.take_removed());
                Err(EngineError::CompileFailed { diagnostics })
            }
        }
    }

    /// Fires the refresh hook unless a previous notification is still
    /// running; overlapping requests collapse into that one.
    fn notify_refresh(&self) {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.refresh.refresh();
            self.refreshing.store(false, Ordering::SeqCst);
        } else {
            debug!("Refresh already in progress, skipping notification");
        }
    }
}
