//! Shared stubs and fixtures for engine integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hotforge::{
    Artifact, ArtifactLookup, CompilerService, Diagnostic, FsSourceLocator, RefreshHook,
};
use tempfile::TempDir;

/// Compiler stub that records every batch it receives and produces a
/// `String` artifact of the form `"<name>|<text>"` per unit. Can be
/// switched into a failing mode to exercise rollback paths.
pub struct TrackingCompiler {
    calls: AtomicUsize,
    batches: Mutex<Vec<Vec<String>>>,
    failing: AtomicBool,
    delay_ms: AtomicUsize,
}

impl TrackingCompiler {
    pub fn new() -> Self {
        TrackingCompiler {
            calls: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            delay_ms: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Sorted unit names of every batch, in invocation order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn last_batch(&self) -> Vec<String> {
        self.batches
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no batch was compiled")
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Slows every compile invocation down, widening race windows in
    /// concurrency tests.
    pub fn set_delay_ms(&self, millis: usize) {
        self.delay_ms.store(millis, Ordering::SeqCst);
    }
}

impl CompilerService for TrackingCompiler {
    fn compile(
        &self,
        sources: &HashMap<String, String>,
    ) -> Result<HashMap<String, Artifact>, Vec<Diagnostic>> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay as u64));
        }
        let mut names: Vec<String> = sources.keys().cloned().collect();
        names.sort();
        self.batches.lock().unwrap().push(names);
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            let unit = sources.keys().next().cloned().unwrap_or_default();
            return Err(vec![Diagnostic::error(unit, "deliberate test failure")]);
        }
        Ok(sources
            .iter()
            .map(|(name, text)| (name.clone(), Artifact::new(format!("{name}|{text}"))))
            .collect())
    }
}

/// Fallback stub backed by a plain map.
#[derive(Default)]
pub struct MapFallback {
    artifacts: Mutex<HashMap<String, Artifact>>,
}

impl MapFallback {
    pub fn new() -> Self {
        MapFallback::default()
    }

    pub fn insert(&self, unit: impl Into<String>, artifact: Artifact) {
        self.artifacts.lock().unwrap().insert(unit.into(), artifact);
    }
}

impl ArtifactLookup for MapFallback {
    fn lookup(&self, unit: &str) -> Option<Artifact> {
        self.artifacts.lock().unwrap().get(unit).cloned()
    }
}

/// Refresh hook stub that counts notifications.
#[derive(Default)]
pub struct CountingRefresh {
    calls: AtomicUsize,
}

impl CountingRefresh {
    pub fn new() -> Self {
        CountingRefresh::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RefreshHook for CountingRefresh {
    fn refresh(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Temporary source tree with a `.java` locator rooted at it.
pub struct Workspace {
    _dir: TempDir,
    pub locator: Arc<FsSourceLocator>,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp workspace");
        let locator = Arc::new(FsSourceLocator::new(dir.path(), "java"));
        Workspace { _dir: dir, locator }
    }

    pub fn write(&self, unit: &str, text: &str) {
        let path = self.locator.source_path(unit);
        fs::create_dir_all(path.parent().expect("unit path has a parent"))
            .expect("create source dir");
        fs::write(&path, text).expect("write source");
    }

    /// Rewrites a source with short sleeps on both sides so its timestamp
    /// lands strictly between the surrounding publications.
    pub fn edit(&self, unit: &str, text: &str) {
        std::thread::sleep(Duration::from_millis(10));
        self.write(unit, text);
        std::thread::sleep(Duration::from_millis(10));
    }

    pub fn delete(&self, unit: &str) {
        fs::remove_file(self.locator.source_path(unit)).expect("delete source");
    }
}

/// Extracts the `String` payload a [`TrackingCompiler`] artifact carries.
pub fn payload(artifact: &Artifact) -> String {
    artifact
        .downcast_ref::<String>()
        .expect("artifact carries a string payload")
        .clone()
}

/// Routes engine logs to the test output. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
