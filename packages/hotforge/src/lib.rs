//! Hotforge - Incremental Recompilation Engine
//!
//! Keeps compiled units synchronized with their sources inside a running
//! host process. Resolving a unit checks recorded dependency edges for
//! staleness, assembles the minimal batch of sources affected by a change
//! (forward dependencies plus reverse dependents), compiles it through a
//! pluggable [`CompilerService`] and publishes the results atomically.
//!
//! ## Architecture
//!
//! - Unit cache with bidirectional dependency edges (`cache`)
//! - Conservative textual reference extraction (`extract`)
//! - Staleness resolution over recorded edges (`scope`)
//! - Batch assembly with cascade and rollback ledger (`batch`)
//! - Per-container serialized orchestration (`engine`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hotforge::{FsSourceLocator, ReloadEngine};
//!
//! let locator = Arc::new(FsSourceLocator::new("/srv/app/src", "java"));
//! let engine = ReloadEngine::new(locator, Arc::new(MyCompiler::new()));
//!
//! // First access compiles; later accesses are cache hits until a
//! // source (or anything it depends on) changes.
//! let artifact = engine.resolve("com.sample.Service")?;
//!
//! // Editing com/sample/Service.java on disk makes the next resolve of
//! // the unit, or of anything depending on it, recompile the affected
//! // set in one batch.
//! let artifact = engine.resolve("com.sample.Service")?;
//! ```

// Public modules
pub mod artifact;
pub mod cache;
pub mod engine;
pub mod error;
pub mod extract;
pub mod ports;
pub mod scope;
pub mod source;

// Batch assembly is an engine implementation detail.
mod batch;

// Re-exports
pub use artifact::Artifact;
pub use cache::{CacheStats, CompiledUnit, UnitCache};
pub use engine::ReloadEngine;
pub use error::{EngineError, Result};
pub use extract::referenced_units;
pub use ports::{
    ArtifactLookup, CompilerService, Diagnostic, NoFallback, NoRefresh, RefreshHook, Severity,
};
pub use scope::CompileScope;
pub use source::{group_of, FsSourceLocator, MemorySourceLocator, SourceLocator};
