//! Collaborator seams toward the host process.
//!
//! The engine owns staleness, batch assembly and cache publication; the
//! host supplies the actual compiler, an optional lookup for precompiled
//! library units, and an optional callback fired after each published
//! batch.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;

/// Severity of a compiler diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// One message produced by the compiler service for a rejected batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Unit the message refers to, when the compiler can attribute it.
    pub unit: Option<String>,
    pub line: Option<u32>,
    pub message: String,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn error(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic {
            unit: Some(unit.into()),
            line: None,
            message: message.into(),
            severity: Severity::Error,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        if let Some(unit) = &self.unit {
            write!(f, " ({unit}")?;
            if let Some(line) = self.line {
                write!(f, ":{line}")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// Source-to-artifact compiler, invoked with one assembled batch.
///
/// All or nothing: on success the returned map holds an artifact for every
/// submitted unit (it may also hold extra entries for nested units the
/// compiler discovered inside a source); on failure nothing was produced
/// and the diagnostics describe why.
pub trait CompilerService: Send + Sync {
    fn compile(
        &self,
        sources: &HashMap<String, String>,
    ) -> Result<HashMap<String, Artifact>, Vec<Diagnostic>>;
}

/// Read-only lookup consulted for units that have no source on disk
/// (precompiled/library units).
pub trait ArtifactLookup: Send + Sync {
    fn lookup(&self, unit: &str) -> Option<Artifact>;
}

/// Host callback fired after a batch is published. Best-effort single
/// notification per batch; the engine never fires it while a previous
/// notification is still running.
pub trait RefreshHook: Send + Sync {
    fn refresh(&self);
}

/// Fallback that never finds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFallback;

impl ArtifactLookup for NoFallback {
    fn lookup(&self, _unit: &str) -> Option<Artifact> {
        None
    }
}

/// Refresh hook that ignores notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRefresh;

impl RefreshHook for NoRefresh {
    fn refresh(&self) {}
}
