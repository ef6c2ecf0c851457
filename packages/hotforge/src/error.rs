use thiserror::Error;

use crate::ports::Diagnostic;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The requested unit has no backing source and no cached or library
    /// artifact, or a tracked source disappeared from under its entry.
    #[error("Unit not found: {0}")]
    UnitNotFound(String),

    /// The compiler rejected the assembled batch. The cache was rolled
    /// back to its pre-call state.
    #[error("Compilation failed with {} diagnostic(s)", .diagnostics.len())]
    CompileFailed { diagnostics: Vec<Diagnostic> },

    /// Internal bookkeeping contradiction, e.g. a unit reported fresh
    /// with no cache entry behind it.
    #[error("Inconsistent cache state: {0}")]
    Inconsistent(String),

    #[error("Source read failed for {unit}: {source}")]
    Io {
        unit: String,
        source: std::io::Error,
    },
}

impl EngineError {
    /// Maps a source-read failure, folding not-found into `UnitNotFound`.
    pub(crate) fn from_io(unit: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            EngineError::UnitNotFound(unit.to_string())
        } else {
            EngineError::Io {
                unit: unit.to_string(),
                source: err,
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::UnitNotFound(_) => "not_found",
            EngineError::CompileFailed { .. } => "compile_failed",
            EngineError::Inconsistent(_) => "inconsistent",
            EngineError::Io { .. } => "io",
        }
    }
}
