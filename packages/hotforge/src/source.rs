//! Source discovery: unit names to texts, timestamps and groups.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use walkdir::WalkDir;

use crate::error::{EngineError, Result};

/// Group portion of a dotted unit name. Units without a dot live in the
/// root group `""`.
pub fn group_of(unit: &str) -> &str {
    unit.rsplit_once('.').map_or("", |(group, _)| group)
}

/// Resolves unit names to sources.
///
/// Pure lookup with no caching; the engine re-reads sources for every
/// compile attempt so a resolve always sees the latest text.
pub trait SourceLocator: Send + Sync {
    /// Whether a source exists for `unit`.
    fn exists(&self, unit: &str) -> bool;

    /// Modification time of the backing source. `UnitNotFound` when there
    /// is no source.
    fn last_modified(&self, unit: &str) -> Result<SystemTime>;

    /// Full source text. `UnitNotFound` when there is no source.
    fn read_source(&self, unit: &str) -> Result<String>;

    /// Unit names directly inside a group (non-recursive). Empty when the
    /// group does not exist.
    fn units_in_group(&self, group: &str) -> Vec<String>;

    /// Whether the group exists at all.
    fn group_exists(&self, group: &str) -> bool;

    /// Whether the source exists and is strictly newer than `stamp`.
    fn modified_since(&self, unit: &str, stamp: SystemTime) -> bool {
        match self.last_modified(unit) {
            Ok(mtime) => mtime > stamp,
            Err(_) => false,
        }
    }
}

/// Locator over a single source-root directory.
///
/// Dotted unit names map to paths: `pkg.sub.Leaf` with extension `java`
/// becomes `<root>/pkg/sub/Leaf.java`. Nested names (`$` suffix) never
/// reach the locator; callers resolve the container name first.
#[derive(Debug, Clone)]
pub struct FsSourceLocator {
    root: PathBuf,
    extension: String,
}

impl FsSourceLocator {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        FsSourceLocator {
            root: root.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path a unit's source would occupy.
    pub fn source_path(&self, unit: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in unit.split('.') {
            path.push(segment);
        }
        path.set_extension(&self.extension);
        path
    }

    /// Resolves a raw relative resource path under the source root.
    /// Returns `None` when nothing is there. A leading `/` is tolerated.
    pub fn locate(&self, relative: &str) -> Option<PathBuf> {
        let path = self.root.join(relative.trim_start_matches('/'));
        path.exists().then_some(path)
    }

    fn group_dir(&self, group: &str) -> PathBuf {
        let mut dir = self.root.clone();
        if !group.is_empty() {
            for segment in group.split('.') {
                dir.push(segment);
            }
        }
        dir
    }
}

impl SourceLocator for FsSourceLocator {
    fn exists(&self, unit: &str) -> bool {
        self.source_path(unit).is_file()
    }

    fn last_modified(&self, unit: &str) -> Result<SystemTime> {
        let path = self.source_path(unit);
        let metadata = fs::metadata(&path).map_err(|e| EngineError::from_io(unit, e))?;
        metadata.modified().map_err(|e| EngineError::from_io(unit, e))
    }

    fn read_source(&self, unit: &str) -> Result<String> {
        fs::read_to_string(self.source_path(unit)).map_err(|e| EngineError::from_io(unit, e))
    }

    fn units_in_group(&self, group: &str) -> Vec<String> {
        let dir = self.group_dir(group);
        if !dir.is_dir() {
            return Vec::new();
        }
        let mut units = Vec::new();
        for entry in WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if group.is_empty() {
                    units.push(stem.to_string());
                } else {
                    units.push(format!("{group}.{stem}"));
                }
            }
        }
        units.sort();
        units
    }

    fn group_exists(&self, group: &str) -> bool {
        self.group_dir(group).is_dir()
    }
}

/// In-memory locator for hosts that feed sources from buffers rather than
/// files, and for tests.
#[derive(Debug, Default)]
pub struct MemorySourceLocator {
    files: RwLock<FxHashMap<String, MemorySource>>,
}

#[derive(Debug)]
struct MemorySource {
    text: String,
    modified: SystemTime,
}

impl MemorySourceLocator {
    pub fn new() -> Self {
        MemorySourceLocator::default()
    }

    /// Adds or replaces a source, stamping it with the current time.
    pub fn insert(&self, unit: impl Into<String>, text: impl Into<String>) {
        self.insert_at(unit, text, SystemTime::now());
    }

    /// Adds or replaces a source with an explicit modification stamp.
    pub fn insert_at(
        &self,
        unit: impl Into<String>,
        text: impl Into<String>,
        modified: SystemTime,
    ) {
        self.files.write().insert(
            unit.into(),
            MemorySource {
                text: text.into(),
                modified,
            },
        );
    }

    /// Removes a source, as if its file was deleted.
    pub fn remove(&self, unit: &str) {
        self.files.write().remove(unit);
    }
}

impl SourceLocator for MemorySourceLocator {
    fn exists(&self, unit: &str) -> bool {
        self.files.read().contains_key(unit)
    }

    fn last_modified(&self, unit: &str) -> Result<SystemTime> {
        self.files
            .read()
            .get(unit)
            .map(|source| source.modified)
            .ok_or_else(|| EngineError::UnitNotFound(unit.to_string()))
    }

    fn read_source(&self, unit: &str) -> Result<String> {
        self.files
            .read()
            .get(unit)
            .map(|source| source.text.clone())
            .ok_or_else(|| EngineError::UnitNotFound(unit.to_string()))
    }

    fn units_in_group(&self, group: &str) -> Vec<String> {
        let files = self.files.read();
        let mut units: Vec<String> = files
            .keys()
            .filter(|unit| group_of(unit) == group)
            .cloned()
            .collect();
        units.sort();
        units
    }

    fn group_exists(&self, group: &str) -> bool {
        if group.is_empty() {
            return true;
        }
        let prefix = format!("{group}.");
        self.files
            .read()
            .keys()
            .any(|unit| group_of(unit) == group || group_of(unit).starts_with(&prefix))
    }
}
