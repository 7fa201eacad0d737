// src/state.rs
//! Durable per-handle watermark: handle -> last delivered post id.
//!
//! Loading is tolerant (missing or malformed files yield an empty mapping) so
//! a fresh checkout can start from scratch. Writing goes through a temp file
//! and an atomic rename so the previous durable state survives a crash at any
//! point of the write.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::StateError;
use crate::types::PostId;

/// Which file(s) back the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreScope {
    /// One mapping file shared by every handle polled from this process.
    Shared { path: PathBuf },
    /// A dedicated file for one handle. When it does not exist yet, the
    /// handle's entry is seeded from the legacy shared file, if any.
    PerHandle {
        handle: String,
        dir: PathBuf,
        legacy_path: Option<PathBuf>,
    },
}

impl StoreScope {
    pub fn file_path(&self) -> PathBuf {
        match self {
            StoreScope::Shared { path } => path.clone(),
            StoreScope::PerHandle { handle, dir, .. } => per_handle_path(dir, handle),
        }
    }
}

pub fn per_handle_path(dir: &Path, handle: &str) -> PathBuf {
    dir.join(format!("last-seen-{handle}.json"))
}

#[derive(Debug)]
pub struct WatermarkStore {
    path: PathBuf,
    marks: BTreeMap<String, PostId>,
}

impl WatermarkStore {
    /// Load the mapping for `scope`. Never fails.
    pub fn load(scope: &StoreScope) -> Self {
        let path = scope.file_path();
        let marks = match scope {
            StoreScope::Shared { path } => read_marks(path).unwrap_or_default(),
            StoreScope::PerHandle {
                handle,
                legacy_path,
                ..
            } => match read_marks(&path) {
                Some(marks) => marks,
                None => migrate_from_legacy(handle, legacy_path.as_deref()),
            },
        };
        tracing::debug!(path = %path.display(), entries = marks.len(), "watermark store loaded");
        Self { path, marks }
    }

    /// Empty store that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            marks: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, handle: &str) -> Option<PostId> {
        self.marks.get(handle).copied()
    }

    /// Unconditional in-memory update.
    pub fn set(&mut self, handle: &str, id: PostId) {
        self.marks.insert(handle.to_string(), id);
    }

    /// Move the watermark forward to `id`. Returns false (and leaves the
    /// mapping untouched) when `id` is not greater than the current value.
    pub fn advance(&mut self, handle: &str, id: PostId) -> bool {
        match self.marks.get(handle) {
            Some(current) if *current >= id => false,
            _ => {
                self.marks.insert(handle.to_string(), id);
                true
            }
        }
    }

    pub fn entries(&self) -> &BTreeMap<String, PostId> {
        &self.marks
    }

    /// Write the whole mapping: `<file>.tmp`, fsync, rename over `<file>`.
    /// Creates the parent directory when absent. Safe to call repeatedly.
    pub fn persist(&self) -> Result<(), StateError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| StateError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_vec_pretty(&self.marks)?;
        let tmp = temp_path(&self.path);
        write_synced(&tmp, &json).map_err(|source| StateError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StateError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut f = fs::File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()
}

/// `None` when the file does not exist; an empty map when it is unreadable
/// or malformed. Individual entries that are not valid ids are skipped.
fn read_marks(path: &Path) -> Option<BTreeMap<String, PostId>> {
    let content = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "state unreadable, starting empty");
            return Some(BTreeMap::new());
        }
    };

    let raw: Map<String, Value> = match serde_json::from_str(&content) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "state malformed, starting empty");
            return Some(BTreeMap::new());
        }
    };

    let mut marks = BTreeMap::new();
    for (handle, value) in raw {
        match serde_json::from_value::<PostId>(value) {
            Ok(id) => {
                marks.insert(handle, id);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), %handle, error = %e, "skipping bad state entry");
            }
        }
    }
    Some(marks)
}

fn migrate_from_legacy(handle: &str, legacy: Option<&Path>) -> BTreeMap<String, PostId> {
    let mut marks = BTreeMap::new();
    let Some(legacy) = legacy else {
        return marks;
    };
    if let Some(id) = read_marks(legacy).and_then(|m| m.get(handle).copied()) {
        tracing::info!(%handle, post_id = %id, from = %legacy.display(), "seeded watermark from legacy state");
        marks.insert(handle.to_string(), id);
    }
    marks
}
