//! Test fixtures.
//!
//! Provides a sample content type and temporary queue files.

use concord_storage::FileQueueStore;
use concord_sync_engine::Content;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A sample content type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Task {
    /// Unique id within the collection.
    pub id: String,
    /// Title.
    pub title: String,
    /// Completion flag.
    pub done: bool,
}

impl Task {
    /// Creates an open task.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            done: false,
        }
    }

    /// Returns a completed copy of this task.
    pub fn completed(&self) -> Self {
        Self {
            done: true,
            ..self.clone()
        }
    }
}

impl Content for Task {
    type Id = String;

    fn id(&self) -> String {
        self.id.clone()
    }
}

/// A second content type, for type mismatch tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Unique id.
    pub id: u64,
    /// Body text.
    pub body: String,
}

impl Content for Note {
    type Id = u64;

    fn id(&self) -> u64 {
        self.id
    }
}

/// A queue file in a temporary directory with automatic cleanup.
pub struct TempQueueFile {
    dir: TempDir,
    path: PathBuf,
}

impl TempQueueFile {
    /// Creates a path for a queue file. The file itself is not created.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = dir.path().join("queue.json");
        Self { dir, path }
    }

    /// Returns the queue file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the temporary directory.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Opens a store over the queue file.
    pub fn open(&self) -> FileQueueStore {
        FileQueueStore::open(&self.path).expect("Failed to open queue file")
    }

    /// Writes raw contents to the queue file.
    pub fn write_raw(&self, contents: &str) {
        std::fs::write(&self.path, contents).expect("Failed to write queue file");
    }

    /// Reads the raw contents of the queue file.
    pub fn read_raw(&self) -> String {
        std::fs::read_to_string(&self.path).expect("Failed to read queue file")
    }
}

impl Default for TempQueueFile {
    fn default() -> Self {
        Self::new()
    }
}
