//! Server-side journal storage.
//!
//! Each group owns one record journal:
//! ```text
//! <DATA_DIR>/
//!   <group_id>/
//!     journal.json
//! ```
//!
//! Journals are cached in memory after first use and written back to disk
//! after every mutation.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use tablesync_core::{RecordJournal, DEFAULT_PAGE_SIZE};

const JOURNAL_FILENAME: &str = "journal.json";

/// Errors that can occur during server storage operations.
#[derive(Debug)]
pub enum ServerStorageError {
    /// I/O error reading or writing a file.
    IoError(PathBuf, io::Error),
    /// Journal file exists but could not be parsed.
    ParseError(PathBuf, String),
    /// Invalid group ID (e.g., contains path separators).
    InvalidGroupId(String),
}

impl std::fmt::Display for ServerStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStorageError::IoError(path, e) => {
                write!(f, "I/O error for {}: {}", path.display(), e)
            }
            ServerStorageError::ParseError(path, e) => {
                write!(f, "Failed to load journal {}: {}", path.display(), e)
            }
            ServerStorageError::InvalidGroupId(id) => {
                write!(f, "Invalid group ID: {}", id)
            }
        }
    }
}

impl std::error::Error for ServerStorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerStorageError::IoError(_, e) => Some(e),
            _ => None,
        }
    }
}

/// Per-group record journals backed by JSON files.
#[derive(Debug)]
pub struct JournalStore {
    data_dir: PathBuf,
    page_size: usize,
    journals: Mutex<HashMap<String, RecordJournal>>,
}

impl JournalStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self::with_page_size(data_dir, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(data_dir: impl Into<PathBuf>, page_size: usize) -> Self {
        Self {
            data_dir: data_dir.into(),
            page_size,
            journals: Mutex::new(HashMap::new()),
        }
    }

    /// Validates a group ID to prevent path traversal attacks.
    fn validate_group_id(group_id: &str) -> Result<(), ServerStorageError> {
        if group_id.is_empty()
            || group_id.contains('/')
            || group_id.contains('\\')
            || group_id.contains("..")
            || group_id.starts_with('.')
        {
            return Err(ServerStorageError::InvalidGroupId(group_id.to_string()));
        }
        Ok(())
    }

    fn journal_path(&self, group_id: &str) -> PathBuf {
        self.data_dir.join(group_id).join(JOURNAL_FILENAME)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RecordJournal>> {
        self.journals.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reads a group's journal. A group with no file yet sees an empty journal.
    pub fn read<T>(
        &self,
        group_id: &str,
        f: impl FnOnce(&RecordJournal) -> T,
    ) -> Result<T, ServerStorageError> {
        Self::validate_group_id(group_id)?;
        let mut journals = self.lock();
        let journal = self.cached(&mut journals, group_id)?;
        Ok(f(journal))
    }

    /// Runs `f` against a copy of a group's journal and writes the copy to
    /// disk. The cache only takes the copy once it is persisted, so a failed
    /// write leaves the journal as it was.
    pub fn write<T>(
        &self,
        group_id: &str,
        f: impl FnOnce(&mut RecordJournal) -> T,
    ) -> Result<T, ServerStorageError> {
        Self::validate_group_id(group_id)?;
        let mut journals = self.lock();
        let journal = self.cached(&mut journals, group_id)?;
        let mut updated = journal.clone();
        let result = f(&mut updated);
        self.persist(group_id, &updated)?;
        *journal = updated;
        Ok(result)
    }

    fn cached<'a>(
        &self,
        journals: &'a mut HashMap<String, RecordJournal>,
        group_id: &str,
    ) -> Result<&'a mut RecordJournal, ServerStorageError> {
        match journals.entry(group_id.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(self.load(group_id)?)),
        }
    }

    fn load(&self, group_id: &str) -> Result<RecordJournal, ServerStorageError> {
        let path = self.journal_path(group_id);
        let mut journal = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str::<RecordJournal>(&contents)
                .map_err(|e| ServerStorageError::ParseError(path, e.to_string()))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => RecordJournal::default(),
            Err(e) => return Err(ServerStorageError::IoError(path, e)),
        };
        journal.set_page_size(self.page_size);
        Ok(journal)
    }

    fn persist(&self, group_id: &str, journal: &RecordJournal) -> Result<(), ServerStorageError> {
        let group_dir = self.data_dir.join(group_id);
        let path = self.journal_path(group_id);

        fs::create_dir_all(&group_dir)
            .map_err(|e| ServerStorageError::IoError(group_dir.clone(), e))?;

        let bytes = serde_json::to_vec_pretty(journal)
            .map_err(|e| ServerStorageError::ParseError(path.clone(), e.to_string()))?;

        // Write atomically using temp file + rename
        let temp_path = path.with_extension("json.tmp");
        let mut file = File::create(&temp_path)
            .map_err(|e| ServerStorageError::IoError(temp_path.clone(), e))?;
        file.write_all(&bytes)
            .map_err(|e| ServerStorageError::IoError(temp_path.clone(), e))?;
        file.sync_all()
            .map_err(|e| ServerStorageError::IoError(temp_path.clone(), e))?;

        fs::rename(&temp_path, &path).map_err(|e| ServerStorageError::IoError(path, e))
    }

    /// Lists groups that have a journal on disk.
    pub fn groups(&self) -> Result<Vec<String>, ServerStorageError> {
        let entries = match fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ServerStorageError::IoError(self.data_dir.clone(), e)),
        };

        let mut groups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ServerStorageError::IoError(self.data_dir.clone(), e))?;
            if entry.path().join(JOURNAL_FILENAME).is_file() {
                groups.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        groups.sort();
        Ok(groups)
    }
}
