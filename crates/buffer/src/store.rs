//! Buffer store
//!
//! One append-only NDJSON file per table:
//!
//! ```text
//! <dir>/orders.json                                   active, receives appends
//! <dir>/orders.json.3f9c0d5e7a8b4e2c9d1f6a7b8c9d0e1f  rotated, awaiting upload
//! ```
//!
//! The store keeps at most one open append handle per table and remembers
//! when each table first received data since its last rotation. Append and
//! rotate are serialized by the store's state lock; the `flock` on the file
//! additionally keeps external readers from seeing a partial row.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use spool_sinks::TableName;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{BufferError, Result};
use crate::lock::FileLock;

/// Suffix of active buffer files
pub const ACTIVE_SUFFIX: &str = ".json";

/// Active or rotated
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum BufferFileKind {
    /// `<table>.json`, still receiving appends
    Active,
    /// `<table>.json.<token>`, detached from writers
    Rotated(String),
}

/// A buffer file found on disk
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BufferFile {
    /// Destination table
    pub table: TableName,
    /// Active or rotated
    pub kind: BufferFileKind,
    /// Full path
    pub path: PathBuf,
}

impl BufferFile {
    /// Recognize a buffer file from its path
    ///
    /// Returns `None` for names that are not `<table>.json` or
    /// `<table>.json.<token>` with a valid table name.
    pub fn parse(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;

        let (table, kind) = if let Some(table) = name.strip_suffix(ACTIVE_SUFFIX) {
            (table, BufferFileKind::Active)
        } else {
            let (table, token) = name.split_once(".json.")?;
            if !is_valid_token(token) {
                return None;
            }
            (table, BufferFileKind::Rotated(token.to_string()))
        };

        Some(Self {
            table: TableName::new(table).ok()?,
            kind,
            path: path.to_path_buf(),
        })
    }

    /// True for the active file of a table
    pub fn is_active(&self) -> bool {
        self.kind == BufferFileKind::Active
    }
}

fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[derive(Debug, Default)]
struct StoreState {
    /// Open append handles
    handles: HashMap<TableName, File>,
    /// First unflushed append since the last rotation
    pending_since: HashMap<TableName, Instant>,
}

/// Per-table append-only buffer files in one directory
#[derive(Debug)]
pub struct BufferStore {
    dir: PathBuf,
    state: Mutex<StoreState>,
}

impl BufferStore {
    /// Open a store, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| BufferError::io("create directory", &dir, e))?;
        Ok(Self {
            dir,
            state: Mutex::new(StoreState::default()),
        })
    }

    /// Buffer directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a table's active file
    pub fn active_path(&self, table: &TableName) -> PathBuf {
        self.dir.join(format!("{}{}", table, ACTIVE_SUFFIX))
    }

    fn rotated_path(&self, table: &TableName) -> PathBuf {
        let token = Uuid::new_v4().simple();
        self.dir.join(format!("{}{}.{}", table, ACTIVE_SUFFIX, token))
    }

    /// Append one row
    pub fn append(&self, table: &TableName, row: &[u8]) -> Result<()> {
        self.append_batch(table, &[row])
    }

    /// Append rows with a single locked write
    ///
    /// Each row gets a trailing newline. Rows must not contain newlines
    /// themselves.
    pub fn append_batch<R: AsRef<[u8]>>(&self, table: &TableName, rows: &[R]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let capacity = rows.iter().map(|r| r.as_ref().len() + 1).sum();
        let mut buf = Vec::with_capacity(capacity);
        for row in rows {
            buf.extend_from_slice(row.as_ref());
            buf.push(b'\n');
        }

        let mut state = self.state.lock();
        let path = self.active_path(table);

        if !state.handles.contains_key(table) {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| BufferError::io("open", &path, e))?;
            state.handles.insert(table.clone(), file);
        }

        let written = match state.handles.get(table) {
            Some(file) => write_locked(file, &buf),
            None => Ok(()),
        };
        if let Err(e) = written {
            // Reopen on the next append
            state.handles.remove(table);
            return Err(BufferError::io("append", &path, e));
        }

        state
            .pending_since
            .entry(table.clone())
            .or_insert_with(Instant::now);
        Ok(())
    }

    /// Detach the active file from writers
    ///
    /// The active file is renamed to a fresh rotated name and its handle is
    /// closed, so the next append starts a new file. Pending-since is cleared
    /// either way; `None` means there was no active file.
    pub fn rotate(&self, table: &TableName) -> Result<Option<PathBuf>> {
        let mut state = self.state.lock();
        state.pending_since.remove(table);

        let active = self.active_path(table);
        let file = match state.handles.remove(table) {
            Some(file) => file,
            None => match OpenOptions::new().append(true).open(&active) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(BufferError::io("open", &active, e)),
            },
        };

        let rotated = self.rotated_path(table);
        let _lock = FileLock::exclusive(&file).map_err(|e| BufferError::io("lock", &active, e))?;
        match fs::rename(&active, &rotated) {
            Ok(()) => Ok(Some(rotated)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BufferError::io("rotate", &active, e)),
        }
    }

    /// When the table first received data since its last rotation
    pub fn pending_since(&self, table: &TableName) -> Option<Instant> {
        self.state.lock().pending_since.get(table).copied()
    }

    /// Size of the table's active file (0 if absent)
    pub fn active_size(&self, table: &TableName) -> u64 {
        fs::metadata(self.active_path(table)).map_or(0, |m| m.len())
    }

    /// Buffer files on disk, sorted by table then kind
    ///
    /// Files whose names do not look like buffer files are ignored.
    pub fn list(&self) -> Result<Vec<BufferFile>> {
        let entries =
            fs::read_dir(&self.dir).map_err(|e| BufferError::io("list", &self.dir, e))?;

        let mut files: Vec<BufferFile> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter_map(|entry| BufferFile::parse(&entry.path()))
            .collect();
        files.sort();
        Ok(files)
    }

}

fn write_locked(file: &File, buf: &[u8]) -> io::Result<()> {
    let _lock = FileLock::exclusive(file)?;
    write_whole(&mut &*file, buf)
}

/// Append target that can be cut back to an earlier length
trait Truncate: Write {
    fn len(&self) -> io::Result<u64>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl Truncate for &File {
    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Write all of `buf` or leave the target as it was
///
/// A short write (disk full) leaves a row without its newline, and the next
/// append would be glued onto it. The target is cut back to its length before
/// the write so the file stays valid NDJSON.
fn write_whole<W: Truncate>(target: &mut W, buf: &[u8]) -> io::Result<()> {
    let start = target.len()?;
    let Err(e) = target.write_all(buf) else {
        return Ok(());
    };

    if let Err(truncate_err) = target.truncate(start) {
        tracing::error!(
            error = %truncate_err,
            len = start,
            "failed to remove partial row after failed append"
        );
    }
    Err(e)
}

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;
