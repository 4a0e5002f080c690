use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use regex::Regex;

use super::{LockedUserFile, UserFile, retain_unmatched};

/// Header written into a freshly created user file.
pub const DEFAULT_HEADER: &str = "\
# fedsync user directory
#
# Format:
# username:password_hash:display_name:email:groups
#
# display_name and every group are percent-encoded, groups are comma-separated.
# Lines are managed by fedsync; hand edits are picked up on the next reload.

";

/// A user file on disk.
///
/// Writers are serialized twice: by an in-process mutex (threads sharing this
/// handle) and by an advisory exclusive lock on the file itself (other
/// processes opening the same path).
#[derive(Debug)]
pub struct FlatFile {
    path: PathBuf,
    writers: Mutex<()>,
}

impl FlatFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writers: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file with `header` unless it already exists.
    ///
    /// Returns `true` when the file was created.
    pub fn create_if_missing(&self, header: &str) -> io::Result<bool> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                file.write_all(header.as_bytes())?;
                file.sync_all()?;
                tracing::info!(path = %self.path.display(), "created user file");
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(err),
        }
    }
}

impl FlatFile {
    fn open_locked(&self, create: bool) -> io::Result<FlatFileLock<'_>> {
        let guard = self.writers.lock().unwrap_or_else(PoisonError::into_inner);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .truncate(false)
            .open(&self.path)?;
        file.lock()?;
        Ok(FlatFileLock {
            file,
            _guard: guard,
        })
    }
}

impl UserFile for FlatFile {
    fn lock(&self) -> io::Result<Box<dyn LockedUserFile + '_>> {
        Ok(Box::new(self.open_locked(true)?))
    }

    fn lock_existing(&self) -> io::Result<Option<Box<dyn LockedUserFile + '_>>> {
        match self.open_locked(false) {
            Ok(locked) => Ok(Some(Box::new(locked))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

struct FlatFileLock<'a> {
    file: File,
    _guard: MutexGuard<'a, ()>,
}

impl FlatFileLock<'_> {
    fn rewrite(&mut self, contents: &str) -> io::Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(contents.as_bytes())?;
        self.file.sync_data()
    }

    fn ends_with_newline(&mut self) -> io::Result<bool> {
        if self.file.metadata()?.len() == 0 {
            return Ok(true);
        }
        let mut last = [0u8; 1];
        self.file.seek(SeekFrom::End(-1))?;
        self.file.read_exact(&mut last)?;
        Ok(last[0] == b'\n')
    }
}

impl LockedUserFile for FlatFileLock<'_> {
    fn contents(&mut self) -> io::Result<String> {
        let mut contents = String::new();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_to_string(&mut contents)?;
        Ok(contents)
    }

    fn delete_matching(&mut self, pattern: &Regex) -> io::Result<usize> {
        let contents = self.contents()?;
        let (kept, removed) = retain_unmatched(&contents, pattern);
        if removed > 0 {
            self.rewrite(&kept)?;
        }
        Ok(removed)
    }

    fn append(&mut self, line: &str) -> io::Result<()> {
        let mut buf = String::with_capacity(line.len() + 2);
        if !self.ends_with_newline()? {
            buf.push('\n');
        }
        buf.push_str(line);
        buf.push('\n');

        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(buf.as_bytes())?;
        self.file.sync_data()
    }
}

impl Drop for FlatFileLock<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            tracing::warn!("failed to release user file lock: {err}");
        }
    }
}
