use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

use regex::Regex;

use super::{LockedUserFile, UserFile, retain_unmatched};

/// In-memory user file.
///
/// Intended for tests/dev. Failures can be armed to exercise the directory's
/// recovery paths; each armed failure fires once.
#[derive(Debug, Default)]
pub struct MemoryFile {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    contents: String,
    fail_append: bool,
    fail_delete: bool,
    fail_delete_after_write: bool,
}

impl MemoryFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                contents: contents.into(),
                ..MemoryState::default()
            }),
        }
    }

    /// Snapshot of the current contents.
    pub fn contents(&self) -> String {
        self.state().contents.clone()
    }

    /// The next append fails without writing anything.
    pub fn fail_next_append(&self) {
        self.state().fail_append = true;
    }

    /// The next delete fails without touching the contents.
    pub fn fail_next_delete(&self) {
        self.state().fail_delete = true;
    }

    /// The next delete rewrites the contents and then reports failure.
    pub fn fail_next_delete_after_write(&self) {
        self.state().fail_delete_after_write = true;
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl UserFile for MemoryFile {
    fn lock(&self) -> io::Result<Box<dyn LockedUserFile + '_>> {
        Ok(Box::new(MemoryFileLock {
            state: self.state(),
        }))
    }

    fn lock_existing(&self) -> io::Result<Option<Box<dyn LockedUserFile + '_>>> {
        self.lock().map(Some)
    }
}

struct MemoryFileLock<'a> {
    state: MutexGuard<'a, MemoryState>,
}

impl LockedUserFile for MemoryFileLock<'_> {
    fn contents(&mut self) -> io::Result<String> {
        Ok(self.state.contents.clone())
    }

    fn delete_matching(&mut self, pattern: &Regex) -> io::Result<usize> {
        if std::mem::take(&mut self.state.fail_delete) {
            return Err(io::Error::other("injected delete failure"));
        }
        let (kept, removed) = retain_unmatched(&self.state.contents, pattern);
        if removed > 0 {
            self.state.contents = kept;
        }
        if std::mem::take(&mut self.state.fail_delete_after_write) {
            return Err(io::Error::other("injected failure after rewrite"));
        }
        Ok(removed)
    }

    fn append(&mut self, line: &str) -> io::Result<()> {
        if std::mem::take(&mut self.state.fail_append) {
            return Err(io::Error::other("injected append failure"));
        }
        let contents = &mut self.state.contents;
        if !contents.is_empty() && !contents.ends_with('\n') {
            contents.push('\n');
        }
        contents.push_str(line);
        contents.push('\n');
        Ok(())
    }
}
