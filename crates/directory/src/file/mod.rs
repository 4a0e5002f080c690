//! Backing storage for the user directory.
//!
//! A user file is plain text that can only be changed while holding its
//! exclusive lock. Both mutations the directory needs (drop every line whose
//! key matches, append one line) happen through the lock guard, so a caller
//! that needs delete-then-append to be indivisible simply holds one guard for
//! both steps.

pub mod flat;
pub mod memory;

use std::io;
use std::sync::Arc;

use regex::Regex;

pub use flat::FlatFile;
pub use memory::MemoryFile;

/// A lockable user file.
pub trait UserFile: Send + Sync {
    /// Take the exclusive lock over the whole file, creating it if needed.
    ///
    /// The lock is released when the returned guard is dropped.
    fn lock(&self) -> io::Result<Box<dyn LockedUserFile + '_>>;

    /// Like [`UserFile::lock`], but `None` when the file does not exist.
    ///
    /// Used by paths that only read or shrink the file.
    fn lock_existing(&self) -> io::Result<Option<Box<dyn LockedUserFile + '_>>>;
}

/// Exclusive access to a user file.
pub trait LockedUserFile {
    /// Current file contents.
    fn contents(&mut self) -> io::Result<String>;

    /// Rewrite the file without every line matching `pattern`.
    ///
    /// Returns the number of lines removed. A rewrite that fails may already
    /// have changed the file; callers must re-read rather than assume.
    fn delete_matching(&mut self, pattern: &Regex) -> io::Result<usize>;

    /// Append one line (the newline is added here).
    fn append(&mut self, line: &str) -> io::Result<()>;
}

impl<F> UserFile for Arc<F>
where
    F: UserFile + ?Sized,
{
    fn lock(&self) -> io::Result<Box<dyn LockedUserFile + '_>> {
        (**self).lock()
    }

    fn lock_existing(&self) -> io::Result<Option<Box<dyn LockedUserFile + '_>>> {
        (**self).lock_existing()
    }
}

/// Split `contents` into kept text and a removed-line count.
pub(crate) fn retain_unmatched(contents: &str, pattern: &Regex) -> (String, usize) {
    let mut kept = String::with_capacity(contents.len());
    let mut removed = 0;
    for line in contents.lines() {
        if pattern.is_match(line) {
            removed += 1;
        } else {
            kept.push_str(line);
            kept.push('\n');
        }
    }
    (kept, removed)
}
