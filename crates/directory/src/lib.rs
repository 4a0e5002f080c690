//! `fedsync-directory`: the file-backed user directory.
//!
//! One user per line, whole-file rewrites under an exclusive lock, and an
//! in-memory cache in front of it. Nothing here knows about federation; the
//! attribute handling lives in `fedsync-auth`.

pub mod codec;
pub mod credential;
pub mod file;
pub mod record;
pub mod store;

pub use codec::{CodecError, DecodedFile};
pub use file::{FlatFile, LockedUserFile, MemoryFile, UserFile};
pub use record::{GroupSet, SyncedFields, UserChanges, UserRecord};
pub use store::{CreateMode, DirectoryStore, StoreOptions};
