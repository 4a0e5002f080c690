//! `fedsync-core`: shared directory primitives.
//!
//! This crate holds the pieces every other crate agrees on: the validated
//! username key and the directory error model. It does no IO of its own.

pub mod error;
pub mod username;

pub use error::{DirectoryError, DirectoryResult};
pub use username::Username;
