//! `fedsync-auth`: federated attribute sync boundary.
//!
//! This crate trusts the attribute bag it is handed: assertion validation,
//! sessions and cookies belong to the caller.

pub mod attributes;
pub mod config;
pub mod mapper;
pub mod permissions;
pub mod principal;
pub mod sync;

pub use attributes::AttributeBag;
pub use config::{ConfigError, SyncConfig};
pub use mapper::{AttributeMapper, AttributeNames, MappedAttributes};
pub use permissions::{FieldPermissions, SyncField};
pub use principal::LocalIdentity;
pub use sync::{SyncController, SyncError, SyncOutcome};
