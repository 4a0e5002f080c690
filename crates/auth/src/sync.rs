//! Login-time synchronization of provider attributes into the directory.
//!
//! One call handles one authentication event and finishes in a single pass:
//!
//! 1. map the bag (an empty bag aborts with no store access),
//! 2. look the user up,
//! 3. register an unknown user, or update a known one with the permitted,
//!    non-empty incoming fields,
//! 4. hand the resulting local identity back to the caller.
//!
//! Store failures are reported, never retried.

use std::sync::Arc;

use thiserror::Error;

use fedsync_core::{DirectoryError, Username};
use fedsync_directory::credential;
use fedsync_directory::{DirectoryStore, SyncedFields, UserChanges, UserFile, UserRecord};

use crate::{
    AttributeBag, AttributeMapper, FieldPermissions, LocalIdentity, MappedAttributes, SyncConfig,
    SyncField,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The bag was empty; nothing was read or written.
    Skipped,
    /// A new record was created.
    Registered(LocalIdentity),
    /// An existing record was reconciled. `changed` lists the fields that
    /// were actually rewritten (empty when nothing differed).
    Updated {
        identity: LocalIdentity,
        changed: Vec<SyncField>,
    },
}

impl SyncOutcome {
    pub fn identity(&self) -> Option<&LocalIdentity> {
        match self {
            SyncOutcome::Skipped => None,
            SyncOutcome::Registered(identity) => Some(identity),
            SyncOutcome::Updated { identity, .. } => Some(identity),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, SyncOutcome::Skipped)
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("attribute bag has no '{attribute}' value to use as username")]
    MissingUsername { attribute: String },

    #[error("identity provider asserted an unusable username")]
    InvalidUsername(#[source] DirectoryError),

    #[error("lookup failed for {username}")]
    LookupFailed {
        username: String,
        #[source]
        source: DirectoryError,
    },

    #[error("registration failed for {username}")]
    RegistrationFailed {
        username: String,
        #[source]
        source: DirectoryError,
    },

    #[error("update failed for {username}")]
    UpdateFailed {
        username: String,
        #[source]
        source: DirectoryError,
    },
}

impl SyncError {
    /// The underlying store error, if any.
    pub fn directory_error(&self) -> Option<&DirectoryError> {
        match self {
            SyncError::MissingUsername { .. } => None,
            SyncError::InvalidUsername(source) => Some(source),
            SyncError::LookupFailed { source, .. }
            | SyncError::RegistrationFailed { source, .. }
            | SyncError::UpdateFailed { source, .. } => Some(source),
        }
    }

    /// The user's record was lost mid-write: the caller must not treat the
    /// principal as logged in and should send them through registration.
    pub fn requires_reregistration(&self) -> bool {
        self.directory_error()
            .is_some_and(DirectoryError::is_data_loss)
    }
}

/// Reconciles attribute bags against a directory store.
#[derive(Debug)]
pub struct SyncController<F> {
    store: Arc<DirectoryStore<F>>,
    mapper: AttributeMapper,
    permissions: FieldPermissions,
}

impl<F: UserFile> SyncController<F> {
    pub fn new(
        store: Arc<DirectoryStore<F>>,
        mapper: AttributeMapper,
        permissions: FieldPermissions,
    ) -> Self {
        Self {
            store,
            mapper,
            permissions,
        }
    }

    pub fn from_config(store: Arc<DirectoryStore<F>>, config: &SyncConfig) -> Self {
        Self::new(
            store,
            AttributeMapper::new(config.attributes.clone()),
            config.permissions,
        )
    }

    pub fn store(&self) -> &Arc<DirectoryStore<F>> {
        &self.store
    }

    pub fn mapper(&self) -> &AttributeMapper {
        &self.mapper
    }

    /// Synchronize `username` from `bag`.
    pub fn synchronize(
        &self,
        username: &Username,
        bag: &AttributeBag,
    ) -> Result<SyncOutcome, SyncError> {
        let incoming = match self.mapper.map(bag) {
            MappedAttributes::NoData => {
                tracing::debug!(user = %username, "empty attribute bag, skipping sync");
                return Ok(SyncOutcome::Skipped);
            }
            MappedAttributes::Fields(fields) => fields,
        };

        let existing = self
            .store
            .get(username)
            .map_err(|source| SyncError::LookupFailed {
                username: username.to_string(),
                source,
            })?;

        match existing {
            None => self.register(username, incoming),
            Some(record) => self.update(record, &incoming),
        }
    }

    /// Synchronize the user named by the bag's uid attribute.
    pub fn synchronize_bag(&self, bag: &AttributeBag) -> Result<SyncOutcome, SyncError> {
        if bag.is_empty() {
            tracing::debug!("empty attribute bag, skipping sync");
            return Ok(SyncOutcome::Skipped);
        }
        let raw = self
            .mapper
            .username(bag)
            .ok_or_else(|| SyncError::MissingUsername {
                attribute: self.mapper.names().uid.clone(),
            })?;
        let username = Username::parse(raw).map_err(SyncError::InvalidUsername)?;
        self.synchronize(&username, bag)
    }

    /// Whether `bag` authenticates `username`: it must be non-empty and its
    /// uid attribute must name exactly this user.
    pub fn verify_principal(&self, username: &Username, bag: &AttributeBag) -> bool {
        !bag.is_empty() && self.mapper.username(bag) == Some(username.as_str())
    }

    /// Local identity of an already-synchronized user.
    pub fn resolve_identity(&self, username: &Username) -> Result<Option<LocalIdentity>, SyncError> {
        self.store
            .get(username)
            .map(|record| record.map(LocalIdentity::from))
            .map_err(|source| SyncError::LookupFailed {
                username: username.to_string(),
                source,
            })
    }

    /// The update a sync would apply to `record`.
    ///
    /// A field is included only if it is permitted, the incoming value is
    /// non-empty, and it differs from what is stored. Empty incoming values
    /// never overwrite, groups included.
    pub fn changes_for(
        &self,
        record: &UserRecord,
        incoming: &SyncedFields,
    ) -> (UserChanges, Vec<SyncField>) {
        let mut changes = UserChanges::new();
        let mut changed = Vec::new();

        if self.permissions.allows(SyncField::Name)
            && !incoming.display_name.is_empty()
            && incoming.display_name != record.display_name
        {
            changes = changes.display_name(incoming.display_name.clone());
            changed.push(SyncField::Name);
        }
        if self.permissions.allows(SyncField::Mail)
            && !incoming.email.is_empty()
            && incoming.email != record.email
        {
            changes = changes.email(incoming.email.clone());
            changed.push(SyncField::Mail);
        }
        if self.permissions.allows(SyncField::Groups)
            && !incoming.groups.is_empty()
            && incoming.groups != record.groups
        {
            changes = changes.groups(incoming.groups.iter().cloned());
            changed.push(SyncField::Groups);
        }

        (changes, changed)
    }

    fn register(&self, username: &Username, fields: SyncedFields) -> Result<SyncOutcome, SyncError> {
        let failed = |source| SyncError::RegistrationFailed {
            username: username.to_string(),
            source,
        };

        let placeholder = credential::generate_placeholder().map_err(failed)?;
        let record = self
            .store
            .create(username, &placeholder, fields)
            .map_err(failed)?;

        tracing::info!(user = %username, groups = record.groups.len(), "registered federated user");
        Ok(SyncOutcome::Registered(record.into()))
    }

    fn update(&self, record: UserRecord, incoming: &SyncedFields) -> Result<SyncOutcome, SyncError> {
        let (changes, changed) = self.changes_for(&record, incoming);
        if changes.is_empty() {
            tracing::debug!(user = %record.username, "federated attributes unchanged");
            return Ok(SyncOutcome::Updated {
                identity: record.into(),
                changed,
            });
        }

        let stored = self
            .store
            .update(&record.username, &changes)
            .map_err(|source| {
                if source.is_data_loss() {
                    tracing::error!(user = %record.username, "user record lost during sync, re-registration required");
                }
                SyncError::UpdateFailed {
                    username: record.username.to_string(),
                    source,
                }
            })?;

        tracing::info!(
            user = %stored.username,
            fields = ?changed.iter().map(SyncField::as_str).collect::<Vec<_>>(),
            "updated federated user"
        );
        Ok(SyncOutcome::Updated {
            identity: stored.into(),
            changed,
        })
    }
}
