//! User records and the partial updates applied to them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use fedsync_core::{DirectoryError, DirectoryResult, Username};

/// Group memberships. Ordered so that encoding is deterministic.
pub type GroupSet = BTreeSet<String>;

/// One local identity.
///
/// # Invariants
/// - `username` is unique across the store.
/// - `email` and `password_hash` are stored verbatim and therefore never
///   contain the field delimiter, the comment marker or a line break.
/// - An empty `groups` set is a valid record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: Username,
    pub password_hash: String,
    pub display_name: String,
    pub email: String,
    pub groups: GroupSet,
}

impl UserRecord {
    pub fn new(username: Username, password_hash: impl Into<String>, fields: SyncedFields) -> Self {
        Self {
            username,
            password_hash: password_hash.into(),
            display_name: fields.display_name,
            email: fields.email,
            groups: fields.groups,
        }
    }

    /// Profile view of the record (everything a sync touches).
    pub fn fields(&self) -> SyncedFields {
        SyncedFields {
            display_name: self.display_name.clone(),
            email: self.email.clone(),
            groups: self.groups.clone(),
        }
    }

    /// Reject values the line format cannot carry.
    pub fn validate(&self) -> DirectoryResult<()> {
        ensure_verbatim("password hash", &self.password_hash)?;
        ensure_verbatim("email", &self.email)
    }
}

fn ensure_verbatim(field: &str, value: &str) -> DirectoryResult<()> {
    match value.chars().find(|c| *c == ':' || *c == '#' || c.is_control()) {
        Some(c) => Err(DirectoryError::invalid_input(format!(
            "{field} contains forbidden character {c:?}"
        ))),
        None => Ok(()),
    }
}

/// The profile fields kept in sync with the identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedFields {
    pub display_name: String,
    pub email: String,
    pub groups: GroupSet,
}

impl SyncedFields {
    pub fn new(
        display_name: impl Into<String>,
        email: impl Into<String>,
        groups: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            email: email.into(),
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }
}

/// A partial update. Unset fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    /// New primary key (rename).
    pub username: Option<Username>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub groups: Option<GroupSet>,
}

impl UserChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rename(mut self, username: Username) -> Self {
        self.username = Some(username);
        self
    }

    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn groups(mut self, groups: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.display_name.is_none()
            && self.email.is_none()
            && self.groups.is_none()
    }

    /// Merge into `record`. The password hash is never touched.
    pub fn apply_to(&self, mut record: UserRecord) -> UserRecord {
        if let Some(username) = &self.username {
            record.username = username.clone();
        }
        if let Some(display_name) = &self.display_name {
            record.display_name = display_name.clone();
        }
        if let Some(email) = &self.email {
            record.email = email.clone();
        }
        if let Some(groups) = &self.groups {
            record.groups = groups.clone();
        }
        record
    }
}
