use serde::{Deserialize, Serialize};

/// A profile field an update may overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncField {
    Name,
    Mail,
    Groups,
}

impl SyncField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncField::Name => "name",
            SyncField::Mail => "mail",
            SyncField::Groups => "groups",
        }
    }
}

impl core::fmt::Display for SyncField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which fields the host's authorization model lets a sync change.
///
/// Each field is gated independently. Registration ignores these: a new
/// record always gets everything the provider sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldPermissions {
    pub name: bool,
    pub mail: bool,
    pub groups: bool,
}

impl FieldPermissions {
    pub fn all() -> Self {
        Self {
            name: true,
            mail: true,
            groups: true,
        }
    }

    pub fn none() -> Self {
        Self {
            name: false,
            mail: false,
            groups: false,
        }
    }

    pub fn allows(&self, field: SyncField) -> bool {
        match field {
            SyncField::Name => self.name,
            SyncField::Mail => self.mail,
            SyncField::Groups => self.groups,
        }
    }
}

impl Default for FieldPermissions {
    fn default() -> Self {
        Self::all()
    }
}
