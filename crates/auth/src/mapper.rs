//! Attribute bag → synced profile fields.

use serde::{Deserialize, Serialize};

use fedsync_directory::{GroupSet, SyncedFields};

use crate::AttributeBag;

/// Which provider attributes feed which local field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeNames {
    /// Source of the local username.
    pub uid: String,
    pub name: String,
    pub mail: String,
    pub groups: String,
}

impl Default for AttributeNames {
    fn default() -> Self {
        Self {
            uid: "uid".to_string(),
            name: "cn".to_string(),
            mail: "mail".to_string(),
            groups: "eduPersonAffiliation".to_string(),
        }
    }
}

/// Outcome of mapping one bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappedAttributes {
    /// The bag was empty: the federation session is not actually
    /// authenticated and nothing may be synchronized.
    NoData,
    Fields(SyncedFields),
}

#[derive(Debug, Clone, Default)]
pub struct AttributeMapper {
    names: AttributeNames,
}

impl AttributeMapper {
    pub fn new(names: AttributeNames) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &AttributeNames {
        &self.names
    }

    /// Extract the synced fields, defaulting each missing one to empty.
    pub fn map(&self, bag: &AttributeBag) -> MappedAttributes {
        if bag.is_empty() {
            return MappedAttributes::NoData;
        }

        let display_name = bag
            .first(&self.names.name)
            .filter(|v| !v.is_empty())
            .unwrap_or_default()
            .to_string();
        let email = bag.first(&self.names.mail).unwrap_or_default().to_string();
        let groups: GroupSet = bag
            .all(&self.names.groups)
            .unwrap_or_default()
            .iter()
            .filter(|g| !g.is_empty())
            .cloned()
            .collect();

        MappedAttributes::Fields(SyncedFields {
            display_name,
            email,
            groups,
        })
    }

    /// Raw username asserted by the provider (first `uid` value).
    pub fn username<'a>(&self, bag: &'a AttributeBag) -> Option<&'a str> {
        bag.first(&self.names.uid).filter(|v| !v.is_empty())
    }
}
