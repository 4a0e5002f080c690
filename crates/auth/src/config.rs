//! Sync configuration.
//!
//! Defaults, optionally overlaid by a JSON file and then by `FEDSYNC_*`
//! environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use fedsync_directory::{CreateMode, StoreOptions};

use crate::{AttributeNames, FieldPermissions};

pub const DEFAULT_USER_FILE: &str = "users.saml.conf";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Path of the backing user file.
    pub user_file: PathBuf,
    pub attributes: AttributeNames,
    pub permissions: FieldPermissions,
    #[serde(flatten)]
    pub store: StoreOptions,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            user_file: PathBuf::from(DEFAULT_USER_FILE),
            attributes: AttributeNames::default(),
            permissions: FieldPermissions::default(),
            store: StoreOptions::default(),
        }
    }
}

impl SyncConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Load a JSON config file; missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `FEDSYNC_*` overrides fetched through `lookup`.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(path) = lookup("FEDSYNC_USER_FILE") {
            self.user_file = PathBuf::from(path);
        }

        let attributes = [
            ("FEDSYNC_UID_ATTR", &mut self.attributes.uid),
            ("FEDSYNC_NAME_ATTR", &mut self.attributes.name),
            ("FEDSYNC_MAIL_ATTR", &mut self.attributes.mail),
            ("FEDSYNC_GROUPS_ATTR", &mut self.attributes.groups),
        ];
        for (key, slot) in attributes {
            if let Some(value) = lookup(key) {
                *slot = value;
            }
        }

        let flags = [
            ("FEDSYNC_SYNC_NAME", &mut self.permissions.name),
            ("FEDSYNC_SYNC_MAIL", &mut self.permissions.mail),
            ("FEDSYNC_SYNC_GROUPS", &mut self.permissions.groups),
            ("FEDSYNC_RELOAD_ON_MISS", &mut self.store.reload_on_miss),
        ];
        for (key, slot) in flags {
            if let Some(value) = lookup(key) {
                *slot = parse_flag(key, &value)?;
            }
        }

        if let Some(value) = lookup("FEDSYNC_CREATE_MODE") {
            self.store.create_mode = value
                .parse::<CreateMode>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "FEDSYNC_CREATE_MODE",
                    value,
                })?;
        }

        Ok(self)
    }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}
