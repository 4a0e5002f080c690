//! The directory's primary key.

use core::str::FromStr;
use std::borrow::Borrow;

use serde::{Deserialize, Serialize};

use crate::error::DirectoryError;

/// A validated username.
///
/// Usernames are written verbatim as the first field of a user line, so they
/// may not contain the field delimiter, the comment marker or control
/// characters, and may not carry surrounding whitespace (lines are trimmed on
/// load).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    pub fn parse(value: impl Into<String>) -> Result<Self, DirectoryError> {
        let value = value.into();
        if value.is_empty() {
            return Err(DirectoryError::invalid_input("username cannot be empty"));
        }
        if value.trim() != value {
            return Err(DirectoryError::invalid_input(format!(
                "username '{value}' has surrounding whitespace"
            )));
        }
        if let Some(c) = value.chars().find(|c| *c == ':' || *c == '#' || c.is_control()) {
            return Err(DirectoryError::invalid_input(format!(
                "username '{}' contains forbidden character {c:?}",
                value.escape_debug()
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl core::fmt::Display for Username {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Username {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for Username {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Username {
    type Error = DirectoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.0
    }
}
