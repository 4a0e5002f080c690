use serde::{Deserialize, Serialize};

use fedsync_core::Username;
use fedsync_directory::{GroupSet, UserRecord};

/// The local identity of an authenticated principal.
///
/// Handed back to the caller to populate its session; this crate never keeps
/// it. It never carries the credential placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIdentity {
    pub username: Username,
    pub display_name: String,
    pub email: String,
    pub groups: GroupSet,
}

impl From<UserRecord> for LocalIdentity {
    fn from(record: UserRecord) -> Self {
        Self {
            username: record.username,
            display_name: record.display_name,
            email: record.email,
            groups: record.groups,
        }
    }
}
