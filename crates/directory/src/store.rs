//! The directory store: a cached, lock-protected table of user records.
//!
//! Reads are served from an in-memory map that is populated in one piece
//! from the backing file. Every mutation takes the file's exclusive lock,
//! removes the affected lines by key pattern, appends the replacement and
//! only then updates the cache. Writes made by other processes become
//! visible after `reload` (or on a cache miss with `reload_on_miss`).

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use regex::Regex;
use serde::{Deserialize, Serialize};

use fedsync_core::{DirectoryError, DirectoryResult, Username};

use crate::codec;
use crate::file::UserFile;
use crate::record::{SyncedFields, UserChanges, UserRecord};

/// What `create` does when the username already has a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateMode {
    /// Replace the existing line (delete-then-append).
    #[default]
    Upsert,
    /// Fail with `AlreadyExists`.
    InsertOnly,
}

impl FromStr for CreateMode {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upsert" => Ok(Self::Upsert),
            "insert_only" => Ok(Self::InsertOnly),
            other => Err(DirectoryError::invalid_input(format!(
                "unknown create mode '{other}' (expected 'upsert' or 'insert_only')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    pub create_mode: CreateMode,
    /// Re-read the backing file once when `get` misses the cache.
    pub reload_on_miss: bool,
}

type UserMap = HashMap<Username, UserRecord>;

/// File-backed user directory.
///
/// `DirectoryStore` is `Send + Sync` whenever its file is; share it behind an
/// `Arc`.
#[derive(Debug)]
pub struct DirectoryStore<F> {
    file: F,
    options: StoreOptions,
    cache: RwLock<Option<UserMap>>,
}

impl<F: UserFile> DirectoryStore<F> {
    pub fn new(file: F) -> Self {
        Self::with_options(file, StoreOptions::default())
    }

    pub fn with_options(file: F, options: StoreOptions) -> Self {
        Self {
            file,
            options,
            cache: RwLock::new(None),
        }
    }

    pub fn file(&self) -> &F {
        &self.file
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// Look up one user.
    pub fn get(&self, username: &Username) -> DirectoryResult<Option<UserRecord>> {
        {
            let cache = self.read_cache();
            if let Some(users) = cache.as_ref() {
                if let Some(record) = users.get(username) {
                    return Ok(Some(record.clone()));
                }
                if !self.options.reload_on_miss {
                    return Ok(None);
                }
            }
        }

        self.reload()?;
        Ok(self
            .read_cache()
            .as_ref()
            .and_then(|users| users.get(username).cloned()))
    }

    /// All users, sorted by username.
    pub fn list(&self) -> DirectoryResult<Vec<UserRecord>> {
        self.ensure_loaded()?;
        let mut records: Vec<UserRecord> = self
            .read_cache()
            .as_ref()
            .map(|users| users.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(records)
    }

    /// Number of users currently known.
    pub fn count(&self) -> DirectoryResult<usize> {
        self.ensure_loaded()?;
        Ok(self.read_cache().as_ref().map_or(0, HashMap::len))
    }

    /// Re-read the whole backing file into the cache.
    ///
    /// Runs under the file lock so it never observes a half-written mutation.
    /// A missing file loads as an empty directory and is not created.
    /// Returns the number of users loaded.
    pub fn reload(&self) -> DirectoryResult<usize> {
        let contents = match self.file.lock_existing().map_err(DirectoryError::read_failure)? {
            Some(mut file) => file.contents().map_err(DirectoryError::read_failure)?,
            None => String::new(),
        };
        Ok(self.replace_cache(&contents))
    }

    /// Store a new record for `username`.
    ///
    /// Any existing line for the key is removed first, then the new line is
    /// appended, both under one lock. With `CreateMode::InsertOnly` an
    /// existing line is an error instead.
    pub fn create(
        &self,
        username: &Username,
        password_hash: &str,
        fields: SyncedFields,
    ) -> DirectoryResult<UserRecord> {
        let record = UserRecord::new(username.clone(), password_hash, fields);
        record.validate()?;
        let line = codec::encode(&record);
        let pattern = key_pattern([username])?;

        let mut file = self
            .file
            .lock()
            .map_err(|e| DirectoryError::write_failure("locking", e))?;

        if self.options.create_mode == CreateMode::InsertOnly {
            let contents = file.contents().map_err(DirectoryError::read_failure)?;
            if contents.lines().any(|l| pattern.is_match(l)) {
                return Err(DirectoryError::already_exists(username.as_str()));
            }
        }

        let removed = file
            .delete_matching(&pattern)
            .map_err(|e| DirectoryError::write_failure("removing the previous line", e))?;

        if let Err(source) = file.append(&line) {
            if removed == 0 {
                return Err(DirectoryError::write_failure("appending", source));
            }
            self.forget(username);
            tracing::error!(user = %username, "previous line removed but replacement not written: {source}");
            return Err(DirectoryError::PartialWriteFailure {
                username: username.to_string(),
                source,
            });
        }

        self.remember(record.clone());
        tracing::info!(user = %username, replaced = removed > 0, "stored user record");
        Ok(record)
    }

    /// Apply `changes` to an existing user and return the stored result.
    ///
    /// The changes are applied to the line read under the file lock, not to
    /// the cached copy, so edits made through other handles are kept. A
    /// `username` change renames the record. The old line is removed and the
    /// new one appended under one lock; if the append fails the user is gone
    /// from the file and `PartialWriteFailure` is returned.
    pub fn update(&self, username: &Username, changes: &UserChanges) -> DirectoryResult<UserRecord> {
        if changes.is_empty() {
            return self
                .get(username)?
                .ok_or_else(|| DirectoryError::not_found(username.as_str()));
        }

        let old_key = key_pattern([username])?;
        let Some(mut file) = self
            .file
            .lock_existing()
            .map_err(|e| DirectoryError::write_failure("locking", e))?
        else {
            self.forget(username);
            return Err(DirectoryError::not_found(username.as_str()));
        };
        let contents = file.contents().map_err(DirectoryError::read_failure)?;

        let Some(current) = current_record(&contents, &old_key, username) else {
            self.forget(username);
            return Err(DirectoryError::not_found(username.as_str()));
        };
        let updated = changes.apply_to(current);
        updated.validate()?;
        let line = codec::encode(&updated);

        if &updated.username != username {
            let new_key = key_pattern([&updated.username])?;
            if contents.lines().any(|l| new_key.is_match(l)) {
                return Err(DirectoryError::already_exists(updated.username.as_str()));
            }
        }

        file.delete_matching(&old_key)
            .map_err(|e| DirectoryError::write_failure("removing the previous line", e))?;

        if let Err(source) = file.append(&line) {
            self.forget(username);
            tracing::error!(user = %username, "user line removed but not rewritten: {source}");
            return Err(DirectoryError::PartialWriteFailure {
                username: username.to_string(),
                source,
            });
        }

        self.forget(username);
        self.remember(updated.clone());
        tracing::info!(user = %username, renamed_to = %updated.username, "updated user record");
        Ok(updated)
    }

    /// Delete every listed user in a single rewrite.
    ///
    /// Unknown usernames are ignored. Returns how many users were removed; if
    /// the rewrite reports failure the count is recomputed from the file.
    pub fn delete<'a>(&self, usernames: impl IntoIterator<Item = &'a Username>) -> DirectoryResult<usize> {
        self.ensure_loaded()?;

        let targets: Vec<Username> = {
            let cache = self.read_cache();
            let Some(users) = cache.as_ref() else {
                return Ok(0);
            };
            let mut targets: Vec<Username> = usernames
                .into_iter()
                .filter(|u| users.contains_key(*u))
                .cloned()
                .collect();
            targets.sort();
            targets.dedup();
            targets
        };
        if targets.is_empty() {
            return Ok(0);
        }

        let pattern = key_pattern(&targets)?;
        let Some(mut file) = self
            .file
            .lock_existing()
            .map_err(|e| DirectoryError::write_failure("locking", e))?
        else {
            tracing::warn!("user file disappeared, nothing to delete");
            self.replace_cache("");
            return Ok(0);
        };

        match file.delete_matching(&pattern) {
            Ok(_) => {
                if let Some(users) = self.write_cache().as_mut() {
                    for username in &targets {
                        users.remove(username);
                    }
                }
                tracing::info!(count = targets.len(), "deleted users");
                Ok(targets.len())
            }
            Err(err) => {
                tracing::warn!("user file rewrite failed, recounting: {err}");
                let before = self.read_cache().as_ref().map_or(0, HashMap::len);
                let contents = file.contents().map_err(DirectoryError::read_failure)?;
                let after = self.replace_cache(&contents);
                Ok(before.saturating_sub(after))
            }
        }
    }

    fn ensure_loaded(&self) -> DirectoryResult<()> {
        if self.read_cache().is_none() {
            self.reload()?;
        }
        Ok(())
    }

    fn replace_cache(&self, contents: &str) -> usize {
        let decoded = codec::decode_all(contents);
        for (line, err) in &decoded.skipped {
            tracing::warn!(line, "skipping malformed user line: {err}");
        }

        let users: UserMap = decoded
            .records
            .into_iter()
            .map(|r| (r.username.clone(), r))
            .collect();
        let count = users.len();
        *self.write_cache() = Some(users);
        tracing::debug!(users = count, "loaded user directory");
        count
    }

    fn remember(&self, record: UserRecord) {
        if let Some(users) = self.write_cache().as_mut() {
            users.insert(record.username.clone(), record);
        }
    }

    fn forget(&self, username: &Username) {
        if let Some(users) = self.write_cache().as_mut() {
            users.remove(username);
        }
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, Option<UserMap>> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, Option<UserMap>> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The last well-formed line for `username`, as a later line shadows an
/// earlier one on load.
fn current_record(contents: &str, key: &Regex, username: &Username) -> Option<UserRecord> {
    contents
        .lines()
        .rev()
        .filter(|line| key.is_match(line))
        .filter_map(|line| codec::decode(line).ok().flatten())
        .find(|record| &record.username == username)
}

/// `^\s*(?:k1|k2|...):` with every key escaped. A key matches its own line
/// only, never a longer key it prefixes.
fn key_pattern<'a>(keys: impl IntoIterator<Item = &'a Username>) -> DirectoryResult<Regex> {
    let alternatives = keys
        .into_iter()
        .map(|k| regex::escape(k.as_str()))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"^\s*(?:{alternatives}):"))
        .map_err(|e| DirectoryError::invalid_input(format!("cannot build key pattern: {e}")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::file::MemoryFile;
    use proptest::prelude::*;

    const SEED: &str = "\
# test directory
alice:hash1:Alice:alice@x.org:eng,ops
carol:hash3:Carol:carol@x.org:
";

    fn user(name: &str) -> Username {
        Username::parse(name).unwrap()
    }

    fn store_with(contents: &str) -> (Arc<MemoryFile>, DirectoryStore<Arc<MemoryFile>>) {
        let file = Arc::new(MemoryFile::with_contents(contents));
        let store = DirectoryStore::new(Arc::clone(&file));
        (file, store)
    }

    fn lines_for(file: &MemoryFile, name: &str) -> usize {
        let prefix = format!("{name}:");
        file.contents().lines().filter(|l| l.starts_with(&prefix)).count()
    }

    #[test]
    fn get_loads_the_whole_file_once() {
        let (file, store) = store_with(SEED);

        let alice = store.get(&user("alice")).unwrap().unwrap();
        assert_eq!(alice.display_name, "Alice");
        assert_eq!(alice.groups.len(), 2);

        // Later writes by someone else are not seen without a reload.
        file.lock().unwrap().append("dave:h:Dave:d@x.org:").unwrap();
        assert!(store.get(&user("dave")).unwrap().is_none());
        assert_eq!(store.reload().unwrap(), 3);
        assert!(store.get(&user("dave")).unwrap().is_some());
    }

    #[test]
    fn reload_on_miss_picks_up_external_writes() {
        let file = Arc::new(MemoryFile::with_contents(SEED));
        let store = DirectoryStore::with_options(
            Arc::clone(&file),
            StoreOptions {
                reload_on_miss: true,
                ..StoreOptions::default()
            },
        );

        assert!(store.get(&user("dave")).unwrap().is_none());
        file.lock().unwrap().append("dave:h:Dave:d@x.org:").unwrap();
        assert!(store.get(&user("dave")).unwrap().is_some());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let (_file, store) = store_with("alice:h:Alice:a@x.org:\nnot a record\nbob:h:Bob:b@x.org:\n");
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn create_twice_keeps_exactly_one_line() {
        let (file, store) = store_with(SEED);
        let bob = user("bob");

        store
            .create(&bob, "h1", SyncedFields::new("Bob", "bob@x.org", ["ops"]))
            .unwrap();
        store
            .create(&bob, "h2", SyncedFields::new("Robert", "bob@x.org", ["eng"]))
            .unwrap();

        assert_eq!(lines_for(&file, "bob"), 1);
        let stored = store.get(&bob).unwrap().unwrap();
        assert_eq!(stored.display_name, "Robert");
        assert_eq!(stored.password_hash, "h2");
    }

    #[test]
    fn insert_only_rejects_existing_users() {
        let file = Arc::new(MemoryFile::with_contents(SEED));
        let store = DirectoryStore::with_options(
            Arc::clone(&file),
            StoreOptions {
                create_mode: CreateMode::InsertOnly,
                ..StoreOptions::default()
            },
        );

        let err = store
            .create(&user("alice"), "h", SyncedFields::default())
            .unwrap_err();
        assert!(matches!(err, DirectoryError::AlreadyExists(_)));
        assert_eq!(file.contents(), SEED);
    }

    #[test]
    fn create_rejects_unencodable_fields() {
        let (file, store) = store_with(SEED);
        let err = store
            .create(&user("bob"), "h", SyncedFields::new("Bob", "bob:x", Vec::<String>::new()))
            .unwrap_err();

        assert!(matches!(err, DirectoryError::InvalidInput(_)));
        assert_eq!(file.contents(), SEED);
    }

    #[test]
    fn update_changes_only_the_named_field() {
        let (file, store) = store_with(SEED);
        let alice = user("alice");

        let updated = store
            .update(&alice, &UserChanges::new().email("alice@new.org"))
            .unwrap();

        assert_eq!(updated.email, "alice@new.org");
        assert_eq!(updated.display_name, "Alice");
        assert_eq!(updated.password_hash, "hash1");
        assert_eq!(
            updated.groups.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["eng", "ops"]
        );
        assert!(file.contents().contains("alice:hash1:Alice:alice@new.org:eng,ops\n"));
        assert_eq!(lines_for(&file, "alice"), 1);
    }

    #[test]
    fn update_of_unknown_user_is_not_found() {
        let (_file, store) = store_with(SEED);
        let err = store
            .update(&user("zed"), &UserChanges::new().email("z@x.org"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn rename_moves_the_record() {
        let (file, store) = store_with(SEED);

        store
            .update(&user("carol"), &UserChanges::new().rename(user("caroline")))
            .unwrap();

        assert!(store.get(&user("carol")).unwrap().is_none());
        assert_eq!(
            store.get(&user("caroline")).unwrap().unwrap().password_hash,
            "hash3"
        );
        assert_eq!(lines_for(&file, "carol"), 0);
        assert_eq!(lines_for(&file, "caroline"), 1);
    }

    #[test]
    fn update_keeps_changes_made_through_another_handle() {
        let file = Arc::new(MemoryFile::with_contents("alice:h:Alice:alice@x.org:eng\n"));
        let first = DirectoryStore::new(Arc::clone(&file));
        let second = DirectoryStore::new(Arc::clone(&file));
        let alice = user("alice");
        first.get(&alice).unwrap();

        second
            .update(&alice, &UserChanges::new().email("alice@new.org"))
            .unwrap();
        let stored = first
            .update(&alice, &UserChanges::new().display_name("Alice B"))
            .unwrap();

        assert_eq!(stored.email, "alice@new.org");
        assert_eq!(file.contents(), "alice:h:Alice B:alice@new.org:eng\n");
        assert_eq!(first.get(&alice).unwrap().unwrap().email, "alice@new.org");
    }

    #[test]
    fn update_of_a_user_deleted_elsewhere_is_not_found() {
        let (file, store) = store_with(SEED);
        let carol = user("carol");
        store.get(&carol).unwrap();

        let other = DirectoryStore::new(Arc::clone(&file));
        assert_eq!(other.delete([&carol]).unwrap(), 1);

        let err = store
            .update(&carol, &UserChanges::new().email("carol@new.org"))
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(lines_for(&file, "carol"), 0);
        assert!(store.get(&carol).unwrap().is_none());
    }

    #[test]
    fn rename_onto_an_existing_user_is_refused() {
        let (file, store) = store_with(SEED);

        let err = store
            .update(&user("carol"), &UserChanges::new().rename(user("alice")))
            .unwrap_err();

        assert!(matches!(err, DirectoryError::AlreadyExists(_)));
        assert_eq!(file.contents(), SEED);
    }

    #[test]
    fn failed_append_after_delete_is_a_partial_write() {
        let (file, store) = store_with(SEED);
        let alice = user("alice");
        store.get(&alice).unwrap();

        file.fail_next_append();
        let err = store
            .update(&alice, &UserChanges::new().display_name("Alice B"))
            .unwrap_err();

        assert!(err.is_data_loss());
        assert_eq!(lines_for(&file, "alice"), 0);
        // The cache no longer pretends the record is intact.
        assert!(store.get(&alice).unwrap().is_none());
    }

    #[test]
    fn failed_append_on_fresh_create_is_a_plain_write_failure() {
        let (file, store) = store_with(SEED);
        file.fail_next_append();

        let err = store
            .create(&user("bob"), "h", SyncedFields::default())
            .unwrap_err();

        assert!(matches!(err, DirectoryError::StoreWriteFailure { .. }));
        assert_eq!(file.contents(), SEED);
    }

    #[test]
    fn failed_append_on_replacing_create_is_a_partial_write() {
        let (file, store) = store_with(SEED);
        file.fail_next_append();

        let err = store
            .create(&user("alice"), "h", SyncedFields::default())
            .unwrap_err();

        assert!(err.is_data_loss());
        assert_eq!(lines_for(&file, "alice"), 0);
    }

    #[test]
    fn bulk_delete_counts_only_existing_users() {
        let (file, store) = store_with(SEED);
        let (a, b, c) = (user("alice"), user("bob"), user("carol"));

        assert_eq!(store.delete([&a, &b, &c]).unwrap(), 2);

        assert!(store.get(&a).unwrap().is_none());
        assert!(store.get(&b).unwrap().is_none());
        assert!(store.get(&c).unwrap().is_none());
        assert_eq!(file.contents(), "# test directory\n");
    }

    #[test]
    fn deleting_nothing_is_a_no_op() {
        let (file, store) = store_with(SEED);
        let nobody: [&Username; 0] = [];
        assert_eq!(store.delete(nobody).unwrap(), 0);
        assert_eq!(store.delete([&user("nobody")]).unwrap(), 0);
        assert_eq!(file.contents(), SEED);
    }

    #[test]
    fn delete_never_touches_prefix_or_metacharacter_neighbours() {
        let (file, store) = store_with(
            "al:h:Al:al@x.org:\nalice:h:Alice:a@x.org:\na.c:h:AC:ac@x.org:\nabc:h:ABC:abc@x.org:\n",
        );

        assert_eq!(store.delete([&user("al"), &user("a.c")]).unwrap(), 2);

        assert_eq!(file.contents(), "alice:h:Alice:a@x.org:\nabc:h:ABC:abc@x.org:\n");
        assert!(store.get(&user("alice")).unwrap().is_some());
        assert!(store.get(&user("abc")).unwrap().is_some());
    }

    #[test]
    fn failed_rewrite_recounts_from_the_file() {
        let (file, store) = store_with(SEED);
        store.count().unwrap();

        file.fail_next_delete_after_write();
        assert_eq!(store.delete([&user("alice"), &user("carol")]).unwrap(), 2);

        let (file, store) = store_with(SEED);
        store.count().unwrap();

        file.fail_next_delete();
        assert_eq!(store.delete([&user("alice")]).unwrap(), 0);
        assert!(store.get(&user("alice")).unwrap().is_some());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: delete returns |requested ∩ present| and removes exactly those.
        #[test]
        fn delete_count_matches_intersection(
            present in prop::collection::btree_set("[a-e]{1,3}", 0..8),
            requested in prop::collection::btree_set("[a-e]{1,3}", 0..8)
        ) {
            let contents: String = present
                .iter()
                .map(|name| format!("{name}:h:{name}:{name}@x.org:g\n"))
                .collect();
            let (_file, store) = store_with(&contents);
            let requested: Vec<Username> = requested.iter().map(|n| user(n)).collect();

            let expected = requested.iter().filter(|u| present.contains(u.as_str())).count();
            prop_assert_eq!(store.delete(&requested).unwrap(), expected);
            prop_assert_eq!(store.count().unwrap(), present.len() - expected);
        }
    }
}
