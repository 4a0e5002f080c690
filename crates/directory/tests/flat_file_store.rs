use std::sync::Arc;
use std::thread;

use fedsync_core::Username;
use fedsync_directory::file::flat::DEFAULT_HEADER;
use fedsync_directory::{DirectoryStore, FlatFile, SyncedFields, UserChanges, UserFile};

fn user(name: &str) -> Username {
    Username::parse(name).unwrap()
}

#[test]
fn records_survive_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.saml.conf");

    let file = FlatFile::new(&path);
    file.create_if_missing(DEFAULT_HEADER).unwrap();
    let store = DirectoryStore::new(file);
    store
        .create(
            &user("alice"),
            "hash1",
            SyncedFields::new("Alice Ämberg", "alice@x.org", ["eng", "ops, night"]),
        )
        .unwrap();
    store
        .update(&user("alice"), &UserChanges::new().email("alice@new.org"))
        .unwrap();

    let reopened = DirectoryStore::new(FlatFile::new(&path));
    let alice = reopened.get(&user("alice")).unwrap().unwrap();
    assert_eq!(alice.display_name, "Alice Ämberg");
    assert_eq!(alice.email, "alice@new.org");
    assert!(alice.groups.contains("ops, night"));

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with(DEFAULT_HEADER));
    assert_eq!(text.lines().filter(|l| l.starts_with("alice:")).count(), 1);
}

#[test]
fn concurrent_writers_never_lose_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.conf");

    // Two independent handles on the same path stand in for two processes;
    // they only share the advisory file lock.
    let handles: Vec<_> = (0..2)
        .map(|worker| {
            let path = path.clone();
            thread::spawn(move || {
                let store = Arc::new(DirectoryStore::new(FlatFile::new(path)));
                for i in 0..25 {
                    let name = user(&format!("w{worker}u{i}"));
                    store
                        .create(&name, "h", SyncedFields::new("", "", ["g"]))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let store = DirectoryStore::new(FlatFile::new(&path));
    assert_eq!(store.count().unwrap(), 50);

    let contents = store.file().lock().unwrap().contents().unwrap();
    assert_eq!(contents.lines().count(), 50);
}

#[test]
fn shared_store_serializes_threads() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DirectoryStore::new(FlatFile::new(dir.path().join("users.conf"))));

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..10 {
                    let name = user(&format!("t{worker}-{i}"));
                    store.create(&name, "h", SyncedFields::default()).unwrap();
                    store
                        .update(&name, &UserChanges::new().display_name(format!("T {worker} {i}")))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.reload().unwrap(), 40);
    let removed = store
        .delete(&(0..10).map(|i| user(&format!("t0-{i}"))).collect::<Vec<_>>())
        .unwrap();
    assert_eq!(removed, 10);
    assert_eq!(store.reload().unwrap(), 30);
}

#[test]
fn reads_of_a_missing_file_do_not_create_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.conf");
    let store = DirectoryStore::new(FlatFile::new(&path));

    assert!(store.get(&user("alice")).unwrap().is_none());
    assert!(store.list().unwrap().is_empty());
    assert!(store.update(&user("alice"), &UserChanges::new().email("a@x.org")).unwrap_err().is_not_found());
    assert!(!path.exists());

    store
        .create(&user("alice"), "h", SyncedFields::default())
        .unwrap();
    assert!(path.exists());
}
