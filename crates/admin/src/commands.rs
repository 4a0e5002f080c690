//! Subcommand handlers.
//!
//! Handlers write their report to `out` so they can be driven from tests.

use std::io::Write;

use anyhow::{Context, Result, bail};

use fedsync_core::Username;
use fedsync_directory::credential::generate_placeholder;
use fedsync_directory::file::flat::DEFAULT_HEADER;
use fedsync_directory::{DirectoryStore, FlatFile, SyncedFields, UserChanges, UserRecord};

use crate::cli::{Command, ProfileArgs};

pub fn run(store: &DirectoryStore<FlatFile>, command: Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Init => init(store, out),
        Command::List { json } => list(store, json, out),
        Command::Show { username } => show(store, &username, out),
        Command::Add { username, profile } => add(store, &username, profile, out),
        Command::Set {
            username,
            rename,
            profile,
            clear_groups,
        } => set(store, &username, rename, profile, clear_groups, out),
        Command::Delete { usernames } => delete(store, &usernames, out),
    }
}

fn init(store: &DirectoryStore<FlatFile>, out: &mut impl Write) -> Result<()> {
    let path = store.file().path();
    let created = store
        .file()
        .create_if_missing(DEFAULT_HEADER)
        .with_context(|| format!("creating {}", path.display()))?;
    if created {
        writeln!(out, "created {}", path.display())?;
    } else {
        writeln!(out, "{} already exists", path.display())?;
    }
    Ok(())
}

fn list(store: &DirectoryStore<FlatFile>, json: bool, out: &mut impl Write) -> Result<()> {
    let records = store.list()?;
    if json {
        serde_json::to_writer_pretty(&mut *out, &records)?;
        writeln!(out)?;
        return Ok(());
    }

    for record in &records {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            record.username,
            record.display_name,
            record.email,
            join_groups(record)
        )?;
    }
    writeln!(out, "{} user(s)", records.len())?;
    Ok(())
}

fn show(store: &DirectoryStore<FlatFile>, username: &Username, out: &mut impl Write) -> Result<()> {
    let Some(record) = store.get(username)? else {
        bail!("user '{username}' not found");
    };
    print_record(&record, out)
}

fn add(
    store: &DirectoryStore<FlatFile>,
    username: &Username,
    profile: ProfileArgs,
    out: &mut impl Write,
) -> Result<()> {
    ensure_file(store)?;
    let fields = SyncedFields::new(
        profile.name.unwrap_or_default(),
        profile.mail.unwrap_or_default(),
        profile.groups,
    );
    let placeholder = generate_placeholder()?;
    let record = store.create(username, &placeholder, fields)?;
    writeln!(out, "added {}", record.username)?;
    Ok(())
}

fn set(
    store: &DirectoryStore<FlatFile>,
    username: &Username,
    rename: Option<Username>,
    profile: ProfileArgs,
    clear_groups: bool,
    out: &mut impl Write,
) -> Result<()> {
    let mut changes = UserChanges::new();
    if let Some(new_name) = rename {
        changes = changes.rename(new_name);
    }
    if let Some(name) = profile.name {
        changes = changes.display_name(name);
    }
    if let Some(mail) = profile.mail {
        changes = changes.email(mail);
    }
    if clear_groups {
        changes = changes.groups(Vec::<String>::new());
    } else if !profile.groups.is_empty() {
        changes = changes.groups(profile.groups);
    }
    if changes.is_empty() {
        bail!("nothing to change; pass --rename, --name, --mail, --group or --clear-groups");
    }

    let record = store.update(username, &changes)?;
    print_record(&record, out)
}

fn delete(store: &DirectoryStore<FlatFile>, usernames: &[Username], out: &mut impl Write) -> Result<()> {
    let removed = store.delete(usernames)?;
    writeln!(out, "deleted {removed} of {} user(s)", usernames.len())?;
    Ok(())
}

fn ensure_file(store: &DirectoryStore<FlatFile>) -> Result<()> {
    let path = store.file().path();
    store
        .file()
        .create_if_missing(DEFAULT_HEADER)
        .with_context(|| format!("creating {}", path.display()))?;
    Ok(())
}

fn print_record(record: &UserRecord, out: &mut impl Write) -> Result<()> {
    writeln!(out, "username: {}", record.username)?;
    writeln!(out, "name:     {}", record.display_name)?;
    writeln!(out, "mail:     {}", record.email)?;
    writeln!(out, "groups:   {}", join_groups(record))?;
    Ok(())
}

fn join_groups(record: &UserRecord) -> String {
    record.groups.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}
