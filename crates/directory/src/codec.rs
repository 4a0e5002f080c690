//! Line codec for the user file.
//!
//! Layout: `username:password_hash:display_name:email:group,group,...`
//!
//! In `display_name` and every group name only the characters the layout
//! reserves are percent-escaped (`%`, `+`, the delimiters, the comment marker,
//! control characters, and whitespace that line trimming would eat), so a
//! line whose values avoid those characters is written back byte-for-byte.
//! On read, `+` is a space, as in form encoding. `username`, `password_hash`
//! and `email` are written verbatim; their producers guarantee they carry no
//! delimiter.

use std::borrow::Cow;

use thiserror::Error;

use fedsync_core::Username;

use crate::record::{GroupSet, UserRecord};

pub const FIELD_DELIMITER: char = ':';
pub const GROUP_DELIMITER: char = ',';
pub const COMMENT_MARKER: char = '#';

const FIELD_COUNT: usize = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("expected {FIELD_COUNT} fields, found {found}")]
    FieldCount { found: usize },

    #[error("invalid username '{0}'")]
    InvalidUsername(String),

    #[error("{field} is not valid percent-encoded UTF-8")]
    InvalidEncoding { field: &'static str },
}

/// Encode one record as a line (without the trailing newline).
pub fn encode(record: &UserRecord) -> String {
    let last = record.groups.len().saturating_sub(1);
    let groups = record
        .groups
        .iter()
        .enumerate()
        .map(|(idx, g)| encode_value(g, idx == last))
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "{}:{}:{}:{}:{}",
        record.username,
        record.password_hash,
        encode_value(&record.display_name, false),
        record.email,
        groups
    )
}

fn is_reserved(c: char) -> bool {
    matches!(c, '%' | '+' | FIELD_DELIMITER | GROUP_DELIMITER | COMMENT_MARKER) || c.is_control()
}

/// Escape reserved characters. `line_end` also escapes trailing whitespace,
/// which `decode` would otherwise trim off the line.
fn encode_value(value: &str, line_end: bool) -> String {
    let kept = if line_end { value.trim_end().len() } else { value.len() };
    let mut out = String::with_capacity(value.len());
    let mut buf = [0u8; 4];
    for (idx, c) in value.char_indices() {
        if idx >= kept || is_reserved(c) {
            out.push_str(&urlencoding::encode(c.encode_utf8(&mut buf)));
        } else {
            out.push(c);
        }
    }
    out
}

fn decode_value(raw: &str, field: &'static str) -> Result<String, CodecError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(Cow::into_owned)
        .map_err(|_| CodecError::InvalidEncoding { field })
}

/// Decode one line. Comment-only and blank lines yield `Ok(None)`.
pub fn decode(line: &str) -> Result<Option<UserRecord>, CodecError> {
    let content = match line.find(COMMENT_MARKER) {
        Some(idx) => &line[..idx],
        None => line,
    }
    .trim();
    if content.is_empty() {
        return Ok(None);
    }

    let fields: Vec<&str> = content.split(FIELD_DELIMITER).collect();
    let [username, password_hash, display_name, email, groups] = fields[..] else {
        return Err(CodecError::FieldCount {
            found: fields.len(),
        });
    };

    let username =
        Username::parse(username).map_err(|_| CodecError::InvalidUsername(username.to_string()))?;
    let display_name = decode_value(display_name, "display name")?;
    let groups = decode_groups(groups)?;

    Ok(Some(UserRecord {
        username,
        password_hash: password_hash.to_string(),
        display_name,
        email: email.to_string(),
        groups,
    }))
}

fn decode_groups(raw: &str) -> Result<GroupSet, CodecError> {
    raw.split(GROUP_DELIMITER)
        .filter(|g| !g.is_empty())
        .map(|g| decode_value(g, "group"))
        .collect()
}

/// Result of decoding a whole user file.
#[derive(Debug, Default)]
pub struct DecodedFile {
    /// Records in file order. A username repeated later in the file shadows
    /// the earlier line when collected into a map.
    pub records: Vec<UserRecord>,
    /// Malformed lines as `(1-based line number, error)`.
    pub skipped: Vec<(usize, CodecError)>,
}

/// Decode every line, skipping (not aborting on) malformed ones.
pub fn decode_all(text: &str) -> DecodedFile {
    let mut decoded = DecodedFile::default();
    for (idx, line) in text.lines().enumerate() {
        match decode(line) {
            Ok(Some(record)) => decoded.records.push(record),
            Ok(None) => {}
            Err(err) => decoded.skipped.push((idx + 1, err)),
        }
    }
    decoded
}
