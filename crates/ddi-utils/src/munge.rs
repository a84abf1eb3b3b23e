//! Name and key munging for catalog identifiers and storage paths.

use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;

/// Maximum length of a catalog record name.
pub const MAX_NAME_LENGTH: usize = 100;

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ .:/]").unwrap());
static DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_-]").unwrap());

/// Characters escaped inside one storage key path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Turn a study identifier into a URL-safe record name.
///
/// Separators (` .:/`) become dashes, anything outside `[A-Za-z0-9_-]` is
/// dropped, and the result is lower-cased and capped at [`MAX_NAME_LENGTH`].
pub fn munge_name(identifier: &str) -> String {
    let dashed = SEPARATORS.replace_all(identifier.trim(), "-");
    let cleaned = DISALLOWED.replace_all(&dashed, "").to_lowercase();
    truncate_chars(&cleaned, MAX_NAME_LENGTH)
}

/// Keep at most `max` characters (not bytes) of `s`.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Percent-encode a `/`-separated storage key for use in a URL path.
pub fn encode_storage_key(key: &str) -> String {
    key.split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}
