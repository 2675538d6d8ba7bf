//! Human readable names for keys and groups.

use std::cmp::Ordering;

use crate::{trailing_chars, Key, KeyGroup, Protocol};

const FINGERPRINT_SUFFIX_LEN: usize = 8;

/// The name of the primary user id.
///
/// For S/MIME certificates without a name the e-mail is used instead.
pub fn display_name(key: &Key) -> String {
    let Some(uid) = key.primary_user_id() else {
        return String::new();
    };
    if uid.name.is_empty() && key.protocol() == Protocol::CMS {
        return uid.email.clone();
    }
    uid.name.clone()
}

/// The e-mail of the primary user id, or the first user id that has one.
pub fn display_email(key: &Key) -> String {
    key.user_ids()
        .iter()
        .find_map(|uid| uid.addr_spec())
        .unwrap_or_default()
}

/// A one-line summary like `Alice <alice@example.com> (89ab cdef)`.
pub fn name_and_email_for_summary_line(key: &Key) -> String {
    let name = display_name(key);
    let email = display_email(key);
    let mut line = match (name.is_empty(), email.is_empty()) {
        (false, false) if name != email => format!("{name} <{email}>"),
        (false, _) => name,
        (true, false) => email,
        (true, true) => String::new(),
    };
    if !line.is_empty() {
        line.push(' ');
    }
    line.push('(');
    line.push_str(&short_fingerprint(key));
    line.push(')');
    line
}

/// The last eight fingerprint digits, grouped by four.
pub fn short_fingerprint(key: &Key) -> String {
    let fingerprint = key.fingerprint().as_str();
    let suffix = trailing_chars(fingerprint, FINGERPRINT_SUFFIX_LEN);
    let tail = trailing_chars(suffix, 4);
    let head = &suffix[..suffix.len() - tail.len()];
    if head.is_empty() {
        tail.to_owned()
    } else {
        format!("{head} {tail}")
    }
}

pub fn group_display_name(group: &KeyGroup) -> String {
    if group.name.is_empty() {
        group.id.clone()
    } else {
        group.name.clone()
    }
}

/// Orders keys for display: by summary line ignoring case, then by fingerprint.
pub fn compare_keys_for_display(a: &Key, b: &Key) -> Ordering {
    let line_a = name_and_email_for_summary_line(a).to_lowercase();
    let line_b = name_and_email_for_summary_line(b).to_lowercase();
    line_a
        .cmp(&line_b)
        .then_with(|| a.fingerprint().cmp(b.fingerprint()))
}
