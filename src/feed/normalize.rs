//! Pure helpers that turn a [`RawEntry`] into the values we store.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sha2::{Digest, Sha256};

use crate::models::NewEntry;

use super::types::RawEntry;

pub const MAX_TITLE_LEN: usize = 2000;
pub const MAX_LINK_LEN: usize = 4000;
pub const MAX_AUTHOR_LEN: usize = 1000;
pub const MAX_FEED_TITLE_LEN: usize = 500;

/// Dedup key for an entry: id, then guid, then link, then a hash of
/// `title|published`.
pub fn derive_identifier(entry: &RawEntry) -> String {
    let native = [&entry.id, &entry.guid, &entry.link]
        .into_iter()
        .flatten()
        .map(|v| v.trim())
        .find(|v| !v.is_empty());

    if let Some(value) = native {
        return value.to_string();
    }

    let title = entry.title.as_deref().unwrap_or("").trim();
    let published = entry.published_raw.as_deref().unwrap_or("").trim();
    let digest = Sha256::digest(format!("{}|{}", title, published).as_bytes());
    hex::encode(digest)
}

/// Trim, map empty to `None`, and hard-cut to `max_len` characters.
pub fn normalize_text(value: Option<&str>, max_len: Option<usize>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    match max_len {
        Some(max) if trimmed.chars().count() > max => Some(trimmed.chars().take(max).collect()),
        _ => Some(trimmed.to_string()),
    }
}

/// Published time, falling back to updated time, in UTC without sub-seconds.
pub fn derive_timestamp(entry: &RawEntry) -> Option<DateTime<Utc>> {
    entry
        .published
        .or(entry.updated)
        .map(|dt| dt.with_timezone(&Utc).trunc_subsecs(0))
}

pub fn pick_summary(entry: &RawEntry) -> Option<String> {
    [&entry.summary, &entry.subtitle]
        .into_iter()
        .flatten()
        .find(|v| !v.is_empty())
        .and_then(|v| normalize_text(Some(v.as_str()), None))
}

pub fn pick_content(entry: &RawEntry) -> Option<String> {
    normalize_text(entry.content.first().map(String::as_str), None)
}

pub fn normalize_entry(feed_id: i64, entry: &RawEntry, fetched_at: DateTime<Utc>) -> NewEntry {
    NewEntry {
        feed_id,
        guid: derive_identifier(entry),
        title: normalize_text(entry.title.as_deref(), Some(MAX_TITLE_LEN)),
        link: normalize_text(entry.link.as_deref(), Some(MAX_LINK_LEN)),
        author: normalize_text(entry.author.as_deref(), Some(MAX_AUTHOR_LEN)),
        published_at: derive_timestamp(entry),
        summary: pick_summary(entry),
        content: pick_content(entry),
        fetched_at: fetched_at.trunc_subsecs(0),
    }
}

/// Canonical stored form, e.g. `2024-01-02T03:04:05+00:00`. Every stored
/// instant uses it so string comparison is chronological.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.trunc_subsecs(0).to_rfc3339_opts(SecondsFormat::Secs, false)
}
