use chrono::{DateTime, FixedOffset};

/// Validators from the previous fetch, replayed so the server can answer 304.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalToken {
    pub etag: Option<String>,
    pub modified: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Fetched,
    NotModified,
}

/// What a [`FeedSource`](super::FeedSource) hands back for one URL.
#[derive(Debug, Clone)]
pub struct FetchedFeed {
    pub status: FetchStatus,
    pub etag: Option<String>,
    pub modified: Option<String>,
    pub title: Option<String>,
    pub entries: Vec<RawEntry>,
}

impl FetchedFeed {
    pub fn not_modified() -> Self {
        Self {
            status: FetchStatus::NotModified,
            etag: None,
            modified: None,
            title: None,
            entries: Vec::new(),
        }
    }
}

/// One item as the parser saw it. Every field is optional; nothing is
/// trimmed or validated yet.
#[derive(Debug, Clone, Default)]
pub struct RawEntry {
    pub id: Option<String>,
    pub guid: Option<String>,
    pub link: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub published: Option<DateTime<FixedOffset>>,
    pub updated: Option<DateTime<FixedOffset>>,
    pub published_raw: Option<String>,
    pub summary: Option<String>,
    pub subtitle: Option<String>,
    pub content: Vec<String>,
}
