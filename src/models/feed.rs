use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CATEGORY: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    pub url: String,
    pub title: Option<String>,
    pub category: String,
    pub etag: Option<String>,
    pub modified: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub added_at: DateTime<Utc>,
}

/// How a caller identifies the feed to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSelector {
    Id(i64),
    Url(String),
}

/// A failure while ingesting one feed. Never aborts the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedError {
    pub feed_id: i64,
    pub url: String,
    pub error: String,
}

/// Outcome of one ingestion run over every registered feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchSummary {
    pub feeds_total: usize,
    pub feeds_fetched: usize,
    pub entries_inserted: usize,
    pub entries_seen: usize,
    pub errors: Vec<FeedError>,
}

impl FetchSummary {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
