use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MatchField;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub feed_id: i64,
    pub guid: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl Entry {
    /// Publish time when known, otherwise the time it was first stored.
    pub fn display_time(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.fetched_at)
    }

    pub fn field(&self, field: MatchField) -> Option<&str> {
        match field {
            MatchField::Title => self.title.as_deref(),
            MatchField::Summary => self.summary.as_deref(),
            MatchField::Content => self.content.as_deref(),
        }
    }
}

/// A normalized entry ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub feed_id: i64,
    pub guid: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Which timestamp column a time window or recency ordering is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeColumn {
    #[default]
    Published,
    Fetched,
}

impl TimeColumn {
    pub fn from_use_published(use_published: bool) -> Self {
        if use_published {
            TimeColumn::Published
        } else {
            TimeColumn::Fetched
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            TimeColumn::Published => "published_at",
            TimeColumn::Fetched => "fetched_at",
        }
    }
}
