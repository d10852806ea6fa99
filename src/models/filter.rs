use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Entry fields a filter's keywords can be matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchField {
    Title,
    Summary,
    Content,
}

impl MatchField {
    pub const ALL: [MatchField; 3] = [MatchField::Title, MatchField::Summary, MatchField::Content];

    pub fn as_str(self) -> &'static str {
        match self {
            MatchField::Title => "title",
            MatchField::Summary => "summary",
            MatchField::Content => "content",
        }
    }
}

impl fmt::Display for MatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "title" => Ok(MatchField::Title),
            "summary" => Ok(MatchField::Summary),
            "content" => Ok(MatchField::Content),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedFilter {
    pub id: i64,
    pub feed_id: i64,
    pub name: String,
    pub include_keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
    pub match_fields: Vec<MatchField>,
    pub case_sensitive: bool,
    pub enabled: bool,
}

/// Filter definition as supplied by the user. Keyword and field lists are
/// raw text (comma-separated or a JSON array) and get validated on insert.
#[derive(Debug, Clone)]
pub struct NewFeedFilter {
    pub feed_id: i64,
    pub name: String,
    pub include_keywords: String,
    pub exclude_keywords: String,
    pub match_fields: String,
    pub case_sensitive: bool,
}

impl NewFeedFilter {
    pub fn new(feed_id: i64, name: impl Into<String>, include_keywords: impl Into<String>) -> Self {
        Self {
            feed_id,
            name: name.into(),
            include_keywords: include_keywords.into(),
            exclude_keywords: String::new(),
            match_fields: "title,summary,content".to_string(),
            case_sensitive: false,
        }
    }
}
