mod entry;
mod feed;
mod filter;

pub use entry::{Entry, NewEntry, TimeColumn};
pub use feed::{Feed, FeedError, FeedSelector, FetchSummary, DEFAULT_CATEGORY};
pub use filter::{FeedFilter, MatchField, NewFeedFilter};
