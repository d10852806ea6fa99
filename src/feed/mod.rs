mod fetcher;
pub mod normalize;
mod types;

pub use fetcher::{FeedSource, HttpFeedSource};
pub use types::{ConditionalToken, FetchStatus, FetchedFeed, RawEntry};
