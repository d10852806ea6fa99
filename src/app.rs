use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::config::Config;
use crate::db::{FeedUpdate, Repository};
use crate::error::Result;
use crate::feed::normalize::{normalize_entry, normalize_text, MAX_FEED_TITLE_LEN};
use crate::feed::{ConditionalToken, FeedSource, FetchStatus, FetchedFeed, HttpFeedSource};
use crate::models::{Feed, FeedError, FetchSummary};

pub struct App {
    pub repository: Repository,
    source: Arc<dyn FeedSource>,
    max_concurrent_fetches: usize,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Repository::open(config).await?;
        let source = Arc::new(HttpFeedSource::new(config)?);
        Ok(Self::with_source(repository, source, config.max_concurrent_fetches))
    }

    pub fn with_source(
        repository: Repository,
        source: Arc<dyn FeedSource>,
        max_concurrent_fetches: usize,
    ) -> Self {
        Self {
            repository,
            source,
            max_concurrent_fetches: max_concurrent_fetches.max(1),
        }
    }

    /// Fetch every registered feed and store what is new.
    ///
    /// Downloads overlap up to `max_concurrent_fetches`; each feed's results
    /// are then written in its own transaction, one feed at a time, in id
    /// order. A failing feed is recorded in the summary and never stops the
    /// run.
    pub async fn ingest_all(&self) -> Result<FetchSummary> {
        let mut feeds = self.repository.list_feeds().await?;
        feeds.sort_by_key(|f| f.id);

        let mut summary = FetchSummary {
            feeds_total: feeds.len(),
            ..FetchSummary::default()
        };

        let source = Arc::clone(&self.source);
        let mut fetches = stream::iter(feeds)
            .map(|feed| {
                let source = Arc::clone(&source);
                async move {
                    let token = ConditionalToken {
                        etag: feed.etag.clone(),
                        modified: feed.modified.clone(),
                    };
                    let result = source.fetch(&feed.url, &token).await;
                    (feed, result)
                }
            })
            .buffered(self.max_concurrent_fetches);

        while let Some((feed, fetched)) = fetches.next().await {
            let outcome = match fetched {
                Ok(fetched) => self.store_feed(&feed, fetched).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok((inserted, seen)) => {
                    tracing::debug!(
                        "Fetched {}: {} new of {} entries",
                        feed.url,
                        inserted,
                        seen
                    );
                    summary.feeds_fetched += 1;
                    summary.entries_inserted += inserted;
                    summary.entries_seen += seen;
                }
                Err(e) => {
                    tracing::warn!("Failed to ingest {}: {}", feed.url, e);
                    summary.errors.push(FeedError {
                        feed_id: feed.id,
                        url: feed.url.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(summary)
    }

    /// Returns `(inserted, seen)` for one feed.
    async fn store_feed(&self, feed: &Feed, fetched: FetchedFeed) -> Result<(usize, usize)> {
        let checked_at = Utc::now();
        let not_modified = fetched.status == FetchStatus::NotModified;

        let entries = if not_modified {
            Vec::new()
        } else {
            fetched
                .entries
                .iter()
                .map(|raw| normalize_entry(feed.id, raw, checked_at))
                .collect()
        };
        let seen = entries.len();

        let update = FeedUpdate {
            feed_id: feed.id,
            checked_at,
            token: ConditionalToken {
                etag: fetched.etag,
                modified: fetched.modified,
            },
            not_modified,
            title: normalize_text(fetched.title.as_deref(), Some(MAX_FEED_TITLE_LEN)),
            entries,
        };

        let inserted = self.repository.apply_feed_update(update).await?;
        Ok((inserted, seen))
    }
}
