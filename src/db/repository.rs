use std::path::Path;

use chrono::{DateTime, Days, NaiveDate, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, OptionalExtension, Row, Transaction};
use serde::de::DeserializeOwned;
use tokio_rusqlite::Connection;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::feed::normalize::format_timestamp;
use crate::feed::ConditionalToken;
use crate::filter;
use crate::models::{
    Entry, Feed, FeedFilter, FeedSelector, NewEntry, NewFeedFilter, TimeColumn, DEFAULT_CATEGORY,
};

use super::schema::{migrate, try_enable_fts};

const MAX_LIMIT: i64 = 500;

const FEED_COLUMNS: &str =
    "id, url, title, category, etag, modified, last_checked_at, added_at";

const ENTRY_COLUMNS: &str = "e.id, e.feed_id, e.guid, e.title, e.link, e.author, \
                             e.published_at, e.summary, e.content, e.fetched_at";

const FILTER_COLUMNS: &str = "id, feed_id, name, include_keywords, exclude_keywords, \
                              match_fields, case_sensitive, enabled";

/// Everything one fetch of one feed writes to the store.
#[derive(Debug, Clone)]
pub struct FeedUpdate {
    pub feed_id: i64,
    pub checked_at: DateTime<Utc>,
    pub token: ConditionalToken,
    pub not_modified: bool,
    pub title: Option<String>,
    pub entries: Vec<NewEntry>,
}

enum FilterInsert {
    Added(FeedFilter),
    MissingFeed,
    Duplicate,
}

pub struct Repository {
    conn: Connection,
    fts_enabled: bool,
}

impl Repository {
    pub async fn open(config: &Config) -> Result<Self> {
        Self::open_path(&config.db_path).await
    }

    pub async fn open_path(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path).await?;
        Self::init(conn, true).await
    }

    /// A private in-memory store. `force_degraded` skips the full-text
    /// index so the LIKE fallback can be exercised.
    pub async fn open_in_memory(force_degraded: bool) -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn, !force_degraded).await
    }

    async fn init(conn: Connection, with_fts: bool) -> Result<Self> {
        let fts_enabled = conn
            .call(move |conn| {
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                    row.get::<_, String>(0)
                })?;
                conn.pragma_update(None, "foreign_keys", true)?;

                for column in migrate(conn)? {
                    tracing::info!("Migrated database: added column {}", column);
                }

                Ok(with_fts && try_enable_fts(conn))
            })
            .await?;

        Ok(Self { conn, fts_enabled })
    }

    pub fn fts_enabled(&self) -> bool {
        self.fts_enabled
    }

    // Feed operations

    /// Register a feed. Re-registering an existing URL only updates its
    /// category, and only when a non-blank one is given.
    pub async fn add_feed(&self, url: &str, category: Option<&str>) -> Result<Feed> {
        let url = url.trim().to_string();
        if url.is_empty() {
            return Err(AppError::validation("Feed URL is empty."));
        }
        let category = category
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let now = format_timestamp(Utc::now());

        let feed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO feeds (url, category, added_at) VALUES (?1, ?2, ?3)",
                    params![url, category.as_deref().unwrap_or(DEFAULT_CATEGORY), now],
                )?;
                if let Some(category) = &category {
                    tx.execute(
                        "UPDATE feeds SET category = ?1 WHERE url = ?2",
                        params![category, url],
                    )?;
                }
                let feed = tx.query_row(
                    &format!("SELECT {} FROM feeds WHERE url = ?1", FEED_COLUMNS),
                    params![url],
                    feed_from_row,
                )?;
                tx.commit()?;
                Ok(feed)
            })
            .await?;
        Ok(feed)
    }

    pub async fn list_feeds(&self) -> Result<Vec<Feed>> {
        let feeds = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM feeds ORDER BY category, id",
                    FEED_COLUMNS
                ))?;
                let feeds = stmt
                    .query_map([], feed_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    pub async fn get_feed(&self, id: i64) -> Result<Option<Feed>> {
        let feed = self
            .conn
            .call(move |conn| {
                let feed = conn
                    .query_row(
                        &format!("SELECT {} FROM feeds WHERE id = ?1", FEED_COLUMNS),
                        params![id],
                        feed_from_row,
                    )
                    .optional()?;
                Ok(feed)
            })
            .await?;
        Ok(feed)
    }

    /// Delete a feed with its entries and filters. Returns the number of
    /// feeds removed, so `0` means no such feed.
    pub async fn delete_feed(&self, selector: FeedSelector) -> Result<usize> {
        let fts_enabled = self.fts_enabled;
        let deleted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let (where_sql, key) = match selector {
                    FeedSelector::Id(id) => ("id = ?1", Value::Integer(id)),
                    FeedSelector::Url(url) => ("url = ?1", Value::Text(url.trim().to_string())),
                };
                if fts_enabled {
                    tx.execute(
                        &format!(
                            "DELETE FROM entries_fts WHERE entry_id IN (
                                SELECT e.id FROM entries e JOIN feeds f ON f.id = e.feed_id WHERE f.{}
                            )",
                            where_sql
                        ),
                        params![key],
                    )?;
                }
                let deleted =
                    tx.execute(&format!("DELETE FROM feeds WHERE {}", where_sql), params![key])?;
                tx.commit()?;
                Ok(deleted)
            })
            .await?;
        Ok(deleted)
    }

    /// Record one fetch of a feed in a single transaction. Bookkeeping is
    /// always written; the title and entries only when content came back.
    /// Returns how many entries were new.
    pub async fn apply_feed_update(&self, update: FeedUpdate) -> Result<usize> {
        let fts_enabled = self.fts_enabled;
        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "UPDATE feeds SET last_checked_at = ?1, etag = COALESCE(?2, etag), modified = COALESCE(?3, modified) WHERE id = ?4",
                    params![
                        format_timestamp(update.checked_at),
                        update.token.etag,
                        update.token.modified,
                        update.feed_id,
                    ],
                )?;

                if update.not_modified {
                    tx.commit()?;
                    return Ok(0);
                }

                if let Some(title) = &update.title {
                    tx.execute(
                        "UPDATE feeds SET title = COALESCE(title, ?1) WHERE id = ?2",
                        params![title, update.feed_id],
                    )?;
                }

                let mut inserted = 0;
                for entry in &update.entries {
                    if insert_entry(&tx, entry, fts_enabled)? {
                        inserted += 1;
                    }
                }

                tx.commit()?;
                Ok(inserted)
            })
            .await?;
        Ok(inserted)
    }

    // Entry queries

    /// Entries whose chosen timestamp lies in `[start, end]`, newest first.
    /// Rows with no value in that column are left out.
    pub async fn updates_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        column: TimeColumn,
    ) -> Result<Vec<Entry>> {
        let col = column.column();
        let start = format_timestamp(start);
        let end = format_timestamp(end);

        let entries = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {cols} FROM entries e
                     WHERE e.{col} IS NOT NULL AND e.{col} BETWEEN ?1 AND ?2
                     ORDER BY COALESCE(e.published_at, e.fetched_at) DESC, e.id DESC",
                    cols = ENTRY_COLUMNS,
                    col = col,
                ))?;
                let entries = stmt
                    .query_map(params![start, end], entry_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }

    pub async fn updates_for_day(&self, day: NaiveDate, column: TimeColumn) -> Result<Vec<Entry>> {
        let (start, end) = day_bounds(day, day);
        self.updates_between(start, end, column).await
    }

    /// The last `days` UTC days including today. `days <= 0` yields nothing.
    pub async fn updates_last_n_days(&self, days: i64, column: TimeColumn) -> Result<Vec<Entry>> {
        self.updates_last_n_days_from(Utc::now().date_naive(), days, column)
            .await
    }

    pub async fn updates_last_n_days_from(
        &self,
        today: NaiveDate,
        days: i64,
        column: TimeColumn,
    ) -> Result<Vec<Entry>> {
        if days <= 0 {
            return Ok(Vec::new());
        }
        let first_day = today
            .checked_sub_days(Days::new((days - 1) as u64))
            .unwrap_or(NaiveDate::MIN);
        let (start, end) = day_bounds(first_day, today);
        self.updates_between(start, end, column).await
    }

    /// Latest entries of one feed, ordered by the chosen column with
    /// `fetched_at` standing in when it is empty.
    pub async fn recent_for_feed(
        &self,
        feed_id: i64,
        limit: i64,
        column: TimeColumn,
    ) -> Result<Vec<Entry>> {
        let col = column.column();
        let limit = clamp_limit(limit);

        let entries = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {cols} FROM entries e
                     WHERE e.feed_id = ?1
                     ORDER BY COALESCE(e.{col}, e.fetched_at) DESC, e.id DESC
                     LIMIT ?2",
                    cols = ENTRY_COLUMNS,
                    col = col,
                ))?;
                let entries = stmt
                    .query_map(params![feed_id, limit], entry_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }

    /// [`recent_for_feed`](Self::recent_for_feed) narrowed by the feed's
    /// enabled filters. A feed without enabled filters is returned as is.
    pub async fn filtered_recent_for_feed(
        &self,
        feed_id: i64,
        limit: i64,
        column: TimeColumn,
    ) -> Result<Vec<Entry>> {
        let entries = self.recent_for_feed(feed_id, limit, column).await?;
        let filters = self.list_filters(Some(feed_id), true).await?;
        Ok(entries
            .into_iter()
            .filter(|entry| filter::matches_any(entry, &filters))
            .collect())
    }

    /// Full-text search when FTS5 is available, otherwise a LIKE match on
    /// title and summary. A blank query returns nothing.
    pub async fn search(
        &self,
        query: &str,
        limit: i64,
        category: Option<&str>,
    ) -> Result<Vec<Entry>> {
        let query = query.trim().to_string();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let limit = clamp_limit(limit);
        let category = category
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let fts_enabled = self.fts_enabled;

        let entries = self
            .conn
            .call(move |conn| {
                if fts_enabled {
                    match search_fts(conn, &query, limit, category.as_deref()) {
                        Ok(entries) => return Ok(entries),
                        Err(e) => {
                            tracing::warn!("FTS query {:?} failed, using LIKE: {}", query, e);
                        }
                    }
                }
                Ok(search_like(conn, &query, limit, category.as_deref())?)
            })
            .await?;
        Ok(entries)
    }

    // Filter operations

    pub async fn add_filter(&self, new_filter: NewFeedFilter) -> Result<FeedFilter> {
        let name = new_filter.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::validation("Filter name is required."));
        }
        let include = filter::parse_keywords(&new_filter.include_keywords)?;
        if include.is_empty() {
            return Err(AppError::validation(
                "include_keywords must contain at least one keyword.",
            ));
        }
        let exclude = filter::parse_keywords(&new_filter.exclude_keywords)?;
        let fields = filter::parse_match_fields(&new_filter.match_fields)?;

        let feed_id = new_filter.feed_id;
        let case_sensitive = new_filter.case_sensitive;
        let include_json = serde_json::to_string(&include)?;
        let exclude_json = serde_json::to_string(&exclude)?;
        let fields_json = serde_json::to_string(&fields)?;
        let now = format_timestamp(Utc::now());
        let lookup_name = name.clone();

        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let feed_exists = tx
                    .query_row("SELECT 1 FROM feeds WHERE id = ?1", params![feed_id], |_| Ok(()))
                    .optional()?
                    .is_some();
                if !feed_exists {
                    return Ok(FilterInsert::MissingFeed);
                }

                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO feed_filters
                        (feed_id, name, include_keywords, exclude_keywords, match_fields, case_sensitive, enabled, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
                    params![feed_id, name, include_json, exclude_json, fields_json, case_sensitive, now],
                )?;
                if inserted == 0 {
                    return Ok(FilterInsert::Duplicate);
                }

                let filter = tx.query_row(
                    &format!("SELECT {} FROM feed_filters WHERE id = ?1", FILTER_COLUMNS),
                    params![tx.last_insert_rowid()],
                    filter_from_row,
                )?;
                tx.commit()?;
                Ok(FilterInsert::Added(filter))
            })
            .await?;

        match outcome {
            FilterInsert::Added(filter) => Ok(filter),
            FilterInsert::MissingFeed => Err(AppError::NotFound(format!(
                "Feed id {} does not exist.",
                feed_id
            ))),
            FilterInsert::Duplicate => Err(AppError::validation(format!(
                "Feed {} already has a filter named {:?}.",
                feed_id, lookup_name
            ))),
        }
    }

    pub async fn list_filters(
        &self,
        feed_id: Option<i64>,
        only_enabled: bool,
    ) -> Result<Vec<FeedFilter>> {
        let filters = self
            .conn
            .call(move |conn| {
                let mut clauses = Vec::new();
                let mut values = Vec::new();
                if let Some(feed_id) = feed_id {
                    clauses.push("feed_id = ?");
                    values.push(Value::Integer(feed_id));
                }
                if only_enabled {
                    clauses.push("enabled = 1");
                }
                let where_sql = if clauses.is_empty() {
                    String::new()
                } else {
                    format!("WHERE {}", clauses.join(" AND "))
                };

                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM feed_filters {} ORDER BY feed_id, id",
                    FILTER_COLUMNS, where_sql
                ))?;
                let filters = stmt
                    .query_map(params_from_iter(values), filter_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(filters)
            })
            .await?;
        Ok(filters)
    }

    /// Soft removal: the filter stays on record but stops applying.
    pub async fn disable_filter(&self, id: i64) -> Result<usize> {
        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE feed_filters SET enabled = 0 WHERE id = ?1",
                    params![id],
                )?)
            })
            .await?;
        Ok(changed)
    }

    pub async fn remove_filter(&self, id: i64) -> Result<usize> {
        let changed = self
            .conn
            .call(move |conn| Ok(conn.execute("DELETE FROM feed_filters WHERE id = ?1", params![id])?))
            .await?;
        Ok(changed)
    }
}

/// Insert unless `(feed_id, guid)` is already stored. New rows are mirrored
/// into the full-text index. Returns whether a row was created.
fn insert_entry(tx: &Transaction, entry: &NewEntry, fts_enabled: bool) -> rusqlite::Result<bool> {
    let changed = tx.execute(
        r#"INSERT OR IGNORE INTO entries
               (feed_id, guid, title, link, author, published_at, summary, content, fetched_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
        params![
            entry.feed_id,
            entry.guid,
            entry.title,
            entry.link,
            entry.author,
            entry.published_at.map(format_timestamp),
            entry.summary,
            entry.content,
            format_timestamp(entry.fetched_at),
        ],
    )?;
    if changed == 0 {
        return Ok(false);
    }

    if fts_enabled {
        tx.execute(
            "INSERT INTO entries_fts (entry_id, feed_id, title, summary, content) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                tx.last_insert_rowid(),
                entry.feed_id,
                entry.title.as_deref().unwrap_or(""),
                entry.summary.as_deref().unwrap_or(""),
                entry.content.as_deref().unwrap_or(""),
            ],
        )?;
    }
    Ok(true)
}

fn search_fts(
    conn: &rusqlite::Connection,
    query: &str,
    limit: i64,
    category: Option<&str>,
) -> rusqlite::Result<Vec<Entry>> {
    let mut values = vec![Value::Text(query.to_string())];
    let category_sql = match category {
        Some(category) => {
            values.push(Value::Text(category.to_string()));
            "AND f.category = ?"
        }
        None => "",
    };
    values.push(Value::Integer(limit));

    let mut stmt = conn.prepare(&format!(
        "SELECT {cols}
         FROM entries_fts
         JOIN entries e ON e.id = entries_fts.entry_id
         JOIN feeds f ON f.id = e.feed_id
         WHERE entries_fts MATCH ? {category_sql}
         ORDER BY bm25(entries_fts) ASC, COALESCE(e.published_at, e.fetched_at) DESC
         LIMIT ?",
        cols = ENTRY_COLUMNS,
        category_sql = category_sql,
    ))?;
    let entries = stmt
        .query_map(params_from_iter(values), entry_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

/// Degraded search: title and summary only; content is not scanned.
fn search_like(
    conn: &rusqlite::Connection,
    query: &str,
    limit: i64,
    category: Option<&str>,
) -> rusqlite::Result<Vec<Entry>> {
    let pattern = format!("%{}%", query);
    let mut values = vec![Value::Text(pattern.clone()), Value::Text(pattern)];
    let category_sql = match category {
        Some(category) => {
            values.push(Value::Text(category.to_string()));
            "AND f.category = ?"
        }
        None => "",
    };
    values.push(Value::Integer(limit));

    let mut stmt = conn.prepare(&format!(
        "SELECT {cols}
         FROM entries e
         JOIN feeds f ON f.id = e.feed_id
         WHERE (e.title LIKE ? OR e.summary LIKE ?) {category_sql}
         ORDER BY COALESCE(e.published_at, e.fetched_at) DESC, e.id DESC
         LIMIT ?",
        cols = ENTRY_COLUMNS,
        category_sql = category_sql,
    ))?;
    let entries = stmt
        .query_map(params_from_iter(values), entry_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, MAX_LIMIT)
}

/// `[first 00:00:00Z, last 23:59:59Z]`
fn day_bounds(first: NaiveDate, last: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = first.and_time(chrono::NaiveTime::MIN).and_utc();
    let end = last
        .and_hms_opt(23, 59, 59)
        .map(|dt| dt.and_utc())
        .unwrap_or(start);
    (start, end)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn feed_from_row(row: &Row) -> rusqlite::Result<Feed> {
    Ok(Feed {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        category: row.get(3)?,
        etag: row.get(4)?,
        modified: row.get(5)?,
        last_checked_at: row
            .get::<_, Option<String>>(6)?
            .and_then(|s| parse_datetime(&s)),
        added_at: row
            .get::<_, String>(7)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    })
}

fn entry_from_row(row: &Row) -> rusqlite::Result<Entry> {
    Ok(Entry {
        id: row.get(0)?,
        feed_id: row.get(1)?,
        guid: row.get(2)?,
        title: row.get(3)?,
        link: row.get(4)?,
        author: row.get(5)?,
        published_at: row
            .get::<_, Option<String>>(6)?
            .and_then(|s| parse_datetime(&s)),
        summary: row.get(7)?,
        content: row.get(8)?,
        fetched_at: row
            .get::<_, String>(9)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    })
}

fn filter_from_row(row: &Row) -> rusqlite::Result<FeedFilter> {
    Ok(FeedFilter {
        id: row.get(0)?,
        feed_id: row.get(1)?,
        name: row.get(2)?,
        include_keywords: json_column(row, 3)?,
        exclude_keywords: json_column(row, 4)?,
        match_fields: json_column(row, 5)?,
        case_sensitive: row.get::<_, i64>(6)? != 0,
        enabled: row.get::<_, i64>(7)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn new_entry(feed_id: i64, guid: &str, title: &str, published: Option<DateTime<Utc>>) -> NewEntry {
        NewEntry {
            feed_id,
            guid: guid.to_string(),
            title: Some(title.to_string()),
            link: Some(format!("https://example.com/{}", guid)),
            author: None,
            published_at: published,
            summary: None,
            content: None,
            fetched_at: at(2024, 3, 10, 12),
        }
    }

    fn update(feed_id: i64, entries: Vec<NewEntry>) -> FeedUpdate {
        FeedUpdate {
            feed_id,
            checked_at: at(2024, 3, 10, 12),
            token: ConditionalToken::default(),
            not_modified: false,
            title: None,
            entries,
        }
    }

    async fn fts_rows(repo: &Repository) -> i64 {
        repo.conn
            .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM entries_fts", [], |row| row.get(0))?))
            .await
            .unwrap()
    }

    async fn repo_with_feed() -> (Repository, Feed) {
        let repo = Repository::open_in_memory(false).await.unwrap();
        let feed = repo.add_feed("https://example.com/rss", Some("news")).await.unwrap();
        (repo, feed)
    }

    #[tokio::test]
    async fn add_feed_is_idempotent_and_updates_category() {
        let repo = Repository::open_in_memory(false).await.unwrap();
        let first = repo.add_feed("https://example.com/rss", Some("news")).await.unwrap();
        let second = repo.add_feed(" https://example.com/rss ", Some("dev")).await.unwrap();
        assert_eq!(first.id, second.id);

        let untouched = repo.add_feed("https://example.com/rss", Some("  ")).await.unwrap();
        assert_eq!(untouched.category, "dev");

        let feeds = repo.list_feeds().await.unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].category, "dev");
        assert_eq!(feeds[0].title, None);
    }

    #[tokio::test]
    async fn add_feed_defaults_category_and_rejects_empty_url() {
        let repo = Repository::open_in_memory(false).await.unwrap();
        let feed = repo.add_feed("https://a.example/feed", None).await.unwrap();
        assert_eq!(feed.category, "default");

        let err = repo.add_feed("   ", None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn duplicate_entries_are_ignored() {
        let (repo, feed) = repo_with_feed().await;
        let entries = vec![
            new_entry(feed.id, "a", "First", Some(at(2024, 3, 9, 8))),
            new_entry(feed.id, "b", "Second", None),
        ];

        assert_eq!(repo.apply_feed_update(update(feed.id, entries.clone())).await.unwrap(), 2);
        assert_eq!(repo.apply_feed_update(update(feed.id, entries)).await.unwrap(), 0);
        assert_eq!(repo.recent_for_feed(feed.id, 50, TimeColumn::Published).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn feed_title_is_first_write_wins() {
        let (repo, feed) = repo_with_feed().await;

        let mut first = update(feed.id, Vec::new());
        first.title = Some("Original".into());
        first.token.etag = Some("\"v1\"".into());
        repo.apply_feed_update(first).await.unwrap();

        let mut second = update(feed.id, Vec::new());
        second.title = Some("Renamed".into());
        repo.apply_feed_update(second).await.unwrap();

        let stored = repo.get_feed(feed.id).await.unwrap().unwrap();
        assert_eq!(stored.title.as_deref(), Some("Original"));
        assert_eq!(stored.etag.as_deref(), Some("\"v1\""));
        assert_eq!(stored.last_checked_at, Some(at(2024, 3, 10, 12)));
    }

    #[tokio::test]
    async fn not_modified_only_touches_bookkeeping() {
        let (repo, feed) = repo_with_feed().await;
        let mut up = update(feed.id, vec![new_entry(feed.id, "a", "First", None)]);
        up.not_modified = true;
        up.title = Some("Ignored".into());
        up.token.etag = Some("\"v2\"".into());

        assert_eq!(repo.apply_feed_update(up).await.unwrap(), 0);
        let stored = repo.get_feed(feed.id).await.unwrap().unwrap();
        assert_eq!(stored.title, None);
        assert_eq!(stored.etag.as_deref(), Some("\"v2\""));
        assert!(repo.recent_for_feed(feed.id, 10, TimeColumn::Published).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_feed_cascades() {
        let (repo, feed) = repo_with_feed().await;
        repo.apply_feed_update(update(feed.id, vec![new_entry(feed.id, "a", "Rust news", None)]))
            .await
            .unwrap();
        repo.add_filter(NewFeedFilter::new(feed.id, "rust", "rust")).await.unwrap();

        assert_eq!(repo.delete_feed(FeedSelector::Id(feed.id)).await.unwrap(), 1);
        assert!(repo.recent_for_feed(feed.id, 10, TimeColumn::Published).await.unwrap().is_empty());
        assert!(repo.list_filters(Some(feed.id), false).await.unwrap().is_empty());
        assert!(repo.search("rust", 10, None).await.unwrap().is_empty());
        assert_eq!(fts_rows(&repo).await, 0);

        assert_eq!(repo.delete_feed(FeedSelector::Id(feed.id)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_feed_by_url() {
        let (repo, _feed) = repo_with_feed().await;
        assert_eq!(
            repo.delete_feed(FeedSelector::Url("https://example.com/rss".into())).await.unwrap(),
            1
        );
        assert!(repo.list_feeds().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn day_window_excludes_missing_timestamps() {
        let (repo, feed) = repo_with_feed().await;
        repo.apply_feed_update(update(
            feed.id,
            vec![
                new_entry(feed.id, "early", "Early", Some(at(2024, 3, 9, 0))),
                new_entry(feed.id, "late", "Late", Some(Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 59).unwrap())),
                new_entry(feed.id, "next", "Next day", Some(at(2024, 3, 10, 0))),
                new_entry(feed.id, "none", "No date", None),
            ],
        ))
        .await
        .unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let entries = repo.updates_for_day(day, TimeColumn::Published).await.unwrap();
        let guids: Vec<_> = entries.iter().map(|e| e.guid.as_str()).collect();
        assert_eq!(guids, vec!["late", "early"]);

        let by_fetch = repo
            .updates_for_day(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(), TimeColumn::Fetched)
            .await
            .unwrap();
        assert_eq!(by_fetch.len(), 4);
    }

    #[tokio::test]
    async fn last_n_days_window() {
        let (repo, feed) = repo_with_feed().await;
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        repo.apply_feed_update(update(
            feed.id,
            vec![
                new_entry(feed.id, "today", "Today", Some(at(2024, 3, 10, 6))),
                new_entry(feed.id, "yesterday", "Yesterday", Some(at(2024, 3, 9, 6))),
                new_entry(feed.id, "two", "Two days ago", Some(at(2024, 3, 8, 6))),
                new_entry(feed.id, "three", "Three days ago", Some(at(2024, 3, 7, 6))),
            ],
        ))
        .await
        .unwrap();

        let one = repo.updates_last_n_days_from(today, 1, TimeColumn::Published).await.unwrap();
        assert_eq!(one.iter().map(|e| e.guid.as_str()).collect::<Vec<_>>(), vec!["today"]);

        let three = repo.updates_last_n_days_from(today, 3, TimeColumn::Published).await.unwrap();
        assert_eq!(
            three.iter().map(|e| e.guid.as_str()).collect::<Vec<_>>(),
            vec!["today", "yesterday", "two"]
        );

        assert!(repo.updates_last_n_days_from(today, 0, TimeColumn::Published).await.unwrap().is_empty());
        assert!(repo.updates_last_n_days_from(today, -2, TimeColumn::Published).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recent_orders_with_fetch_fallback_and_clamps_limit() {
        let (repo, feed) = repo_with_feed().await;
        let mut entries: Vec<NewEntry> = (0..5)
            .map(|i| new_entry(feed.id, &format!("e{}", i), "x", Some(at(2024, 3, 1, 0) + Duration::hours(i))))
            .collect();
        // No publish date: ordered by its fetch time, which is the newest.
        entries.push(new_entry(feed.id, "undated", "x", None));
        repo.apply_feed_update(update(feed.id, entries)).await.unwrap();

        let recent = repo.recent_for_feed(feed.id, 2, TimeColumn::Published).await.unwrap();
        assert_eq!(recent.iter().map(|e| e.guid.as_str()).collect::<Vec<_>>(), vec!["undated", "e4"]);

        let clamped = repo.recent_for_feed(feed.id, 0, TimeColumn::Published).await.unwrap();
        assert_eq!(clamped.len(), 1);

        let all = repo.recent_for_feed(feed.id, 10_000, TimeColumn::Published).await.unwrap();
        assert_eq!(all.len(), 6);
    }

    async fn seed_search(repo: &Repository) -> (Feed, Feed) {
        let news = repo.add_feed("https://news.example/rss", Some("news")).await.unwrap();
        let dev = repo.add_feed("https://dev.example/rss", Some("dev")).await.unwrap();

        let mut tokio_post = new_entry(dev.id, "tokio", "Async runtimes compared", Some(at(2024, 3, 2, 0)));
        tokio_post.summary = Some("A look at tokio internals".into());
        let mut hidden = new_entry(dev.id, "hidden", "Weekly digest", Some(at(2024, 3, 3, 0)));
        hidden.content = Some("deep dive into tokio scheduling".into());
        let headline = new_entry(news.id, "headline", "Tokio release announced", Some(at(2024, 3, 1, 0)));

        repo.apply_feed_update(update(dev.id, vec![tokio_post, hidden])).await.unwrap();
        repo.apply_feed_update(update(news.id, vec![headline])).await.unwrap();
        (news, dev)
    }

    #[tokio::test]
    async fn blank_search_returns_nothing() {
        let repo = Repository::open_in_memory(false).await.unwrap();
        seed_search(&repo).await;
        assert!(repo.search("", 50, None).await.unwrap().is_empty());
        assert!(repo.search("   ", 50, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fts_search_covers_content_and_category() {
        let repo = Repository::open_in_memory(false).await.unwrap();
        assert!(repo.fts_enabled());
        seed_search(&repo).await;

        let hits = repo.search("tokio", 50, None).await.unwrap();
        assert_eq!(hits.len(), 3);

        let dev_only = repo.search("tokio", 50, Some("dev")).await.unwrap();
        assert_eq!(dev_only.len(), 2);
        assert!(dev_only.iter().all(|e| e.guid != "headline"));

        assert_eq!(repo.search("tokio", 1, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn like_fallback_skips_content() {
        let repo = Repository::open_in_memory(true).await.unwrap();
        assert!(!repo.fts_enabled());
        seed_search(&repo).await;

        let hits = repo.search("tokio", 50, None).await.unwrap();
        let guids: Vec<_> = hits.iter().map(|e| e.guid.as_str()).collect();
        assert_eq!(guids, vec!["tokio", "headline"]);

        let news_only = repo.search("tokio", 50, Some("news")).await.unwrap();
        assert_eq!(news_only.len(), 1);
        assert_eq!(news_only[0].guid, "headline");
    }

    #[tokio::test]
    async fn filter_lifecycle() {
        let (repo, feed) = repo_with_feed().await;
        repo.apply_feed_update(update(
            feed.id,
            vec![
                new_entry(feed.id, "1", "AI startup raises seed", Some(at(2024, 3, 1, 0))),
                new_entry(feed.id, "2", "AI startup raises Series B", Some(at(2024, 3, 2, 0))),
                new_entry(feed.id, "3", "Gardening tips", Some(at(2024, 3, 3, 0))),
            ],
        ))
        .await
        .unwrap();

        let mut new_filter = NewFeedFilter::new(feed.id, "ai-startups", "ai,startup");
        new_filter.exclude_keywords = "seed".into();
        new_filter.match_fields = "title".into();
        let added = repo.add_filter(new_filter).await.unwrap();
        assert_eq!(added.include_keywords, vec!["ai", "startup"]);
        assert!(added.enabled);

        let filtered = repo.filtered_recent_for_feed(feed.id, 50, TimeColumn::Published).await.unwrap();
        assert_eq!(filtered.iter().map(|e| e.guid.as_str()).collect::<Vec<_>>(), vec!["2"]);

        assert_eq!(repo.disable_filter(added.id).await.unwrap(), 1);
        assert_eq!(repo.list_filters(Some(feed.id), true).await.unwrap().len(), 0);
        assert_eq!(repo.list_filters(Some(feed.id), false).await.unwrap().len(), 1);

        let unfiltered = repo.filtered_recent_for_feed(feed.id, 50, TimeColumn::Published).await.unwrap();
        assert_eq!(unfiltered.len(), 3);

        assert_eq!(repo.remove_filter(added.id).await.unwrap(), 1);
        assert_eq!(repo.remove_filter(added.id).await.unwrap(), 0);
        assert_eq!(repo.disable_filter(9999).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn add_filter_validation() {
        let (repo, feed) = repo_with_feed().await;

        let err = repo.add_filter(NewFeedFilter::new(feed.id, "  ", "ai")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = repo.add_filter(NewFeedFilter::new(feed.id, "empty", " , ")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let mut bad_fields = NewFeedFilter::new(feed.id, "bad", "ai");
        bad_fields.match_fields = "title,body".into();
        assert!(matches!(repo.add_filter(bad_fields).await, Err(AppError::Validation(_))));

        let err = repo.add_filter(NewFeedFilter::new(424242, "orphan", "ai")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        repo.add_filter(NewFeedFilter::new(feed.id, "dup", "ai")).await.unwrap();
        let err = repo.add_filter(NewFeedFilter::new(feed.id, "dup", "ml")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn opening_a_legacy_file_migrates_without_data_loss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("legacy.db");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute_batch(
                r#"
                CREATE TABLE feeds (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    url TEXT NOT NULL UNIQUE,
                    title TEXT,
                    etag TEXT,
                    added_at TEXT NOT NULL,
                    last_checked_at TEXT
                );
                INSERT INTO feeds (url, title, added_at)
                VALUES ('https://old.example/rss', 'Old feed', '2023-01-01T00:00:00+00:00');
                "#,
            )
            .unwrap();
        }

        let repo = Repository::open_path(path.to_str().unwrap()).await.unwrap();
        let feeds = repo.list_feeds().await.unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].title.as_deref(), Some("Old feed"));
        assert_eq!(feeds[0].category, "default");
        assert_eq!(feeds[0].modified, None);
    }

    #[tokio::test]
    async fn opening_a_trigger_mirrored_store_keeps_flags_and_indexes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirrored.db");
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute_batch(
                r#"
                CREATE TABLE feeds (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    url TEXT NOT NULL UNIQUE,
                    title TEXT,
                    category TEXT NOT NULL DEFAULT 'default',
                    etag TEXT,
                    modified TEXT,
                    added_at TEXT NOT NULL,
                    last_checked_at TEXT
                );
                CREATE TABLE entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                    guid TEXT NOT NULL,
                    title TEXT,
                    link TEXT,
                    author TEXT,
                    published_at TEXT,
                    summary TEXT,
                    content TEXT,
                    fetched_at TEXT NOT NULL,
                    UNIQUE(feed_id, guid)
                );
                CREATE TABLE feed_filters (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    include_keywords TEXT NOT NULL DEFAULT '[]',
                    exclude_keywords TEXT NOT NULL DEFAULT '[]',
                    match_fields TEXT NOT NULL DEFAULT '["title","summary","content"]',
                    is_case_sensitive INTEGER NOT NULL DEFAULT 0,
                    is_enabled INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL,
                    UNIQUE(feed_id, name)
                );
                CREATE INDEX idx_feed_filters_enabled ON feed_filters(is_enabled);
                CREATE VIRTUAL TABLE entries_fts USING fts5(
                    title, summary, content,
                    entry_id UNINDEXED, feed_id UNINDEXED,
                    published_at UNINDEXED, fetched_at UNINDEXED
                );
                CREATE TRIGGER entries_ai AFTER INSERT ON entries BEGIN
                    INSERT INTO entries_fts(entry_id, feed_id, published_at, fetched_at, title, summary, content)
                    VALUES (new.id, new.feed_id, new.published_at, new.fetched_at,
                            COALESCE(new.title, ''), COALESCE(new.summary, ''), COALESCE(new.content, ''));
                END;
                CREATE TRIGGER entries_ad AFTER DELETE ON entries BEGIN
                    DELETE FROM entries_fts WHERE entry_id = old.id;
                END;
                INSERT INTO feeds (url, added_at) VALUES ('https://old.example/rss', '2023-01-01T00:00:00+00:00');
                INSERT INTO feed_filters (feed_id, name, include_keywords, is_enabled, created_at)
                VALUES (1, 'muted', '["ai"]', 0, '2023-01-01T00:00:00+00:00');
                "#,
            )
            .unwrap();
        }

        let repo = Repository::open_path(path.to_str().unwrap()).await.unwrap();
        assert!(repo.fts_enabled());
        assert!(repo.list_filters(Some(1), true).await.unwrap().is_empty());
        assert_eq!(repo.list_filters(Some(1), false).await.unwrap().len(), 1);

        repo.apply_feed_update(update(1, vec![new_entry(1, "a", "rust news", None)]))
            .await
            .unwrap();
        assert_eq!(repo.search("rust", 10, None).await.unwrap().len(), 1);
        assert_eq!(fts_rows(&repo).await, 1);
    }
}
