use rusqlite::Connection;

pub const SCHEMA: &str = r#"
-- feeds table
CREATE TABLE IF NOT EXISTS feeds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    title TEXT,
    category TEXT NOT NULL DEFAULT 'default',
    etag TEXT,
    modified TEXT,
    added_at TEXT NOT NULL,
    last_checked_at TEXT
);

-- entries table
CREATE TABLE IF NOT EXISTS entries (
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

CREATE INDEX IF NOT EXISTS idx_entries_published_at ON entries(published_at);
CREATE INDEX IF NOT EXISTS idx_entries_fetched_at ON entries(fetched_at);

-- feed_filters table
CREATE TABLE IF NOT EXISTS feed_filters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    include_keywords TEXT NOT NULL DEFAULT '[]',
    exclude_keywords TEXT NOT NULL DEFAULT '[]',
    match_fields TEXT NOT NULL DEFAULT '["title","summary","content"]',
    case_sensitive INTEGER NOT NULL DEFAULT 0,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    UNIQUE(feed_id, name)
);

CREATE INDEX IF NOT EXISTS idx_feed_filters_feed_id ON feed_filters(feed_id);
"#;

/// Indexes on columns that older databases may only get through a migration.
pub const LATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_feeds_category ON feeds(category);
CREATE INDEX IF NOT EXISTS idx_feed_filters_enabled ON feed_filters(enabled);
"#;

/// Optional full-text index. Rows are written by the repository alongside
/// each entry insert and removed before the owning feed is deleted. Older
/// stores mirrored through triggers; those are dropped so rows are not
/// indexed twice.
pub const FTS_SCHEMA: &str = r#"
DROP TRIGGER IF EXISTS entries_ai;
DROP TRIGGER IF EXISTS entries_ad;
DROP TRIGGER IF EXISTS entries_au;

CREATE VIRTUAL TABLE IF NOT EXISTS entries_fts USING fts5(
    title,
    summary,
    content,
    entry_id UNINDEXED,
    feed_id UNINDEXED
);
"#;

/// A column added after the first release.
struct AddedColumn {
    table: &'static str,
    column: &'static str,
    definition: &'static str,
    /// Older name of the same flag; its values are copied over when present.
    legacy: Option<&'static str>,
}

const ADDED_COLUMNS: &[AddedColumn] = &[
    AddedColumn {
        table: "feeds",
        column: "category",
        definition: "TEXT NOT NULL DEFAULT 'default'",
        legacy: None,
    },
    AddedColumn {
        table: "feeds",
        column: "modified",
        definition: "TEXT",
        legacy: None,
    },
    AddedColumn {
        table: "feed_filters",
        column: "case_sensitive",
        definition: "INTEGER NOT NULL DEFAULT 0",
        legacy: Some("is_case_sensitive"),
    },
    AddedColumn {
        table: "feed_filters",
        column: "enabled",
        definition: "INTEGER NOT NULL DEFAULT 1",
        legacy: Some("is_enabled"),
    },
];

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

/// Create missing tables, then add any columns an older database lacks.
/// Returns the migrations that were applied.
pub fn migrate(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    conn.execute_batch(SCHEMA)?;

    let mut applied = Vec::new();
    for added in ADDED_COLUMNS {
        let columns = table_columns(conn, added.table)?;
        if columns.iter().any(|c| c == added.column) {
            continue;
        }

        conn.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            added.table, added.column, added.definition
        ))?;
        if let Some(legacy) = added.legacy.filter(|l| columns.iter().any(|c| c == l)) {
            conn.execute_batch(&format!(
                "UPDATE {} SET {} = {}",
                added.table, added.column, legacy
            ))?;
        }
        applied.push(format!("{}.{}", added.table, added.column));
    }

    conn.execute_batch(LATE_INDEXES)?;
    Ok(applied)
}

/// Try to provision the FTS5 index. `false` means the SQLite build lacks it.
pub fn try_enable_fts(conn: &Connection) -> bool {
    match conn.execute_batch(FTS_SCHEMA) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Full-text search unavailable, falling back to LIKE: {}", e);
            false
        }
    }
}
