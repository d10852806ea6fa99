//! Plain-text rendering for the command line.

use crate::feed::normalize::format_timestamp;
use crate::models::{Entry, Feed, FeedFilter, FetchSummary};

/// Render entries under a `=== YYYY-MM-DD ===` header whenever the day
/// changes. The day comes from the publish time, else the fetch time.
pub fn entries_grouped_by_day(entries: &[Entry]) -> String {
    let mut out = String::new();
    let mut last_day: Option<String> = None;

    for entry in entries {
        let when = format_timestamp(entry.display_time());
        let day = when[..10].to_string();
        if last_day.as_deref() != Some(day.as_str()) {
            out.push_str(&format!("\n=== {} ===\n", day));
            last_day = Some(day);
        }

        let title = entry.title.as_deref().unwrap_or("").replace('\n', " ");
        out.push_str(&format!("[{}] feed={} {}\n", when, entry.feed_id, title.trim()));
        if let Some(link) = &entry.link {
            out.push_str(&format!("  {}\n", link));
        }
    }
    out
}

fn sanitize_tsv_field(value: Option<&str>) -> String {
    value
        .unwrap_or("")
        .replace(['\t', '\n'], " ")
        .trim()
        .to_string()
}

/// `when<TAB>title<TAB>link`
pub fn entry_tsv(entry: &Entry) -> String {
    format!(
        "{}\t{}\t{}",
        format_timestamp(entry.display_time()),
        sanitize_tsv_field(entry.title.as_deref()),
        sanitize_tsv_field(entry.link.as_deref())
    )
}

pub fn feed_line(feed: &Feed) -> String {
    format!(
        "{}\t{}\t{}\t{}",
        feed.id,
        feed.category,
        feed.url,
        feed.title.as_deref().unwrap_or("")
    )
}

pub fn filter_line(filter: &FeedFilter) -> String {
    let fields: Vec<&str> = filter.match_fields.iter().map(|f| f.as_str()).collect();
    [
        filter.id.to_string(),
        filter.feed_id.to_string(),
        filter.name.clone(),
        filter.include_keywords.join(","),
        filter.exclude_keywords.join(","),
        fields.join(","),
        u8::from(filter.case_sensitive).to_string(),
        u8::from(filter.enabled).to_string(),
    ]
    .join("\t")
}

pub fn fetch_summary(summary: &FetchSummary) -> String {
    let mut out = format!(
        "Feeds total:    {}\nFeeds fetched:  {}\nEntries seen:   {}\nEntries new:    {}\n",
        summary.feeds_total, summary.feeds_fetched, summary.entries_seen, summary.entries_inserted
    );
    if summary.has_errors() {
        out.push_str("\nErrors:\n");
        for e in &summary.errors {
            out.push_str(&format!("- feed_id={} url={} error={}\n", e.feed_id, e.url, e.error));
        }
    }
    out
}
