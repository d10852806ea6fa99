//! Saved keyword filters: parsing user input and deciding whether an entry
//! passes.

use std::collections::BTreeSet;

use crate::error::{AppError, Result};
use crate::models::{Entry, FeedFilter, MatchField};

/// Parse a keyword list written either as a JSON array (`["a", "b"]`) or as
/// comma-separated text (`a, b`). Items are trimmed; blanks are dropped.
pub fn parse_keywords(value: &str) -> Result<Vec<String>> {
    let raw = value.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    if raw.starts_with('[') {
        let parsed: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| AppError::validation(format!("Malformed keywords JSON: {}", e)))?;
        let items = parsed
            .as_array()
            .ok_or_else(|| AppError::validation("Keywords JSON must be an array."))?;

        let mut keywords = Vec::with_capacity(items.len());
        for item in items {
            let keyword = item
                .as_str()
                .ok_or_else(|| AppError::validation("Keywords JSON must be an array of strings."))?
                .trim();
            if !keyword.is_empty() {
                keywords.push(keyword.to_string());
            }
        }
        return Ok(keywords);
    }

    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect())
}

/// Parse the set of fields a filter looks at. Blank input means all of them.
pub fn parse_match_fields(value: &str) -> Result<Vec<MatchField>> {
    let names: Vec<String> = if value.trim().is_empty() {
        MatchField::ALL.iter().map(|f| f.as_str().to_string()).collect()
    } else {
        parse_keywords(value)?
            .into_iter()
            .map(|name| name.to_lowercase())
            .collect()
    };

    let invalid: BTreeSet<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|name| name.parse::<MatchField>().is_err())
        .collect();
    if !invalid.is_empty() {
        let listed: Vec<&str> = invalid.into_iter().collect();
        return Err(AppError::validation(format!(
            "Invalid match_fields: {}",
            listed.join(", ")
        )));
    }

    let mut fields: Vec<MatchField> = Vec::with_capacity(names.len());
    for name in &names {
        if let Ok(field) = name.parse::<MatchField>() {
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
    }

    if fields.is_empty() {
        return Err(AppError::validation("match_fields cannot be empty."));
    }
    Ok(fields)
}

/// All include keywords present and no exclude keyword present in the
/// filter's scoped fields.
pub fn matches(entry: &Entry, filter: &FeedFilter) -> bool {
    let haystack = filter
        .match_fields
        .iter()
        .filter_map(|&field| entry.field(field))
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if filter.case_sensitive {
        let includes = filter.include_keywords.iter().all(|k| haystack.contains(k.as_str()));
        let excludes = filter.exclude_keywords.iter().any(|k| haystack.contains(k.as_str()));
        return includes && !excludes;
    }

    let haystack = haystack.to_lowercase();
    let includes = filter
        .include_keywords
        .iter()
        .all(|k| haystack.contains(&k.to_lowercase()));
    let excludes = filter
        .exclude_keywords
        .iter()
        .any(|k| haystack.contains(&k.to_lowercase()));
    includes && !excludes
}

/// No filters means everything passes; otherwise any enabled filter must match.
pub fn matches_any(entry: &Entry, filters: &[FeedFilter]) -> bool {
    if filters.is_empty() {
        return true;
    }
    filters
        .iter()
        .filter(|f| f.enabled)
        .any(|f| matches(entry, f))
}
