use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::FeedConfig;
use crate::fetcher::RawItem;

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

const ELLIPSIS: &str = "...";

/// One normalized headline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub title: String,
    pub link: String,
    pub image: String,
    pub excerpt: String,
    pub source: String,
    pub source_color: String,
    pub pub_date: String,
}

impl Story {
    /// Build a story from an upstream item, tagging it with its source.
    pub fn from_raw(
        raw: RawItem,
        feed: &FeedConfig,
        placeholder_image: &str,
        excerpt_chars: usize,
    ) -> Self {
        let image = raw
            .thumbnail
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| placeholder_image.to_string());

        Self {
            title: raw.title,
            link: raw.link,
            image,
            excerpt: make_excerpt(&raw.description, excerpt_chars),
            source: feed.name.clone(),
            source_color: feed.color.clone(),
            pub_date: raw.pub_date,
        }
    }

    pub fn published(&self) -> Option<DateTime<Utc>> {
        parse_pub_date(&self.pub_date)
    }
}

/// The persisted snapshot of the last successful aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsCache {
    pub stories: Vec<Story>,
    /// Creation time in epoch milliseconds
    pub timestamp: i64,
}

impl NewsCache {
    pub fn new(stories: Vec<Story>, timestamp: i64) -> Self {
        Self { stories, timestamp }
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.timestamp
    }

    /// Whether the snapshot may still be served instead of fetching.
    pub fn is_fresh(&self, now_ms: i64, ttl_ms: i64) -> bool {
        self.age_ms(now_ms) < ttl_ms
    }

    /// Whether the periodic check should replace the snapshot.
    pub fn is_stale(&self, now_ms: i64, ttl_ms: i64) -> bool {
        self.age_ms(now_ms) > ttl_ms
    }
}

pub fn strip_html(text: &str) -> String {
    HTML_TAG.replace_all(text, "").into_owned()
}

/// Strip tags, keep at most `max_chars` characters and append an ellipsis.
pub fn make_excerpt(description: &str, max_chars: usize) -> String {
    let stripped = strip_html(description);
    let mut excerpt: String = stripped.chars().take(max_chars).collect();
    excerpt.push_str(ELLIPSIS);
    excerpt
}

/// Parse the upstream publication date. The conversion endpoint emits
/// `YYYY-MM-DD HH:MM:SS` in UTC; RFC 3339 and RFC 2822 are accepted too.
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Drop repeated `(title, source)` pairs, keeping the first occurrence.
pub fn dedupe(stories: Vec<Story>) -> Vec<Story> {
    let mut seen: HashMap<(String, String), bool> = HashMap::new();
    let mut unique = Vec::with_capacity(stories.len());

    for story in stories {
        let key = (story.title.clone(), story.source.clone());
        if seen.get(&key).copied().unwrap_or(false) {
            continue;
        }
        seen.insert(key, true);
        unique.push(story);
    }

    unique
}

/// Deduplicate, order newest first and cap the list.
///
/// The sort is stable, so equal timestamps keep their input order. Stories
/// with an unparsable date go last.
pub fn rank(stories: Vec<Story>, max_stories: usize) -> Vec<Story> {
    let mut unique = dedupe(stories);
    unique.sort_by_key(|s| Reverse(s.published()));
    unique.truncate(max_stories);
    unique
}
