//! Projection of stories and load outcomes into what the page shows.

use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::aggregator::LoadOutcome;
use crate::config::Config;
use crate::story::Story;

pub const NO_STORIES_MESSAGE: &str = "No stories found. Refresh?";
pub const FETCH_ERROR_MESSAGE: &str = "Fetch error (check internet). Using cache if available.";

/// One display card.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryCard {
    pub title: String,
    pub link: String,
    pub image: String,
    pub excerpt: String,
    pub source: String,
    /// Badge background: the accent color with a translucent alpha suffix
    pub badge_color: String,
    /// Only placeholder cards carry the branding overlay
    pub uses_placeholder: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NewsGrid {
    Cards(Vec<StoryCard>),
    Empty,
    Loading { source_count: usize },
    Error,
}

impl NewsGrid {
    pub fn cards(&self) -> &[StoryCard] {
        match self {
            NewsGrid::Cards(cards) => cards,
            _ => &[],
        }
    }
}

pub fn render_stories(stories: &[Story], placeholder_image: &str) -> NewsGrid {
    if stories.is_empty() {
        return NewsGrid::Empty;
    }

    let cards = stories
        .iter()
        .map(|story| StoryCard {
            title: story.title.clone(),
            link: story.link.clone(),
            image: story.image.clone(),
            excerpt: story.excerpt.clone(),
            source: story.source.clone(),
            badge_color: format!("{}aa", story.source_color),
            uses_placeholder: story.image == placeholder_image,
        })
        .collect();

    NewsGrid::Cards(cards)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn css_class(&self) -> &'static str {
        match self {
            Severity::Info => "status",
            Severity::Warning => "status warning",
            Severity::Error => "status error",
        }
    }
}

/// Formats epoch milliseconds in the site's display zone.
#[derive(Debug, Clone)]
pub struct DisplayClock {
    offset: FixedOffset,
    label: String,
}

impl DisplayClock {
    pub fn new(offset_minutes: i32, label: &str) -> Self {
        let offset = FixedOffset::east_opt(offset_minutes.saturating_mul(60)).unwrap_or(Utc.fix());
        Self {
            offset,
            label: label.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.display_utc_offset_minutes, &config.display_zone_label)
    }

    /// e.g. `3/5/2024, 9:30:00 AM ET`
    pub fn format(&self, epoch_ms: i64) -> String {
        match DateTime::from_timestamp_millis(epoch_ms) {
            Some(utc) => format!(
                "{} {}",
                utc.with_timezone(&self.offset)
                    .format("%-m/%-d/%Y, %-I:%M:%S %p"),
                self.label
            ),
            None => format!("Invalid Date {}", self.label),
        }
    }
}

impl Default for DisplayClock {
    fn default() -> Self {
        Self::new(-300, "ET")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub text: String,
    pub severity: Severity,
}

impl StatusLine {
    pub fn from_outcome(outcome: &LoadOutcome, clock: &DisplayClock) -> Self {
        match outcome {
            LoadOutcome::Cached(cache) => Self {
                text: format!(
                    "Cached: {} ({} stories)",
                    clock.format(cache.timestamp),
                    cache.stories.len()
                ),
                severity: Severity::Warning,
            },
            LoadOutcome::Fresh(cache) => Self {
                text: format!(
                    "Fresh! {} stories | {}",
                    cache.stories.len(),
                    clock.format(cache.timestamp)
                ),
                severity: Severity::Info,
            },
            LoadOutcome::Empty { timestamp } => Self {
                text: format!("No stories retrieved | {}", clock.format(*timestamp)),
                severity: Severity::Warning,
            },
            LoadOutcome::Failed { .. } => Self {
                text: "Error – Try again".to_string(),
                severity: Severity::Error,
            },
            LoadOutcome::Busy => Self {
                text: "Refresh already in progress".to_string(),
                severity: Severity::Warning,
            },
        }
    }

    pub fn css_class(&self) -> &'static str {
        self.severity.css_class()
    }
}

/// Grid contents for an outcome.
pub fn grid_for_outcome(outcome: &LoadOutcome, placeholder_image: &str, source_count: usize) -> NewsGrid {
    match outcome {
        LoadOutcome::Cached(cache) | LoadOutcome::Fresh(cache) => {
            render_stories(&cache.stories, placeholder_image)
        }
        LoadOutcome::Empty { .. } => NewsGrid::Empty,
        LoadOutcome::Failed { .. } => NewsGrid::Error,
        LoadOutcome::Busy => NewsGrid::Loading { source_count },
    }
}
