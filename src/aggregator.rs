use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::cache::CacheStore;
use crate::config::{Config, FeedConfig};
use crate::fetcher::FeedClient;
use crate::story::{rank, NewsCache, Story};

/// What a load attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// A snapshot younger than the TTL was served without network activity.
    Cached(NewsCache),
    /// A fetch cycle ran and its result replaced the snapshot.
    Fresh(NewsCache),
    /// A fetch cycle ran but no source produced anything. The empty
    /// snapshot is still persisted so the TTL holds during an outage.
    Empty { timestamp: i64 },
    /// The cycle failed; the previous snapshot was left alone.
    Failed { message: String },
    /// Another cycle was already running.
    Busy,
}

impl LoadOutcome {
    pub fn stories(&self) -> &[Story] {
        match self {
            LoadOutcome::Cached(cache) | LoadOutcome::Fresh(cache) => &cache.stories,
            _ => &[],
        }
    }
}

/// Knobs the fetch cycle runs with.
#[derive(Debug, Clone)]
pub struct Settings {
    pub ttl: Duration,
    pub pacing_delay: Duration,
    pub items_per_source: usize,
    pub max_stories: usize,
    pub excerpt_chars: usize,
    pub placeholder_image: String,
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            ttl: config.cache_ttl(),
            pacing_delay: config.pacing_delay(),
            items_per_source: config.items_per_source,
            max_stories: config.max_stories,
            excerpt_chars: config.excerpt_chars,
            placeholder_image: config.placeholder_image.clone(),
        }
    }
}

pub struct Aggregator {
    feeds: Arc<[FeedConfig]>,
    client: Arc<dyn FeedClient>,
    store: Arc<dyn CacheStore>,
    settings: Settings,
    refreshing: AtomicBool,
}

/// Clears the in-flight flag when the cycle ends, including when the
/// future driving it is dropped mid-cycle.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Aggregator {
    pub fn new(
        feeds: Arc<[FeedConfig]>,
        client: Arc<dyn FeedClient>,
        store: Arc<dyn CacheStore>,
        settings: Settings,
    ) -> Self {
        Self {
            feeds,
            client,
            store,
            settings,
            refreshing: AtomicBool::new(false),
        }
    }

    pub fn feeds(&self) -> &[FeedConfig] {
        &self.feeds
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    fn begin_cycle(&self) -> Option<InFlight<'_>> {
        self.refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(&self.refreshing))
    }

    fn ttl_ms(&self) -> i64 {
        i64::try_from(self.settings.ttl.as_millis()).unwrap_or(i64::MAX)
    }

    pub async fn load_news(&self) -> LoadOutcome {
        self.load_news_at(Utc::now().timestamp_millis()).await
    }

    /// Serve the snapshot if it is younger than the TTL, otherwise run a
    /// fetch cycle. Every trigger path goes through here and shares one
    /// in-flight flag.
    pub async fn load_news_at(&self, now_ms: i64) -> LoadOutcome {
        let Some(_in_flight) = self.begin_cycle() else {
            info!("News load already in progress, skipping");
            return LoadOutcome::Busy;
        };

        match self.do_load(now_ms).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("News load failed: {}", e);
                LoadOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn do_load(&self, now_ms: i64) -> anyhow::Result<LoadOutcome> {
        if let Some(cache) = self.store.load().await? {
            if cache.is_fresh(now_ms, self.ttl_ms()) {
                info!(
                    "Serving {} cached stories ({} ms old)",
                    cache.stories.len(),
                    cache.age_ms(now_ms)
                );
                return Ok(LoadOutcome::Cached(cache));
            }
        }

        let stories = self.fetch_all().await;
        let cache = NewsCache::new(stories, now_ms);
        self.store.store(&cache).await?;

        if cache.stories.is_empty() {
            warn!("No source produced any stories; cached an empty snapshot");
            return Ok(LoadOutcome::Empty { timestamp: now_ms });
        }

        info!("Cached {} fresh stories", cache.stories.len());
        Ok(LoadOutcome::Fresh(cache))
    }

    /// Fetch every source in order, one at a time, pausing after each.
    async fn fetch_all(&self) -> Vec<Story> {
        info!("Fetching from {} sources", self.feeds.len());

        let mut all = Vec::new();
        for feed in self.feeds.iter() {
            all.extend(self.fetch_source(feed).await);
            tokio::time::sleep(self.settings.pacing_delay).await;
        }

        rank(all, self.settings.max_stories)
    }

    async fn fetch_source(&self, feed: &FeedConfig) -> Vec<Story> {
        match self
            .client
            .fetch_feed(feed, self.settings.items_per_source)
            .await
        {
            Ok(items) => items
                .into_iter()
                .take(self.settings.items_per_source)
                .map(|raw| {
                    Story::from_raw(
                        raw,
                        feed,
                        &self.settings.placeholder_image,
                        self.settings.excerpt_chars,
                    )
                })
                .collect(),
            Err(e) => {
                warn!("Skipped {}: {}", feed.name, e);
                Vec::new()
            }
        }
    }

    /// Drop the snapshot and immediately run a fetch cycle.
    pub async fn clear_cache(&self) -> LoadOutcome {
        if let Err(e) = self.store.clear().await {
            error!("Failed to clear news cache: {}", e);
            return LoadOutcome::Failed {
                message: e.to_string(),
            };
        }
        info!("News cache cleared");
        self.load_news().await
    }

    pub async fn check_staleness(&self) -> Option<LoadOutcome> {
        self.check_staleness_at(Utc::now().timestamp_millis()).await
    }

    /// Reload if a snapshot exists and has outlived the TTL. A missing
    /// snapshot is left for the next page load.
    pub async fn check_staleness_at(&self, now_ms: i64) -> Option<LoadOutcome> {
        let cache = match self.store.load().await {
            Ok(Some(cache)) => cache,
            Ok(None) => return None,
            Err(e) => {
                warn!("Staleness check could not read cache: {}", e);
                return None;
            }
        };

        if !cache.is_stale(now_ms, self.ttl_ms()) {
            return None;
        }

        info!("News cache is stale, reloading");
        Some(self.load_news_at(now_ms).await)
    }
}

pub async fn start_staleness_check(aggregator: Arc<Aggregator>, interval: Duration) {
    info!("Starting initial news load");
    if let LoadOutcome::Failed { message } = aggregator.load_news().await {
        error!("Initial news load failed: {}", message);
    }

    loop {
        tokio::time::sleep(interval).await;
        aggregator.check_staleness().await;
    }
}
