use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_API_ENDPOINT: &str = "https://api.rss2json.com/v1/api.json";
pub const DEFAULT_PLACEHOLDER_IMAGE: &str = "https://images.unsplash.com/photo-1507003211169-0a1dd7228f2d?ixlib=rb-4.0.3&auto=format&fit=crop&w=400&h=150&q=80";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// RSS-to-JSON conversion endpoint
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,
    /// Cache time-to-live in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// How often the background task looks for a stale cache, in minutes
    #[serde(default = "default_staleness_check_minutes")]
    pub staleness_check_minutes: u64,
    /// Pause after each source fetch, in milliseconds
    #[serde(default = "default_pacing_delay_ms")]
    pub pacing_delay_ms: u64,
    #[serde(default = "default_items_per_source")]
    pub items_per_source: usize,
    #[serde(default = "default_max_stories")]
    pub max_stories: usize,
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
    #[serde(default = "default_placeholder_image")]
    pub placeholder_image: String,
    /// Overlay shown on cards that use the placeholder image
    #[serde(default = "default_branding_image")]
    pub branding_image: String,
    /// Offset used when formatting timestamps for display
    #[serde(default = "default_display_utc_offset_minutes")]
    pub display_utc_offset_minutes: i32,
    #[serde(default = "default_display_zone_label")]
    pub display_zone_label: String,
    pub feeds: Vec<FeedConfig>,
}

fn default_api_endpoint() -> String {
    DEFAULT_API_ENDPOINT.to_string()
}

fn default_cache_ttl_secs() -> u64 {
    120
}

fn default_staleness_check_minutes() -> u64 {
    60
}

fn default_pacing_delay_ms() -> u64 {
    300
}

fn default_items_per_source() -> usize {
    3
}

fn default_max_stories() -> usize {
    20
}

fn default_excerpt_chars() -> usize {
    160
}

fn default_placeholder_image() -> String {
    DEFAULT_PLACEHOLDER_IMAGE.to_string()
}

fn default_branding_image() -> String {
    "/static/images/eblackdiamond.svg".to_string()
}

fn default_display_utc_offset_minutes() -> i32 {
    -300
}

fn default_display_zone_label() -> String {
    "ET".to_string()
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    /// Accent color for the source badge
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    "#333333".to_string()
}

impl FeedConfig {
    pub fn new(name: &str, url: &str, color: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            color: color.to_string(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.max_stories == 0 {
            anyhow::bail!("max_stories must be greater than zero");
        }
        Ok(config)
    }

    /// A config with every default applied and the given sources.
    pub fn with_feeds(feeds: Vec<FeedConfig>) -> Self {
        Self {
            api_endpoint: default_api_endpoint(),
            cache_ttl_secs: default_cache_ttl_secs(),
            staleness_check_minutes: default_staleness_check_minutes(),
            pacing_delay_ms: default_pacing_delay_ms(),
            items_per_source: default_items_per_source(),
            max_stories: default_max_stories(),
            excerpt_chars: default_excerpt_chars(),
            placeholder_image: default_placeholder_image(),
            branding_image: default_branding_image(),
            display_utc_offset_minutes: default_display_utc_offset_minutes(),
            display_zone_label: default_display_zone_label(),
            feeds,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    pub fn staleness_check_interval(&self) -> Duration {
        Duration::from_secs(self.staleness_check_minutes * 60)
    }
}
