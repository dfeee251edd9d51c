use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::FeedConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("converter reported status '{0}'")]
    Converter(String),
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// An item as returned by the conversion endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RawItem {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub description: String,
    #[serde(rename = "pubDate")]
    pub pub_date: String,
}

#[derive(Debug, Deserialize)]
struct ConverterResponse {
    status: String,
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

/// Fetches the items of a single source.
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Return at most `limit` items from the front of the source's feed.
    async fn fetch_feed(&self, feed: &FeedConfig, limit: usize) -> Result<Vec<RawItem>, FetchError>;
}

/// Talks to an rss2json-compatible conversion endpoint.
pub struct Rss2JsonClient {
    client: Client,
    endpoint: String,
}

impl Rss2JsonClient {
    pub fn new(endpoint: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("NewsDesk/1.0 (News Aggregator)")
            .build()?;

        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }

    /// `<endpoint>?rss_url=<url-encoded feed url>`
    pub fn request_url(&self, rss_url: &str) -> Result<Url, FetchError> {
        let url = Url::parse_with_params(&self.endpoint, &[("rss_url", rss_url)])?;
        Ok(url)
    }

    /// Decode a converter payload, keeping only the first `limit` items.
    ///
    /// Items past the limit are never inspected, so a malformed tail does not
    /// fail the source.
    pub fn parse_payload(body: &[u8], limit: usize) -> Result<Vec<RawItem>, FetchError> {
        let response: ConverterResponse = serde_json::from_slice(body)?;
        if response.status != "ok" {
            return Err(FetchError::Converter(response.status));
        }

        response
            .items
            .into_iter()
            .take(limit)
            .map(|value| serde_json::from_value(value).map_err(FetchError::from))
            .collect()
    }
}

#[async_trait]
impl FeedClient for Rss2JsonClient {
    async fn fetch_feed(&self, feed: &FeedConfig, limit: usize) -> Result<Vec<RawItem>, FetchError> {
        let url = self.request_url(&feed.url)?;
        debug!("Fetching {} via {}", feed.name, url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        Self::parse_payload(&bytes, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn item_json(title: &str) -> serde_json::Value {
        serde_json::json!({
            "title": title,
            "link": format!("https://example.com/{}", title),
            "thumbnail": "",
            "description": "<p>Body</p>",
            "pubDate": "2024-01-01 10:00:00",
        })
    }

    fn feed() -> FeedConfig {
        FeedConfig::new("BBC", "http://feeds.bbci.co.uk/news/rss.xml", "#bb1d1d")
    }

    mod parse_payload_tests {
        use super::*;

        #[test]
        fn test_ok_payload() {
            let body = serde_json::json!({
                "status": "ok",
                "items": [item_json("a"), item_json("b")],
            });

            let items = Rss2JsonClient::parse_payload(body.to_string().as_bytes(), 3).unwrap();
            assert_eq!(items.len(), 2);
            assert_eq!(items[0].title, "a");
            assert_eq!(items[0].pub_date, "2024-01-01 10:00:00");
            assert_eq!(items[0].thumbnail.as_deref(), Some(""));
        }

        #[test]
        fn test_limit_applied() {
            let body = serde_json::json!({
                "status": "ok",
                "items": [item_json("a"), item_json("b"), item_json("c"), item_json("d")],
            });

            let items = Rss2JsonClient::parse_payload(body.to_string().as_bytes(), 3).unwrap();
            let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
            assert_eq!(titles, vec!["a", "b", "c"]);
        }

        #[test]
        fn test_malformed_item_past_limit_ignored() {
            let body = serde_json::json!({
                "status": "ok",
                "items": [item_json("a"), {"title": "broken"}],
            });

            let items = Rss2JsonClient::parse_payload(body.to_string().as_bytes(), 1).unwrap();
            assert_eq!(items.len(), 1);
        }

        #[test]
        fn test_missing_field_within_limit_fails() {
            let body = serde_json::json!({
                "status": "ok",
                "items": [{"title": "no description", "link": "x", "pubDate": "y"}],
            });

            let result = Rss2JsonClient::parse_payload(body.to_string().as_bytes(), 3);
            assert!(matches!(result, Err(FetchError::Payload(_))));
        }

        #[test]
        fn test_missing_thumbnail_is_none() {
            let body = serde_json::json!({
                "status": "ok",
                "items": [{"title": "t", "link": "l", "description": "d", "pubDate": "p"}],
            });

            let items = Rss2JsonClient::parse_payload(body.to_string().as_bytes(), 3).unwrap();
            assert!(items[0].thumbnail.is_none());
        }

        #[test]
        fn test_error_status() {
            let body = r#"{"status":"error","message":"rss_url parameter is required."}"#;
            let result = Rss2JsonClient::parse_payload(body.as_bytes(), 3);
            assert!(matches!(result, Err(FetchError::Converter(s)) if s == "error"));
        }

        #[test]
        fn test_not_json() {
            let result = Rss2JsonClient::parse_payload(b"<html>oops</html>", 3);
            assert!(matches!(result, Err(FetchError::Payload(_))));
        }
    }

    mod request_url_tests {
        use super::*;

        #[test]
        fn test_rss_url_is_encoded() {
            let client = Rss2JsonClient::with_client(Client::new(), "https://api.rss2json.com/v1/api.json");
            let url = client
                .request_url("https://feeds.npr.org/1001/rss.xml?a=1&b=2")
                .unwrap();

            assert_eq!(
                url.as_str(),
                "https://api.rss2json.com/v1/api.json?rss_url=https%3A%2F%2Ffeeds.npr.org%2F1001%2Frss.xml%3Fa%3D1%26b%3D2"
            );
        }

        #[test]
        fn test_bad_endpoint() {
            let client = Rss2JsonClient::with_client(Client::new(), "not a url");
            assert!(matches!(
                client.request_url("https://example.com/rss"),
                Err(FetchError::Endpoint(_))
            ));
        }
    }

    mod fetch_feed_tests {
        use super::*;

        #[tokio::test]
        async fn test_fetch_success() {
            let mock_server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/v1/api.json"))
                .and(query_param("rss_url", "http://feeds.bbci.co.uk/news/rss.xml"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "status": "ok",
                    "items": [item_json("a"), item_json("b"), item_json("c"), item_json("d")],
                })))
                .expect(1)
                .mount(&mock_server)
                .await;

            let client = Rss2JsonClient::new(&format!("{}/v1/api.json", mock_server.uri())).unwrap();
            let items = client.fetch_feed(&feed(), 3).await.unwrap();

            assert_eq!(items.len(), 3);
        }

        #[tokio::test]
        async fn test_http_500() {
            let mock_server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(500))
                .mount(&mock_server)
                .await;

            let client = Rss2JsonClient::new(&mock_server.uri()).unwrap();
            let result = client.fetch_feed(&feed(), 3).await;

            assert!(matches!(result, Err(FetchError::HttpStatus(500))));
        }

        #[tokio::test]
        async fn test_converter_error_status() {
            let mock_server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(serde_json::json!({"status": "error", "items": []})),
                )
                .mount(&mock_server)
                .await;

            let client = Rss2JsonClient::new(&mock_server.uri()).unwrap();
            let result = client.fetch_feed(&feed(), 3).await;

            assert!(matches!(result, Err(FetchError::Converter(_))));
        }

        #[tokio::test]
        async fn test_connection_refused() {
            // Nothing listens on port 9 of localhost in the test environment
            let client = Rss2JsonClient::new("http://127.0.0.1:9/v1/api.json").unwrap();
            let result = client.fetch_feed(&feed(), 3).await;

            assert!(matches!(result, Err(FetchError::Network(_))));
        }
    }
}
