//! Track resolution: free text or a URL in, one playable [`Track`] out.

pub mod youtube_api;
pub mod ytdlp;

use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tracing::debug;

use crate::{config::Config, error::BotError};

pub use youtube_api::YouTubeApiSearch;
pub use ytdlp::YtDlpSearch;

/// A resolved track. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    title: String,
    url: String,
    duration: Option<Duration>,
}

impl Track {
    pub fn new(title: String, url: String) -> Self {
        Self {
            title,
            url,
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Markdown link with the embed preview suppressed, plus `[m:ss]` when
    /// the length is known.
    pub fn link(&self) -> String {
        match self.duration() {
            Some(duration) => {
                let secs = duration.as_secs();
                format!("[{}](<{}>) `[{}:{:02}]`", self.title, self.url, secs / 60, secs % 60)
            }
            None => format!("[{}](<{}>)", self.title, self.url),
        }
    }
}

/// Turns a query into the first matching track.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Track, BotError>;
}

/// Only `http` and `https` URLs are passed through unchanged.
pub fn is_url(query: &str) -> bool {
    url::Url::parse(query)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Sends URLs to yt-dlp and text to the YouTube Data API when a key is
/// configured, otherwise to yt-dlp search.
pub struct SearchRouter {
    ytdlp: YtDlpSearch,
    api: Option<YouTubeApiSearch>,
}

impl SearchRouter {
    pub fn new(ytdlp: YtDlpSearch, api: Option<YouTubeApiSearch>) -> Self {
        Self { ytdlp, api }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Arc<dyn TrackResolver>> {
        let api = match &config.youtube_api_key {
            Some(key) => Some(YouTubeApiSearch::new(key.clone())?),
            None => None,
        };
        Ok(Arc::new(Self::new(YtDlpSearch::new(config.ytdlp_path.clone()), api)))
    }
}

#[async_trait]
impl TrackResolver for SearchRouter {
    async fn resolve(&self, query: &str) -> Result<Track, BotError> {
        match &self.api {
            Some(api) if !is_url(query) => {
                debug!("🔍 Searching YouTube API for: {}", query);
                api.resolve(query).await
            }
            _ => {
                debug!("🔍 Resolving with yt-dlp: {}", query);
                self.ytdlp.resolve(query).await
            }
        }
    }
}
