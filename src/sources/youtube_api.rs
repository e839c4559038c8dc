use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};

use super::{Track, TrackResolver};
use crate::error::BotError;

const SEARCH_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/search";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: ItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
}

/// Text search through the YouTube Data API v3.
pub struct YouTubeApiSearch {
    api_key: String,
    client: reqwest::Client,
}

impl YouTubeApiSearch {
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { api_key, client })
    }

    fn first_track(response: SearchResponse) -> Option<Track> {
        response.items.into_iter().find_map(|item| {
            let video_id = item.id.video_id?;
            Some(Track::new(
                unescape_html(&item.snippet.title),
                format!("https://www.youtube.com/watch?v={video_id}"),
            ))
        })
    }
}

/// The API returns titles HTML-escaped.
fn unescape_html(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[async_trait]
impl TrackResolver for YouTubeApiSearch {
    async fn resolve(&self, query: &str) -> Result<Track, BotError> {
        let response = self
            .client
            .get(SEARCH_ENDPOINT)
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("maxResults", "1"),
                ("q", query),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| {
                error!("❌ YouTube API request failed: {}", e);
                BotError::Resolution(e.to_string())
            })?;

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| BotError::Resolution(format!("unexpected API response: {e}")))?;

        debug!("YouTube API returned {} items for {:?}", body.items.len(), query);
        Self::first_track(body).ok_or(BotError::NoResults)
    }
}
