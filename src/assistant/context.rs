// Context refresh - fetches the pieces of a VideoContext after navigation.

use async_trait::async_trait;
use std::time::Duration;

use crate::browser::transcript::{TranscriptFetcher, TranscriptResult};
use crate::browser::youtube::{extract_metadata, VideoMetadata};

/// Source of scraped page state for a given video.
///
/// Metadata extraction is total: any fault degrades to the placeholder
/// record rather than an error. Transcript faults come back as the
/// Unavailable variant.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn fetch_metadata(&self, video_id: &str) -> VideoMetadata;
    async fn fetch_transcript(&self, video_id: &str) -> TranscriptResult;
}

/// Production source: scrapes the live watch page.
pub struct WatchPageSource {
    client: reqwest::Client,
    base_url: String,
    transcripts: TranscriptFetcher,
}

impl WatchPageSource {
    pub fn new() -> Self {
        Self::with_base_url("https://www.youtube.com".to_string())
    }

    /// Custom base URL, used by tests to point at a local stub.
    pub fn with_base_url(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let transcripts = TranscriptFetcher::with_base_url(base_url.clone());
        Self {
            client,
            base_url,
            transcripts,
        }
    }
}

impl Default for WatchPageSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContextSource for WatchPageSource {
    async fn fetch_metadata(&self, video_id: &str) -> VideoMetadata {
        let url = format!("{}/watch?v={}", self.base_url, video_id);

        let html = match self.client.get(&url).send().await {
            Ok(response) => match response.text().await {
                Ok(html) => html,
                Err(e) => {
                    eprintln!("Context: Failed to read watch page body: {}", e);
                    return VideoMetadata::placeholder();
                }
            },
            Err(e) => {
                eprintln!("Context: Failed to fetch watch page: {}", e);
                return VideoMetadata::placeholder();
            }
        };

        extract_metadata(&html)
    }

    async fn fetch_transcript(&self, video_id: &str) -> TranscriptResult {
        self.transcripts.fetch_transcript(video_id).await
    }
}
