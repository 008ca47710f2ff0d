// Transcript fetching - locates a watch page's caption tracks and flattens
// the selected track's caption document into a single text blob.

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

/// Canonical default caption language.
pub const DEFAULT_LANGUAGE: &str = "en";

pub const NO_TRANSCRIPT_MSG: &str =
    "No transcript available for this video. Please try another video.";
pub const NO_TRANSCRIPT_URL_MSG: &str = "No transcript available for this video.";
pub const FETCH_FAILED_MSG: &str = "Failed to fetch transcript. Please try again.";

/// Outcome of a transcript fetch. Exactly one arm is populated; faults are
/// always converted to the Unavailable arm, never raised.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptResult {
    Transcript {
        text: String,
        language: String,
        is_translated: bool,
    },
    Unavailable {
        message: String,
    },
}

impl TranscriptResult {
    fn unavailable(message: &str) -> Self {
        TranscriptResult::Unavailable {
            message: message.to_string(),
        }
    }
}

/// A caption track reference embedded in the watch page.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CaptionTrack {
    #[serde(rename = "baseUrl", default)]
    pub base_url: Option<String>,
    #[serde(rename = "languageCode", default)]
    pub language_code: String,
    /// "asr" marks an auto-generated track
    #[serde(default)]
    pub kind: Option<String>,
}

/// Fetches and flattens caption transcripts for watch-page videos.
pub struct TranscriptFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl TranscriptFetcher {
    pub fn new() -> Self {
        Self::with_base_url("https://www.youtube.com".to_string())
    }

    /// Custom base URL, used by tests to point at a local stub.
    pub fn with_base_url(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, base_url }
    }

    /// Fetch the transcript for a video.
    ///
    /// Retrieves the watch page, locates the embedded caption-track list,
    /// selects the default-language track (or the first listed one), fetches
    /// that track's caption document, and joins its trimmed text nodes in
    /// document order with line breaks.
    pub async fn fetch_transcript(&self, video_id: &str) -> TranscriptResult {
        let watch_url = format!("{}/watch?v={}", self.base_url, video_id);

        let html = match self.fetch_text(&watch_url).await {
            Ok(html) => html,
            Err(e) => {
                eprintln!("Transcript: Failed to fetch watch page: {}", e);
                return TranscriptResult::unavailable(FETCH_FAILED_MSG);
            }
        };

        let tracks = match parse_caption_tracks(&html) {
            Ok(Some(tracks)) => tracks,
            Ok(None) => return TranscriptResult::unavailable(NO_TRANSCRIPT_MSG),
            Err(e) => {
                eprintln!("Transcript: Failed to parse caption tracks: {}", e);
                return TranscriptResult::unavailable(FETCH_FAILED_MSG);
            }
        };

        let track = match select_track(&tracks) {
            Some(track) => track,
            None => return TranscriptResult::unavailable(NO_TRANSCRIPT_MSG),
        };

        let track_url = match track.base_url.as_deref() {
            Some(url) if !url.is_empty() => url,
            _ => return TranscriptResult::unavailable(NO_TRANSCRIPT_URL_MSG),
        };

        let caption_xml = match self.fetch_text(track_url).await {
            Ok(xml) => xml,
            Err(e) => {
                eprintln!("Transcript: Failed to fetch caption document: {}", e);
                return TranscriptResult::unavailable(FETCH_FAILED_MSG);
            }
        };

        match parse_timedtext(&caption_xml) {
            Ok(text) => TranscriptResult::Transcript {
                text,
                language: track.language_code.clone(),
                is_translated: track.kind.as_deref() == Some("asr"),
            },
            Err(e) => {
                eprintln!("Transcript: Failed to parse caption document: {}", e);
                TranscriptResult::unavailable(FETCH_FAILED_MSG)
            }
        }
    }

    async fn fetch_text(&self, url: &str) -> Result<String, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("status {}", response.status()));
        }

        response
            .text()
            .await
            .map_err(|e| format!("failed to read body: {}", e))
    }
}

impl Default for TranscriptFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Locate and parse the embedded caption-track list.
///
/// Returns Ok(None) when the page carries no caption tracks at all, and an
/// error when the fragment exists but cannot be parsed.
fn parse_caption_tracks(html: &str) -> Result<Option<Vec<CaptionTrack>>, String> {
    static CAPTIONS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#""captionTracks":\[(.*?)\]"#).unwrap()
    });

    let fragment = match CAPTIONS_REGEX.captures(html).and_then(|caps| caps.get(1)) {
        Some(m) => m.as_str(),
        None => return Ok(None),
    };

    let tracks: Vec<CaptionTrack> = serde_json::from_str(&format!("[{}]", fragment))
        .map_err(|e| format!("invalid caption track JSON: {}", e))?;

    Ok(Some(tracks))
}

/// Select the caption track to fetch.
///
/// The default-language track wins regardless of its position; otherwise the
/// first listed track is the deterministic fallback.
fn select_track(tracks: &[CaptionTrack]) -> Option<&CaptionTrack> {
    tracks
        .iter()
        .find(|t| t.language_code == DEFAULT_LANGUAGE)
        .or_else(|| tracks.first())
}

/// Flatten a timedtext caption document into one text blob.
///
/// Every text node's trimmed content is collected in document order and
/// joined with a line break.
fn parse_timedtext(xml: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut lines = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| format!("bad text node: {}", e))?;
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    lines.push(trimmed.to_string());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "error at position {}: {:?}",
                    reader.buffer_position(),
                    e
                ))
            }
            _ => {}
        }
    }

    Ok(lines.join("\n"))
}
