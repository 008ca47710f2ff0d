// YouTube watch-page extraction - fixed pattern recognizers over page HTML

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Placeholder values used when a recognizer finds no match.
///
/// Absence of a field is represented by these sentinels, never by a missing
/// key - VideoMetadata is always fully populated.
pub const TITLE_NOT_FOUND: &str = "Title not found";
pub const CHANNEL_NOT_FOUND: &str = "Channel not found";
pub const DATE_NOT_FOUND: &str = "Date not found";
pub const DESCRIPTION_NOT_FOUND: &str = "Description not found";
pub const NO_TAGS_FOUND: &str = "No tags found";

/// Structured metadata scraped from a watch page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub channel: String,
    #[serde(rename = "uploadDate")]
    pub upload_date: String,
    pub description: String,
    pub tags: Vec<String>,
}

impl VideoMetadata {
    /// Metadata with every field set to its placeholder.
    pub fn placeholder() -> Self {
        Self {
            title: TITLE_NOT_FOUND.to_string(),
            channel: CHANNEL_NOT_FOUND.to_string(),
            upload_date: DATE_NOT_FOUND.to_string(),
            description: DESCRIPTION_NOT_FOUND.to_string(),
            tags: vec![NO_TAGS_FOUND.to_string()],
        }
    }
}

/// The scraped context for the video currently on screen.
///
/// Produced fresh after every navigation and superseded in full (never
/// merged) by the next extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoContext {
    pub transcript: String,
    pub metadata: VideoMetadata,
}

impl VideoContext {
    pub fn empty() -> Self {
        Self {
            transcript: String::new(),
            metadata: VideoMetadata::placeholder(),
        }
    }
}

/// Extract video metadata from watch-page HTML.
///
/// Total function: every recognizer is attempted independently and a missing
/// match degrades to its per-field placeholder rather than aborting the
/// extraction.
pub fn extract_metadata(html: &str) -> VideoMetadata {
    VideoMetadata {
        title: extract_title(html),
        channel: extract_channel(html),
        upload_date: extract_upload_date(html),
        description: extract_description(html),
        tags: extract_tags(html),
    }
}

/// Extract a YouTube video ID from a URL.
///
/// Matches both youtube.com/watch?v= (v= in any query position) and
/// youtu.be/ short URLs. Video IDs are exactly 11 characters.
pub fn extract_video_id(url: &str) -> Option<String> {
    static VIDEO_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?:youtube\.com/watch\?(?:[^&]*&)*v=|youtu\.be/)([a-zA-Z0-9_-]{11})").unwrap()
    });

    VIDEO_ID_REGEX
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn extract_title(html: &str) -> String {
    static TITLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#""title":\s*"([^"]*)""#).unwrap()
    });

    TITLE_REGEX
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| unescape_json(m.as_str()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| TITLE_NOT_FOUND.to_string())
}

fn extract_channel(html: &str) -> String {
    static CHANNEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#""ownerChannelName":\s*"((?:[^"\\]|\\.)*)""#).unwrap()
    });

    CHANNEL_REGEX
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| unescape_json(m.as_str()))
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| CHANNEL_NOT_FOUND.to_string())
}

/// Extract the upload date and render it for display.
///
/// The embedded value is an ISO date ("2024-03-01" or full RFC 3339). An
/// unparseable value is passed through as-is rather than discarded.
fn extract_upload_date(html: &str) -> String {
    static UPLOAD_DATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#""uploadDate":\s*"([^"]*)""#).unwrap()
    });

    let raw = match UPLOAD_DATE_REGEX.captures(html).and_then(|caps| caps.get(1)) {
        Some(m) if !m.as_str().is_empty() => m.as_str(),
        _ => return DATE_NOT_FOUND.to_string(),
    };

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return dt.format("%-m/%-d/%Y").to_string();
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.format("%-m/%-d/%Y").to_string();
    }
    raw.to_string()
}

/// Extract the description, preferring the simpleText form and falling back
/// to shortDescription. The result is unescaped and truncated at the
/// isFamilySafe marker - everything from that marker onward is provider
/// bookkeeping, not description.
fn extract_description(html: &str) -> String {
    static DESCRIPTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#""description":\{"simpleText":"((?:[^"\\]|\\.)*)"\}\}"#).unwrap()
    });
    static ALT_DESCRIPTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#""shortDescription":"((?:[^"\\]|\\.)*)""#).unwrap()
    });

    let raw = DESCRIPTION_REGEX
        .captures(html)
        .or_else(|| ALT_DESCRIPTION_REGEX.captures(html))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or("");

    if raw.is_empty() {
        return DESCRIPTION_NOT_FOUND.to_string();
    }

    let mut description = unescape_json(raw);

    if let Some(idx) = description.find("isFamilySafe") {
        description.truncate(idx);
        description = description.trim_end().to_string();
    }

    if description.is_empty() {
        DESCRIPTION_NOT_FOUND.to_string()
    } else {
        description
    }
}

/// Extract the tag list from the embedded keywords fragment.
///
/// The fragment is a raw comma-separated run of JSON string literals. Split
/// on top-level commas, parse each element independently, drop elements that
/// fail to parse, and fall back to the one-element sentinel list when the
/// result is empty. The returned list is never empty.
fn extract_tags(html: &str) -> Vec<String> {
    static TAGS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#""keywords":\[([^\]]*)\]"#).unwrap()
    });

    let fragment = TAGS_REGEX
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or("");

    let tags: Vec<String> = split_top_level_commas(fragment)
        .into_iter()
        .filter_map(|elem| serde_json::from_str::<String>(elem.trim()).ok())
        .filter(|tag| !tag.is_empty())
        .collect();

    if tags.is_empty() {
        vec![NO_TAGS_FOUND.to_string()]
    } else {
        tags
    }
}

/// Split a fragment on commas that sit outside string literals.
///
/// Commas inside quoted elements (including escaped quotes) do not split.
fn split_top_level_commas(fragment: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;
    let mut start = 0;

    for (i, ch) in fragment.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            ',' if !in_string => {
                parts.push(&fragment[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&fragment[start..]);
    parts
}

/// Unescape JSON string escape sequences.
///
/// Handles: \n, \t, \", \\, \/, \r, \b, \f
pub fn unescape_json(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next_ch) = chars.next() {
                match next_ch {
                    'n' => result.push('\n'),
                    't' => result.push('\t'),
                    'r' => result.push('\r'),
                    'b' => result.push('\u{0008}'), // backspace
                    'f' => result.push('\u{000C}'), // form feed
                    '"' => result.push('"'),
                    '\\' => result.push('\\'),
                    '/' => result.push('/'),
                    _ => {
                        // Unknown escape sequence - keep as-is
                        result.push('\\');
                        result.push(next_ch);
                    }
                }
            } else {
                // Trailing backslash
                result.push('\\');
            }
        } else {
            result.push(ch);
        }
    }

    result
}
