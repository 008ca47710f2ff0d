// Browser observation and watch-page scraping

pub mod observer;
pub mod transcript;
pub mod youtube;

pub use observer::{ChromeProbe, PageEvent, PageObserver, PageProbe};
pub use transcript::{TranscriptFetcher, TranscriptResult};
pub use youtube::{extract_metadata, extract_video_id, VideoContext, VideoMetadata};
