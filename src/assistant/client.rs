// AssistantClient - forwards (question, context) pairs to the answering
// service and returns the answer text.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use crate::browser::youtube::VideoContext;

/// The only failure wording ever shown to the user. The underlying detail
/// is logged, never rendered.
pub const SERVER_ERROR_MSG: &str = "Server error, please try again later";

/// Fixed deadline on the ask request so a hung call cannot leave the panel
/// waiting forever.
const ASK_TIMEOUT: Duration = Duration::from_secs(30);

/// A failed ask, carrying the HTTP status and provider error body when
/// available. For diagnostics only.
#[derive(Debug)]
pub struct AskError {
    pub status: Option<u16>,
    pub detail: String,
}

impl Display for AskError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "ask failed ({}): {}", status, self.detail),
            None => write!(f, "ask failed: {}", self.detail),
        }
    }
}

/// Something that can answer a question about the current video.
///
/// The panel controller only interacts through this trait, so tests can
/// swap in scripted answerers.
#[async_trait]
pub trait AnswerSource: Send + Sync {
    async fn ask(&self, question: &str, context: &VideoContext) -> Result<String, AskError>;
}

// ── Answering service request/response shapes ──

#[derive(Serialize)]
struct AskRequest<'a> {
    query: &'a str,
    #[serde(rename = "videoData")]
    video_data: &'a VideoContext,
}

#[derive(Deserialize)]
struct AskResponse {
    answer: String,
}

/// HTTP client for the answering service.
pub struct AssistantClient {
    client: Client,
    endpoint: String,
}

impl AssistantClient {
    /// Build a client against the answering service endpoint
    /// (e.g. "http://127.0.0.1:8787/api").
    pub fn new(endpoint: String) -> Self {
        let client = Client::builder()
            .timeout(ASK_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, endpoint }
    }
}

#[async_trait]
impl AnswerSource for AssistantClient {
    /// Send one question with the current context. No retry; a single
    /// request per call.
    async fn ask(&self, question: &str, context: &VideoContext) -> Result<String, AskError> {
        let request = AskRequest {
            query: question,
            video_data: context,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| AskError {
                status: None,
                detail: format!("transport fault: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            eprintln!("Assistant: Service error {} - {}", status, body);
            return Err(AskError {
                status: Some(status.as_u16()),
                detail: body,
            });
        }

        let parsed: AskResponse = response.json().await.map_err(|e| AskError {
            status: None,
            detail: format!("malformed answer payload: {}", e),
        })?;

        Ok(parsed.answer)
    }
}
