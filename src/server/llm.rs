// OpenRouterProvider - chat completion via the OpenRouter API

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::browser::youtube::VideoContext;
use crate::error::AppError;

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1";
const MODEL: &str = "meta-llama/llama-3.3-70b-instruct:free";
const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 500;
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(25);

const SYSTEM_PROMPT: &str = r#"context: You are a sophisticated AI assistant integrated into a YouTube browser extension. Your role is to be an expert companion for the user, capable of understanding and discussing the video they are watching. You must create a seamless and intuitive experience, making the user feel like they are conversing with an intelligent entity that has full visual and auditory access to the video.
task: Your primary function is to answer user questions. Follow this strict operational hierarchy:
Prioritize Video Content: First, always attempt to answer the question using only the provided video data (title, description, transcript). Synthesize information to provide direct, concise, and relevant answers.
Use General Knowledge with Attribution: If the answer is not present in the video data, use your broader knowledge base to provide a helpful answer. You MUST preface this type of answer with a clear, friendly disclaimer. Examples: "The video doesn't mention that, but generally...", "While the speaker doesn't cover it in this video, the concept of...", or "That's outside the scope of this video, but I can tell you that...".
Maintain the Persona: You are "watching" the video. NEVER mention the words "transcript," "metadata," "data," or "text." Refer to the source of your information as "the video," "the speaker," "what they show," or "at this point in the video."
Handle Specific Query Types:
Summaries: If asked for a summary (e.g., "what's this about?", "tldr"), provide a brief, neutral overview of the video's main topics and conclusion.
Opinions: Do not state personal opinions. If asked for one, either summarize the different viewpoints presented in the video or state that the video presents a specific viewpoint without endorsing it.
Vague Questions: If a question is too ambiguous, ask for clarification or provide a high-level summary as a default response.
Uphold Quality and Safety: All responses must be clear, user-friendly, and free of jargon (unless explained in the video). Refuse to engage with harmful, unethical, or inappropriate prompts.
input:
user's query, video details
output: A helpful and context-aware response that directly addresses the user's question, strictly adhering to the rules defined in the task."#;

/// Something that can produce an answer from a question and video context.
///
/// The answering service only interacts through this trait, so tests can
/// swap in scripted providers.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, query: &str, context: &VideoContext) -> Result<String, String>;
}

// ── OpenRouter API request/response shapes ──

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: &'static str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Render the video context into the prompt block the model sees.
fn format_context(context: &VideoContext) -> String {
    format!(
        "Video Title: {}\nChannel Name: {}\nUpload Date: {}\nDescription: {}\nTags: {}\n\nComplete Transcript:\n{}",
        context.metadata.title,
        context.metadata.channel,
        context.metadata.upload_date,
        context.metadata.description,
        context.metadata.tags.join(", "),
        context.transcript,
    )
}

/// Completion provider backed by the OpenRouter API.
///
/// Holds the API key read from the server's environment. The key never
/// leaves this process except in the Authorization header toward
/// OpenRouter.
pub struct OpenRouterProvider {
    api_key: String,
    site_url: Option<String>,
    site_name: Option<String>,
    base_url: String,
    client: Client,
}

impl OpenRouterProvider {
    /// Read configuration from the environment. OPENROUTER_API_KEY is
    /// required; SITE_URL and SITE_NAME are optional attribution headers.
    pub fn from_env() -> Result<Self, AppError> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| AppError::MissingConfig("OPENROUTER_API_KEY".to_string()))?;
        let site_url = std::env::var("SITE_URL").ok();
        let site_name = std::env::var("SITE_NAME").ok();
        Ok(Self::new(api_key, site_url, site_name))
    }

    pub fn new(api_key: String, site_url: Option<String>, site_name: Option<String>) -> Self {
        eprintln!(
            "LLM/OpenRouter: Initialized with API key ({}...)",
            api_key.chars().take(8).collect::<String>()
        );
        let client = Client::builder()
            .timeout(COMPLETION_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            api_key,
            site_url,
            site_name,
            base_url: OPENROUTER_URL.to_string(),
            client,
        }
    }

    /// Custom base URL, used by tests to point at a local stub.
    #[cfg(test)]
    fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl CompletionProvider for OpenRouterProvider {
    async fn complete(&self, query: &str, context: &VideoContext) -> Result<String, String> {
        let request = ChatCompletionRequest {
            model: MODEL,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: format!(
                        "{}\n\nUser Question: {}",
                        format_context(context),
                        query
                    ),
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request);
        if let Some(site_url) = &self.site_url {
            builder = builder.header("HTTP-Referer", site_url);
        }
        if let Some(site_name) = &self.site_name {
            builder = builder.header("X-Title", site_name);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| format!("OpenRouter request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            eprintln!("LLM/OpenRouter: API error {} - {}", status, body);
            return Err(format!("OpenRouter returned {}: {}", status, body));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse OpenRouter response: {}", e))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| "OpenRouter response had no choices".to_string())
    }
}
