//! Summary generation: prompt assembly plus a text-generation backend
//!
//! Provides a `SummaryBackend` trait with a Gemini `generateContent`
//! implementation, and `SummaryGenerator`, which builds the prompt and applies
//! the degrade-not-fail policy: a reply without usable text becomes
//! [`FAILED_SUMMARY`] instead of an error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::GenerationConfig;

/// Stored as the summary when the model returns no candidate text.
pub const FAILED_SUMMARY: &str = "Failed to generate summary.";

/// Comments section body when comments were requested but none came back.
pub const NO_COMMENTS: &str = "No comments available.";

// ============================================================================
// SummaryBackend trait
// ============================================================================

/// Abstraction over text-generation providers.
#[async_trait]
pub trait SummaryBackend: Send + Sync {
    /// Send one prompt and return the first candidate's first text segment.
    /// `Ok(None)` means the provider answered but produced no usable text.
    async fn generate(&self, prompt: &str) -> Result<Option<String>, GenerationError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),

    #[error("Generation API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing API key")]
    MissingApiKey,
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        GenerationError::Http(e.without_url())
    }
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    code: u16,
    message: String,
}

// ============================================================================
// GeminiClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    /// Build a client from config. The key comes from the argument, then
    /// `GEMINI_API_KEY`, then `GOOGLE_API_KEY`.
    pub fn new(config: &GenerationConfig, api_key: Option<String>) -> Result<Self, GenerationError> {
        let api_key = api_key
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .unwrap_or_default();

        if api_key.is_empty() {
            return Err(GenerationError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SummaryBackend for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<Option<String>, GenerationError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let request = GenerateRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: Some(prompt.to_string()),
                }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let error_detail = serde_json::from_str::<GeminiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error);

            let (code, message) = error_detail
                .map(|e| (e.code, e.message))
                .unwrap_or((status.as_u16(), error_body));

            tracing::error!(code = code, message = %message, "Gemini API error");

            return Err(GenerationError::Api { code, message });
        }

        let body: GenerateResponse = response.json().await?;

        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .filter(|t| !t.is_empty());

        Ok(text)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// Prompt assembly
// ============================================================================

/// First `max_chars` characters of `text`, never splitting a character.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Character budgets applied while building a prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptLimits {
    pub transcript_chars: usize,
    pub comment_chars: usize,
}

impl From<&GenerationConfig> for PromptLimits {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            transcript_chars: config.transcript_char_limit,
            comment_chars: config.comment_char_limit,
        }
    }
}

/// Assemble the single user message sent to the model.
///
/// `comments: None` leaves the comments section out entirely; `Some(&[])`
/// keeps the section with the [`NO_COMMENTS`] placeholder.
pub fn build_prompt(
    title: &str,
    transcript: &str,
    comments: Option<&[String]>,
    limits: PromptLimits,
) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are an intelligent assistant.\n");
    prompt.push_str(&format!("Video Title: {}\n", title));
    prompt.push_str("Transcript/Content:\n");
    prompt.push_str(truncate_chars(transcript, limits.transcript_chars));
    prompt.push_str("\n\n");

    if let Some(comments) = comments {
        prompt.push_str("Top Comments:\n");
        if comments.is_empty() {
            prompt.push_str(NO_COMMENTS);
        } else {
            let joined = comments.join("\n");
            prompt.push_str(truncate_chars(&joined, limits.comment_chars));
        }
        prompt.push_str("\n\n");
    }

    prompt.push_str("Please provide a comprehensive summary of this video in Markdown format.\n");
    prompt.push_str("Focus on the key points and takeaways.");
    if comments.is_some() {
        prompt.push_str(" Where comments are given, note how viewers reacted.");
    }
    prompt
}

// ============================================================================
// SummaryGenerator
// ============================================================================

pub struct SummaryGenerator {
    backend: Box<dyn SummaryBackend>,
    limits: PromptLimits,
}

impl SummaryGenerator {
    pub fn new(backend: Box<dyn SummaryBackend>, limits: PromptLimits) -> Self {
        Self { backend, limits }
    }

    /// One generation request per call. Missing candidate text degrades to
    /// [`FAILED_SUMMARY`]; transport and API errors propagate.
    pub async fn summarize(
        &self,
        title: &str,
        transcript: &str,
        comments: Option<&[String]>,
    ) -> Result<String, GenerationError> {
        let prompt = build_prompt(title, transcript, comments, self.limits);
        tracing::debug!(backend = self.backend.name(), prompt_chars = prompt.chars().count(), "Requesting summary");

        match self.backend.generate(&prompt).await? {
            Some(summary) => Ok(summary),
            None => {
                tracing::warn!(
                    backend = self.backend.name(),
                    "Generation returned no candidate text, storing placeholder summary"
                );
                Ok(FAILED_SUMMARY.to_string())
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LIMITS: PromptLimits = PromptLimits {
        transcript_chars: 30_000,
        comment_chars: 10_000,
    };

    fn test_config(base_url: &str) -> GenerationConfig {
        GenerationConfig {
            base_url: base_url.to_string(),
            model: "gemini-test".to_string(),
            timeout_seconds: 5,
            transcript_char_limit: 30_000,
            comment_char_limit: 10_000,
        }
    }

    fn test_generator(server: &MockServer) -> SummaryGenerator {
        let client = GeminiClient::new(&test_config(&server.uri()), Some("test-key".to_string()))
            .expect("Failed to create client");
        SummaryGenerator::new(Box::new(client), LIMITS)
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("视频字幕", 2), "视频");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn test_prompt_truncates_transcript() {
        let transcript = "x".repeat(50);
        let limits = PromptLimits {
            transcript_chars: 10,
            comment_chars: 5,
        };
        let prompt = build_prompt("Title", &transcript, None, limits);

        assert!(prompt.contains("Video Title: Title"));
        assert!(prompt.contains(&format!("{}\n", "x".repeat(10))));
        assert!(!prompt.contains(&"x".repeat(11)));
        assert!(!prompt.contains("Top Comments"));
    }

    #[test]
    fn test_prompt_comment_placeholder_and_truncation() {
        let empty: Vec<String> = Vec::new();
        let prompt = build_prompt("T", "body", Some(empty.as_slice()), LIMITS);
        assert!(prompt.contains("Top Comments:\nNo comments available."));

        let comments = vec!["abcdef".to_string(), "ghij".to_string()];
        let limits = PromptLimits {
            transcript_chars: 100,
            comment_chars: 8,
        };
        let prompt = build_prompt("T", "body", Some(comments.as_slice()), limits);
        assert!(prompt.contains("Top Comments:\nabcdef\ng\n"));
        assert!(!prompt.contains("ghij"));
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let result = GeminiClient::new(&test_config("http://localhost"), Some(String::new()));
        match result {
            Err(GenerationError::MissingApiKey) => {}
            _ => panic!("Expected MissingApiKey error"),
        }
    }

    #[tokio::test]
    async fn test_summarize_sends_single_user_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{ "role": "user" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [
                    { "content": { "role": "model", "parts": [{ "text": "## Summary" }, { "text": "ignored" }] } },
                    { "content": { "parts": [{ "text": "second candidate" }] } }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let summary = test_generator(&server)
            .summarize("Demo", "hello\nworld", None)
            .await
            .unwrap();
        assert_eq!(summary, "## Summary");
    }

    #[tokio::test]
    async fn test_empty_candidates_degrade_to_placeholder() {
        let server = MockServer::start().await;
        let no_comments: Vec<String> = Vec::new();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [],
                "promptFeedback": { "blockReason": "SAFETY" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let summary = test_generator(&server)
            .summarize("Demo", "text", Some(no_comments.as_slice()))
            .await
            .unwrap();
        assert_eq!(summary, FAILED_SUMMARY);
    }

    #[tokio::test]
    async fn test_candidate_without_parts_degrades_to_placeholder() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{ "finishReason": "MAX_TOKENS" }]
            })))
            .mount(&server)
            .await;

        let summary = test_generator(&server)
            .summarize("Demo", "text", None)
            .await
            .unwrap();
        assert_eq!(summary, FAILED_SUMMARY);
    }

    #[tokio::test]
    async fn test_api_error_propagates() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": { "code": 429, "message": "Resource has been exhausted" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = test_generator(&server).summarize("Demo", "text", None).await;
        match result {
            Err(GenerationError::Api { code, message }) => {
                assert_eq!(code, 429);
                assert_eq!(message, "Resource has been exhausted");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_error_does_not_expose_api_key() {
        let client = GeminiClient::new(&test_config("http://127.0.0.1:1"), Some("SECRET-KEY".to_string()))
            .expect("Failed to create client");

        let err = client.generate("prompt").await.unwrap_err();
        assert!(matches!(err, GenerationError::Http(_)));
        assert!(!err.to_string().contains("SECRET-KEY"));
        assert!(!format!("{:?}", err).contains("SECRET-KEY"));
    }
}
