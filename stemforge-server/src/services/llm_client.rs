//! LLM-gateway text search
//!
//! Sends a text, lyrics, or description query to an OpenAI-compatible chat
//! endpoint and parses the model's JSON reply into song suggestions.

use crate::models::{SongSuggestion, SuggestionSource};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Errors from the LLM gateway
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited")]
    RateLimited,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// One suggestion as the model is asked to emit it
#[derive(Debug, Deserialize)]
struct LlmSuggestion {
    title: String,
    artist: String,
    album: Option<String>,
    confidence: Option<f64>,
}

/// Client for an OpenAI-compatible chat-completions gateway
pub struct LlmClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl LlmClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: Option<String>,
    ) -> Result<Self, LlmError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    /// Ask the model for up to five candidate tracks matching the query
    pub async fn suggest_songs(
        &self,
        query: &str,
        query_type: &str,
    ) -> Result<Vec<SongSuggestion>, LlmError> {
        let prompt = format!(
            "A user is searching for a song by {}. Query: {:?}\n\
             Reply with ONLY a JSON array of up to 5 candidates, each an object \
             with keys \"title\", \"artist\", \"album\" (nullable), and \
             \"confidence\" (0.0-1.0). No prose.",
            match query_type {
                "lyrics" => "a lyrics fragment",
                "description" => "a free-form description",
                _ => "title",
            },
            query
        );

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.2,
        };

        tracing::debug!(model = %self.model, query_type, "Requesting song suggestions from LLM gateway");

        let mut builder = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        let status = response.status();
        if status == 429 {
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let content = chat
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| LlmError::InvalidResponse("empty choice list".to_string()))?;

        parse_suggestions(content)
    }
}

/// Extract the JSON array from the model reply, tolerating code fences
fn parse_suggestions(content: &str) -> Result<Vec<SongSuggestion>, LlmError> {
    let trimmed = content.trim();
    let json = if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) {
        &trimmed[start..=end]
    } else {
        trimmed
    };

    let raw: Vec<LlmSuggestion> = serde_json::from_str(json)
        .map_err(|e| LlmError::InvalidResponse(format!("suggestion parse: {}", e)))?;

    Ok(raw
        .into_iter()
        .map(|suggestion| {
            SongSuggestion {
                id: Uuid::new_v4().to_string(),
                title: suggestion.title,
                artist: suggestion.artist,
                album: suggestion.album,
                album_art: None,
                isrc: None,
                confidence: suggestion.confidence.unwrap_or(0.5),
                source: SuggestionSource::Llm,
                spotify_id: None,
                apple_music_id: None,
            }
            .with_clamped_confidence()
        })
        .collect())
}
