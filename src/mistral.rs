//! Mistral API client for file management, OCR, and document Q&A.
//!
//! Thin façade over the HTTP API: one method per capability, each building
//! the exact request shape Mistral expects and returning its wire object
//! untouched. Reshaping into API responses happens in [`crate::format`].

use std::io::SeekFrom;

use async_stream::try_stream;
use eventsource_stream::Eventsource;
use futures_util::{pin_mut, Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncSeekExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::schemas::{ConversationMessage, Role};

const MISTRAL_API_URL: &str = "https://api.mistral.ai";

/// Failures surfaced by the Mistral API or its transport.
#[derive(Debug, Error)]
pub enum MistralError {
    #[error("MISTRAL_API_KEY environment variable not set")]
    MissingApiKey,
    #[error("mistral api error ({status}): {message}")]
    Api { status: StatusCode, message: String },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid response payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("stream interrupted: {0}")]
    Stream(String),
    #[error("upload staging failed: {0}")]
    Io(#[from] std::io::Error),
}

impl MistralError {
    /// True when the provider reported an unknown identifier.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

/// Client for the Mistral files, OCR, and chat APIs.
#[derive(Debug, Clone)]
pub struct MistralClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl MistralClient {
    /// Create a new client, reading the API key from `MISTRAL_API_KEY`.
    pub fn from_env() -> Result<Self, MistralError> {
        let api_key = std::env::var("MISTRAL_API_KEY")
            .map_err(|_| MistralError::MissingApiKey)?;
        Ok(Self::new(api_key))
    }

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: MISTRAL_API_URL.to_string(),
        }
    }

    // ── File management ─────────────────────────────────────────────────────

    /// Upload a PDF to the Files API with `purpose=ocr`.
    ///
    /// The provider requires a real seekable handle, not an arbitrary byte
    /// buffer; callers holding only in-memory bytes must stage them to a
    /// scoped temporary file first. The handle is rewound to offset zero
    /// before the body is streamed.
    pub async fn upload_file(
        &self,
        mut file: tokio::fs::File,
        filename: &str,
        size: u64,
    ) -> Result<FileObject, MistralError> {
        file.seek(SeekFrom::Start(0)).await?;

        info!("Uploading {} ({} bytes) to Mistral Files API", filename, size);

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, size)
            .file_name(filename.to_string())
            .mime_str("application/pdf")?;
        let form = Form::new().part("file", part).text("purpose", "ocr");

        let resp = self
            .client
            .post(format!("{}/v1/files", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let uploaded: FileObject = read_json(resp).await?;
        info!("Uploaded file_id={}", uploaded.id);
        Ok(uploaded)
    }

    /// Retrieve metadata for a stored file.
    pub async fn retrieve_file(&self, file_id: &str) -> Result<FileObject, MistralError> {
        let resp = self
            .client
            .get(format!("{}/v1/files/{}", self.base_url, file_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        read_json(resp).await
    }

    /// List all stored files.
    pub async fn list_files(&self) -> Result<FileList, MistralError> {
        let resp = self
            .client
            .get(format!("{}/v1/files", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        read_json(resp).await
    }

    /// Delete a stored file.
    pub async fn delete_file(&self, file_id: &str) -> Result<DeletedFile, MistralError> {
        let resp = self
            .client
            .delete(format!("{}/v1/files/{}", self.base_url, file_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        read_json(resp).await
    }

    /// Get a time-bounded download URL for a stored file. When `expiry_hours`
    /// is absent the query parameter is omitted and the provider default
    /// expiry applies.
    pub async fn get_signed_url(
        &self,
        file_id: &str,
        expiry_hours: Option<u32>,
    ) -> Result<SignedUrl, MistralError> {
        let mut req = self
            .client
            .get(format!("{}/v1/files/{}/url", self.base_url, file_id))
            .bearer_auth(&self.api_key);

        if let Some(expiry) = expiry_hours {
            req = req.query(&[("expiry", expiry)]);
        }

        read_json(req.send().await?).await
    }

    // ── OCR ─────────────────────────────────────────────────────────────────

    /// Run OCR over a document referenced by signed URL.
    pub async fn process_ocr(
        &self,
        model: &str,
        document_url: &str,
        include_image_base64: bool,
    ) -> Result<OcrResponse, MistralError> {
        let body = OcrRequest {
            model: model.to_string(),
            document: DocumentSource::Url {
                document_url: document_url.to_string(),
            },
            include_image_base64,
        };

        info!("Calling Mistral OCR (model={})", model);

        let resp = self
            .client
            .post(format!("{}/v1/ocr", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        read_json(resp).await
    }

    // ── Q&A ─────────────────────────────────────────────────────────────────

    /// Ask a question about a stored document, blocking until the full
    /// answer is available. Prior turns, if any, are sent verbatim before
    /// the current question.
    pub async fn query_document(
        &self,
        model: &str,
        file_id: &str,
        question: &str,
        history: &[ConversationMessage],
    ) -> Result<ChatCompletion, MistralError> {
        let signed = self.get_signed_url(file_id, None).await?;
        let request = ChatRequest {
            model: model.to_string(),
            messages: compose_messages(history, question, &signed.url),
            stream: None,
        };

        debug!("Chat completion request: model={}, file_id={}", model, file_id);

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let completion: ChatCompletion = read_json(resp).await?;
        if let Some(usage) = &completion.usage {
            info!(
                "Chat completion: {} tokens (prompt: {}, completion: {})",
                usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            );
        }
        Ok(completion)
    }

    /// Ask a question about a stored document, streaming answer increments
    /// as they arrive. The returned stream owns the connection; dropping it
    /// releases the upstream response.
    pub async fn query_document_stream(
        &self,
        model: &str,
        file_id: &str,
        question: &str,
        history: &[ConversationMessage],
    ) -> Result<impl Stream<Item = Result<ChatCompletionChunk, MistralError>> + Send + 'static, MistralError>
    {
        let signed = self.get_signed_url(file_id, None).await?;
        let request = ChatRequest {
            model: model.to_string(),
            messages: compose_messages(history, question, &signed.url),
            stream: Some(true),
        };

        debug!("Streaming chat request: model={}, file_id={}", model, file_id);

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(MistralError::Api { status, message });
        }

        let events = resp.bytes_stream().eventsource();

        Ok(try_stream! {
            pin_mut!(events);
            while let Some(event) = events.next().await {
                let event = event.map_err(|e| MistralError::Stream(e.to_string()))?;
                if event.data.trim() == "[DONE]" {
                    break;
                }
                let chunk: ChatCompletionChunk = serde_json::from_str(&event.data)?;
                yield chunk;
            }
        })
    }
}

/// Check status and decode the response body, embedding the provider's
/// message on failure.
async fn read_json<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, MistralError> {
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(MistralError::Api { status, message });
    }
    Ok(resp.json::<T>().await?)
}

/// Build the message list for a document question: prior turns in original
/// order, then a user turn carrying the question text and the document's
/// signed URL.
pub fn compose_messages(
    history: &[ConversationMessage],
    question: &str,
    document_url: &str,
) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = history
        .iter()
        .map(|turn| ChatMessage {
            role: turn.role,
            content: MessageContent::Text(turn.content.clone()),
        })
        .collect();

    messages.push(ChatMessage {
        role: Role::User,
        content: MessageContent::Parts(vec![
            ContentPart::Text {
                text: question.to_string(),
            },
            ContentPart::DocumentUrl {
                document_url: document_url.to_string(),
            },
        ]),
    });

    messages
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Serialize)]
struct OcrRequest {
    model: String,
    document: DocumentSource,
    include_image_base64: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum DocumentSource {
    #[serde(rename = "document_url")]
    Url { document_url: String },
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    DocumentUrl { document_url: String },
}

// ============================================================================
// Response types
// ============================================================================

/// A stored file as the provider reports it. Attributes the provider may
/// omit are optional here; defaults are applied at the mapping boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct FileObject {
    pub id: String,
    pub object: String,
    pub bytes: Option<u64>,
    pub created_at: i64,
    pub filename: String,
    pub purpose: String,
    pub sample_type: Option<String>,
    pub num_lines: Option<u32>,
    pub mimetype: Option<String>,
    pub source: Option<String>,
    pub signature: Option<String>,
    pub deleted: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct FileList {
    #[serde(default)]
    pub data: Vec<FileObject>,
}

#[derive(Debug, Deserialize)]
pub struct DeletedFile {
    pub id: String,
    pub deleted: bool,
}

#[derive(Debug, Deserialize)]
pub struct SignedUrl {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct OcrResponse {
    pub pages: Vec<OcrPageObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrPageObject {
    pub index: u32,
    pub markdown: String,
    pub image_base64: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletion {
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One increment of a streaming chat response.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    pub delta: ChunkDelta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkDelta {
    pub content: Option<String>,
}

impl ChatCompletionChunk {
    /// Text carried by this increment, if any.
    pub fn delta_content(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.delta.content.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::ConversationMessage;

    fn turn(role: Role, content: &str) -> ConversationMessage {
        ConversationMessage {
            role,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_compose_messages_history_then_question() {
        let history = vec![turn(Role::User, "A"), turn(Role::Assistant, "B")];
        let messages = compose_messages(&history, "C", "https://signed.example/doc");

        let json = serde_json::to_value(&messages).unwrap();
        assert_eq!(json[0]["role"], "user");
        assert_eq!(json[0]["content"], "A");
        assert_eq!(json[1]["role"], "assistant");
        assert_eq!(json[1]["content"], "B");
        // The question turn is last: text part, then the document reference.
        assert_eq!(json[2]["role"], "user");
        assert_eq!(json[2]["content"][0]["type"], "text");
        assert_eq!(json[2]["content"][0]["text"], "C");
        assert_eq!(json[2]["content"][1]["type"], "document_url");
        assert_eq!(
            json[2]["content"][1]["document_url"],
            "https://signed.example/doc"
        );
    }

    #[test]
    fn test_compose_messages_without_history() {
        let messages = compose_messages(&[], "what is this?", "https://signed.example/doc");
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn test_chunk_delta_content() {
        let chunk: ChatCompletionChunk =
            serde_json::from_str(r#"{"choices": [{"delta": {"content": "Hi"}}]}"#).unwrap();
        assert_eq!(chunk.delta_content(), Some("Hi"));

        let empty: ChatCompletionChunk = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert_eq!(empty.delta_content(), None);

        let no_content: ChatCompletionChunk =
            serde_json::from_str(r#"{"choices": [{"delta": {"role": "assistant"}}]}"#).unwrap();
        assert_eq!(no_content.delta_content(), None);
    }

    #[test]
    fn test_file_object_tolerates_missing_optionals() {
        let file: FileObject = serde_json::from_str(
            r#"{
                "id": "file-abc123xyz",
                "object": "file",
                "created_at": 1700000000,
                "filename": "report.pdf",
                "purpose": "ocr"
            }"#,
        )
        .unwrap();
        assert_eq!(file.bytes, None);
        assert_eq!(file.mimetype, None);
        assert_eq!(file.deleted, None);
    }
}
