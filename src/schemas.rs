//! Request and response schemas for the HTTP surface.
//!
//! Every response type is fully populated: optional provider attributes are
//! resolved to documented defaults in [`crate::format`] before they get here.

use serde::{Deserialize, Serialize};

use crate::validate::ValidationError;

// ============================================================================
// Document management
// ============================================================================

/// Metadata returned after uploading a document to Mistral cloud.
#[derive(Debug, Clone, Serialize)]
pub struct FileUploadResponse {
    pub id: String,
    pub object: String,
    pub bytes: u64,
    pub created_at: i64,
    pub filename: String,
    pub purpose: String,
    pub sample_type: String,
    pub num_lines: u32,
    pub mimetype: String,
    pub source: String,
    pub signature: String,
}

/// Metadata for a stored document (retrieve/list).
#[derive(Debug, Clone, Serialize)]
pub struct FileRetrieveResponse {
    pub id: String,
    pub object: String,
    pub bytes: u64,
    pub created_at: i64,
    pub filename: String,
    pub purpose: String,
    pub sample_type: String,
    pub num_lines: u32,
    pub mimetype: String,
    pub source: String,
    pub signature: String,
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<FileRetrieveResponse>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct DeleteFileResponse {
    pub id: String,
    pub deleted: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SignedUrlResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct SignedUrlQuery {
    pub expiry_hours: Option<u32>,
}

// ============================================================================
// OCR
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct OcrQueryRequest {
    pub file_id: String,
    #[serde(default)]
    pub include_image_base64: bool,
}

/// One OCR'd page: zero-based index, markdown text, and the embedded image
/// only when the provider produced one.
#[derive(Debug, Clone, Serialize)]
pub struct OcrPage {
    pub index: u32,
    pub markdown: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OcrProcessResponse {
    pub pages: Vec<OcrPage>,
}

// ============================================================================
// Q&A
// ============================================================================

/// Token accounting copied verbatim from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn in a caller-supplied conversation. History is never stored
/// server-side; the caller is the sole keeper of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct DocumentQaRequest {
    pub file_id: String,
    pub question: String,
    /// Defaults to the configured Q&A model when omitted.
    pub model: Option<String>,
    pub conversation_history: Option<Vec<ConversationMessage>>,
}

#[derive(Debug, Serialize)]
pub struct DocumentQaResponse {
    pub answer: String,
    pub model: String,
    pub usage: Usage,
    pub file_id: String,
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct DocumentConversationRequest {
    pub file_id: String,
    pub messages: Vec<ConversationMessage>,
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DocumentConversationResponse {
    pub answer: String,
    pub model: String,
    pub usage: Usage,
    pub file_id: String,
    pub conversation_length: usize,
}

/// Split a conversation into (history, current question).
///
/// The last message must be a `user` turn; it becomes the question and every
/// earlier turn becomes history in original order.
pub fn split_conversation(
    messages: &[ConversationMessage],
) -> Result<(Vec<ConversationMessage>, String), ValidationError> {
    let (last, history) = messages
        .split_last()
        .ok_or(ValidationError::InvalidConversation)?;

    if last.role != Role::User {
        return Err(ValidationError::InvalidConversation);
    }

    Ok((history.to_vec(), last.content.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: Role, content: &str) -> ConversationMessage {
        ConversationMessage {
            role,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_split_conversation_preserves_order() {
        let messages = vec![
            msg(Role::User, "A"),
            msg(Role::Assistant, "B"),
            msg(Role::User, "C"),
        ];

        let (history, question) = split_conversation(&messages).unwrap();
        assert_eq!(question, "C");
        assert_eq!(history, vec![msg(Role::User, "A"), msg(Role::Assistant, "B")]);
    }

    #[test]
    fn test_split_conversation_single_user_message() {
        let messages = vec![msg(Role::User, "only question")];
        let (history, question) = split_conversation(&messages).unwrap();
        assert!(history.is_empty());
        assert_eq!(question, "only question");
    }

    #[test]
    fn test_split_conversation_rejects_trailing_assistant() {
        let messages = vec![msg(Role::User, "A"), msg(Role::Assistant, "B")];
        assert_eq!(
            split_conversation(&messages),
            Err(ValidationError::InvalidConversation)
        );
    }

    #[test]
    fn test_split_conversation_rejects_empty() {
        assert_eq!(
            split_conversation(&[]),
            Err(ValidationError::InvalidConversation)
        );
    }

    #[test]
    fn test_role_serde_is_lowercase() {
        let parsed: ConversationMessage =
            serde_json::from_str(r#"{"role": "assistant", "content": "hi"}"#).unwrap();
        assert_eq!(parsed.role, Role::Assistant);
        assert_eq!(
            serde_json::to_string(&parsed.role).unwrap(),
            r#""assistant""#
        );
    }
}
