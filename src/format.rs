//! Mapping from Mistral wire objects to API response records.
//!
//! Pure functions, and the only place defaults for absent provider
//! attributes are applied. Fields like `sample_type` and `signature` are
//! opaque passthroughs; no meaning is inferred from them.

use thiserror::Error;

use crate::mistral::{ChatChoice, ChatCompletion, FileList, FileObject, OcrResponse, TokenUsage};
use crate::schemas::{
    DeleteFileResponse, DocumentConversationResponse, DocumentQaResponse, FileListResponse,
    FileRetrieveResponse, FileUploadResponse, OcrPage, OcrProcessResponse, Usage,
};

const DEFAULT_MIMETYPE: &str = "application/pdf";
const DEFAULT_SAMPLE_TYPE: &str = "ocr_input";
const DEFAULT_SOURCE: &str = "upload";

/// A provider response that cannot be reshaped into a complete record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// Token accounting is load-bearing upstream; an absent usage block is
    /// fatal, never defaulted.
    #[error("provider response missing usage data")]
    MissingUsage,
    #[error("provider response contained no choices")]
    EmptyChoices,
}

/// Map a freshly uploaded file. `content_len` is the locally measured upload
/// size, used as the byte-count fallback for this operation only.
pub fn upload_response(file: FileObject, content_len: u64) -> FileUploadResponse {
    FileUploadResponse {
        id: file.id,
        object: file.object,
        bytes: file.bytes.unwrap_or(content_len),
        created_at: file.created_at,
        filename: file.filename,
        purpose: file.purpose,
        sample_type: file.sample_type.unwrap_or_else(|| DEFAULT_SAMPLE_TYPE.to_string()),
        num_lines: file.num_lines.unwrap_or(0),
        mimetype: file.mimetype.unwrap_or_else(|| DEFAULT_MIMETYPE.to_string()),
        source: file.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        signature: file.signature.unwrap_or_default(),
    }
}

/// Map a stored file's metadata (retrieve and list).
pub fn file_metadata(file: FileObject) -> FileRetrieveResponse {
    FileRetrieveResponse {
        id: file.id,
        object: file.object,
        bytes: file.bytes.unwrap_or(0),
        created_at: file.created_at,
        filename: file.filename,
        purpose: file.purpose,
        sample_type: file.sample_type.unwrap_or_else(|| DEFAULT_SAMPLE_TYPE.to_string()),
        num_lines: file.num_lines.unwrap_or(0),
        mimetype: file.mimetype.unwrap_or_else(|| DEFAULT_MIMETYPE.to_string()),
        source: file.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        signature: file.signature.unwrap_or_default(),
        deleted: file.deleted.unwrap_or(false),
    }
}

pub fn file_list(list: FileList) -> FileListResponse {
    let files: Vec<FileRetrieveResponse> = list.data.into_iter().map(file_metadata).collect();
    let total = files.len();
    FileListResponse { files, total }
}

pub fn delete_response(file_id: &str) -> DeleteFileResponse {
    DeleteFileResponse {
        id: file_id.to_string(),
        deleted: true,
        message: format!("file {} deleted successfully", file_id),
    }
}

/// Map OCR output, preserving page order. The image payload is included only
/// when the provider produced a non-empty value.
pub fn ocr_pages(resp: OcrResponse) -> OcrProcessResponse {
    let pages = resp
        .pages
        .into_iter()
        .map(|page| OcrPage {
            index: page.index,
            markdown: page.markdown,
            image_base64: page.image_base64.filter(|img| !img.is_empty()),
        })
        .collect();
    OcrProcessResponse { pages }
}

/// Map a chat completion into a Q&A answer. The answer comes from the first
/// choice; the three usage counters are copied verbatim.
pub fn qa_response(
    completion: ChatCompletion,
    file_id: &str,
    question: &str,
) -> Result<DocumentQaResponse, MappingError> {
    let (answer, usage) = answer_and_usage(completion.choices, completion.usage)?;
    Ok(DocumentQaResponse {
        answer,
        model: completion.model,
        usage,
        file_id: file_id.to_string(),
        question: question.to_string(),
    })
}

/// Conversation-mode variant of [`qa_response`], echoing the supplied
/// message count instead of the question text.
pub fn conversation_response(
    completion: ChatCompletion,
    file_id: &str,
    conversation_length: usize,
) -> Result<DocumentConversationResponse, MappingError> {
    let (answer, usage) = answer_and_usage(completion.choices, completion.usage)?;
    Ok(DocumentConversationResponse {
        answer,
        model: completion.model,
        usage,
        file_id: file_id.to_string(),
        conversation_length,
    })
}

fn answer_and_usage(
    choices: Vec<ChatChoice>,
    usage: Option<TokenUsage>,
) -> Result<(String, Usage), MappingError> {
    let answer = choices
        .into_iter()
        .next()
        .ok_or(MappingError::EmptyChoices)?
        .message
        .content
        .unwrap_or_default();

    let usage = usage.ok_or(MappingError::MissingUsage)?;

    Ok((
        answer,
        Usage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        },
    ))
}
