//! Upload and identifier validation.
//!
//! Pure, synchronous checks run before anything touches the Mistral API.
//! Rules short-circuit in order, so a nameless oversized upload reports the
//! missing filename, not the size.

use thiserror::Error;

/// Reasons a request is rejected before reaching the provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("filename is required")]
    MissingFilename,
    #[error("only pdf files are supported")]
    UnsupportedType,
    #[error("file is empty")]
    EmptyFile,
    #[error("file size exceeds {0}mb limit")]
    FileTooLarge(u64),
    #[error("invalid file_id format")]
    InvalidIdentifier,
    #[error("last message must be from user")]
    InvalidConversation,
}

/// Validate an upload candidate: filename present, `.pdf` extension
/// (case-insensitive), non-empty content, and within the size ceiling.
pub fn validate_upload(
    filename: Option<&str>,
    content_len: usize,
    max_size_mb: u64,
) -> Result<(), ValidationError> {
    let filename = match filename {
        Some(name) if !name.is_empty() => name,
        _ => return Err(ValidationError::MissingFilename),
    };

    if !filename.to_lowercase().ends_with(".pdf") {
        return Err(ValidationError::UnsupportedType);
    }

    if content_len == 0 {
        return Err(ValidationError::EmptyFile);
    }

    if content_len as u64 > max_size_mb * 1024 * 1024 {
        return Err(ValidationError::FileTooLarge(max_size_mb));
    }

    Ok(())
}

/// Validate the shape of a provider file identifier (non-empty, at least
/// 10 characters). Catches obviously malformed ids without a network call.
pub fn validate_file_id(file_id: &str) -> Result<(), ValidationError> {
    if file_id.is_empty() || file_id.len() < 10 {
        return Err(ValidationError::InvalidIdentifier);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_pdf_upload() {
        assert_eq!(validate_upload(Some("report.pdf"), 1024, 50), Ok(()));
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        assert_eq!(validate_upload(Some("REPORT.PDF"), 1024, 50), Ok(()));
        assert_eq!(validate_upload(Some("scan.Pdf"), 1024, 50), Ok(()));
    }

    #[test]
    fn test_missing_filename() {
        assert_eq!(
            validate_upload(None, 1024, 50),
            Err(ValidationError::MissingFilename)
        );
        assert_eq!(
            validate_upload(Some(""), 1024, 50),
            Err(ValidationError::MissingFilename)
        );
    }

    #[test]
    fn test_unsupported_extension() {
        assert_eq!(
            validate_upload(Some("notes.txt"), 1024, 50),
            Err(ValidationError::UnsupportedType)
        );
        assert_eq!(
            validate_upload(Some("archive.pdf.zip"), 1024, 50),
            Err(ValidationError::UnsupportedType)
        );
    }

    #[test]
    fn test_empty_file() {
        assert_eq!(
            validate_upload(Some("empty.pdf"), 0, 50),
            Err(ValidationError::EmptyFile)
        );
    }

    #[test]
    fn test_size_ceiling_boundary() {
        let ceiling = 50 * 1024 * 1024;
        assert_eq!(validate_upload(Some("big.pdf"), ceiling, 50), Ok(()));
        assert_eq!(
            validate_upload(Some("big.pdf"), ceiling + 1, 50),
            Err(ValidationError::FileTooLarge(50))
        );
    }

    #[test]
    fn test_filename_checked_before_size() {
        // Rule order: a nameless oversized upload reports the filename first.
        assert_eq!(
            validate_upload(None, 60 * 1024 * 1024, 50),
            Err(ValidationError::MissingFilename)
        );
    }

    #[test]
    fn test_file_id_length_boundary() {
        assert_eq!(validate_file_id("a1b2c3d4e5"), Ok(()));
        assert_eq!(
            validate_file_id("a1b2c3d4e"),
            Err(ValidationError::InvalidIdentifier)
        );
        assert_eq!(
            validate_file_id(""),
            Err(ValidationError::InvalidIdentifier)
        );
    }
}
