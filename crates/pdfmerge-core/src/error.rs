use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfMergeError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Failed to decode image: {0}")]
    ImageError(String),

    #[error("Encryption failed: {0}")]
    EncryptionError(String),

    #[error("Incorrect password")]
    WrongPassword,
}
