//! Error types for the object store.
//!
//! Four kinds of failure are distinguished. Damage to a single object never
//! reaches the caller as an `Err` from object resolution: it is logged and the
//! object resolves to `Null`. Codec truncation produces partial output. What is
//! left for this enum are document-level violations (the file cannot be opened),
//! security failures (recoverable, the caller may retry with another password)
//! and plain I/O or argument errors.

/// Result type alias for object store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while reading, decoding or writing a document.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)] // "Invalid" prefix is intentional for clarity
pub enum Error {
    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Reason for parse failure
        reason: String,
    },

    /// Invalid cross-reference data that could not be repaired
    #[error("Invalid cross-reference table: {0}")]
    InvalidXref(String),

    /// The trailer has no usable /Root catalog
    #[error("Document catalog is missing or invalid")]
    MissingCatalog,

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Unexpected end of input
    #[error("End of file reached unexpectedly")]
    UnexpectedEof,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid document structure
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Stream decoding or encoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// No password supplied so far unlocks the document.
    ///
    /// The document stays open; call `check_password` again with another
    /// candidate.
    #[error("Invalid password: the document is locked")]
    InvalidPassword,

    /// Encryption scheme this handler cannot process
    #[error("Unsupported encryption: {0}")]
    UnsupportedEncryption(String),

    /// Encryption or decryption failed for a well-formed request
    #[error("Encryption error: {0}")]
    Encryption(String),
}

impl Error {
    /// Whether this error belongs to the security class and can be retried.
    pub fn is_security(&self) -> bool {
        matches!(self, Error::InvalidPassword | Error::UnsupportedEncryption(_))
    }
}
