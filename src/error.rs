//! Error types for the PDF structural engine

use std::io;
use thiserror::Error;

use crate::pdf::ObjectId;

/// Main error type for PDF parsing and writing operations
#[derive(Error, Debug)]
pub enum PDFError {
    /// Malformed token or unexpected delimiter
    #[error("Syntax error at byte {offset}: {message}")]
    Syntax {
        offset: u64,
        message: String,
    },

    /// Input ended in the middle of a structure
    #[error("Unexpected end of file at byte {offset}")]
    UnexpectedEof {
        offset: u64,
    },

    /// No `%PDF-` or `%FDF-` header in the first kilobyte
    #[error("PDF header not found")]
    HeaderNotFound,

    /// No `startxref` keyword before end of file
    #[error("startxref not found")]
    StartXRefNotFound,

    /// Cross reference section error
    #[error("Cross reference error at byte {offset}: {message}")]
    XRef {
        offset: u64,
        message: String,
    },

    /// Missing required trailer entry
    #[error("Missing required trailer entry: {0}")]
    MissingTrailerEntry(String),

    /// Object header does not match the reference that pointed at it
    #[error("Object header mismatch at byte {offset}: expected {expected}, found {found}")]
    ObjectHeaderMismatch {
        offset: u64,
        expected: ObjectId,
        found: String,
    },

    /// Cross reference entries contradict each other
    #[error("Inconsistent cross reference entry for object {number}: {message}")]
    InconsistentXRef {
        number: u32,
        message: String,
    },

    /// Object not found
    #[error("Object not found: {0}")]
    ObjectNotFound(u32),

    /// Invalid object type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        expected: &'static str,
        found: &'static str,
    },

    /// Invalid dictionary value
    #[error("Invalid dictionary value for key {key}: {message}")]
    InvalidDictionaryValue {
        key: String,
        message: String,
    },

    /// Stream error
    #[error("Stream error: {0}")]
    Stream(String),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Cryptographic operation failed
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    /// Invalid key length
    #[error("Invalid key length: {0}")]
    InvalidKeyLength(usize),

    /// Invalid data length
    #[error("Invalid data length for {operation}")]
    InvalidDataLength {
        operation: String,
    },

    /// Document is encrypted but no decryptor was supplied
    #[error("Document is encrypted and no decryptor was supplied")]
    MissingDecryptor,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for PDF operations
pub type PDFResult<T> = Result<T, PDFError>;

impl PDFError {
    /// Create a new syntax error
    pub fn syntax(offset: u64, msg: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            message: msg.into(),
        }
    }

    /// Create a new cross reference error
    pub fn xref(offset: u64, msg: impl Into<String>) -> Self {
        Self::XRef {
            offset,
            message: msg.into(),
        }
    }

    /// Create a new crypto error
    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    /// Create a new invalid data length error
    pub fn invalid_length(operation: impl Into<String>) -> Self {
        Self::InvalidDataLength {
            operation: operation.into(),
        }
    }

    /// Create a new invalid dictionary value error
    pub fn invalid_dict_value(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidDictionaryValue {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Byte offset the error was detected at, if known
    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::Syntax { offset, .. }
            | Self::UnexpectedEof { offset }
            | Self::XRef { offset, .. }
            | Self::ObjectHeaderMismatch { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    /// Check if error is a lexical or grammar error
    pub fn is_syntax_error(&self) -> bool {
        matches!(self,
            Self::Syntax { .. } |
            Self::UnexpectedEof { .. }
        )
    }

    /// Check if error is related to document structure
    pub fn is_structure_error(&self) -> bool {
        matches!(self,
            Self::HeaderNotFound |
            Self::StartXRefNotFound |
            Self::XRef { .. } |
            Self::MissingTrailerEntry(_) |
            Self::ObjectHeaderMismatch { .. } |
            Self::InconsistentXRef { .. } |
            Self::ObjectNotFound(_)
        )
    }

    /// Check if error is cryptographic
    pub fn is_crypto_error(&self) -> bool {
        matches!(self,
            Self::Crypto(_) |
            Self::InvalidKeyLength(_) |
            Self::InvalidDataLength { .. } |
            Self::MissingDecryptor
        )
    }
}

impl From<aes::cipher::InvalidLength> for PDFError {
    fn from(err: aes::cipher::InvalidLength) -> Self {
        Self::Crypto(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PDFError::syntax(12, "unmatched '>'");
        assert!(matches!(err, PDFError::Syntax { offset: 12, .. }));

        let err = PDFError::crypto("bad padding");
        assert!(matches!(err, PDFError::Crypto(_)));

        let err = PDFError::invalid_length("AES decryption");
        assert!(matches!(err, PDFError::InvalidDataLength { .. }));
    }

    #[test]
    fn test_error_categorization() {
        let err = PDFError::UnexpectedEof { offset: 3 };
        assert!(err.is_syntax_error());
        assert!(!err.is_structure_error());

        let err = PDFError::StartXRefNotFound;
        assert!(err.is_structure_error());
        assert!(!err.is_crypto_error());

        let err = PDFError::MissingDecryptor;
        assert!(err.is_crypto_error());
    }

    #[test]
    fn test_error_offset() {
        assert_eq!(PDFError::xref(400, "xref keyword missing").offset(), Some(400));
        let err = PDFError::ObjectHeaderMismatch {
            offset: 77,
            expected: ObjectId::new(4, 0),
            found: "5 0 obj".to_string(),
        };
        assert_eq!(err.offset(), Some(77));
        assert_eq!(PDFError::HeaderNotFound.offset(), None);
    }

    #[test]
    fn test_error_display() {
        let err = PDFError::InvalidKeyLength(32);
        assert_eq!(err.to_string(), "Invalid key length: 32");

        let err = PDFError::ObjectHeaderMismatch {
            offset: 10,
            expected: ObjectId::new(7, 1),
            found: "7 0 obj".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Object header mismatch at byte 10: expected 7 1 R, found 7 0 obj"
        );
    }

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let pdf_err: PDFError = io_err.into();
        assert!(matches!(pdf_err, PDFError::Io(_)));
    }
}
