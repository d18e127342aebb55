//! Errors produced by the log reader.

/// Errors that can occur while reading a DNS log.
///
/// `MissingField` means "skip this record"; every other variant means
/// "abort this file". Callers classify with [`ReadError::is_missing_field`].
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("unable to determine log format, first byte was 0x{first_byte:02x}")]
    UnknownFormat { first_byte: u8 },

    #[error("empty input, nothing to classify")]
    EmptyInput,

    #[error("record has no field {field:?}")]
    MissingField { field: String },

    #[error("field {field:?} is not a {expected}")]
    WrongType { field: String, expected: &'static str },

    #[error("malformed separator directive {directive:?}")]
    BadSeparator { directive: String },

    #[error("malformed JSON record on line {line}: {message}")]
    BadJson { line: u64, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ReadError {
    /// True when the error only invalidates the current record.
    pub fn is_missing_field(&self) -> bool {
        matches!(self, Self::MissingField { .. })
    }
}
