//! Error types for vfscache
//!
//! Every decode primitive surfaces one of these to its caller. Choosing a
//! default value in place of an error is always the caller's decision.

use thiserror::Error;

/// Common result type for vfscache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for vfscache
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying file or page read failed
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Unknown attribute name, absent content id, absent name id
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed varint, scan past declared bounds, unregistered attribute id
    #[error("corrupt cache data: {0}")]
    Corrupt(String),

    /// Record id outside the record table's extent
    #[error("record {record_id} out of range (table holds {extent} records)")]
    OutOfRange { record_id: u32, extent: u32 },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a corruption error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a corruption error
    #[must_use]
    pub const fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt(_))
    }

    /// Check if this is an out of range error
    #[must_use]
    pub const fn is_out_of_range(&self) -> bool {
        matches!(self, Self::OutOfRange { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_predicates() {
        assert!(Error::not_found("name 7").is_not_found());
        assert!(Error::corrupt("bad varint").is_corrupt());
        assert!(
            Error::OutOfRange {
                record_id: 9,
                extent: 4
            }
            .is_out_of_range()
        );
        assert!(!Error::corrupt("x").is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = Error::OutOfRange {
            record_id: 9,
            extent: 4,
        };
        assert_eq!(err.to_string(), "record 9 out of range (table holds 4 records)");

        let io: Error = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(io.to_string().starts_with("I/O failure"));
    }
}
