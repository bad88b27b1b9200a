//! # Validation Errors
//!
//! Structured validation errors shared across the workspace. Variants carry
//! the offending input so callers can surface actionable messages without
//! re-deriving context.

use thiserror::Error;

/// A value failed domain validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A regex pattern failed to compile.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The pattern source as supplied.
        pattern: String,
        /// The compiler's diagnostic.
        reason: String,
    },

    /// A required field was empty or missing.
    #[error("field '{field}' must not be empty")]
    EmptyField {
        /// Name of the offending field.
        field: &'static str,
    },

    /// A numeric field fell outside its permitted range.
    #[error("field '{field}' value {value} out of range {min}..={max}")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// The supplied value.
        value: i64,
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
    },

    /// A timezone name was not a recognized IANA identifier.
    #[error("unknown timezone '{timezone}'")]
    UnknownTimezone {
        /// The timezone name as supplied.
        timezone: String,
    },
}
