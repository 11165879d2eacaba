//! Error types for value parsing in shiner-types.

use thiserror::Error;

/// Errors that can occur when parsing values exchanged with a core.
///
/// This error type is transport-agnostic and does not include BLE errors
/// (those belong in shiner-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// The raw string does not parse as the expected kind.
    #[error("Invalid {kind} value: {raw:?}")]
    InvalidValue {
        /// Expected kind, as displayed.
        kind: &'static str,
        /// The offending raw string.
        raw: String,
    },

    /// A color string did not contain exactly three channels.
    #[error("Color requires 3 channels, got {0}")]
    ChannelCount(usize),

    /// A color channel is outside `0..=255`.
    #[error("Color channel out of range: {0}")]
    ChannelOutOfRange(String),

    /// Unknown property name.
    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    /// The documentation payload is not valid JSON of the expected shape.
    #[error("Invalid documentation: {0}")]
    InvalidDocumentation(String),
}

/// Result type alias using shiner-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
