//! Error types for shiner-core.
//!
//! Every error is local: it concerns either one property of one core or one
//! connection attempt, and none of them leaves the engine in an unusable
//! state.
//!
//! | Error | Raised by | Typical handling |
//! |-------|-----------|------------------|
//! | [`Error::TransportUnavailable`] | scan / connect | Wait for the adapter; scan requests are deferred automatically |
//! | [`Error::ConnectionFailed`] | connect | Surface to the user, let them retry |
//! | [`Error::AlreadyConnected`] | connect | Disconnect the current core first |
//! | [`Error::ConnectInProgress`] | connect | Wait for the first connect to finish |
//! | [`Error::PropertyUnavailable`] | write / refresh | The firmware does not expose this property |
//! | [`Error::WriteFailed`] | throttled write | Reported as an event; the value is re-read |
//! | [`Error::InvalidData`] | incoming values | Dropped; prior value kept |
//! | [`Error::Timeout`] | BLE transport | Retry the operation |

use std::time::Duration;

use thiserror::Error;

use shiner_types::{ParseError, Property, PropertyKind};

/// Errors that can occur while discovering or synchronizing cores.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// The radio is off, unauthorized or absent.
    #[error("Bluetooth transport unavailable")]
    TransportUnavailable,

    /// No core with this identifier is known.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Operation attempted while not connected to the core.
    #[error("Not connected to device")]
    NotConnected,

    /// A different core is already intentionally connected.
    #[error("Already connected to {0}")]
    AlreadyConnected(String),

    /// A connect to this core has not finished yet.
    #[error("Connection to {0} already in progress")]
    ConnectInProgress(String),

    /// Connection failed with specific reason.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// The device identifier that failed to connect.
        device_id: Option<String>,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// A characteristic is not part of the discovered service.
    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(uuid::Uuid),

    /// The property has no endpoint binding on the current connection.
    #[error("Property '{property}' is not available on this device")]
    PropertyUnavailable {
        /// The unavailable property.
        property: Property,
    },

    /// The property is read-only.
    #[error("Property '{property}' is read-only")]
    NotWritable {
        /// The read-only property.
        property: Property,
    },

    /// A property name did not match any known property.
    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    /// A typed value does not match the property's kind.
    #[error("Property '{property}' expects a {expected} value, got {actual}")]
    KindMismatch {
        /// The target property.
        property: Property,
        /// The property's kind.
        expected: PropertyKind,
        /// The kind that was supplied.
        actual: PropertyKind,
    },

    /// Data received from the device could not be decoded.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Write operation failed.
    #[error("Write failed for property '{property}': {reason}")]
    WriteFailed {
        /// The property being written.
        property: Property,
        /// The reason for the failure.
        reason: String,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Bluetooth adapter not available or powered off.
    AdapterUnavailable,
    /// The device is no longer advertising.
    OutOfRange,
    /// Connection attempt timed out.
    Timeout,
    /// The device does not expose the Shiner service.
    ServiceNotFound,
    /// The link dropped before synchronization finished.
    LinkLost,
    /// Generic BLE error.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdapterUnavailable => write!(f, "Bluetooth adapter unavailable"),
            Self::OutOfRange => write!(f, "device out of range"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::ServiceNotFound => write!(f, "Shiner service not found"),
            Self::LinkLost => write!(f, "link lost while connecting"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error {
    /// Create a device not found error for a specific identifier.
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::DeviceNotFound(identifier.into())
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(device_id: Option<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed { device_id, reason }
    }

    /// Create a write failure.
    pub fn write_failed(property: Property, reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            property,
            reason: reason.into(),
        }
    }

    /// Reason to report when this error ends a connection attempt.
    pub fn as_connection_failure(&self) -> ConnectionFailureReason {
        match self {
            Self::ConnectionFailed { reason, .. } => reason.clone(),
            Self::TransportUnavailable => ConnectionFailureReason::AdapterUnavailable,
            Self::Timeout { .. } => ConnectionFailureReason::Timeout,
            Self::DeviceNotFound(_) => ConnectionFailureReason::OutOfRange,
            Self::Bluetooth(e) => ConnectionFailureReason::BleError(e.to_string()),
            other => ConnectionFailureReason::Other(other.to_string()),
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::UnknownProperty(name) => Error::UnknownProperty(name),
            // Handle future ParseError variants (non_exhaustive)
            other => Error::InvalidData(other.to_string()),
        }
    }
}

/// Result type alias using shiner-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::device_not_found("AA:BB:CC:DD:EE:FF");
        assert!(err.to_string().contains("AA:BB:CC:DD:EE:FF"));

        let err = Error::NotConnected;
        assert_eq!(err.to_string(), "Not connected to device");

        let err = Error::PropertyUnavailable {
            property: Property::BlendMode,
        };
        assert_eq!(
            err.to_string(),
            "Property 'blendMode' is not available on this device"
        );

        let err = Error::timeout("read", Duration::from_secs(10));
        assert!(err.to_string().contains("read"));
        assert!(err.to_string().contains("10s"));
    }

    #[test]
    fn test_kind_mismatch_display() {
        let err = Error::KindMismatch {
            property: Property::Speed,
            expected: PropertyKind::Real,
            actual: PropertyKind::Text,
        };
        assert_eq!(
            err.to_string(),
            "Property 'speed' expects a real value, got text"
        );
    }

    #[test]
    fn test_connection_failure_reason() {
        assert_eq!(
            Error::TransportUnavailable.as_connection_failure(),
            ConnectionFailureReason::AdapterUnavailable
        );
        assert_eq!(
            Error::timeout("connect", Duration::from_secs(1)).as_connection_failure(),
            ConnectionFailureReason::Timeout
        );
        let err = Error::connection_failed(
            Some("id".to_string()),
            ConnectionFailureReason::ServiceNotFound,
        );
        assert_eq!(
            err.as_connection_failure(),
            ConnectionFailureReason::ServiceNotFound
        );
        assert!(err.to_string().contains("Shiner service not found"));
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = ParseError::UnknownProperty("colour".to_string()).into();
        assert!(matches!(err, Error::UnknownProperty(ref n) if n == "colour"));

        let err: Error = ParseError::ChannelCount(2).into();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn test_btleplug_error_conversion() {
        fn _assert_from_impl<T: From<btleplug::Error>>() {}
        _assert_from_impl::<Error>();
    }
}
