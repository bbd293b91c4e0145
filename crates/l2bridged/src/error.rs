//! Error types for l2bridged.
//!
//! Per-frame errors ([`BridgeError::FrameTooShort`],
//! [`BridgeError::TruncatedBpdu`]) only ever discard the offending frame.
//! Configuration errors are reported before the bridge starts forwarding.

use std::io;
use thiserror::Error;

use crate::port_table::PortId;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur in the bridge daemon.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Frame is shorter than the header it claims to carry.
    #[error("Frame too short: {len} bytes, need at least {needed}")]
    FrameTooShort {
        /// Actual frame length.
        len: usize,
        /// Minimum length for the header found.
        needed: usize,
    },

    /// BPDU frame does not carry all four fields.
    #[error("Truncated BPDU: {len} bytes, need {needed}")]
    TruncatedBpdu {
        /// Actual frame length.
        len: usize,
        /// Length of a complete BPDU frame.
        needed: usize,
    },

    /// Port index outside the configured interface range.
    #[error("Unknown port {port} (bridge has {count} ports)")]
    UnknownPort {
        /// The offending port.
        port: PortId,
        /// Number of configured ports.
        count: usize,
    },

    /// Attempt to turn a trunk port into an access port or vice versa.
    #[error("Port {port} cannot change role kind from {from} to {to}")]
    RoleKindChange {
        /// The port.
        port: PortId,
        /// Current role.
        from: String,
        /// Requested role.
        to: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// IO error (config files, sockets).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl BridgeError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error only affects a single received frame.
    pub fn is_per_frame(&self) -> bool {
        matches!(
            self,
            BridgeError::FrameTooShort { .. } | BridgeError::TruncatedBpdu { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::FrameTooShort { len: 9, needed: 14 };
        assert_eq!(err.to_string(), "Frame too short: 9 bytes, need at least 14");

        let err = BridgeError::UnknownPort { port: 7, count: 4 };
        assert_eq!(err.to_string(), "Unknown port 7 (bridge has 4 ports)");
    }

    #[test]
    fn test_invalid_config() {
        let err = BridgeError::invalid_config("bridge.priority", "missing");
        assert_eq!(
            err.to_string(),
            "Invalid configuration for bridge.priority: missing"
        );
    }

    #[test]
    fn test_is_per_frame() {
        assert!(BridgeError::FrameTooShort { len: 0, needed: 14 }.is_per_frame());
        assert!(BridgeError::TruncatedBpdu { len: 12, needed: 20 }.is_per_frame());
        assert!(!BridgeError::invalid_config("ports", "empty").is_per_frame());
    }
}
