//! Common types for the layer-2 bridge daemon.
//!
//! - [`MacAddress`]: 48-bit Ethernet hardware addresses
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers

mod mac;
mod vlan;

pub use mac::MacAddress;
pub use vlan::VlanId;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),

    #[error("invalid VLAN ID format: {0}")]
    InvalidVlanFormat(String),
}
