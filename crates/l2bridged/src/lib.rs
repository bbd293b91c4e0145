//! l2bridged - VLAN-aware learning bridge with a simplified spanning tree
//!
//! Bridges Ethernet frames between numbered interfaces. Trunk ports carry
//! 802.1Q-tagged traffic and take part in the spanning tree; access ports
//! carry untagged traffic for a single VLAN. Source addresses are learned
//! first-seen-wins and unknown destinations are flooded.

pub mod bpdu;
pub mod bridge;
pub mod config;
pub mod daemon;
pub mod error;
pub mod forwarding;
pub mod frame;
pub mod link;
pub mod mac_table;
pub mod port_table;
pub mod stp;

pub use bpdu::Bpdu;
pub use bridge::{Bridge, BridgeSnapshot, SharedBridge};
pub use config::{BridgeConfig, SwitchCfg};
pub use error::{BridgeError, Result};
pub use forwarding::{BlockedIngress, Egress};
pub use link::{FrameSink, FrameSource, LinkInfo, ReceivedFrame};
pub use mac_table::MacTable;
pub use port_table::{PortId, PortRole, PortRoleTable};
pub use stp::{SpanningTree, StpOutcome, StpRule, StpState};
