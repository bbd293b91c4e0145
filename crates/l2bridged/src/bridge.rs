//! Bridge state and per-frame dispatch.
//!
//! [`Bridge`] owns every piece of mutable state (spanning tree view, port
//! roles, learning table). The daemon wraps it in a [`SharedBridge`] so the
//! receive path and the hello timer each hold the lock for one complete
//! step; neither ever transmits while holding it.

use l2bridge_types::MacAddress;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::bpdu::Bpdu;
use crate::error::Result;
use crate::forwarding::{self, BlockedIngress, Egress};
use crate::frame;
use crate::mac_table::MacTable;
use crate::port_table::{PortId, PortRole, PortRoleTable};
use crate::stp::{SpanningTree, StpOutcome, StpState};

/// Bridge state shared between the receive and hello tasks.
pub type SharedBridge = Arc<Mutex<Bridge>>;

/// Point-in-time copy of the bridge state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSnapshot {
    pub stp: StpState,
    pub roles: Vec<(PortId, PortRole)>,
    pub learned_addresses: usize,
}

/// A single VLAN-aware spanning tree bridge.
#[derive(Debug, Clone)]
pub struct Bridge {
    mac: MacAddress,
    stp: SpanningTree,
    ports: PortRoleTable,
    macs: MacTable,
    blocked_ingress: BlockedIngress,
}

impl Bridge {
    /// Creates a bridge in the assumed-root state.
    ///
    /// `roles` gives the startup role of each port in index order; trunks
    /// should start as [`PortRole::TrunkForwarding`].
    pub fn new(bridge_id: u16, mac: MacAddress, roles: Vec<PortRole>) -> Self {
        Self {
            mac,
            stp: SpanningTree::new(bridge_id),
            ports: PortRoleTable::new(roles),
            macs: MacTable::new(),
            blocked_ingress: BlockedIngress::default(),
        }
    }

    /// Sets how data frames arriving on blocked trunks are treated.
    pub fn with_blocked_ingress(mut self, policy: BlockedIngress) -> Self {
        self.blocked_ingress = policy;
        self
    }

    /// Wraps the bridge for sharing between tasks.
    pub fn into_shared(self) -> SharedBridge {
        Arc::new(Mutex::new(self))
    }

    /// Hardware address used as the source of BPDUs.
    pub fn mac_address(&self) -> MacAddress {
        self.mac
    }

    /// This bridge's identity.
    pub fn bridge_id(&self) -> u16 {
        self.stp.state().own_id
    }

    /// Current spanning tree view.
    pub fn stp_state(&self) -> StpState {
        self.stp.state()
    }

    /// Returns true while this bridge believes it is the root.
    pub fn is_root(&self) -> bool {
        self.stp.is_root()
    }

    /// Port role table (read only).
    pub fn ports(&self) -> &PortRoleTable {
        &self.ports
    }

    /// Learning table (read only).
    pub fn mac_table(&self) -> &MacTable {
        &self.macs
    }

    /// Changes a port's role. Role kinds stay fixed, see [`PortRoleTable::set`].
    pub fn set_port_role(&mut self, port: PortId, role: PortRole) -> Result<PortRole> {
        self.ports.set(port, role)
    }

    /// Processes one received frame and returns the frames to transmit.
    ///
    /// Frames addressed to the bridge-group address drive the spanning tree;
    /// everything else goes through learning and forwarding.
    pub fn handle_frame(&mut self, port: PortId, raw: &[u8]) -> Result<Vec<Egress>> {
        let (destination, _) = frame::addresses(raw)?;
        if destination.is_bridge_group() {
            let bpdu = Bpdu::decode(raw)?;
            let outcome = self.handle_bpdu(port, &bpdu)?;
            return Ok(self.encode(outcome.relay));
        }

        forwarding::forward_frame(port, raw, &self.ports, &mut self.macs, self.blocked_ingress)
    }

    /// Runs the spanning tree rules for a decoded BPDU.
    pub fn handle_bpdu(&mut self, port: PortId, bpdu: &Bpdu) -> Result<StpOutcome> {
        // Validate before the rule table touches state.
        self.ports.get(port)?;
        debug!(port, ?bpdu, "BPDU received");
        self.stp.process_bpdu(port, bpdu, &mut self.ports)
    }

    /// Periodic hello frames; empty unless this bridge is root.
    pub fn hello(&self) -> Vec<Egress> {
        self.encode(self.stp.hello(&self.ports))
    }

    /// Copies the current state for logging or inspection.
    pub fn snapshot(&self) -> BridgeSnapshot {
        BridgeSnapshot {
            stp: self.stp.state(),
            roles: self.ports.iter().collect(),
            learned_addresses: self.macs.len(),
        }
    }

    fn encode(&self, bpdus: Vec<(PortId, Bpdu)>) -> Vec<Egress> {
        bpdus
            .into_iter()
            .map(|(port, bpdu)| Egress {
                port,
                frame: bpdu.encode(self.mac),
            })
            .collect()
    }
}
