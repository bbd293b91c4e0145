//! VLAN-aware forwarding decisions.
//!
//! The egress rule table, for a frame that entered from a trunk (tag VLAN
//! `t`) or from an access port in VLAN `a`:
//!
//! | ingress \ egress | trunk forwarding | access `v`              | trunk blocked |
//! |------------------|------------------|-------------------------|---------------|
//! | trunk `t`        | as is            | strip tag if `t == v`   | drop          |
//! | access `a`       | insert tag `a`   | as is if `a == v`       | drop          |
//!
//! Every other combination drops. Only the egress port's blocked state is
//! consulted; what happens to frames arriving on a blocked trunk is decided
//! by [`BlockedIngress`].

use l2bridge_types::VlanId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::frame::{self, EthernetHeader};
use crate::mac_table::MacTable;
use crate::port_table::{PortId, PortRole, PortRoleTable};

/// Where a data frame came from, and which VLAN it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingress {
    /// Received on a trunk; VLAN from the tag, `None` if untagged.
    Trunk(Option<VlanId>),
    /// Received on an access port of this VLAN, whatever the frame carries.
    Access(VlanId),
}

impl Ingress {
    /// Classifies a frame by its ingress port role.
    pub fn classify(role: PortRole, header: &EthernetHeader) -> Self {
        match role {
            PortRole::TrunkForwarding | PortRole::TrunkBlocked => Ingress::Trunk(header.vlan_id),
            PortRole::Access(vlan) => Ingress::Access(vlan),
        }
    }
}

/// What to do with a frame on one candidate egress port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EgressAction {
    /// Send the frame unchanged.
    Forward,
    /// Send with a tag for this VLAN inserted (length + 4).
    Tag(VlanId),
    /// Send with the tag removed (length - 4).
    Untag,
    /// Do not send on this port.
    Drop,
}

/// Handling of data frames received on a blocked trunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockedIngress {
    /// Learn and forward them like any other frame.
    #[default]
    Forward,
    /// Discard them before learning.
    Drop,
}

/// A frame ready to be transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Egress {
    pub port: PortId,
    pub frame: Vec<u8>,
}

/// Decides the action for one (ingress, egress role) pair.
pub fn decide(ingress: Ingress, egress: PortRole) -> EgressAction {
    match (ingress, egress) {
        (_, PortRole::TrunkBlocked) => EgressAction::Drop,
        (Ingress::Trunk(_), PortRole::TrunkForwarding) => EgressAction::Forward,
        (Ingress::Trunk(Some(tagged)), PortRole::Access(vlan)) if tagged == vlan => {
            EgressAction::Untag
        }
        (Ingress::Trunk(_), PortRole::Access(_)) => EgressAction::Drop,
        (Ingress::Access(vlan), PortRole::TrunkForwarding) => EgressAction::Tag(vlan),
        (Ingress::Access(from), PortRole::Access(to)) if from == to => EgressAction::Forward,
        (Ingress::Access(_), PortRole::Access(_)) => EgressAction::Drop,
    }
}

/// Builds the bytes to send for `action`, or `None` for [`EgressAction::Drop`].
pub fn apply(action: EgressAction, frame: &[u8]) -> Result<Option<Vec<u8>>> {
    Ok(match action {
        EgressAction::Forward => Some(frame.to_vec()),
        EgressAction::Tag(vlan) => Some(frame::insert_tag(frame, vlan)?),
        EgressAction::Untag => Some(frame::strip_tag(frame)?),
        EgressAction::Drop => None,
    })
}

/// Learns the source of a data frame and computes its egress copies.
///
/// The destination's learned port is the only candidate when known;
/// otherwise the frame floods to every port except `in_port`.
pub fn forward_frame(
    in_port: PortId,
    raw: &[u8],
    ports: &PortRoleTable,
    macs: &mut MacTable,
    blocked_ingress: BlockedIngress,
) -> Result<Vec<Egress>> {
    let header = frame::parse(raw)?;
    let in_role = ports.get(in_port)?;

    if in_role.is_blocked() && blocked_ingress == BlockedIngress::Drop {
        debug!(port = in_port, src = %header.source, "Dropping frame from blocked trunk");
        return Ok(Vec::new());
    }

    let ingress = Ingress::classify(in_role, &header);
    if macs.learn(header.source, in_port) {
        debug!(mac = %header.source, port = in_port, "Learned address");
    }

    let candidates: Vec<PortId> = match macs.lookup(&header.destination) {
        Some(port) => vec![port],
        None => ports
            .iter()
            .map(|(port, _)| port)
            .filter(|&port| port != in_port)
            .collect(),
    };

    let mut egress = Vec::with_capacity(candidates.len());
    for out_port in candidates {
        let action = decide(ingress, ports.get(out_port)?);
        if let Some(out) = apply(action, raw)? {
            egress.push(Egress {
                port: out_port,
                frame: out,
            });
        }
    }

    debug!(
        in_port,
        dst = %header.destination,
        ?ingress,
        egress_ports = ?egress.iter().map(|e| e.port).collect::<Vec<_>>(),
        "Forwarding decision"
    );
    Ok(egress)
}
