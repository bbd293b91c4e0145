//! Per-interface role table.
//!
//! Every read or write of port state goes through [`PortRoleTable`]. The role
//! kind (trunk or access) is fixed when the table is built; only trunk ports
//! move between forwarding and blocked.

use l2bridge_types::VlanId;
use std::fmt;

use crate::error::{BridgeError, Result};

/// Interface index, `0..interface_count`.
pub type PortId = usize;

/// Role of a bridge port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortRole {
    /// Spanning tree port that forwards data traffic.
    TrunkForwarding,
    /// Spanning tree port that drops data traffic on egress.
    TrunkBlocked,
    /// Untagged member of a single VLAN, outside the spanning tree.
    Access(VlanId),
}

impl PortRole {
    /// Returns true for both trunk states.
    pub const fn is_trunk(&self) -> bool {
        matches!(self, PortRole::TrunkForwarding | PortRole::TrunkBlocked)
    }

    /// Returns true if the port is a blocked trunk.
    pub const fn is_blocked(&self) -> bool {
        matches!(self, PortRole::TrunkBlocked)
    }

    /// Returns true if the port is a forwarding trunk.
    pub const fn is_forwarding_trunk(&self) -> bool {
        matches!(self, PortRole::TrunkForwarding)
    }

    /// Returns the access VLAN, if this is an access port.
    pub const fn access_vlan(&self) -> Option<VlanId> {
        match self {
            PortRole::Access(vlan) => Some(*vlan),
            _ => None,
        }
    }
}

impl fmt::Display for PortRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortRole::TrunkForwarding => write!(f, "trunk-forwarding"),
            PortRole::TrunkBlocked => write!(f, "trunk-blocked"),
            PortRole::Access(vlan) => write!(f, "access-{}", vlan),
        }
    }
}

/// Role of every port, indexed by [`PortId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRoleTable {
    roles: Vec<PortRole>,
}

impl PortRoleTable {
    /// Builds the table from the startup roles, in port order.
    pub fn new(roles: Vec<PortRole>) -> Self {
        Self { roles }
    }

    /// Number of ports.
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Returns true if the bridge has no ports.
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Returns the role of `port`.
    pub fn get(&self, port: PortId) -> Result<PortRole> {
        self.roles
            .get(port)
            .copied()
            .ok_or(BridgeError::UnknownPort {
                port,
                count: self.roles.len(),
            })
    }

    /// Sets the role of `port`, returning the previous role.
    ///
    /// # Errors
    ///
    /// Fails for unknown ports and for changes that would turn a trunk into
    /// an access port (or the reverse), or move an access port to another VLAN.
    pub fn set(&mut self, port: PortId, role: PortRole) -> Result<PortRole> {
        let count = self.roles.len();
        let slot = self
            .roles
            .get_mut(port)
            .ok_or(BridgeError::UnknownPort { port, count })?;

        let allowed = match (*slot, role) {
            (current, next) if current.is_trunk() => next.is_trunk(),
            (current, next) => current == next,
        };
        if !allowed {
            return Err(BridgeError::RoleKindChange {
                port,
                from: slot.to_string(),
                to: role.to_string(),
            });
        }

        Ok(std::mem::replace(slot, role))
    }

    /// Iterates `(port, role)` in ascending port order.
    pub fn iter(&self) -> impl Iterator<Item = (PortId, PortRole)> + '_ {
        self.roles.iter().copied().enumerate()
    }

    /// Ports currently in [`PortRole::TrunkForwarding`].
    pub fn forwarding_trunks(&self) -> Vec<PortId> {
        self.iter()
            .filter(|(_, role)| role.is_forwarding_trunk())
            .map(|(port, _)| port)
            .collect()
    }

    /// Ports currently in [`PortRole::TrunkBlocked`].
    pub fn blocked_trunks(&self) -> Vec<PortId> {
        self.iter()
            .filter(|(_, role)| role.is_blocked())
            .map(|(port, _)| port)
            .collect()
    }
}
