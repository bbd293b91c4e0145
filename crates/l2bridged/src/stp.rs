//! Simplified spanning tree state machine.
//!
//! One spanning tree is shared by every VLAN. The bridge starts believing it
//! is the root with all trunk ports forwarding, and reacts to each received
//! BPDU with exactly one of the rules below, followed by root re-assertion:
//!
//! 1. Better root: adopt it, block the other trunks if we were root, make the
//!    receiving port forward and relay the new view on forwarding trunks.
//! 2. Same root: improve the path cost through the root port, or take over a
//!    segment whose neighbour is further from the root.
//! 3. Loop: our own BPDU came back, block the receiving port.
//! 4. Re-assertion (always): a root bridge keeps every trunk forwarding.
//!
//! There are no timers beyond the periodic hello sent by the root.

use tracing::{debug, info, instrument};

use crate::bpdu::Bpdu;
use crate::error::Result;
use crate::port_table::{PortId, PortRole, PortRoleTable};

/// Cost added for each hop towards the root.
pub const LINK_COST: u16 = 10;

/// Root election view of this bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StpState {
    /// This bridge's identity (priority), fixed at startup.
    pub own_id: u16,
    /// Lowest bridge id heard of so far.
    pub root_id: u16,
    /// Cost from this bridge to the root.
    pub root_path_cost: u16,
    /// Port leading to the root; `None` while this bridge is root.
    pub root_port: Option<PortId>,
}

impl StpState {
    /// Assumed-root state for a freshly started bridge.
    pub const fn new(own_id: u16) -> Self {
        Self {
            own_id,
            root_id: own_id,
            root_path_cost: 0,
            root_port: None,
        }
    }

    /// Returns true while this bridge believes it is the root.
    pub const fn is_root(&self) -> bool {
        self.root_id == self.own_id
    }
}

/// Which rule a BPDU triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StpRule {
    /// The BPDU announced a lower root id.
    BetterRoot,
    /// Same root, cheaper path through the root port.
    RootPathImproved,
    /// Same root, neighbour on a non-root port is further from the root.
    DesignatedPort,
    /// Same root, nothing to change.
    SameRoot,
    /// The BPDU was originated by this bridge.
    LoopDetected,
    /// A worse root from another bridge.
    Ignored,
}

/// Effects of processing one BPDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StpOutcome {
    pub rule: StpRule,
    /// Trunk ports moved to blocked, in order of change.
    pub blocked: Vec<PortId>,
    /// Trunk ports moved to forwarding, in order of change.
    pub unblocked: Vec<PortId>,
    /// BPDUs to relay, one per forwarding trunk.
    pub relay: Vec<(PortId, Bpdu)>,
}

impl StpOutcome {
    fn new(rule: StpRule) -> Self {
        Self {
            rule,
            blocked: Vec::new(),
            unblocked: Vec::new(),
            relay: Vec::new(),
        }
    }

    /// Returns true if any port changed state.
    pub fn topology_changed(&self) -> bool {
        !self.blocked.is_empty() || !self.unblocked.is_empty()
    }
}

/// Spanning tree engine for one bridge.
#[derive(Debug, Clone)]
pub struct SpanningTree {
    state: StpState,
}

impl SpanningTree {
    pub fn new(own_id: u16) -> Self {
        Self {
            state: StpState::new(own_id),
        }
    }

    /// Current root election view.
    pub fn state(&self) -> StpState {
        self.state
    }

    /// Returns true while this bridge believes it is the root.
    pub fn is_root(&self) -> bool {
        self.state.is_root()
    }

    /// BPDU advertising this bridge's current view out of `port`.
    pub fn advertisement(&self, port: PortId) -> Bpdu {
        Bpdu {
            root_id: self.state.root_id,
            root_path_cost: self.state.root_path_cost,
            bridge_id: self.state.own_id,
            port_id: u16::try_from(port).unwrap_or(u16::MAX),
        }
    }

    /// BPDUs for the periodic hello: one per forwarding trunk, and only
    /// while this bridge is root.
    pub fn hello(&self, ports: &PortRoleTable) -> Vec<(PortId, Bpdu)> {
        if !self.is_root() {
            return Vec::new();
        }
        self.advertise_on_forwarding(ports)
    }

    /// Applies the rule table to a BPDU received on `port`.
    #[instrument(skip(self, ports), fields(own_id = self.state.own_id))]
    pub fn process_bpdu(
        &mut self,
        port: PortId,
        bpdu: &Bpdu,
        ports: &mut PortRoleTable,
    ) -> Result<StpOutcome> {
        let mut outcome = if bpdu.root_id < self.state.root_id {
            self.adopt_root(port, bpdu, ports)?
        } else if bpdu.root_id == self.state.root_id {
            self.same_root(port, bpdu, ports)?
        } else if bpdu.bridge_id == self.state.own_id {
            let mut outcome = StpOutcome::new(StpRule::LoopDetected);
            if ports.get(port)?.is_forwarding_trunk() {
                block(ports, port, &mut outcome)?;
            }
            outcome
        } else {
            StpOutcome::new(StpRule::Ignored)
        };

        if self.is_root() {
            for blocked in ports.blocked_trunks() {
                unblock(ports, blocked, &mut outcome)?;
            }
        }

        debug!(
            rule = ?outcome.rule,
            root_id = self.state.root_id,
            root_path_cost = self.state.root_path_cost,
            root_port = ?self.state.root_port,
            "BPDU processed"
        );
        Ok(outcome)
    }

    fn adopt_root(
        &mut self,
        port: PortId,
        bpdu: &Bpdu,
        ports: &mut PortRoleTable,
    ) -> Result<StpOutcome> {
        let mut outcome = StpOutcome::new(StpRule::BetterRoot);
        let was_root = self.is_root();

        self.state.root_id = bpdu.root_id;
        self.state.root_path_cost = bpdu.root_path_cost.saturating_add(LINK_COST);
        self.state.root_port = Some(port);
        info!(
            root_id = self.state.root_id,
            root_path_cost = self.state.root_path_cost,
            root_port = port,
            "New root bridge"
        );

        if was_root {
            let others: Vec<PortId> = ports
                .forwarding_trunks()
                .into_iter()
                .filter(|&other| other != port)
                .collect();
            for other in others {
                block(ports, other, &mut outcome)?;
            }
        }

        if ports.get(port)?.is_blocked() {
            unblock(ports, port, &mut outcome)?;
        }

        outcome.relay = self.advertise_on_forwarding(ports);
        Ok(outcome)
    }

    fn same_root(
        &mut self,
        port: PortId,
        bpdu: &Bpdu,
        ports: &mut PortRoleTable,
    ) -> Result<StpOutcome> {
        let via_root_port = self.state.root_port == Some(port);
        let offered_cost = bpdu.root_path_cost.saturating_add(LINK_COST);

        if via_root_port && offered_cost < self.state.root_path_cost {
            self.state.root_path_cost = offered_cost;
            info!(root_path_cost = offered_cost, "Root path cost improved");
            return Ok(StpOutcome::new(StpRule::RootPathImproved));
        }

        if !via_root_port && bpdu.root_path_cost > self.state.root_path_cost {
            let mut outcome = StpOutcome::new(StpRule::DesignatedPort);
            if ports.get(port)?.is_blocked() {
                unblock(ports, port, &mut outcome)?;
            }
            return Ok(outcome);
        }

        Ok(StpOutcome::new(StpRule::SameRoot))
    }

    fn advertise_on_forwarding(&self, ports: &PortRoleTable) -> Vec<(PortId, Bpdu)> {
        ports
            .forwarding_trunks()
            .into_iter()
            .map(|port| (port, self.advertisement(port)))
            .collect()
    }
}

fn block(ports: &mut PortRoleTable, port: PortId, outcome: &mut StpOutcome) -> Result<()> {
    ports.set(port, PortRole::TrunkBlocked)?;
    info!(port, "Trunk port blocked");
    outcome.blocked.push(port);
    Ok(())
}

fn unblock(ports: &mut PortRoleTable, port: PortId, outcome: &mut StpOutcome) -> Result<()> {
    ports.set(port, PortRole::TrunkForwarding)?;
    info!(port, "Trunk port forwarding");
    outcome.unblocked.push(port);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use l2bridge_types::VlanId;
    use pretty_assertions::assert_eq;

    fn bpdu(root_id: u16, root_path_cost: u16, bridge_id: u16, port_id: u16) -> Bpdu {
        Bpdu {
            root_id,
            root_path_cost,
            bridge_id,
            port_id,
        }
    }

    /// Three trunks and one access port.
    fn ports() -> PortRoleTable {
        PortRoleTable::new(vec![
            PortRole::TrunkForwarding,
            PortRole::TrunkForwarding,
            PortRole::TrunkForwarding,
            PortRole::Access(VlanId::new(10).unwrap()),
        ])
    }

    #[test]
    fn test_starts_as_root() {
        let stp = SpanningTree::new(30);
        let state = stp.state();
        assert!(state.is_root());
        assert_eq!(state.root_id, 30);
        assert_eq!(state.root_path_cost, 0);
        assert_eq!(state.root_port, None);
    }

    #[test]
    fn test_hello_only_from_root_on_forwarding_trunks() {
        let mut ports = ports();
        ports.set(1, PortRole::TrunkBlocked).unwrap();
        let stp = SpanningTree::new(10);
        let hello = stp.hello(&ports);
        assert_eq!(
            hello,
            vec![(0, bpdu(10, 0, 10, 0)), (2, bpdu(10, 0, 10, 2))]
        );

        let mut stp = SpanningTree::new(30);
        let mut ports = self::ports();
        stp.process_bpdu(0, &bpdu(10, 0, 10, 1), &mut ports).unwrap();
        assert!(stp.hello(&ports).is_empty());
    }

    #[test]
    fn test_better_root_blocks_other_trunks_and_relays() {
        let mut stp = SpanningTree::new(30);
        let mut ports = ports();
        let outcome = stp.process_bpdu(1, &bpdu(10, 0, 10, 4), &mut ports).unwrap();

        assert_eq!(outcome.rule, StpRule::BetterRoot);
        assert_eq!(outcome.blocked, vec![0, 2]);
        assert!(outcome.unblocked.is_empty());
        assert_eq!(outcome.relay, vec![(1, bpdu(10, 10, 30, 1))]);

        let state = stp.state();
        assert_eq!(state.root_id, 10);
        assert_eq!(state.root_path_cost, 10);
        assert_eq!(state.root_port, Some(1));
        assert_eq!(ports.blocked_trunks(), vec![0, 2]);
        assert_eq!(ports.get(3).unwrap(), PortRole::Access(VlanId::new(10).unwrap()));
    }

    #[test]
    fn test_better_root_when_not_root_keeps_other_trunks() {
        let mut stp = SpanningTree::new(30);
        let mut ports = ports();
        stp.process_bpdu(0, &bpdu(20, 0, 20, 0), &mut ports).unwrap();
        assert_eq!(ports.blocked_trunks(), vec![1, 2]);

        // A better root arrives on a blocked port: only that port opens.
        let outcome = stp.process_bpdu(2, &bpdu(10, 10, 25, 0), &mut ports).unwrap();
        assert_eq!(outcome.rule, StpRule::BetterRoot);
        assert!(outcome.blocked.is_empty());
        assert_eq!(outcome.unblocked, vec![2]);
        assert_eq!(ports.blocked_trunks(), vec![1]);
        assert_eq!(stp.state().root_port, Some(2));
        assert_eq!(stp.state().root_path_cost, 20);
        assert_eq!(
            outcome.relay,
            vec![(0, bpdu(10, 20, 30, 0)), (2, bpdu(10, 20, 30, 2))]
        );
    }

    #[test]
    fn test_same_root_improves_cost_on_root_port() {
        let mut stp = SpanningTree::new(30);
        let mut ports = ports();
        stp.process_bpdu(0, &bpdu(10, 20, 20, 0), &mut ports).unwrap();
        assert_eq!(stp.state().root_path_cost, 30);

        let outcome = stp.process_bpdu(0, &bpdu(10, 0, 10, 0), &mut ports).unwrap();
        assert_eq!(outcome.rule, StpRule::RootPathImproved);
        assert_eq!(stp.state().root_path_cost, 10);

        let outcome = stp.process_bpdu(0, &bpdu(10, 0, 10, 0), &mut ports).unwrap();
        assert_eq!(outcome.rule, StpRule::SameRoot);
    }

    #[test]
    fn test_same_root_cheaper_path_on_other_port_is_not_adopted() {
        let mut stp = SpanningTree::new(30);
        let mut ports = ports();
        stp.process_bpdu(0, &bpdu(10, 20, 20, 0), &mut ports).unwrap();

        let outcome = stp.process_bpdu(1, &bpdu(10, 0, 10, 0), &mut ports).unwrap();
        assert_eq!(outcome.rule, StpRule::SameRoot);
        assert_eq!(stp.state().root_port, Some(0));
        assert_eq!(stp.state().root_path_cost, 30);
        assert!(ports.get(1).unwrap().is_blocked());
    }

    #[test]
    fn test_same_root_designated_port_unblocks() {
        let mut stp = SpanningTree::new(30);
        let mut ports = ports();
        stp.process_bpdu(0, &bpdu(10, 0, 10, 0), &mut ports).unwrap();
        assert!(ports.get(2).unwrap().is_blocked());

        let outcome = stp.process_bpdu(2, &bpdu(10, 20, 40, 1), &mut ports).unwrap();
        assert_eq!(outcome.rule, StpRule::DesignatedPort);
        assert_eq!(outcome.unblocked, vec![2]);
        assert!(ports.get(2).unwrap().is_forwarding_trunk());
    }

    #[test]
    fn test_same_root_equal_cost_neighbour_stays_blocked() {
        let mut stp = SpanningTree::new(30);
        let mut ports = ports();
        stp.process_bpdu(0, &bpdu(10, 0, 10, 0), &mut ports).unwrap();

        let outcome = stp.process_bpdu(2, &bpdu(10, 10, 20, 1), &mut ports).unwrap();
        assert_eq!(outcome.rule, StpRule::SameRoot);
        assert!(!outcome.topology_changed());
        assert!(ports.get(2).unwrap().is_blocked());
    }

    #[test]
    fn test_loop_detected_blocks_forwarding_port() {
        let mut stp = SpanningTree::new(30);
        let mut ports = ports();
        stp.process_bpdu(0, &bpdu(10, 0, 10, 0), &mut ports).unwrap();
        stp.process_bpdu(1, &bpdu(10, 20, 20, 0), &mut ports).unwrap();
        assert!(ports.get(1).unwrap().is_forwarding_trunk());

        let outcome = stp.process_bpdu(1, &bpdu(30, 0, 30, 2), &mut ports).unwrap();
        assert_eq!(outcome.rule, StpRule::LoopDetected);
        assert_eq!(outcome.blocked, vec![1]);
        assert!(ports.get(1).unwrap().is_blocked());
    }

    #[test]
    fn test_loop_detected_on_blocked_port_is_noop() {
        let mut stp = SpanningTree::new(30);
        let mut ports = ports();
        stp.process_bpdu(0, &bpdu(10, 0, 10, 0), &mut ports).unwrap();

        let outcome = stp.process_bpdu(2, &bpdu(30, 0, 30, 0), &mut ports).unwrap();
        assert_eq!(outcome.rule, StpRule::LoopDetected);
        assert!(!outcome.topology_changed());
    }

    #[test]
    fn test_root_reasserts_forwarding_on_any_bpdu() {
        let mut stp = SpanningTree::new(10);
        let mut ports = ports();
        ports.set(1, PortRole::TrunkBlocked).unwrap();
        ports.set(2, PortRole::TrunkBlocked).unwrap();

        let outcome = stp.process_bpdu(0, &bpdu(20, 0, 20, 0), &mut ports).unwrap();
        assert_eq!(outcome.rule, StpRule::Ignored);
        assert_eq!(outcome.unblocked, vec![1, 2]);
        assert!(ports.blocked_trunks().is_empty());
    }

    #[test]
    fn test_own_bpdu_at_root_is_same_root() {
        // Rule 2 precedes loop detection, so a root hearing its own hello
        // keeps the port and re-asserts forwarding.
        let mut stp = SpanningTree::new(10);
        let mut ports = ports();
        let outcome = stp.process_bpdu(1, &bpdu(10, 0, 10, 0), &mut ports).unwrap();
        assert_eq!(outcome.rule, StpRule::SameRoot);
        assert!(ports.get(1).unwrap().is_forwarding_trunk());
    }

    #[test]
    fn test_cost_saturates() {
        let mut stp = SpanningTree::new(30);
        let mut ports = ports();
        stp.process_bpdu(0, &bpdu(10, u16::MAX - 3, 20, 0), &mut ports).unwrap();
        assert_eq!(stp.state().root_path_cost, u16::MAX);
    }

    #[test]
    fn test_bpdu_on_access_port_never_changes_its_role() {
        let mut stp = SpanningTree::new(30);
        let mut ports = ports();
        let outcome = stp.process_bpdu(3, &bpdu(10, 0, 10, 0), &mut ports).unwrap();
        assert_eq!(outcome.rule, StpRule::BetterRoot);
        assert_eq!(outcome.blocked, vec![0, 1, 2]);
        assert_eq!(ports.get(3).unwrap(), PortRole::Access(VlanId::new(10).unwrap()));
        assert!(outcome.relay.is_empty());
    }
}
