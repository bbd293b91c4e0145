//! MAC learning table.
//!
//! Entries are first-seen-wins and never age out: a host that moves to
//! another port keeps its original mapping for the life of the process.

use l2bridge_types::MacAddress;
use std::collections::HashMap;

use crate::port_table::PortId;

/// Maps learned source addresses to the port they were first seen on.
#[derive(Debug, Clone, Default)]
pub struct MacTable {
    entries: HashMap<MacAddress, PortId>,
}

impl MacTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `addr` on `port` unless it is already known.
    ///
    /// Returns true if a new entry was inserted.
    pub fn learn(&mut self, addr: MacAddress, port: PortId) -> bool {
        if self.entries.contains_key(&addr) {
            return false;
        }
        self.entries.insert(addr, port);
        true
    }

    /// Returns the port `addr` was learned on.
    pub fn lookup(&self, addr: &MacAddress) -> Option<PortId> {
        self.entries.get(addr).copied()
    }

    /// Number of learned addresses.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been learned yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
