//! Configuration file support for l2bridged
//!
//! The primary format is TOML:
//!
//! ```toml
//! [bridge]
//! priority = 10
//! hello_interval_ms = 1000
//!
//! [[ports]]
//! name = "r-0"
//! mode = "trunk"
//!
//! [[ports]]
//! name = "r-1"
//! mode = "access"
//! vlan = 10
//! ```
//!
//! The older per-switch text file (`switch<N>.cfg`) is also understood,
//! see [`SwitchCfg`], and can be overlaid onto a TOML configuration.

use l2bridge_types::{MacAddress, VlanId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BridgeError, Result};
use crate::forwarding::BlockedIngress;
use crate::link::udp::UdpEndpoint;
use crate::port_table::PortRole;

/// Bridge-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSection {
    /// Bridge priority, used as the bridge ID. Lower wins the root election.
    pub priority: u16,

    /// Hardware address; derived from the priority when absent.
    #[serde(default)]
    pub mac: Option<MacAddress>,

    /// Hello period while root, in milliseconds
    #[serde(default = "default_hello_interval_ms")]
    pub hello_interval_ms: u64,

    /// Handling of data frames received on blocked trunks
    #[serde(default)]
    pub blocked_ingress: BlockedIngress,
}

/// Trunk or access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortMode {
    Trunk,
    Access,
}

/// One interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    pub name: String,

    pub mode: PortMode,

    /// Access VLAN; required for access ports, rejected on trunks.
    #[serde(default)]
    pub vlan: Option<VlanId>,

    /// Local UDP address of the virtual wire
    #[serde(default)]
    pub bind: Option<SocketAddr>,

    /// Remote UDP address of the virtual wire
    #[serde(default)]
    pub peer: Option<SocketAddr>,
}

impl PortConfig {
    /// Startup role for this port. Trunks start forwarding.
    pub fn role(&self) -> Result<PortRole> {
        match (self.mode, self.vlan) {
            (PortMode::Trunk, None) => Ok(PortRole::TrunkForwarding),
            (PortMode::Trunk, Some(vlan)) => Err(BridgeError::invalid_config(
                format!("ports.{}.vlan", self.name),
                format!("trunk ports carry every VLAN, got vlan = {vlan}"),
            )),
            (PortMode::Access, Some(vlan)) => Ok(PortRole::Access(vlan)),
            (PortMode::Access, None) => Err(BridgeError::invalid_config(
                format!("ports.{}.vlan", self.name),
                "access ports need a vlan",
            )),
        }
    }
}

/// Complete l2bridged configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub bridge: BridgeSection,

    #[serde(default)]
    pub ports: Vec<PortConfig>,
}

fn default_hello_interval_ms() -> u64 {
    1000
}

impl BridgeConfig {
    /// Loads and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            BridgeError::InvalidConfig { field, message } => BridgeError::invalid_config(
                field,
                format!("{message} (in {})", path.display()),
            ),
            other => other,
        })
    }

    /// Parses and validates a TOML configuration.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BridgeError::invalid_config("toml", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from a legacy switch file alone.
    pub fn from_switch_cfg(legacy: &SwitchCfg) -> Result<Self> {
        let mut config = Self {
            bridge: BridgeSection {
                priority: legacy.priority,
                mac: None,
                hello_interval_ms: default_hello_interval_ms(),
                blocked_ingress: BlockedIngress::default(),
            },
            ports: Vec::new(),
        };
        config.apply_switch_cfg(legacy)?;
        Ok(config)
    }

    /// Overlays a legacy switch file.
    ///
    /// The priority is replaced, and interface `i` of the legacy file sets
    /// the mode and VLAN of port `i`. Ports beyond the TOML list are added
    /// without transport endpoints.
    pub fn apply_switch_cfg(&mut self, legacy: &SwitchCfg) -> Result<()> {
        self.bridge.priority = legacy.priority;
        for (index, entry) in legacy.ports.iter().enumerate() {
            let (mode, vlan) = match entry.vlan {
                Some(vlan) => (PortMode::Access, Some(vlan)),
                None => (PortMode::Trunk, None),
            };
            match self.ports.get_mut(index) {
                Some(port) => {
                    port.mode = mode;
                    port.vlan = vlan;
                }
                None => self.ports.push(PortConfig {
                    name: entry.name.clone(),
                    mode,
                    vlan,
                    bind: None,
                    peer: None,
                }),
            }
        }
        self.validate()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.bridge.hello_interval_ms == 0 {
            return Err(BridgeError::invalid_config(
                "bridge.hello_interval_ms",
                "must be > 0",
            ));
        }

        if self.ports.is_empty() {
            return Err(BridgeError::invalid_config("ports", "at least one port is required"));
        }

        let mut names = HashSet::new();
        for port in &self.ports {
            if port.name.is_empty() {
                return Err(BridgeError::invalid_config("ports.name", "must not be empty"));
            }
            if !names.insert(port.name.as_str()) {
                return Err(BridgeError::invalid_config(
                    "ports.name",
                    format!("duplicate port name {}", port.name),
                ));
            }
            port.role()?;
            if port.bind.is_some() != port.peer.is_some() {
                return Err(BridgeError::invalid_config(
                    format!("ports.{}", port.name),
                    "bind and peer must be given together",
                ));
            }
        }

        Ok(())
    }

    /// Bridge ID (the configured priority)
    pub fn bridge_id(&self) -> u16 {
        self.bridge.priority
    }

    /// Configured hardware address, or one derived from the bridge ID.
    pub fn mac_address(&self) -> MacAddress {
        self.bridge
            .mac
            .unwrap_or_else(|| MacAddress::from_bridge_id(self.bridge.priority))
    }

    /// Get hello interval as Duration
    pub fn hello_interval(&self) -> Duration {
        Duration::from_millis(self.bridge.hello_interval_ms)
    }

    /// Startup roles in port order.
    pub fn port_roles(&self) -> Result<Vec<PortRole>> {
        self.ports.iter().map(PortConfig::role).collect()
    }

    /// Port names in port order.
    pub fn port_names(&self) -> Vec<String> {
        self.ports.iter().map(|p| p.name.clone()).collect()
    }

    /// UDP endpoints for every port; fails if any port has none.
    pub fn udp_endpoints(&self) -> Result<Vec<UdpEndpoint>> {
        self.ports
            .iter()
            .map(|port| match (port.bind, port.peer) {
                (Some(bind), Some(peer)) => Ok(UdpEndpoint {
                    name: port.name.clone(),
                    bind,
                    peer,
                }),
                _ => Err(BridgeError::invalid_config(
                    format!("ports.{}", port.name),
                    "no UDP bind/peer configured",
                )),
            })
            .collect()
    }
}

/// One interface line of a legacy switch file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchCfgPort {
    pub name: String,
    /// Access VLAN, `None` for a trunk (`T`).
    pub vlan: Option<VlanId>,
}

/// Legacy per-switch configuration file.
///
/// ```text
/// 10
/// r-0 T
/// r-1 10
/// ```
///
/// The first single-token line is the priority; every two-token line names
/// an interface and its role, in interface order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchCfg {
    pub priority: u16,
    pub ports: Vec<SwitchCfgPort>,
}

impl SwitchCfg {
    /// Path of switch `id`'s file under `dir`.
    pub fn locate(dir: impl AsRef<Path>, id: u32) -> PathBuf {
        dir.as_ref().join(format!("switch{id}.cfg"))
    }

    /// Reads and parses a legacy file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parses the legacy text format.
    pub fn parse(content: &str) -> Result<Self> {
        let mut priority = None;
        let mut ports = Vec::new();

        for (lineno, line) in content.lines().enumerate() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let field = || format!("line {}", lineno + 1);
            match tokens.as_slice() {
                [] => {}
                [value] => {
                    if priority.is_some() {
                        return Err(BridgeError::invalid_config(field(), "priority given twice"));
                    }
                    let parsed = value.parse::<u16>().map_err(|_| {
                        BridgeError::invalid_config(field(), format!("bad priority {value:?}"))
                    })?;
                    priority = Some(parsed);
                }
                [name, role] => {
                    let vlan = if role.eq_ignore_ascii_case("t") {
                        None
                    } else {
                        let vlan = role.parse::<VlanId>().map_err(|e| {
                            BridgeError::invalid_config(field(), format!("role {role:?}: {e}"))
                        })?;
                        Some(vlan)
                    };
                    ports.push(SwitchCfgPort {
                        name: (*name).to_string(),
                        vlan,
                    });
                }
                _ => {
                    return Err(BridgeError::invalid_config(
                        field(),
                        format!("expected `<ifname> <T|vlan>`, got {line:?}"),
                    ));
                }
            }
        }

        let priority =
            priority.ok_or_else(|| BridgeError::invalid_config("priority", "missing priority line"))?;
        Ok(Self { priority, ports })
    }
}
