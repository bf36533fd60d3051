// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entity data carried by graph nodes.
//!
//! These are plain data records; relationships (which host owns which
//! interface, which network an address belongs to) live in the graph's
//! edges, not here.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Entity type tag used in change events and for neighbor filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Location,
    Template,
    Host,
    Interface,
    Layer2Network,
    Layer3Network,
    Layer3Address,
    Service,
    DnsService,
    DhcpService,
    Route,
    FirewallRule,
    FirewallRaw,
    Disk,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Power state reported for a host. Anything unrecognized stays `None` on
/// the host rather than failing a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    Halted,
    Running,
    Suspended,
}

impl FromStr for PowerState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "halted" => Ok(PowerState::Halted),
            "running" => Ok(PowerState::Running),
            "suspended" => Ok(PowerState::Suspended),
            _ => Err(()),
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::Halted => write!(f, "Halted"),
            PowerState::Running => write!(f, "Running"),
            PowerState::Suspended => write!(f, "Suspended"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocationData {
    /// Lower-cased location identifier.
    pub id: SmolStr,
    /// Hypervisor kind from the locations registry, e.g. "xen".
    pub hypervisor: Option<SmolStr>,
    pub default_template: Option<SmolStr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TemplateData {
    pub id: SmolStr,
    /// Metadata tags such as {ubuntu, router}.
    pub metadata: BTreeSet<SmolStr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostData {
    pub id: SmolStr,
    pub cpus: Option<u32>,
    pub memory_min: Option<u64>,
    pub memory_max: Option<u64>,
    pub power_state: Option<PowerState>,
    /// Configuration names this host belongs to.
    pub config_names: BTreeSet<String>,
    /// False until a rename action has landed on the live machine.
    pub name_applied: bool,
}

impl HostData {
    pub fn default_disk_name(&self) -> String {
        format!("{}-hdd", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InterfaceData {
    /// MAC address, the identity of the interface.
    pub mac: SmolStr,
    /// Rate limit in kbps.
    pub rate: Option<u32>,
    pub mtu: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct L2NetworkData {
    pub id: SmolStr,
    pub config_names: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct L3NetworkData {
    pub id: SmolStr,
    pub address: SmolStr,
    pub netmask: SmolStr,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct L3AddressData {
    /// Dotted IP, the identity of the address.
    pub address: SmolStr,
    pub netmask: Option<SmolStr>,
    pub gateway: Option<SmolStr>,
    /// Whether the address is configured statically on the host.
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceData {
    pub port: u16,
    pub protocol: SmolStr,
    /// Service type, e.g. "ssh", "dns", "dhcp".
    pub kind: SmolStr,
    pub product: Option<SmolStr>,
    pub version: Option<SmolStr>,
    pub extra: ServiceExtra,
}

impl ServiceData {
    /// Plain service with no specialization.
    pub fn generic(port: u16, protocol: impl Into<SmolStr>, kind: impl Into<SmolStr>) -> Self {
        Self {
            port,
            protocol: protocol.into(),
            kind: kind.into(),
            product: None,
            version: None,
            extra: ServiceExtra::Generic,
        }
    }

    /// DNS is fixed at 53/udp.
    pub fn dns() -> Self {
        Self {
            port: 53,
            protocol: "udp".into(),
            kind: "dns".into(),
            product: None,
            version: None,
            extra: ServiceExtra::Dns { domain: None },
        }
    }

    /// DHCP is fixed at 67/udp.
    pub fn dhcp() -> Self {
        Self {
            port: 67,
            protocol: "udp".into(),
            kind: "dhcp".into(),
            product: None,
            version: None,
            extra: ServiceExtra::Dhcp {
                lease: None,
                range_start: None,
                range_end: None,
                announced_gateway: None,
            },
        }
    }

    /// Local ID: `<port>_<protocol>_<product-or-type>`.
    pub fn local_id(&self) -> String {
        let name = self.product.as_deref().unwrap_or(&self.kind);
        format!("{}_{}_{}", self.port, self.protocol, name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceExtra {
    Generic,
    Dns {
        domain: Option<SmolStr>,
    },
    Dhcp {
        /// Lease time in seconds.
        lease: Option<u32>,
        range_start: Option<SmolStr>,
        range_end: Option<SmolStr>,
        announced_gateway: Option<SmolStr>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouteData {
    pub destination: SmolStr,
    pub genmask: SmolStr,
    pub gateway: SmolStr,
}

impl RouteData {
    /// Local ID derived from the identity fields (destination, genmask).
    pub fn local_id(&self) -> String {
        stable_hash(&[&self.destination, &self.genmask]).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FirewallRuleData {
    pub chain: SmolStr,
    pub action: SmolStr,
    pub protocol: Option<SmolStr>,
    pub srcnet: Option<SmolStr>,
    pub destnet: Option<SmolStr>,
    /// Port or `start:end` range, as written in configurations.
    pub srcports: Option<SmolStr>,
    pub destports: Option<SmolStr>,
}

impl FirewallRuleData {
    pub fn local_id(&self) -> String {
        stable_hash(&[
            &self.chain,
            &self.action,
            self.protocol.as_deref().unwrap_or(""),
            self.srcnet.as_deref().unwrap_or(""),
            self.destnet.as_deref().unwrap_or(""),
            self.srcports.as_deref().unwrap_or(""),
            self.destports.as_deref().unwrap_or(""),
        ])
        .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FirewallRawData {
    /// Firewall product, e.g. "iptables".
    pub firewall: SmolStr,
    pub data: String,
}

impl FirewallRawData {
    /// Raw dumps drop their header line and per-line leading whitespace.
    pub fn normalized(firewall: impl Into<SmolStr>, data: &str) -> Self {
        let lines: Vec<&str> = data.lines().map(|l| l.trim_start_matches(' ')).collect();
        let data = lines.iter().skip(1).copied().collect::<Vec<_>>().join("\n");
        Self { firewall: firewall.into(), data }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiskData {
    pub id: SmolStr,
    pub size: Option<u64>,
}

/// Typed payload of a graph node.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    /// The graph root; never exposed through factories or events.
    Root,
    Location(LocationData),
    Template(TemplateData),
    Host(HostData),
    Interface(InterfaceData),
    L2Network(L2NetworkData),
    L3Network(L3NetworkData),
    L3Address(L3AddressData),
    Service(ServiceData),
    Route(RouteData),
    FirewallRule(FirewallRuleData),
    FirewallRaw(FirewallRawData),
    Disk(DiskData),
}

impl Entity {
    pub fn kind(&self) -> Option<EntityKind> {
        Some(match self {
            Entity::Root => return None,
            Entity::Location(_) => EntityKind::Location,
            Entity::Template(_) => EntityKind::Template,
            Entity::Host(_) => EntityKind::Host,
            Entity::Interface(_) => EntityKind::Interface,
            Entity::L2Network(_) => EntityKind::Layer2Network,
            Entity::L3Network(_) => EntityKind::Layer3Network,
            Entity::L3Address(_) => EntityKind::Layer3Address,
            Entity::Service(data) => match data.extra {
                ServiceExtra::Generic => EntityKind::Service,
                ServiceExtra::Dns { .. } => EntityKind::DnsService,
                ServiceExtra::Dhcp { .. } => EntityKind::DhcpService,
            },
            Entity::Route(_) => EntityKind::Route,
            Entity::FirewallRule(_) => EntityKind::FirewallRule,
            Entity::FirewallRaw(_) => EntityKind::FirewallRaw,
            Entity::Disk(_) => EntityKind::Disk,
        })
    }

    /// Identifier local to the entity, before any owner prefixing.
    pub fn local_id(&self) -> String {
        match self {
            Entity::Root => String::new(),
            Entity::Location(data) => data.id.to_string(),
            Entity::Template(data) => data.id.to_string(),
            Entity::Host(data) => data.id.to_string(),
            Entity::Interface(data) => interface_id_from_mac(&data.mac),
            Entity::L2Network(data) => data.id.to_string(),
            Entity::L3Network(data) => data.id.to_string(),
            Entity::L3Address(data) => data.address.to_string(),
            Entity::Service(data) => data.local_id(),
            Entity::Route(data) => data.local_id(),
            Entity::FirewallRule(data) => data.local_id(),
            Entity::FirewallRaw(data) => data.firewall.to_string(),
            Entity::Disk(data) => data.id.to_string(),
        }
    }
}

/// Canonical interface name derived from the MAC: `enx` + MAC without colons.
pub fn interface_id_from_mac(mac: &str) -> String {
    format!("enx{}", mac.replace(':', ""))
}

/// FNV-1a over the given parts; deterministic so identity hashes survive
/// process restarts and can be compared across graphs.
fn stable_hash(parts: &[&str]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for part in parts {
        for byte in part.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(PRIME);
        }
        // Separator so ("ab","c") and ("a","bc") differ.
        hash ^= 0xff;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
#[path = "entity_tests.rs"]
mod tests;
