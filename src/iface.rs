use std::collections::HashMap;
use std::net::Ipv4Addr;

use anyhow::{Result, anyhow};

use crate::constants::DEFAULT_GATEWAY;
use crate::settings::{Network, NetworkKind, Networks};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StaticInterfaceConfiguration {
    pub name: String,
    pub address: String,
    pub network: String,
    pub netmask: String,
    pub broadcast: String,
    pub gateway: String,
    pub is_default_for_gateway: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DhcpInterfaceConfiguration {
    pub name: String,
}

/// Maps VIP-filtered network settings plus the detected MAC address map to
/// typed interface configurations. The pipeline makes no assumption about
/// the order of the returned lists; it re-sorts them before rendering.
pub trait InterfaceConfigBuilder: Send + Sync {
    fn build(
        &self,
        networks: &Networks,
        interfaces_by_mac: &HashMap<String, String>,
    ) -> Result<(
        Vec<StaticInterfaceConfiguration>,
        Vec<DhcpInterfaceConfiguration>,
    )>;
}

/// Default builder: each network is bound to the physical interface whose
/// hardware address it names. A network without a MAC is accepted only when
/// exactly one physical interface exists.
pub struct MacKeyedConfigBuilder;

impl InterfaceConfigBuilder for MacKeyedConfigBuilder {
    fn build(
        &self,
        networks: &Networks,
        interfaces_by_mac: &HashMap<String, String>,
    ) -> Result<(
        Vec<StaticInterfaceConfiguration>,
        Vec<DhcpInterfaceConfiguration>,
    )> {
        let mut static_configs = Vec::new();
        let mut dhcp_configs = Vec::new();

        for (name, network) in networks.iter() {
            if network.is_vip() {
                continue;
            }
            let iface = interface_for(name, network, interfaces_by_mac)?;
            match network.kind {
                NetworkKind::Dhcp => dhcp_configs.push(DhcpInterfaceConfiguration { name: iface }),
                _ => static_configs.push(static_config(name, network, iface, networks.len())?),
            }
        }

        let defaults = static_configs
            .iter()
            .filter(|c| c.is_default_for_gateway)
            .count();
        if defaults > 1 {
            return Err(anyhow!(
                "found {} networks marked default for gateway, expected at most one",
                defaults
            ));
        }

        Ok((static_configs, dhcp_configs))
    }
}

fn interface_for(
    name: &str,
    network: &Network,
    interfaces_by_mac: &HashMap<String, String>,
) -> Result<String> {
    if let Some(mac) = &network.mac
        && !mac.is_empty()
    {
        return interfaces_by_mac.get(mac).cloned().ok_or_else(|| {
            anyhow!(
                "no physical interface with MAC address {} for network {}",
                mac,
                name
            )
        });
    }
    if interfaces_by_mac.len() == 1 {
        return Ok(interfaces_by_mac.values().next().cloned().unwrap_or_default());
    }
    Err(anyhow!(
        "network {} has no MAC address and {} physical interfaces are present",
        name,
        interfaces_by_mac.len()
    ))
}

fn static_config(
    name: &str,
    network: &Network,
    iface: String,
    network_count: usize,
) -> Result<StaticInterfaceConfiguration> {
    let ip = parse_addr(name, "ip", network.ip.as_deref())?;
    let netmask = parse_addr(name, "netmask", network.netmask.as_deref())?;
    let network_addr = ip & netmask;
    let broadcast = network_addr | !netmask;

    // A sole network carries the default route even without the label.
    let is_default_for_gateway = network.is_default_for(DEFAULT_GATEWAY) || network_count == 1;
    let gateway = network.gateway.clone().unwrap_or_default();
    if is_default_for_gateway && gateway.is_empty() {
        return Err(anyhow!(
            "network {} is default for gateway but has no gateway address",
            name
        ));
    }

    Ok(StaticInterfaceConfiguration {
        name: iface,
        address: ip.to_string(),
        network: network_addr.to_string(),
        netmask: netmask.to_string(),
        broadcast: broadcast.to_string(),
        gateway,
        is_default_for_gateway,
    })
}

fn parse_addr(name: &str, field: &str, value: Option<&str>) -> Result<Ipv4Addr> {
    let value = value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("network {} has no {}", name, field))?;
    value
        .parse()
        .map_err(|e| anyhow!("network {} has invalid {} '{}': {}", name, field, value, e))
}
