use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_DNS;

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Static,
    #[default]
    Dhcp,
    Vip,
}

/// A single logical network from the agent's settings document.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Network {
    #[serde(rename = "type", default)]
    pub kind: NetworkKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub preconfigured: bool,
}

impl Network {
    pub fn is_vip(&self) -> bool {
        self.kind == NetworkKind::Vip
    }

    pub fn is_default_for(&self, label: &str) -> bool {
        self.default.iter().any(|l| l == label)
    }
}

/// Named logical networks. Keyed by a BTreeMap so iteration order, and
/// everything derived from it, is stable across invocations.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Networks(BTreeMap<String, Network>);

impl Networks {
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Network)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// VIP networks represent floating addresses, not interfaces to
    /// configure. They are dropped before any configuration work begins.
    pub fn non_vip(&self) -> Networks {
        Networks(
            self.0
                .iter()
                .filter(|(_, network)| !network.is_vip())
                .map(|(name, network)| (name.clone(), network.clone()))
                .collect(),
        )
    }

    /// True when every non-VIP network was already configured by the host
    /// image, in which case only DNS resolution is (re)written.
    pub fn is_preconfigured(&self) -> bool {
        self.0
            .values()
            .filter(|network| !network.is_vip())
            .all(|network| network.preconfigured)
    }

    pub fn default_network_for(&self, label: &str) -> Option<&Network> {
        if self.0.len() == 1 {
            return self.0.values().next();
        }
        self.0.values().find(|network| network.is_default_for(label))
    }

    /// DNS servers of the network authoritative for DNS, in the exact order
    /// that network lists them.
    pub fn dns_servers(&self) -> Vec<String> {
        self.default_network_for(DEFAULT_DNS)
            .map(|network| network.dns.clone())
            .unwrap_or_default()
    }
}

impl FromIterator<(String, Network)> for Networks {
    fn from_iter<T: IntoIterator<Item = (String, Network)>>(iter: T) -> Self {
        Networks(iter.into_iter().collect())
    }
}
