use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};

use crate::exec::CommandRunner;

/// Resolves the address currently assigned to an interface. Used to check
/// static assignments and to look up DHCP leases at broadcast time.
pub trait IpResolver: Send + Sync {
    fn primary_ipv4(&self, iface: &str) -> Result<Ipv4Addr>;
}

/// An interface name paired with a concrete address, ready to announce.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddressBinding {
    pub interface: String,
    pub address: String,
}

/// An interface whose address is either fixed by static configuration or
/// only knowable after DHCP negotiation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InterfaceAddress {
    Static { interface: String, address: String },
    /// Resolved lazily, at broadcast time, because the lease address does
    /// not exist until the DHCP client has negotiated it.
    Resolving { interface: String },
}

impl InterfaceAddress {
    pub fn interface(&self) -> &str {
        match self {
            InterfaceAddress::Static { interface, .. } => interface,
            InterfaceAddress::Resolving { interface } => interface,
        }
    }

    pub fn resolve(&self, resolver: &dyn IpResolver) -> Result<AddressBinding> {
        match self {
            InterfaceAddress::Static { interface, address } => Ok(AddressBinding {
                interface: interface.clone(),
                address: address.clone(),
            }),
            InterfaceAddress::Resolving { interface } => {
                let address = resolver
                    .primary_ipv4(interface)
                    .with_context(|| format!("resolving address of {}", interface))?;
                Ok(AddressBinding {
                    interface: interface.clone(),
                    address: address.to_string(),
                })
            }
        }
    }
}

/// Host resolver backed by `ip -o -4 addr show`.
pub struct IpCommandResolver {
    runner: Arc<dyn CommandRunner>,
}

impl IpCommandResolver {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl IpResolver for IpCommandResolver {
    fn primary_ipv4(&self, iface: &str) -> Result<Ipv4Addr> {
        let output = self
            .runner
            .run("ip", &["-o", "-4", "addr", "show", "dev", iface])?;
        parse_ip_addr_output(&output.stdout)
            .ok_or_else(|| anyhow!("no IPv4 address found on {}", iface))
    }
}

fn parse_ip_addr_output(stdout: &str) -> Option<Ipv4Addr> {
    for line in stdout.lines() {
        let mut fields = line.split_whitespace();
        while let Some(field) = fields.next() {
            if field == "inet"
                && let Some(cidr) = fields.next()
                && let Some(addr) = cidr.split('/').next()
                && let Ok(ip) = addr.parse()
            {
                return Some(ip);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::fakes::{FakeResolver, FakeRunner, FakeRunnerExt};

    #[test]
    fn test_parse_ip_addr_output() {
        let stdout = "2: eth0    inet 10.0.2.15/24 brd 10.0.2.255 scope global eth0\\       valid_lft forever preferred_lft forever\n";
        assert_eq!(
            parse_ip_addr_output(stdout),
            Some(Ipv4Addr::new(10, 0, 2, 15))
        );
    }

    #[test]
    fn test_parse_ip_addr_output_empty() {
        assert_eq!(parse_ip_addr_output(""), None);
    }

    #[test]
    fn test_static_address_resolves_without_resolver_lookup() {
        let resolver = FakeResolver::new();
        let address = InterfaceAddress::Static {
            interface: "eth0".to_string(),
            address: "10.0.0.5".to_string(),
        };

        let binding = address.resolve(&resolver).unwrap();
        assert_eq!(binding.interface, "eth0");
        assert_eq!(binding.address, "10.0.0.5");
    }

    #[test]
    fn test_resolving_address_uses_resolver() {
        let resolver = FakeResolver::new();
        resolver.set("eth1", Ipv4Addr::new(192, 168, 1, 9));
        let address = InterfaceAddress::Resolving {
            interface: "eth1".to_string(),
        };

        let binding = address.resolve(&resolver).unwrap();
        assert_eq!(binding.address, "192.168.1.9");
    }

    #[test]
    fn test_resolving_address_failure_is_wrapped() {
        let resolver = FakeResolver::new();
        let address = InterfaceAddress::Resolving {
            interface: "eth1".to_string(),
        };

        let err = address.resolve(&resolver).unwrap_err();
        assert!(format!("{:#}", err).contains("resolving address of eth1"));
    }

    #[test]
    fn test_ip_command_resolver_invocation() {
        let runner = FakeRunner::new();
        runner.set_stdout("ip", "2: eth0    inet 10.0.2.15/24 scope global eth0\n");
        let resolver = IpCommandResolver::new(runner.clone_arc());

        let ip = resolver.primary_ipv4("eth0").unwrap();
        assert_eq!(ip, Ipv4Addr::new(10, 0, 2, 15));
        assert_eq!(
            runner.calls(),
            vec![vec![
                "ip", "-o", "-4", "addr", "show", "dev", "eth0"
            ]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()]
        );
    }
}
