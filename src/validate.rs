use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, anyhow};

use crate::addrs::{InterfaceAddress, IpResolver};
use crate::constants::FILE_ETC_RESOLV_CONF;
use crate::fs::FileSystem;

/// Confirms the static addresses handed to the renderer are actually
/// assigned on their interfaces. Fail-closed: any mismatch aborts setup.
pub trait StaticAddressValidator: Send + Sync {
    fn validate(&self, addresses: &[InterfaceAddress]) -> Result<()>;
}

/// Confirms the DNS servers handed to the renderer are usable.
pub trait DnsValidator: Send + Sync {
    fn validate(&self, servers: &[String]) -> Result<()>;
}

pub struct ResolverAddressValidator {
    resolver: Arc<dyn IpResolver>,
}

impl ResolverAddressValidator {
    pub fn new(resolver: Arc<dyn IpResolver>) -> Self {
        Self { resolver }
    }
}

impl StaticAddressValidator for ResolverAddressValidator {
    fn validate(&self, addresses: &[InterfaceAddress]) -> Result<()> {
        for address in addresses {
            let InterfaceAddress::Static { interface, address } = address else {
                continue;
            };
            let expected: Ipv4Addr = address.parse().map_err(|e| {
                anyhow!("invalid configured address '{}' on {}: {}", address, interface, e)
            })?;
            let actual = self
                .resolver
                .primary_ipv4(interface)
                .map_err(|e| anyhow!("unable to read address of {}: {}", interface, e))?;
            if actual != expected {
                return Err(anyhow!(
                    "interface {} has address {}, expected {}",
                    interface,
                    actual,
                    expected
                ));
            }
        }
        Ok(())
    }
}

/// Checks that every configured DNS server made it into the resolver state
/// the host actually uses.
pub struct ResolvConfDnsValidator {
    fs: Arc<dyn FileSystem>,
}

impl ResolvConfDnsValidator {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

impl DnsValidator for ResolvConfDnsValidator {
    fn validate(&self, servers: &[String]) -> Result<()> {
        if servers.is_empty() {
            return Ok(());
        }
        let contents = self
            .fs
            .read_file_string(Path::new(FILE_ETC_RESOLV_CONF))
            .map_err(|e| anyhow!("unable to read {}: {}", FILE_ETC_RESOLV_CONF, e))?;
        for server in servers {
            if !contents.contains(server.as_str()) {
                return Err(anyhow!(
                    "DNS server {} is not present in {}",
                    server,
                    FILE_ETC_RESOLV_CONF
                ));
            }
        }
        Ok(())
    }
}
