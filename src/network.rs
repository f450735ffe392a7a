use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, anyhow};
use crossbeam::channel::Sender;
use log::{debug, warn};

use crate::addrs::{InterfaceAddress, IpCommandResolver, IpResolver};
use crate::broadcast::{AddressBroadcaster, ArpingBroadcaster, announce_bindings};
use crate::constants::{
    DIR_SYS_CLASS_NET, FILE_DHCLIENT_CONF, FILE_NETWORK_INTERFACES, FILE_RESOLVCONF_HEAD,
};
use crate::exec::{CommandRunner, HostRunner, best_effort};
use crate::fs::{FileSystem, HostFs};
use crate::iface::{
    DhcpInterfaceConfiguration, InterfaceConfigBuilder, MacKeyedConfigBuilder,
    StaticInterfaceConfiguration,
};
use crate::render;
use crate::settings::Networks;
use crate::validate::{
    DnsValidator, ResolvConfDnsValidator, ResolverAddressValidator, StaticAddressValidator,
};

/// Drives the whole setup pipeline: MAC detection, config building, artifact
/// rendering with change detection, interface restarts, validation, and the
/// asynchronous address broadcast. Holds no state between invocations; every
/// call re-derives everything from the host and the given settings.
pub struct NetManager {
    fs: Arc<dyn FileSystem>,
    runner: Arc<dyn CommandRunner>,
    resolver: Arc<dyn IpResolver>,
    builder: Arc<dyn InterfaceConfigBuilder>,
    address_validator: Arc<dyn StaticAddressValidator>,
    dns_validator: Arc<dyn DnsValidator>,
    broadcaster: Arc<dyn AddressBroadcaster>,
}

impl NetManager {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        runner: Arc<dyn CommandRunner>,
        resolver: Arc<dyn IpResolver>,
        builder: Arc<dyn InterfaceConfigBuilder>,
        address_validator: Arc<dyn StaticAddressValidator>,
        dns_validator: Arc<dyn DnsValidator>,
        broadcaster: Arc<dyn AddressBroadcaster>,
    ) -> Self {
        Self {
            fs,
            runner,
            resolver,
            builder,
            address_validator,
            dns_validator,
            broadcaster,
        }
    }

    /// Manager wired to the real host: /sys, dhclient, resolvconf, ifupdown
    /// and arping.
    pub fn host() -> Self {
        let fs: Arc<dyn FileSystem> = Arc::new(HostFs);
        let runner: Arc<dyn CommandRunner> = Arc::new(HostRunner);
        let resolver: Arc<dyn IpResolver> =
            Arc::new(IpCommandResolver::new(Arc::clone(&runner)));
        Self {
            builder: Arc::new(MacKeyedConfigBuilder),
            address_validator: Arc::new(ResolverAddressValidator::new(Arc::clone(&resolver))),
            dns_validator: Arc::new(ResolvConfDnsValidator::new(Arc::clone(&fs))),
            broadcaster: Arc::new(ArpingBroadcaster::new(Arc::clone(&runner))),
            fs,
            runner,
            resolver,
        }
    }

    /// Configure host networking from the given logical networks. If a
    /// completion sender is supplied, the result of the address broadcast is
    /// sent on it once the broadcast finishes; the call itself never waits
    /// for the broadcast.
    pub fn setup_networking(
        &self,
        networks: &Networks,
        completion: Option<Sender<Result<()>>>,
    ) -> Result<()> {
        if networks.is_preconfigured() {
            // Interfaces came configured with the image; only DNS resolution
            // is rewritten, and no addresses are broadcast.
            return self.write_resolv_conf_head(networks);
        }

        let (static_configs, dhcp_configs, dns_servers) = self
            .compute_network_config(networks)
            .context("computing network configuration")?;

        let interfaces_changed = self
            .write_network_interfaces(&dhcp_configs, &static_configs, &dns_servers)
            .context("writing network configuration")?;

        let mut dhcp_changed = false;
        if !dhcp_configs.is_empty() {
            dhcp_changed = self.write_dhcp_configuration(&dns_servers)?;
        }

        if interfaces_changed || dhcp_changed {
            self.remove_stale_dhcp_state();
            self.restart_interfaces(&interface_names(&dhcp_configs, &static_configs));
        }

        let (static_addresses, dynamic_addresses) =
            interface_addresses(&static_configs, &dhcp_configs);

        self.address_validator
            .validate(&static_addresses)
            .context("validating static network configuration")?;
        self.dns_validator
            .validate(&dns_servers)
            .context("validating dns configuration")?;

        let mut addresses = static_addresses;
        addresses.extend(dynamic_addresses);
        self.broadcast_addresses(addresses, completion);

        Ok(())
    }

    /// Filter VIP networks, detect hardware, build typed configurations and
    /// sort them by interface name so rendering is deterministic regardless
    /// of MAC map enumeration order.
    pub fn compute_network_config(
        &self,
        networks: &Networks,
    ) -> Result<(
        Vec<StaticInterfaceConfiguration>,
        Vec<DhcpInterfaceConfiguration>,
        Vec<String>,
    )> {
        let non_vip = networks.non_vip();
        let interfaces_by_mac = self
            .detect_mac_addresses()
            .context("getting network interfaces")?;
        let (mut static_configs, mut dhcp_configs) = self
            .builder
            .build(&non_vip, &interfaces_by_mac)
            .context("creating interface configurations")?;
        static_configs.sort_by(|a, b| a.name.cmp(&b.name));
        dhcp_configs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok((static_configs, dhcp_configs, non_vip.dns_servers()))
    }

    /// Enumerate physical network devices and map hardware address to
    /// device name. Rebuilt on every invocation; nothing is cached.
    pub fn detect_mac_addresses(&self) -> Result<HashMap<String, String>> {
        let dir = Path::new(DIR_SYS_CLASS_NET);
        let entries = self
            .fs
            .list_dir(dir)
            .with_context(|| format!("listing {}", DIR_SYS_CLASS_NET))?;

        let mut addresses = HashMap::new();
        for entry in entries {
            // Physical devices have a backing device entry; bridges and
            // other virtual interfaces do not and are skipped.
            if !self.fs.file_exists(&entry.join("device")) {
                continue;
            }
            let mac = self
                .fs
                .read_file_string(&entry.join("address"))
                .with_context(|| format!("reading mac address of {:?}", entry))?;
            let name = entry
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| anyhow!("invalid device path {:?}", entry))?;
            addresses.insert(mac.trim_end().to_string(), name);
        }
        Ok(addresses)
    }

    /// Physical interfaces that ifupdown knows about, probed without acting.
    pub fn get_configured_interfaces(&self) -> Result<Vec<String>> {
        let interfaces_by_mac = self
            .detect_mac_addresses()
            .context("getting network interfaces")?;
        let mut names: Vec<String> = interfaces_by_mac.into_values().collect();
        names.sort();

        let mut configured = Vec::new();
        for iface in names {
            let output = self
                .runner
                .observe("ifup", &["--no-act", &iface])
                .with_context(|| format!("getting status of interface {}", iface))?;
            if !output.stderr.contains("unknown interface") {
                configured.push(iface);
            }
        }
        Ok(configured)
    }

    fn write_network_interfaces(
        &self,
        dhcp_configs: &[DhcpInterfaceConfiguration],
        static_configs: &[StaticInterfaceConfiguration],
        dns_servers: &[String],
    ) -> Result<bool> {
        let contents = render::network_interfaces(dhcp_configs, static_configs, dns_servers);
        self.fs
            .converge_file_contents(Path::new(FILE_NETWORK_INTERFACES), contents.as_bytes())
            .with_context(|| format!("writing to {}", FILE_NETWORK_INTERFACES))
    }

    fn write_dhcp_configuration(&self, dns_servers: &[String]) -> Result<bool> {
        let contents = render::dhclient_conf(dns_servers);
        self.fs
            .converge_file_contents(Path::new(FILE_DHCLIENT_CONF), contents.as_bytes())
            .with_context(|| format!("writing to {}", FILE_DHCLIENT_CONF))
    }

    // Removing dhcp stanzas from the interfaces file does not stop a running
    // dhclient, and resolvconf holds on to old dhclient records after the
    // configuration is gone, so both are cleared before cycling interfaces.
    // Every step is best-effort; an already-absent client is an equally
    // valid end state.
    fn remove_stale_dhcp_state(&self) {
        best_effort("pkill dhclient", self.runner.observe("pkill", &["dhclient"]));

        let interfaces_by_mac = match self.detect_mac_addresses() {
            Ok(map) => map,
            Err(e) => {
                warn!("ignoring failure listing interfaces for resolvconf cleanup: {:#}", e);
                return;
            }
        };
        let mut names: Vec<String> = interfaces_by_mac.into_values().collect();
        names.sort();
        for iface in names {
            let record = format!("{}.dhclient", iface);
            best_effort(
                &format!("resolvconf -d {}", record),
                self.runner.observe("resolvconf", &["-d", &record]),
            );
        }
    }

    // Force-cycle the batch of configured interfaces. Both directions run
    // regardless of each other's outcome, and neither failure is propagated;
    // a transient flap failure corrects itself on a later convergent run.
    fn restart_interfaces(&self, names: &[String]) {
        debug!("restarting network interfaces {:?}", names);
        let mut args = vec!["--force"];
        args.extend(names.iter().map(|n| n.as_str()));
        best_effort("ifdown", self.runner.observe("ifdown", &args));
        best_effort("ifup", self.runner.observe("ifup", &args));
    }

    fn write_resolv_conf_head(&self, networks: &Networks) -> Result<()> {
        let dns_servers = networks.non_vip().dns_servers();
        let contents = render::resolv_conf_head(&dns_servers);
        self.fs
            .converge_file_contents(Path::new(FILE_RESOLVCONF_HEAD), contents.as_bytes())
            .with_context(|| format!("writing to {}", FILE_RESOLVCONF_HEAD))?;
        self.runner
            .run("resolvconf", &["-u"])
            .context("updating resolvconf")?;
        Ok(())
    }

    // Fire-and-forget: the announcement runs on its own thread and the
    // caller returns immediately. The optional sender carries exactly one
    // completion value once the announcement finishes.
    fn broadcast_addresses(
        &self,
        addresses: Vec<InterfaceAddress>,
        completion: Option<Sender<Result<()>>>,
    ) {
        let broadcaster = Arc::clone(&self.broadcaster);
        let resolver = Arc::clone(&self.resolver);
        thread::spawn(move || {
            let result = announce_bindings(broadcaster.as_ref(), resolver.as_ref(), &addresses);
            if let Some(tx) = completion {
                let _ = tx.send(result);
            }
        });
    }
}

/// Restart set: DHCP interface names first, then static.
fn interface_names(
    dhcp_configs: &[DhcpInterfaceConfiguration],
    static_configs: &[StaticInterfaceConfiguration],
) -> Vec<String> {
    let mut names: Vec<String> = dhcp_configs.iter().map(|c| c.name.clone()).collect();
    names.extend(static_configs.iter().map(|c| c.name.clone()));
    names
}

fn interface_addresses(
    static_configs: &[StaticInterfaceConfiguration],
    dhcp_configs: &[DhcpInterfaceConfiguration],
) -> (Vec<InterfaceAddress>, Vec<InterfaceAddress>) {
    let static_addresses = static_configs
        .iter()
        .map(|c| InterfaceAddress::Static {
            interface: c.name.clone(),
            address: c.address.clone(),
        })
        .collect();
    let dynamic_addresses = dhcp_configs
        .iter()
        .map(|c| InterfaceAddress::Resolving {
            interface: c.name.clone(),
        })
        .collect();
    (static_addresses, dynamic_addresses)
}
