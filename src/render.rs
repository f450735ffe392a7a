use std::fmt::Write;

use crate::iface::{DhcpInterfaceConfiguration, StaticInterfaceConfiguration};

const GENERATED_HEADER: &str = "# Generated by guestnet\n";

// dhclient requests the standard option set; classless static routes are
// declared explicitly because dhclient does not know option 121 by default.
const DHCLIENT_BOILERPLATE: &str = "\noption rfc3442-classless-static-routes code 121 = array of unsigned integer 8;\n\nsend host-name \"<hostname>\";\n\nrequest subnet-mask, broadcast-address, time-offset, routers,\n\tdomain-name, domain-name-servers, domain-search, host-name,\n\tnetbios-name-servers, netbios-scope, interface-mtu,\n\trfc3442-classless-static-routes, ntp-servers;\n";

/// Render /etc/network/interfaces. Callers pass configuration lists already
/// sorted by interface name; given sorted input the output is byte-stable,
/// which the converge check depends on.
pub fn network_interfaces(
    dhcp_configs: &[DhcpInterfaceConfiguration],
    static_configs: &[StaticInterfaceConfiguration],
    dns_servers: &[String],
) -> String {
    let mut out = String::from(GENERATED_HEADER);
    out.push_str("auto lo\niface lo inet loopback\n");

    for config in dhcp_configs {
        let _ = write!(
            out,
            "\nauto {name}\niface {name} inet dhcp\n",
            name = config.name
        );
    }

    for config in static_configs {
        let _ = write!(
            out,
            "\nauto {name}\niface {name} inet static\n    address {address}\n    network {network}\n    netmask {netmask}\n",
            name = config.name,
            address = config.address,
            network = config.network,
            netmask = config.netmask,
        );
        if config.is_default_for_gateway {
            let _ = write!(
                out,
                "    broadcast {}\n    gateway {}\n",
                config.broadcast, config.gateway
            );
        }
    }

    if !dns_servers.is_empty() {
        let _ = write!(out, "\ndns-nameservers {}\n", dns_servers.join(" "));
    }
    out
}

/// Render /etc/dhcp/dhclient.conf. All DNS servers ride in a single prepend
/// directive so dhclient applies them in the order the network listed them.
pub fn dhclient_conf(dns_servers: &[String]) -> String {
    let mut out = String::from(GENERATED_HEADER);
    out.push_str(DHCLIENT_BOILERPLATE);
    if !dns_servers.is_empty() {
        let _ = write!(
            out,
            "\nprepend domain-name-servers {};\n",
            dns_servers.join(", ")
        );
    }
    out
}

/// Render the resolvconf head file used on the preconfigured path.
pub fn resolv_conf_head(dns_servers: &[String]) -> String {
    let mut out = String::from(GENERATED_HEADER);
    for server in dns_servers {
        let _ = writeln!(out, "nameserver {}", server);
    }
    out
}
