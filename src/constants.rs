pub const DIR_SYS_CLASS_NET: &str = "/sys/class/net";

pub const FILE_NETWORK_INTERFACES: &str = "/etc/network/interfaces";
pub const FILE_DHCLIENT_CONF: &str = "/etc/dhcp/dhclient.conf";
pub const FILE_RESOLVCONF_HEAD: &str = "/etc/resolvconf/resolv.conf.d/head";
pub const FILE_ETC_RESOLV_CONF: &str = "/etc/resolv.conf";

// Networks carrying one of these labels in their default list own the
// named concern for the whole host.
pub const DEFAULT_DNS: &str = "dns";
pub const DEFAULT_GATEWAY: &str = "gateway";
