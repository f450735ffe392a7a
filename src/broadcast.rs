use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use log::{debug, warn};

use crate::addrs::{AddressBinding, InterfaceAddress, IpResolver};
use crate::exec::{CommandRunner, best_effort};

/// Announces address bindings to peers so their caches pick up the new
/// assignments. Announcement is diagnostic by nature and never fails setup.
pub trait AddressBroadcaster: Send + Sync {
    fn announce(&self, bindings: &[AddressBinding]);
}

/// Sends gratuitous ARP for each binding. Repeated a few times because a
/// single unsolicited reply is easily lost right after an interface flap.
pub struct ArpingBroadcaster {
    runner: Arc<dyn CommandRunner>,
    attempts: u32,
    interval: Duration,
}

impl ArpingBroadcaster {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            attempts: 6,
            interval: Duration::from_secs(1),
        }
    }
}

impl AddressBroadcaster for ArpingBroadcaster {
    fn announce(&self, bindings: &[AddressBinding]) {
        for binding in bindings {
            debug!("announcing {} on {}", binding.address, binding.interface);
            for attempt in 0..self.attempts {
                if attempt > 0 {
                    thread::sleep(self.interval);
                }
                let result = self.runner.observe(
                    "arping",
                    &["-c", "1", "-U", "-I", &binding.interface, &binding.address],
                );
                best_effort(&format!("arping on {}", binding.interface), result);
            }
        }
    }
}

/// Resolve each interface address to a concrete binding and hand the result
/// to the broadcaster. Bindings that fail to resolve are skipped; the first
/// such error becomes the overall result so an optional completion channel
/// can report it.
pub fn announce_bindings(
    broadcaster: &dyn AddressBroadcaster,
    resolver: &dyn IpResolver,
    addresses: &[InterfaceAddress],
) -> Result<()> {
    let mut bindings = Vec::new();
    let mut first_err = None;
    for address in addresses {
        match address.resolve(resolver) {
            Ok(binding) => bindings.push(binding),
            Err(e) => {
                warn!("skipping announcement for {}: {:#}", address.interface(), e);
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
    }
    broadcaster.announce(&bindings);
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
