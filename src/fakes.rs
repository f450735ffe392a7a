//! In-memory collaborator fakes shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};

use crate::addrs::{AddressBinding, IpResolver};
use crate::broadcast::AddressBroadcaster;
use crate::exec::{CmdOutput, CommandRunner};
use crate::fs::FileSystem;

#[derive(Default)]
pub(crate) struct FakeFs {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    writes: Mutex<Vec<PathBuf>>,
    failing_reads: Mutex<HashSet<PathBuf>>,
    failing_writes: Mutex<HashSet<PathBuf>>,
    failing_lists: Mutex<HashSet<PathBuf>>,
}

impl FakeFs {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, path: &Path, contents: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), contents.to_vec());
    }

    pub(crate) fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    /// Paths written through write_file, in order.
    pub(crate) fn writes(&self) -> Vec<PathBuf> {
        self.writes.lock().unwrap().clone()
    }

    pub(crate) fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
    }

    pub(crate) fn fail_read(&self, path: &Path) {
        self.failing_reads.lock().unwrap().insert(path.to_path_buf());
    }

    pub(crate) fn fail_write(&self, path: &Path) {
        self.failing_writes.lock().unwrap().insert(path.to_path_buf());
    }

    pub(crate) fn fail_list(&self, dir: &Path) {
        self.failing_lists.lock().unwrap().insert(dir.to_path_buf());
    }

    /// Registers a physical device under /sys/class/net: a device-backing
    /// marker plus an address attribute with a trailing newline, the way the
    /// kernel exposes it.
    pub(crate) fn add_physical_device(&self, name: &str, mac: &str) {
        let dev = Path::new(crate::constants::DIR_SYS_CLASS_NET).join(name);
        self.insert(&dev.join("device"), b"");
        self.insert(&dev.join("address"), format!("{}\n", mac).as_bytes());
    }

    /// Registers a virtual device: it has an address but no device marker.
    pub(crate) fn add_virtual_device(&self, name: &str, mac: &str) {
        let dev = Path::new(crate::constants::DIR_SYS_CLASS_NET).join(name);
        self.insert(&dev.join("address"), format!("{}\n", mac).as_bytes());
    }
}

impl FileSystem for FakeFs {
    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if self.failing_lists.lock().unwrap().contains(dir) {
            return Err(anyhow!("unable to read from directory {:?}", dir));
        }
        let files = self.files.lock().unwrap();
        let mut entries: Vec<PathBuf> = files
            .keys()
            .filter_map(|path| {
                path.strip_prefix(dir)
                    .ok()
                    .and_then(|rest| rest.components().next())
                    .map(|first| dir.join(first.as_os_str()))
            })
            .collect();
        entries.sort();
        entries.dedup();
        Ok(entries)
    }

    fn file_exists(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        files.keys().any(|p| p == path || p.starts_with(path))
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        if self.failing_reads.lock().unwrap().contains(path) {
            return Err(anyhow!("unable to read {:?}", path));
        }
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no such file {:?}", path))
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if self.failing_writes.lock().unwrap().contains(path) {
            return Err(anyhow!("unable to write {:?}", path));
        }
        self.writes.lock().unwrap().push(path.to_path_buf());
        self.insert(path, contents);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeRunner {
    calls: Mutex<Vec<Vec<String>>>,
    stdout: Mutex<HashMap<String, String>>,
    stderr: Mutex<HashMap<String, String>>,
    failing: Mutex<HashSet<String>>,
    failing_spawn: Mutex<HashSet<String>>,
}

impl FakeRunner {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All invocations so far, each as program followed by its arguments.
    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn programs(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| call.into_iter().next())
            .collect()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub(crate) fn set_stdout(&self, program: &str, stdout: &str) {
        self.stdout
            .lock()
            .unwrap()
            .insert(program.to_string(), stdout.to_string());
    }

    pub(crate) fn set_stderr(&self, program: &str, stderr: &str) {
        self.stderr
            .lock()
            .unwrap()
            .insert(program.to_string(), stderr.to_string());
    }

    /// Make the program exit non-zero.
    pub(crate) fn fail(&self, program: &str) {
        self.failing.lock().unwrap().insert(program.to_string());
    }

    /// Make the program fail to spawn at all.
    pub(crate) fn fail_spawn(&self, program: &str) {
        self.failing_spawn.lock().unwrap().insert(program.to_string());
    }
}

pub(crate) trait FakeRunnerExt {
    fn clone_arc(&self) -> Arc<dyn CommandRunner>;
}

impl FakeRunnerExt for Arc<FakeRunner> {
    fn clone_arc(&self) -> Arc<dyn CommandRunner> {
        Arc::clone(self) as Arc<dyn CommandRunner>
    }
}

impl CommandRunner for FakeRunner {
    fn observe(&self, program: &str, args: &[&str]) -> Result<CmdOutput> {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().map(|a| a.to_string()));
        self.calls.lock().unwrap().push(call);

        if self.failing_spawn.lock().unwrap().contains(program) {
            return Err(anyhow!("unable to run {}: no such file or directory", program));
        }
        let stdout = self
            .stdout
            .lock()
            .unwrap()
            .get(program)
            .cloned()
            .unwrap_or_default();
        let stderr = self
            .stderr
            .lock()
            .unwrap()
            .get(program)
            .cloned()
            .unwrap_or_else(|| {
                if self.failing.lock().unwrap().contains(program) {
                    "exit status 1\n".to_string()
                } else {
                    String::new()
                }
            });
        Ok(CmdOutput {
            stdout,
            stderr,
            success: !self.failing.lock().unwrap().contains(program),
        })
    }
}

#[derive(Default)]
pub(crate) struct FakeResolver {
    addresses: Mutex<HashMap<String, Ipv4Addr>>,
}

impl FakeResolver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self, iface: &str, address: Ipv4Addr) {
        self.addresses
            .lock()
            .unwrap()
            .insert(iface.to_string(), address);
    }
}

impl IpResolver for FakeResolver {
    fn primary_ipv4(&self, iface: &str) -> Result<Ipv4Addr> {
        self.addresses
            .lock()
            .unwrap()
            .get(iface)
            .copied()
            .ok_or_else(|| anyhow!("no IPv4 address found on {}", iface))
    }
}

#[derive(Default)]
pub(crate) struct FakeBroadcaster {
    announced: Mutex<Vec<Vec<AddressBinding>>>,
}

impl FakeBroadcaster {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn announced(&self) -> Vec<Vec<AddressBinding>> {
        self.announced.lock().unwrap().clone()
    }
}

impl AddressBroadcaster for FakeBroadcaster {
    fn announce(&self, bindings: &[AddressBinding]) {
        self.announced.lock().unwrap().push(bindings.to_vec());
    }
}
