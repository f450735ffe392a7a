use std::fs::{File, rename};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use log::debug;
use rustix::cstr;
use rustix::fs::Dir;

/// File access seam for the setup pipeline. Everything the pipeline touches
/// on disk goes through this trait so tests can run against an in-memory
/// filesystem.
pub trait FileSystem: Send + Sync {
    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    fn file_exists(&self, path: &Path) -> bool;

    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()>;

    fn read_file_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read_file(path)?;
        String::from_utf8(bytes).map_err(|e| anyhow!("{:?} is not valid utf-8: {}", path, e))
    }

    /// Write contents only when they differ from what is on disk, reporting
    /// whether a write happened. An absent file counts as differing. This is
    /// the change signal that gates interface restarts, so the comparison is
    /// exact bytes.
    fn converge_file_contents(&self, path: &Path, contents: &[u8]) -> Result<bool> {
        if self.file_exists(path) && self.read_file(path)? == contents {
            debug!("contents of {:?} are unchanged", path);
            return Ok(false);
        }
        self.write_file(path, contents)?;
        Ok(true)
    }
}

pub struct HostFs;

impl FileSystem for HostFs {
    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let dir_fd = File::open(dir).map_err(|e| anyhow!("unable to open {:?}: {}", dir, e))?;
        let entries = Dir::read_from(dir_fd)
            .map_err(|e| anyhow!("unable to read from directory {:?}: {}", dir, e))?;
        let mut paths = Vec::new();
        for entry_res in entries {
            let entry = entry_res
                .map_err(|e| anyhow!("unable to read directory entry in {:?}: {}", dir, e))?;
            if entry.file_name() == cstr!(".") || entry.file_name() == cstr!("..") {
                continue;
            }
            paths.push(dir.join(entry.file_name().to_string_lossy().as_ref()));
        }
        paths.sort();
        Ok(paths)
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|e| anyhow!("unable to read {:?}: {}", path, e))
    }

    // Write through a temporary file and rename so a crash mid-write never
    // leaves a half-written network config behind.
    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let dir = path.parent().unwrap_or(Path::new("/"));
        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow!("invalid path {:?}", path))?;
        let tmp = dir.join(format!(".{}.tmp", file_name.to_string_lossy()));
        {
            let mut f = File::create(&tmp)
                .map_err(|e| anyhow!("unable to create {:?}: {}", &tmp, e))?;
            f.write_all(contents)
                .map_err(|e| anyhow!("unable to write {:?}: {}", path, e))?;
            f.sync_all()
                .map_err(|e| anyhow!("unable to sync {:?}: {}", path, e))?;
        }
        rename(&tmp, path)
            .map_err(|e| anyhow!("unable to rename {:?} to {:?}: {}", &tmp, path, e))
    }
}
