use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use eyre::{eyre, Result, WrapErr};
use tracing::{debug, warn};

use crate::Deployment;

/// A directory of deployment records, one `<network>.json` file per network.
#[derive(Clone, Debug)]
pub struct DeploymentStore {
    dir: PathBuf,
}

impl DeploymentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The record file for a network.
    pub fn path(&self, network: &str) -> PathBuf {
        self.dir.join(format!("{}.json", network))
    }

    /// Loads the record for a network, if one has been written.
    pub fn load(&self, network: &str) -> Result<Option<Deployment>> {
        let path = self.path(network);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).wrap_err_with(|| format!("failed to read {}", path.display()))
            }
        };
        let value = serde_json::from_str(&contents)
            .wrap_err_with(|| format!("{} is not valid JSON", path.display()))?;
        let mut deployment = Deployment::from_json(value)
            .wrap_err_with(|| format!("failed to parse deployment record {}", path.display()))?;
        // The file name decides the network; copied records may disagree.
        if !deployment.network.is_empty() && deployment.network != network {
            warn!(
                path = %path.display(),
                recorded = %deployment.network,
                "deployment record names another network; treating it as {}",
                network
            );
        }
        deployment.network = network.to_string();
        Ok(Some(deployment))
    }

    /// Loads the record for a network and fails if there isn't one.
    pub fn require(&self, network: &str) -> Result<Deployment> {
        self.load(network)?.ok_or_else(|| {
            eyre!(
                "no deployment record for {} at {}; run `fund deploy` first",
                network,
                self.path(network).display()
            )
        })
    }

    /// Writes a record in canonical form. The file is written next to its
    /// destination and renamed into place so readers never see a partial
    /// record.
    pub fn save(&self, deployment: &Deployment) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .wrap_err_with(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.path(&deployment.network);
        let tmp = path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(deployment)?;
        fs::write(&tmp, contents + "\n")
            .wrap_err_with(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .wrap_err_with(|| format!("failed to move {} into place", tmp.display()))?;
        debug!(path = %path.display(), "saved deployment record");
        Ok(path)
    }

    /// Takes the exclusive lock on a network's record. The lock is released
    /// when the returned guard is dropped.
    pub fn lock(&self, network: &str) -> Result<RecordLock> {
        fs::create_dir_all(&self.dir)
            .wrap_err_with(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.dir.join(format!("{}.json.lock", network));
        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(eyre!(
                    "deployment record for {} is locked by another run; remove {} if that run died",
                    network,
                    path.display()
                ))
            }
            Err(e) => {
                return Err(e).wrap_err_with(|| format!("failed to create {}", path.display()))
            }
        };
        RecordLock::claim(path, file)
    }
}

/// Guard for a record lock file.
#[derive(Debug)]
pub struct RecordLock {
    path: PathBuf,
}

impl RecordLock {
    /// Writes our pid into a freshly created lock file. The guard exists
    /// before the write so a failed write still removes the file.
    fn claim(path: PathBuf, mut file: impl Write) -> Result<Self> {
        let lock = RecordLock { path };
        writeln!(file, "{}", std::process::id())
            .wrap_err_with(|| format!("failed to write {}", lock.path.display()))?;
        Ok(lock)
    }
}

impl Drop for RecordLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release record lock");
        }
    }
}
