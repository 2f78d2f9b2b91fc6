//! Persisted per-device configuration
//!
//! One record per device, keyed by MAC hex. The store keeps the whole
//! set in a single JSON file and rewrites it on change; the file being
//! absent reads as an empty set.

use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::descriptor::DeviceDescriptor;
use crate::error::Result;
use crate::mac::MacAddr;

fn default_timeout_secs() -> u64 {
    5
}

/// A device as persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub host: Ipv4Addr,

    pub mac: MacAddr,

    pub devtype: u16,

    pub name: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Lock state observed at onboarding, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<bool>,
}

impl DeviceRecord {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Unique id of the record (bare-hex MAC).
    pub fn unique_id(&self) -> String {
        self.mac.unique_id()
    }

    /// Rebuild a descriptor for re-creating the device handle.
    pub fn to_descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor {
            name: self.name.clone(),
            is_locked: self.lock.unwrap_or(false),
            timeout: self.timeout(),
            ..DeviceDescriptor::new(self.host, self.mac, self.devtype)
        }
    }
}

/// File-backed set of device records.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all records. A missing file is an empty set.
    pub fn load(&self) -> Result<Vec<DeviceRecord>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn save(&self, records: &[DeviceRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(records)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }

    /// Insert or replace the record with the same MAC.
    pub fn upsert(&self, record: DeviceRecord) -> Result<()> {
        let mut records = self.load()?;
        match records.iter_mut().find(|r| r.mac == record.mac) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.save(&records)
    }

    /// Remove the record for `mac`. Returns whether one existed.
    pub fn remove(&self, mac: MacAddr) -> Result<bool> {
        let mut records = self.load()?;
        let before = records.len();
        records.retain(|r| r.mac != mac);
        let removed = records.len() != before;
        if removed {
            self.save(&records)?;
        }
        Ok(removed)
    }
}
