//! Per-region JSON snapshot files.
//!
//! Each file holds the latest payload per region plus the timestamp it was
//! taken at. These are plain caches: a missing or corrupt file is rebuilt on
//! the next write, never an error for the caller.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::Result;
use crate::master::write_atomic;
use crate::region::Region;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotData {
    /// Epoch milliseconds of the last write per region.
    #[serde(default)]
    pub last_updated: BTreeMap<Region, i64>,
    #[serde(default)]
    pub data: BTreeMap<Region, Value>,
}

pub struct SnapshotFile {
    path: PathBuf,
    // Serializes read-modify-write cycles on the one file.
    write_lock: Mutex<()>,
}

impl SnapshotFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Current contents; missing or unreadable files come back empty with a
    /// warning rather than failing the caller.
    pub fn read(&self) -> SnapshotData {
        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(data) => data,
                Err(e) => {
                    warn!("Corrupt snapshot {}, starting fresh: {}", self.path.display(), e);
                    SnapshotData::default()
                }
            },
            Err(_) => SnapshotData::default(),
        }
    }

    pub fn get(&self, region: Region) -> Option<(i64, Value)> {
        let data = self.read();
        let ts = data.last_updated.get(&region).copied()?;
        let payload = data.data.get(&region)?.clone();
        Some((ts, payload))
    }

    /// Replace one region's payload, stamping the write time. Other regions'
    /// entries are preserved.
    pub fn write(&self, region: Region, payload: Value) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut data = self.read();
        data.last_updated.insert(region, Utc::now().timestamp_millis());
        data.data.insert(region, payload);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_vec(&data)?;
        write_atomic(&self.path, &serialized)
    }
}
