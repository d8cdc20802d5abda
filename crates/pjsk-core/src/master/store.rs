//! Per-region master-data bundle cache.
//!
//! Tables are replaced wholesale on each successful refresh and never patched
//! incrementally. A failed download keeps the previous good data; refreshes
//! are single-flight per store, so a burst of concurrent callers shares one
//! download.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::staleness::VERSION_CHECK_WINDOW;
use crate::error::{Error, Result};
use crate::master::fetcher::{BundleFetcher, BundleVersion};
use crate::region::Region;

const VERSION_FILE: &str = "version.json";

#[derive(Default)]
struct StoreState {
    tables: HashMap<String, Arc<Vec<Value>>>,
    version: Option<BundleVersion>,
    /// Latest descriptor seen upstream; runs ahead of `version` when a
    /// metadata check observed a change whose bundle is not downloaded yet.
    observed_version: Option<BundleVersion>,
    version_checked_at: Option<DateTime<Utc>>,
    fetched_at: Option<DateTime<Utc>>,
    /// Bumped on every successful refresh; doubles as the single-flight
    /// marker and as the invalidation signal for derived caches.
    generation: u64,
}

impl StoreState {
    fn version_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.version_checked_at {
            Some(checked) => {
                (now - checked).to_std().map(|d| d < VERSION_CHECK_WINDOW).unwrap_or(false)
            }
            None => false,
        }
    }

    /// Checked recently and nothing newer observed upstream; the guard for
    /// every unforced short-circuit.
    fn version_current(&self, now: DateTime<Utc>) -> bool {
        let newer_observed = match (&self.observed_version, &self.version) {
            (Some(observed), Some(current)) => observed != current,
            _ => false,
        };
        self.version_fresh(now) && !newer_observed
    }
}

pub struct MasterDataStore {
    region: Region,
    dir: PathBuf,
    fetcher: Arc<dyn BundleFetcher>,
    state: RwLock<StoreState>,
    refresh_lock: Mutex<()>,
}

impl MasterDataStore {
    /// Open a store rooted at `<cache_dir>/<region>/master`, warm-loading any
    /// tables a previous run left on disk.
    pub fn open<P: AsRef<Path>>(
        region: Region,
        cache_dir: P,
        fetcher: Arc<dyn BundleFetcher>,
    ) -> Self {
        let dir = cache_dir.as_ref().join(region.code()).join("master");
        let mut state = StoreState::default();

        match load_from_disk(&dir) {
            Ok(Some((version, tables))) => {
                info!(
                    "Warm-started {} master data from disk ({} tables, version {})",
                    region,
                    tables.len(),
                    version.data_version
                );
                state.tables = tables;
                state.version = Some(version);
                state.fetched_at = Some(Utc::now());
            }
            Ok(None) => {}
            Err(e) => warn!("Ignoring unreadable {} disk cache: {}", region, e),
        }

        Self {
            region,
            dir,
            fetcher,
            state: RwLock::new(state),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    /// Current refresh generation; derived caches compare this to decide
    /// whether their own state is stale.
    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    pub async fn bundle_version(&self) -> Option<BundleVersion> {
        self.state.read().await.version.clone()
    }

    /// Fetch the version descriptor, re-checking upstream at most once per
    /// staleness window unless forced.
    pub async fn get_bundle_metadata(&self, force: bool) -> Result<BundleVersion> {
        if !force {
            let state = self.state.read().await;
            if state.version_fresh(Utc::now()) {
                if let Some(version) = state.observed_version.as_ref().or(state.version.as_ref()) {
                    return Ok(version.clone());
                }
            }
        }

        let remote = self.fetcher.fetch_version(self.region).await?;
        let mut state = self.state.write().await;
        state.version_checked_at = Some(Utc::now());
        state.observed_version = Some(remote.clone());
        Ok(remote)
    }

    /// Return a cached table, refreshing first when absent, forced, or when
    /// the upstream bundle version moved.
    pub async fn get_master_data(&self, table: &str, force: bool) -> Result<Arc<Vec<Value>>> {
        if !force {
            let state = self.state.read().await;
            if let Some(rows) = state.tables.get(table) {
                if state.version_current(Utc::now()) {
                    return Ok(rows.clone());
                }
            }
        }

        self.update_master_data(force).await?;

        let state = self.state.read().await;
        state
            .tables
            .get(table)
            .cloned()
            .ok_or_else(|| Error::NoDataYet(format!("{}/{}", self.region, table)))
    }

    /// Refresh the bundle if upstream changed (always when `force`).
    ///
    /// All-or-nothing: either every table is replaced and persisted, or the
    /// previous state is kept untouched. Concurrent callers collapse onto a
    /// single in-flight refresh.
    pub async fn update_master_data(&self, force: bool) -> Result<()> {
        let start_generation = self.state.read().await.generation;

        let _guard = self.refresh_lock.lock().await;

        {
            let state = self.state.read().await;
            if state.generation != start_generation {
                // Another caller refreshed while we waited for the lock.
                return Ok(());
            }
            if !force && state.fetched_at.is_some() && state.version_current(Utc::now()) {
                return Ok(());
            }
        }

        let remote = match self.fetcher.fetch_version(self.region).await {
            Ok(v) => v,
            Err(e) => return self.keep_previous_or_fail(e, "version check").await,
        };

        {
            let mut state = self.state.write().await;
            state.version_checked_at = Some(Utc::now());
            state.observed_version = Some(remote.clone());
            if !force && state.fetched_at.is_some() && state.version.as_ref() == Some(&remote) {
                debug!("{} bundle unchanged at {}", self.region, remote.data_version);
                return Ok(());
            }
        }

        let tables = match self.fetcher.fetch_bundle(self.region, &remote).await {
            Ok(t) => t,
            Err(e) => return self.keep_previous_or_fail(e, "bundle download").await,
        };

        if let Err(e) = persist_to_disk(&self.dir, &remote, &tables) {
            // Disk persistence is best-effort; in-memory state still updates.
            warn!("Failed to persist {} master data: {}", self.region, e);
        }

        let mut state = self.state.write().await;
        state.tables = tables
            .into_iter()
            .map(|(name, rows)| (name, Arc::new(rows)))
            .collect();
        state.version = Some(remote.clone());
        state.observed_version = Some(remote.clone());
        state.fetched_at = Some(Utc::now());
        state.generation += 1;
        info!(
            "Refreshed {} master data to version {} ({} tables)",
            self.region,
            remote.data_version,
            state.tables.len()
        );
        Ok(())
    }

    /// Failure policy: previous good data is kept and the error downgraded to
    /// a warning. Only a store that has never fetched propagates the failure.
    async fn keep_previous_or_fail(&self, e: Error, what: &str) -> Result<()> {
        let state = self.state.read().await;
        if state.fetched_at.is_some() {
            warn!("{} {} failed, keeping previous data: {}", self.region, what, e);
            Ok(())
        } else {
            Err(e)
        }
    }

    /// Names of every currently cached table.
    pub async fn table_names(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut names: Vec<String> = state.tables.keys().cloned().collect();
        names.sort();
        names
    }
}

fn load_from_disk(dir: &Path) -> Result<Option<(BundleVersion, HashMap<String, Arc<Vec<Value>>>)>> {
    let version_path = dir.join(VERSION_FILE);
    if !version_path.exists() {
        return Ok(None);
    }
    let version: BundleVersion = serde_json::from_str(&fs::read_to_string(version_path)?)?;

    let mut tables = HashMap::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if stem == "version" || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match fs::read_to_string(&path).map_err(Error::from).and_then(|s| {
            serde_json::from_str::<Vec<Value>>(&s).map_err(Error::from)
        }) {
            Ok(rows) => {
                tables.insert(stem.to_string(), Arc::new(rows));
            }
            // A table mid-write by a dying process must not take the store down.
            Err(e) => warn!("Skipping unreadable cached table {:?}: {}", path, e),
        }
    }
    Ok(Some((version, tables)))
}

fn persist_to_disk(
    dir: &Path,
    version: &BundleVersion,
    tables: &HashMap<String, Vec<Value>>,
) -> Result<()> {
    fs::create_dir_all(dir)?;
    for (name, rows) in tables {
        write_atomic(&dir.join(format!("{}.json", name)), &serde_json::to_vec(rows)?)?;
    }
    write_atomic(&dir.join(VERSION_FILE), &serde_json::to_vec(version)?)?;
    Ok(())
}

/// Write via a temp path and rename so readers never observe a partial file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
