//! Supervised background refresh loop.
//!
//! One tokio task owns the periodic master-data refresh, index rebuild and
//! constant-sheet refresh. Its status is observable through a watch channel,
//! so tests and operators await completion instead of sleeping, and an
//! explicit trigger forces a cycle out of band.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::service::PjskService;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshStatus {
    Idle { cycles: u64 },
    Refreshing { cycles: u64 },
    Failed { cycles: u64, message: String },
}

impl RefreshStatus {
    /// Completed refresh attempts, successful or not.
    pub fn cycles(&self) -> u64 {
        match *self {
            Self::Idle { cycles }
            | Self::Refreshing { cycles }
            | Self::Failed { cycles, .. } => cycles,
        }
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(self, Self::Refreshing { .. })
    }
}

pub struct BackgroundRefresher {
    status_rx: watch::Receiver<RefreshStatus>,
    trigger_tx: mpsc::Sender<bool>,
    handle: JoinHandle<()>,
}

impl BackgroundRefresher {
    /// Spawn the loop; the first cycle starts immediately.
    pub fn spawn(service: Arc<PjskService>, interval: Duration) -> Self {
        let (status_tx, status_rx) = watch::channel(RefreshStatus::Idle { cycles: 0 });
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let handle = tokio::spawn(run_loop(service, interval, status_tx, trigger_rx));
        Self {
            status_rx,
            trigger_tx,
            handle,
        }
    }

    pub fn status(&self) -> RefreshStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RefreshStatus> {
        self.status_rx.clone()
    }

    /// Request an out-of-band forced cycle. A trigger already queued is
    /// enough, so a full queue is not an error.
    pub async fn reload(&self) {
        let _ = self.trigger_tx.try_send(true);
    }

    /// Wait until at least `cycles` refresh attempts have completed.
    pub async fn wait_for_cycles(&self, cycles: u64) -> Result<RefreshStatus> {
        let mut rx = self.status_rx.clone();
        let status = rx
            .wait_for(|status| !status.is_refreshing() && status.cycles() >= cycles)
            .await
            .map_err(|_| Error::Io(std::io::Error::other("refresher task gone")))?;
        Ok(status.clone())
    }
}

impl Drop for BackgroundRefresher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run_loop(
    service: Arc<PjskService>,
    interval: Duration,
    status_tx: watch::Sender<RefreshStatus>,
    mut trigger_rx: mpsc::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The interval's first tick is immediate; consume it so the loop body
    // runs the initial refresh straight away.
    ticker.tick().await;

    let mut cycles = 0u64;
    let mut force = false;
    loop {
        status_tx.send_replace(RefreshStatus::Refreshing { cycles });
        let status = match service.refresh(force).await {
            Ok(()) => {
                cycles += 1;
                info!("Background refresh cycle {} complete", cycles);
                RefreshStatus::Idle { cycles }
            }
            Err(e) => {
                cycles += 1;
                warn!("Background refresh cycle {} failed: {}", cycles, e);
                RefreshStatus::Failed {
                    cycles,
                    message: e.to_string(),
                }
            }
        };
        status_tx.send_replace(status);

        force = tokio::select! {
            _ = ticker.tick() => false,
            trigger = trigger_rx.recv() => match trigger {
                Some(force) => force,
                // All handles dropped; keep ticking until aborted.
                None => {
                    ticker.tick().await;
                    false
                }
            },
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::GameApi;
    use crate::config::{CoreConfig, KeySet, RegionConfig};
    use crate::constants::SheetFetcher;
    use crate::master::{BundleFetcher, BundleVersion};
    use crate::region::Region;
    use crate::registry::Registry;
    use crate::session::{ProtocolHeaders, Transport, TransportResponse};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use tempfile::tempdir;

    struct FixtureFetcher {
        fail: bool,
    }

    #[async_trait]
    impl BundleFetcher for FixtureFetcher {
        async fn fetch_version(&self, _region: Region) -> crate::error::Result<BundleVersion> {
            if self.fail {
                return Err(Error::Network("down".into()));
            }
            Ok(BundleVersion {
                data_version: "1.0.0".to_string(),
                asset_version: None,
            })
        }

        async fn fetch_bundle(
            &self,
            _region: Region,
            _version: &BundleVersion,
        ) -> crate::error::Result<HashMap<String, Vec<Value>>> {
            let mut tables = HashMap::new();
            tables.insert(
                "musics".to_string(),
                vec![json!({"id": 1, "title": "Tell Your World", "publishedAt": 10})],
            );
            tables.insert(
                "musicDifficulties".to_string(),
                vec![json!({
                    "id": 10, "musicId": 1, "musicDifficulty": "master",
                    "playLevel": 28, "totalNoteCount": 900
                })],
            );
            tables.insert("cards".to_string(), vec![]);
            tables.insert("gameCharacters".to_string(), vec![]);
            tables.insert("events".to_string(), vec![]);
            Ok(tables)
        }
    }

    struct DeadTransport;

    #[async_trait]
    impl Transport for DeadTransport {
        async fn exchange(
            &self,
            _path: &str,
            _body: &[u8],
            _headers: &ProtocolHeaders,
        ) -> crate::error::Result<TransportResponse> {
            Err(Error::Network("no transport in this test".into()))
        }
    }

    struct EmptySheets;

    #[async_trait]
    impl SheetFetcher for EmptySheets {
        async fn fetch_rows(&self, _url: &str) -> crate::error::Result<Vec<Value>> {
            Ok(vec![])
        }
    }

    fn service(dir: &std::path::Path, fail: bool) -> Arc<PjskService> {
        let config = CoreConfig {
            cache_dir: dir.to_path_buf(),
            ..CoreConfig::default()
        };
        let region_config = RegionConfig {
            keys: KeySet {
                key: "30313233343536373839616263646566".to_string(),
                iv: "66656463626139383736353433323130".to_string(),
            },
            ..RegionConfig::default()
        };
        let api = GameApi::with_parts(
            Region::Jp,
            &region_config,
            dir,
            Arc::new(FixtureFetcher { fail }),
            Arc::new(DeadTransport),
        )
        .unwrap();
        Arc::new(PjskService::with_parts(
            &config,
            Registry::from_apis(vec![Arc::new(api)]),
            Arc::new(EmptySheets),
        ))
    }

    #[tokio::test]
    async fn test_first_cycle_builds_the_index() {
        let dir = tempdir().unwrap();
        let service = service(dir.path(), false);
        let refresher = BackgroundRefresher::spawn(service.clone(), Duration::from_secs(3600));

        let status = refresher.wait_for_cycles(1).await.unwrap();
        assert!(matches!(status, RefreshStatus::Idle { cycles: 1 }));
        assert_eq!(service.resolve_song("tell your world").unwrap().id, 1);
    }

    #[tokio::test]
    async fn test_reload_forces_another_cycle() {
        let dir = tempdir().unwrap();
        let service = service(dir.path(), false);
        let refresher = BackgroundRefresher::spawn(service, Duration::from_secs(3600));

        refresher.wait_for_cycles(1).await.unwrap();
        refresher.reload().await;
        let status = refresher.wait_for_cycles(2).await.unwrap();
        assert_eq!(status.cycles(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_observable() {
        let dir = tempdir().unwrap();
        let service = service(dir.path(), true);
        let refresher = BackgroundRefresher::spawn(service, Duration::from_secs(3600));

        let status = refresher.wait_for_cycles(1).await.unwrap();
        assert!(matches!(status, RefreshStatus::Failed { .. }));
    }
}
