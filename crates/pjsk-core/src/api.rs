//! Per-region composition of the store, session and profile cache.
//!
//! One [`GameApi`] exists per configured region; the registry owns them and
//! hands out shared references. Everything here is region-scoped: master
//! data, account pulls, leaderboards and chart assets for exactly one
//! deployment.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::fs;
use tracing::debug;

use crate::config::http::REQUEST_TIMEOUT;
use crate::config::RegionConfig;
use crate::error::{Error, Result};
use crate::master::{parse_rows, BundleFetcher, EventRecord, HttpBundleFetcher, MasterDataStore};
use crate::model::{Difficulty, Event};
use crate::profile::{Profile, ProfileCache, ProfileFetcher};
use crate::region::Region;
use crate::session::{SecureSession, TransferCredential, Transport};

pub struct GameApi {
    region: Region,
    store: Arc<MasterDataStore>,
    session: SecureSession,
    profiles: ProfileCache,
    asset_base: String,
    asset_cache_dir: PathBuf,
    asset_client: Client,
}

impl GameApi {
    pub fn from_config<P: AsRef<Path>>(
        region: Region,
        config: &RegionConfig,
        cache_dir: P,
    ) -> Result<Self> {
        let fetcher = Arc::new(HttpBundleFetcher::new(config.data_base.clone())?);
        let session = SecureSession::from_config(region, config)?;
        Self::assemble(region, config, cache_dir, fetcher, session)
    }

    /// Constructor with injected seams; how tests stand up an api without a
    /// network.
    pub fn with_parts<P: AsRef<Path>>(
        region: Region,
        config: &RegionConfig,
        cache_dir: P,
        fetcher: Arc<dyn BundleFetcher>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let session = SecureSession::new(
            region,
            &config.keys,
            config.app_version.clone(),
            transport,
        )?;
        Self::assemble(region, config, cache_dir, fetcher, session)
    }

    fn assemble<P: AsRef<Path>>(
        region: Region,
        config: &RegionConfig,
        cache_dir: P,
        fetcher: Arc<dyn BundleFetcher>,
        session: SecureSession,
    ) -> Result<Self> {
        let cache_dir = cache_dir.as_ref();
        let asset_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            region,
            store: Arc::new(MasterDataStore::open(region, cache_dir, fetcher)),
            session,
            profiles: ProfileCache::new(region),
            asset_base: config.asset_base.clone(),
            asset_cache_dir: cache_dir.join("charts").join(region.code()),
            asset_client,
        })
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn store(&self) -> &Arc<MasterDataStore> {
        &self.store
    }

    pub fn session(&self) -> &SecureSession {
        &self.session
    }

    pub async fn get_master_data(&self, table: &str, force: bool) -> Result<Arc<Vec<Value>>> {
        self.store.get_master_data(table, force).await
    }

    /// Profile by user id, served from the TTL cache unless forced.
    pub async fn get_profile(&self, user_id: u64, forced: bool) -> Result<Profile> {
        self.profiles.get_profile(user_id, forced, self).await
    }

    /// Full account pull via one-time transfer credentials; the snapshot also
    /// lands in the profile cache.
    pub async fn get_user_data(
        &self,
        transfer_id: &str,
        transfer_password: &str,
        inherit: bool,
    ) -> Result<(Value, Option<TransferCredential>, Vec<u8>)> {
        let (data, credentials, raw) = self
            .session
            .get_user_data(transfer_id, transfer_password, inherit)
            .await?;
        if let Some(user_id) = data.get("userId").and_then(Value::as_u64) {
            self.profiles.put(user_id, data.clone()).await;
        }
        Ok((data, credentials, raw))
    }

    /// Best-effort current-data fetch; `None` is expected outside an
    /// authorized session or inside the pull cooldown.
    pub async fn attempt_get_user_data(&self, user_id: u64) -> Result<Option<Value>> {
        let data = self.session.attempt_get_user_data(user_id).await?;
        if let Some(data) = &data {
            self.profiles.put(user_id, data.clone()).await;
        }
        Ok(data)
    }

    /// Ingest a proxied encrypted account update into the profile cache.
    pub async fn save_user_data_raw(&self, bytes: &[u8]) -> Result<u64> {
        let (user_id, data) = self.session.save_user_data_raw(bytes).await?;
        self.profiles.put(user_id, data).await;
        Ok(user_id)
    }

    /// The event whose `[startAt, closedAt)` window contains now, if any.
    pub async fn get_current_event(&self) -> Result<Option<Event>> {
        let rows = self.store.get_master_data("events", false).await?;
        let records: Vec<EventRecord> = parse_rows(self.region, "events", &rows);
        let now_ms = Utc::now().timestamp_millis();
        Ok(records
            .iter()
            .filter_map(|r| Event::from_record(r, self.region))
            .find(|e| e.is_current(self.region, now_ms)))
    }

    pub async fn get_event_leaderboard(&self, event_id: u32, limit: u32) -> Result<Value> {
        let path = format!("/api/event/{}/ranking", event_id);
        self.session.call(&path, &json!({"limit": limit})).await
    }

    /// Reward-tier border scores for an event.
    pub async fn get_event_border(&self, event_id: u32) -> Result<Value> {
        let path = format!("/api/event/{}/ranking-border", event_id);
        self.session.call(&path, &json!({})).await
    }

    pub async fn get_ranked_leaderboard(&self, season_id: u32, limit: u32) -> Result<Value> {
        let path = format!("/api/rank-match-season/{}/ranking", season_id);
        self.session.call(&path, &json!({"limit": limit})).await
    }

    /// Chart image for one song/difficulty, downloaded once and cached under
    /// the asset cache dir.
    pub async fn get_chart(&self, music_id: u32, difficulty: Difficulty) -> Result<PathBuf> {
        let path = self
            .asset_cache_dir
            .join(format!("{}_{}.png", music_id, difficulty));
        if fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(path);
        }

        let url = format!(
            "{}/music/charts/{:0>4}/{}.png",
            self.asset_base, music_id, difficulty
        );
        debug!("Downloading {} chart {}/{}", self.region, music_id, difficulty);
        let bytes = self
            .asset_client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        fs::create_dir_all(&self.asset_cache_dir).await?;
        crate::master::write_atomic(&path, bytes.as_ref())?;
        Ok(path)
    }
}

#[async_trait]
impl ProfileFetcher for GameApi {
    async fn fetch_profile(&self, user_id: u64) -> Result<Value> {
        let path = format!("/api/user/{}/profile", user_id);
        match self.session.call_optional(&path, &json!({})).await? {
            Some(data) => Ok(data),
            None => Err(Error::ProfileNotFound {
                region: self.region,
                user_id,
            }),
        }
    }
}
