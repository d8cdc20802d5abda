//! Per-user TTL cache of fetched account snapshots.
//!
//! Entries are keyed per user id within a region's cache and replaced
//! wholesale, never merged. Concurrent fetches for the same id collapse onto
//! one upstream call; different ids never block each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::staleness::PROFILE_TTL;
use crate::error::Result;
use crate::region::Region;

#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    /// Fetch a fresh snapshot; a confirmed-missing account must surface as
    /// `Error::ProfileNotFound`, distinct from transport failure.
    async fn fetch_profile(&self, user_id: u64) -> Result<Value>;
}

#[derive(Debug, Clone)]
pub struct Profile {
    pub user_id: u64,
    pub payload: Value,
    pub last_updated: DateTime<Utc>,
}

impl Profile {
    fn fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        (now - self.last_updated)
            .to_std()
            .map(|age| age < ttl)
            .unwrap_or(false)
    }
}

pub struct ProfileCache {
    region: Region,
    ttl: Duration,
    slots: Mutex<HashMap<u64, Arc<Mutex<Option<Profile>>>>>,
}

impl ProfileCache {
    pub fn new(region: Region) -> Self {
        Self::with_ttl(region, PROFILE_TTL)
    }

    pub fn with_ttl(region: Region, ttl: Duration) -> Self {
        Self {
            region,
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Cached snapshot if younger than the TTL and not forced; otherwise one
    /// upstream fetch whose result replaces the entry wholesale.
    pub async fn get_profile(
        &self,
        user_id: u64,
        forced: bool,
        fetcher: &dyn ProfileFetcher,
    ) -> Result<Profile> {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.entry(user_id).or_default().clone()
        };

        // Holding the per-user slot across the fetch is what collapses
        // concurrent callers for the same id onto one upstream call.
        let mut entry = slot.lock().await;
        if !forced {
            if let Some(profile) = entry.as_ref() {
                if profile.fresh(self.ttl, Utc::now()) {
                    return Ok(profile.clone());
                }
            }
        }

        let payload = fetcher.fetch_profile(user_id).await?;
        let profile = Profile {
            user_id,
            payload,
            last_updated: Utc::now(),
        };
        debug!("{} profile {} refreshed", self.region, user_id);
        *entry = Some(profile.clone());
        Ok(profile)
    }

    /// Store an externally-obtained snapshot (e.g. from a proxied raw
    /// update), replacing whatever is cached.
    pub async fn put(&self, user_id: u64, payload: Value) {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.entry(user_id).or_default().clone()
        };
        let mut entry = slot.lock().await;
        *entry = Some(Profile {
            user_id,
            payload,
            last_updated: Utc::now(),
        });
    }
}
