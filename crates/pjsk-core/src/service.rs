//! The explicitly-wired root object.
//!
//! Everything a front end needs flows through a [`PjskService`]: the
//! per-region apis, the shared name index, leak predicates, the constant
//! overlay and the standing leaderboard snapshots. There are no globals;
//! whoever owns the service owns all of its state.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::warn;

use crate::api::GameApi;
use crate::config::CoreConfig;
use crate::constants::{ConstantOverlayCache, ConstantSource, HttpSheetFetcher, SheetFetcher};
use crate::error::{Error, Result};
use crate::index::NameIndex;
use crate::leak::LeakGuard;
use crate::master::{parse_rows, MasterDataStore};
use crate::model::{current_ranked_season, Card, Character, Difficulty, Event, RankedSeason, Song};
use crate::region::Region;
use crate::registry::Registry;
use crate::storage::{SnapshotFile, EVENT_TOP100_FILE, RANKED_TOP100_FILE};

pub struct PjskService {
    registry: Registry,
    index: NameIndex,
    leak: LeakGuard,
    constants: ConstantOverlayCache,
    event_top100: SnapshotFile,
    ranked_top100: SnapshotFile,
}

impl PjskService {
    pub fn from_config(config: &CoreConfig) -> Result<Self> {
        let registry = Registry::from_config(config)?;
        let sheets = Arc::new(HttpSheetFetcher::new()?);
        Ok(Self::assemble(config, registry, sheets))
    }

    /// Wire a service from pre-built parts; the seam tests use.
    pub fn with_parts(
        config: &CoreConfig,
        registry: Registry,
        sheets: Arc<dyn SheetFetcher>,
    ) -> Self {
        Self::assemble(config, registry, sheets)
    }

    fn assemble(config: &CoreConfig, registry: Registry, sheets: Arc<dyn SheetFetcher>) -> Self {
        Self {
            registry,
            index: NameIndex::new(config.fuzzy.clone(), &config.cache_dir),
            leak: LeakGuard::new(&config.leak_allow),
            constants: ConstantOverlayCache::new(config.sheets.clone(), sheets),
            event_top100: SnapshotFile::new(config.cache_dir.join(EVENT_TOP100_FILE)),
            ranked_top100: SnapshotFile::new(config.cache_dir.join(RANKED_TOP100_FILE)),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn api(&self, region: &str) -> Result<&Arc<GameApi>> {
        self.registry.get_api(region)
    }

    pub fn leak_guard(&self) -> &LeakGuard {
        &self.leak
    }

    /// Refresh every region's master data, then the derived index. Store
    /// failures degrade per the store's own policy; a region with no data at
    /// all fails the whole refresh.
    pub async fn refresh(&self, force: bool) -> Result<()> {
        for api in self.registry.all() {
            api.store().update_master_data(force).await?;
        }
        self.rebuild_index(force).await?;
        if force {
            self.constants.force_refresh().await;
        }
        Ok(())
    }

    pub async fn rebuild_index(&self, force: bool) -> Result<()> {
        let stores: Vec<Arc<MasterDataStore>> = self
            .registry
            .all()
            .iter()
            .map(|api| api.store().clone())
            .collect();
        self.index.rebuild(&stores, &self.leak, force).await
    }

    /// Drop the persisted card-name index and rebuild everything.
    pub async fn reload_card_names(&self) -> Result<()> {
        self.index.discard_card_names()?;
        self.rebuild_index(true).await
    }

    pub fn resolve_song(&self, query: &str) -> Option<Song> {
        let snapshot = self.index.snapshot();
        snapshot.resolve_song(query, self.index.policy()).cloned()
    }

    pub fn resolve_character(&self, query: &str) -> Option<Character> {
        let snapshot = self.index.snapshot();
        snapshot
            .resolve_character(query, self.index.policy())
            .cloned()
    }

    pub fn resolve_event(&self, query: &str) -> Option<Event> {
        let snapshot = self.index.snapshot();
        snapshot.resolve_event(query, self.index.policy()).cloned()
    }

    pub fn lookup_card(&self, name: &str) -> Option<Card> {
        self.index.snapshot().lookup_card(name).cloned()
    }

    pub fn parse_difficulty(&self, text: &str) -> Option<Difficulty> {
        Difficulty::parse_loose(text)
    }

    /// Full display name for a card id, or `None` when the card or its
    /// character is unknown.
    pub fn card_display_name(&self, card_id: u32) -> Option<String> {
        let snapshot = self.index.snapshot();
        let card = snapshot.card(card_id)?;
        let character = snapshot.character(card.character_id)?;
        Some(card.display_name(&character.name))
    }

    pub fn is_leaked_song(&self, song_id: u32) -> bool {
        let snapshot = self.index.snapshot();
        snapshot
            .song(song_id)
            .map(|song| self.leak.is_leaked_song(song, Utc::now().timestamp_millis()))
            .unwrap_or(false)
    }

    pub fn is_leaked_event(&self, event_id: u32) -> bool {
        let snapshot = self.index.snapshot();
        snapshot
            .event(event_id)
            .map(|event| self.leak.is_leaked_event(event, Utc::now().timestamp_millis()))
            .unwrap_or(false)
    }

    pub fn is_leaked_card(&self, card_id: u32) -> bool {
        let snapshot = self.index.snapshot();
        snapshot
            .card(card_id)
            .map(|card| self.leak.is_leaked_card(card, Utc::now().timestamp_millis()))
            .unwrap_or(false)
    }

    /// `(fully_leaked, released_regions)` for a song id.
    pub fn music_regions(&self, song_id: u32) -> Option<(bool, Vec<Region>)> {
        let snapshot = self.index.snapshot();
        let song = snapshot.song(song_id)?;
        Some(
            self.leak
                .music_available_regions(song, Utc::now().timestamp_millis()),
        )
    }

    pub fn music_append_regions(&self, song_id: u32) -> Option<Vec<Region>> {
        let snapshot = self.index.snapshot();
        let song = snapshot.song(song_id)?;
        Some(
            self.leak
                .music_append_regions(song, Utc::now().timestamp_millis()),
        )
    }

    /// Difficulty constant for one chart, wiring the listed level through the
    /// overlay cache's resolution order.
    pub async fn get_constant(
        &self,
        song_id: u32,
        difficulty: Difficulty,
        all_perfect: bool,
        force_39s: bool,
    ) -> Result<(f64, ConstantSource)> {
        let listed_level = {
            let snapshot = self.index.snapshot();
            let song = snapshot
                .song(song_id)
                .ok_or_else(|| Error::NoDataYet(format!("song {}", song_id)))?;
            song.chart(difficulty)
                .ok_or_else(|| {
                    Error::NoDataYet(format!("song {} has no {} chart", song_id, difficulty))
                })?
                .level
                .effective()
        };
        Ok(self
            .constants
            .get_constant(song_id, difficulty, listed_level, all_perfect, force_39s)
            .await)
    }

    /// The ranked season currently running on a region, with the carried-over
    /// fallback to the last already-started season.
    pub async fn current_ranked_season(&self, region: Region) -> Result<Option<RankedSeason>> {
        let api = self.registry.get(region)?;
        let rows = api.get_master_data("rankMatchSeasons", false).await?;
        let seasons: Vec<RankedSeason> = parse_rows(region, "rankMatchSeasons", &rows);
        Ok(current_ranked_season(&seasons, Utc::now().timestamp_millis()).cloned())
    }

    /// Pull and persist a region's event top-100, falling back to the last
    /// snapshot when the upstream call fails and one exists.
    pub async fn refresh_event_top100(&self, region: Region, event_id: u32) -> Result<Value> {
        let api = self.registry.get(region)?;
        match api.get_event_leaderboard(event_id, 100).await {
            Ok(payload) => {
                self.event_top100.write(region, payload.clone())?;
                Ok(payload)
            }
            Err(e) => match self.event_top100.get(region) {
                Some((_, payload)) => {
                    warn!("{} event top100 fetch failed, serving snapshot: {}", region, e);
                    Ok(payload)
                }
                None => Err(e),
            },
        }
    }

    pub async fn refresh_ranked_top100(&self, region: Region, season_id: u32) -> Result<Value> {
        let api = self.registry.get(region)?;
        match api.get_ranked_leaderboard(season_id, 100).await {
            Ok(payload) => {
                self.ranked_top100.write(region, payload.clone())?;
                Ok(payload)
            }
            Err(e) => match self.ranked_top100.get(region) {
                Some((_, payload)) => {
                    warn!("{} ranked top100 fetch failed, serving snapshot: {}", region, e);
                    Ok(payload)
                }
                None => Err(e),
            },
        }
    }

    pub fn event_top100_snapshot(&self, region: Region) -> Option<(i64, Value)> {
        self.event_top100.get(region)
    }

    pub fn ranked_top100_snapshot(&self, region: Region) -> Option<(i64, Value)> {
        self.ranked_top100.get(region)
    }
}
