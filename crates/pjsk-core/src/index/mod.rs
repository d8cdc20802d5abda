//! Free-text → id resolution over every region's master data.
//!
//! The index is rebuilt at most hourly (or on explicit force), single-flight,
//! and swapped in atomically: readers keep the previous snapshot until the
//! new one is complete. Leaked entities are never indexed for resolution,
//! though they stay queryable by id for the leak predicates themselves.

mod romaji;

pub use romaji::{contains_kana, romanize, LoanwordStyle};

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::staleness::INDEX_REBUILD_INTERVAL;
use crate::config::FuzzyPolicy;
use crate::error::Result;
use crate::leak::LeakGuard;
use crate::master::{
    parse_rows, CardRecord, CharacterRecord, EventRecord, MasterDataStore,
    MusicDifficultyRecord, MusicRecord,
};
use crate::model::{assemble_songs, Card, Character, Event, Song};
use crate::region::Region;

const CARD_NAME_FILE: &str = "card_names.json";

/// Tolerance for floor comparisons so a score computed exactly at the floor
/// resolves.
const FLOOR_EPSILON: f64 = 1e-9;

/// One fuzzy-matchable entry. Insertion order is the final tie-break.
#[derive(Debug, Clone)]
struct TitleEntry {
    text: String,
    id: u32,
}

/// Persisted card-name index: rebuilt only when this file is absent or
/// explicitly discarded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardNameCache {
    pub cards: HashMap<String, u32>,
    pub cards_en_jp: HashMap<String, u32>,
}

/// Everything one build pass produces. Immutable once built.
#[derive(Default)]
pub struct IndexSnapshot {
    built_at: Option<DateTime<Utc>>,
    songs: HashMap<u32, Song>,
    song_titles: Vec<TitleEntry>,
    song_exact: HashMap<String, u32>,
    characters: HashMap<u32, Character>,
    character_names: Vec<TitleEntry>,
    cards: HashMap<u32, Card>,
    card_names: CardNameCache,
    events: HashMap<u32, Event>,
    event_exact: HashMap<String, u32>,
    event_names: Vec<TitleEntry>,
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

impl IndexSnapshot {
    pub fn song(&self, id: u32) -> Option<&Song> {
        self.songs.get(&id)
    }

    pub fn card(&self, id: u32) -> Option<&Card> {
        self.cards.get(&id)
    }

    pub fn character(&self, id: u32) -> Option<&Character> {
        self.characters.get(&id)
    }

    pub fn event(&self, id: u32) -> Option<&Event> {
        self.events.get(&id)
    }

    pub fn card_names(&self) -> &CardNameCache {
        &self.card_names
    }

    pub fn events_iter(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }

    /// Resolve free text to a song.
    ///
    /// Order: numeric id (minus configured ambiguous aliases), exact
    /// case-insensitive title, transliterated retry for kana queries, fuzzy
    /// with the configured floor.
    pub fn resolve_song(&self, query: &str, policy: &FuzzyPolicy) -> Option<&Song> {
        let q = normalize(query);
        if q.is_empty() {
            return None;
        }

        if !policy.numeric_alias_exceptions.iter().any(|a| a == &q) {
            if let Ok(id) = q.parse::<u32>() {
                // Only ids that made it into the public index resolve here.
                if self.song_titles.iter().any(|e| e.id == id) {
                    return self.songs.get(&id);
                }
            }
        }

        if let Some(&id) = self.song_exact.get(&q) {
            return self.songs.get(&id);
        }

        if contains_kana(&q) {
            for style in [LoanwordStyle::DoubledVowel, LoanwordStyle::Preserved] {
                let romanized = normalize(&romanize(&q, style));
                if let Some(&id) = self.song_exact.get(&romanized) {
                    return self.songs.get(&id);
                }
            }
        }

        fuzzy_best(&self.song_titles, &q, policy.song_floor).and_then(|id| self.songs.get(&id))
    }

    /// Character resolution; higher floor because collisions are costlier.
    pub fn resolve_character(&self, query: &str, policy: &FuzzyPolicy) -> Option<&Character> {
        let q = normalize(query);
        if q.is_empty() {
            return None;
        }
        if let Ok(id) = q.parse::<u32>() {
            if let Some(character) = self.characters.get(&id) {
                return Some(character);
            }
        }
        fuzzy_best(&self.character_names, &q, policy.character_floor)
            .and_then(|id| self.characters.get(&id))
    }

    /// Event resolution: exact over titles, short codes and numeric ids
    /// merged into one map, then a substring-tuned Skim match.
    pub fn resolve_event(&self, query: &str, policy: &FuzzyPolicy) -> Option<&Event> {
        let q = normalize(query);
        if q.is_empty() {
            return None;
        }
        if let Some(&id) = self.event_exact.get(&q) {
            return self.events.get(&id);
        }

        let matcher = SkimMatcherV2::default();
        let mut best: Option<(i64, u32)> = None;
        for entry in &self.event_names {
            let Some(score) = matcher.fuzzy_match(&entry.text, &q) else {
                continue;
            };
            if score < policy.event_floor {
                continue;
            }
            if best.map(|(s, _)| score > s).unwrap_or(true) {
                best = Some((score, entry.id));
            }
        }
        best.and_then(|(_, id)| self.events.get(&id))
    }

    /// Exact card display-name lookup, EN/JP-priority map first.
    pub fn lookup_card(&self, name: &str) -> Option<&Card> {
        let q = normalize(name);
        self.card_names
            .cards_en_jp
            .get(&q)
            .or_else(|| self.card_names.cards.get(&q))
            .and_then(|id| self.cards.get(id))
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.built_at {
            Some(built) => (now - built)
                .to_std()
                .map(|age| age >= INDEX_REBUILD_INTERVAL)
                .unwrap_or(true),
            None => true,
        }
    }
}

/// Best fuzzy match at or above the floor. Ties break by lower edit
/// distance, then first-seen insertion order.
fn fuzzy_best(entries: &[TitleEntry], query: &str, floor: f64) -> Option<u32> {
    let mut best: Option<(f64, usize, u32)> = None;
    for entry in entries {
        let score = strsim::normalized_levenshtein(query, &entry.text);
        if score + FLOOR_EPSILON < floor {
            continue;
        }
        let distance = strsim::levenshtein(query, &entry.text);
        let better = match best {
            None => true,
            Some((best_score, best_distance, _)) => {
                score > best_score + FLOOR_EPSILON
                    || ((score - best_score).abs() <= FLOOR_EPSILON && distance < best_distance)
            }
        };
        if better {
            best = Some((score, distance, entry.id));
        }
    }
    best.map(|(_, _, id)| id)
}

/// Raw table set for one region, parsed into typed records.
pub struct RegionTables {
    pub region: Region,
    pub musics: Vec<MusicRecord>,
    pub difficulties: Vec<MusicDifficultyRecord>,
    pub cards: Vec<CardRecord>,
    pub characters: Vec<CharacterRecord>,
    pub events: Vec<EventRecord>,
}

impl RegionTables {
    pub async fn load(store: &MasterDataStore) -> Result<Self> {
        let region = store.region();
        Ok(Self {
            region,
            musics: parse_rows(region, "musics", &store.get_master_data("musics", false).await?),
            difficulties: parse_rows(
                region,
                "musicDifficulties",
                &store.get_master_data("musicDifficulties", false).await?,
            ),
            cards: parse_rows(region, "cards", &store.get_master_data("cards", false).await?),
            characters: parse_rows(
                region,
                "gameCharacters",
                &store.get_master_data("gameCharacters", false).await?,
            ),
            events: parse_rows(region, "events", &store.get_master_data("events", false).await?),
        })
    }
}

/// Pure build pass; CPU-bound and safe to run on a worker thread.
pub fn build_snapshot(
    tables: Vec<RegionTables>,
    leak: &LeakGuard,
    card_cache: Option<CardNameCache>,
    now_ms: i64,
) -> IndexSnapshot {
    let mut snapshot = IndexSnapshot {
        built_at: Some(Utc::now()),
        ..Default::default()
    };

    // Songs: assemble across regions, index titles for everything the leak
    // policy does not hide.
    let mut per_region = BTreeMap::new();
    for region_tables in &tables {
        per_region.insert(
            region_tables.region,
            (region_tables.musics.clone(), region_tables.difficulties.clone()),
        );
    }
    snapshot.songs = assemble_songs(&per_region);

    let mut song_ids: Vec<u32> = snapshot.songs.keys().copied().collect();
    song_ids.sort();
    for id in song_ids {
        let song = &snapshot.songs[&id];
        if leak.is_leaked_song(song, now_ms) {
            continue;
        }
        let mut variants: Vec<String> = Vec::new();
        for title in song.titles.values() {
            variants.push(normalize(title));
        }
        // JP-only songs become searchable by typed English approximations.
        if let Some(reading) = &song.pronunciation {
            variants.push(normalize(&romanize(reading, LoanwordStyle::DoubledVowel)));
            variants.push(normalize(&romanize(reading, LoanwordStyle::Preserved)));
        }
        variants.dedup();
        for text in variants {
            snapshot.song_exact.entry(text.clone()).or_insert(id);
            snapshot.song_titles.push(TitleEntry { text, id });
        }
    }

    // Characters: first-seen per id, every regional spelling indexed.
    for region_tables in &tables {
        for record in &region_tables.characters {
            snapshot
                .characters
                .entry(record.id)
                .or_insert_with(|| Character::from(record));
            let name = normalize(&record.full_name());
            if !snapshot
                .character_names
                .iter()
                .any(|e| e.text == name && e.id == record.id)
            {
                snapshot.character_names.push(TitleEntry {
                    text: name,
                    id: record.id,
                });
            }
        }
    }

    // Cards: merge release timestamps across regions; skip what the JP leak
    // policy hides; first-seen display names, EN/JP-priority map on the side.
    for region_tables in &tables {
        for record in &region_tables.cards {
            let card = Card::from_record(record, region_tables.region);
            snapshot
                .cards
                .entry(record.id)
                .and_modify(|existing| {
                    existing.release_at.insert(region_tables.region, record.release_at);
                })
                .or_insert(card);
        }
    }
    snapshot.card_names = match card_cache {
        Some(cache) => cache,
        None => {
            let mut cache = CardNameCache::default();
            for region_tables in &tables {
                for record in &region_tables.cards {
                    // Leak status is a property of the merged card (all
                    // regions' release timestamps), but the indexed name must
                    // be this region's own spelling.
                    let Some(merged) = snapshot.cards.get(&record.id) else {
                        continue;
                    };
                    if leak.is_leaked_card(merged, now_ms) {
                        continue;
                    }
                    let Some(character) = snapshot.characters.get(&record.character_id) else {
                        warn!(
                            "Card {} references unknown character {}",
                            record.id, record.character_id
                        );
                        continue;
                    };
                    let regional = Card::from_record(record, region_tables.region);
                    let name = normalize(&regional.display_name(&character.name));
                    cache.cards.entry(name.clone()).or_insert(record.id);
                    match region_tables.region {
                        Region::En | Region::Jp => {
                            cache.cards_en_jp.insert(name, record.id);
                        }
                        _ => {
                            cache.cards_en_jp.entry(name).or_insert(record.id);
                        }
                    }
                }
            }
            cache
        }
    };

    // Events: titles, short codes and ids share one exact-lookup map.
    for region_tables in &tables {
        for record in &region_tables.events {
            let Some(event) = Event::from_record(record, region_tables.region) else {
                warn!(
                    "Skipping event {} with unknown type {:?}",
                    record.id, record.event_type
                );
                continue;
            };
            snapshot
                .events
                .entry(record.id)
                .and_modify(|existing| {
                    existing.timings.extend(event.timings.clone());
                })
                .or_insert(event);
        }
    }
    let mut event_ids: Vec<u32> = snapshot.events.keys().copied().collect();
    event_ids.sort();
    for id in event_ids {
        let event = &snapshot.events[&id];
        if leak.is_leaked_event(event, now_ms) {
            continue;
        }
        let name = normalize(&event.name);
        snapshot.event_exact.entry(name.clone()).or_insert(id);
        snapshot
            .event_exact
            .entry(normalize(event.short_code()))
            .or_insert(id);
        snapshot.event_exact.entry(id.to_string()).or_insert(id);
        snapshot.event_names.push(TitleEntry { text: name, id });
    }

    snapshot
}

/// The shared, atomically-swapped index handle.
pub struct NameIndex {
    policy: FuzzyPolicy,
    cache_dir: PathBuf,
    snapshot: std::sync::RwLock<Arc<IndexSnapshot>>,
    rebuild_lock: tokio::sync::Mutex<()>,
}

impl NameIndex {
    pub fn new<P: AsRef<Path>>(policy: FuzzyPolicy, cache_dir: P) -> Self {
        Self {
            policy,
            cache_dir: cache_dir.as_ref().to_path_buf(),
            snapshot: std::sync::RwLock::new(Arc::new(IndexSnapshot::default())),
            rebuild_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn policy(&self) -> &FuzzyPolicy {
        &self.policy
    }

    /// Current snapshot; cheap to clone, safe to hold across awaits.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Rebuild from the given stores if stale (always when `force`).
    /// Single-flight: a rebuild already in progress is awaited, not repeated.
    pub async fn rebuild(
        &self,
        stores: &[Arc<MasterDataStore>],
        leak: &LeakGuard,
        force: bool,
    ) -> Result<()> {
        if !force && !self.snapshot().is_stale(Utc::now()) {
            return Ok(());
        }

        let _guard = self.rebuild_lock.lock().await;
        if !force && !self.snapshot().is_stale(Utc::now()) {
            // Raced with a rebuild that finished while we waited.
            return Ok(());
        }

        let mut tables = Vec::with_capacity(stores.len());
        for store in stores {
            tables.push(RegionTables::load(store).await?);
        }

        let card_cache = self.load_card_cache();
        let persist_cards = card_cache.is_none();
        let leak = leak.clone();
        let now_ms = Utc::now().timestamp_millis();

        let built = tokio::task::spawn_blocking(move || {
            build_snapshot(tables, &leak, card_cache, now_ms)
        })
        .await
        .map_err(|e| crate::error::Error::Io(std::io::Error::other(format!(
            "index build task failed: {}",
            e
        ))))?;

        if persist_cards {
            if let Err(e) = self.persist_card_cache(&built.card_names) {
                warn!("Failed to persist card-name index: {}", e);
            }
        }

        let songs = built.song_titles.len();
        let events = built.event_names.len();
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(built);
        info!("Name index rebuilt: {} song titles, {} events", songs, events);
        Ok(())
    }

    /// Drop the persisted card-name index; the next rebuild recomputes it.
    pub fn discard_card_names(&self) -> Result<()> {
        let path = self.cache_dir.join(CARD_NAME_FILE);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn load_card_cache(&self) -> Option<CardNameCache> {
        let path = self.cache_dir.join(CARD_NAME_FILE);
        let content = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!("Discarding corrupt card-name index: {}", e);
                None
            }
        }
    }

    fn persist_card_cache(&self, cache: &CardNameCache) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)?;
        crate::master::write_atomic(
            &self.cache_dir.join(CARD_NAME_FILE),
            &serde_json::to_vec(cache)?,
        )
    }
}
