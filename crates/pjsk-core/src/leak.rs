//! Leak policy: content present in master data before its public release
//! timestamp must never surface through any public-facing resolver.
//!
//! Pure predicates over the derived entities; the only state is the fixed
//! allow-list of intentionally exempted ids.

use std::collections::HashSet;

use crate::config::LeakAllowList;
use crate::model::{Card, Event, Song};
use crate::region::Region;

#[derive(Debug, Clone, Default)]
pub struct LeakGuard {
    songs: HashSet<u32>,
    events: HashSet<u32>,
    cards: HashSet<u32>,
}

impl LeakGuard {
    pub fn new(allow: &LeakAllowList) -> Self {
        Self {
            songs: allow.songs.iter().copied().collect(),
            events: allow.events.iter().copied().collect(),
            cards: allow.cards.iter().copied().collect(),
        }
    }

    /// A song is leaked iff it exists only in the JP table and JP's release
    /// timestamp is still in the future, unless its id is allow-listed.
    pub fn is_leaked_song(&self, song: &Song, now_ms: i64) -> bool {
        if self.songs.contains(&song.id) {
            return false;
        }
        song.is_jp_only()
            && song
                .published_at
                .get(&Region::Jp)
                .map(|&ts| ts > now_ms)
                .unwrap_or(false)
    }

    pub fn is_leaked_event(&self, event: &Event, now_ms: i64) -> bool {
        if self.events.contains(&event.id) {
            return false;
        }
        event.is_jp_only() && event.jp_start().map(|ts| ts > now_ms).unwrap_or(false)
    }

    pub fn is_leaked_card(&self, card: &Card, now_ms: i64) -> bool {
        if self.cards.contains(&card.id) {
            return false;
        }
        let jp_only = card.release_at.len() == 1 && card.release_at.contains_key(&Region::Jp);
        jp_only
            && card
                .release_at
                .get(&Region::Jp)
                .map(|&ts| ts > now_ms)
                .unwrap_or(false)
    }

    /// Regions whose release timestamp for the song has passed. The flag is
    /// true only when no region qualifies (the song is fully leaked).
    pub fn music_available_regions(&self, song: &Song, now_ms: i64) -> (bool, Vec<Region>) {
        let regions = song.released_regions(now_ms);
        (regions.is_empty(), regions)
    }

    /// Released regions that also carry the append chart. Subset of
    /// `music_available_regions` by construction.
    pub fn music_append_regions(&self, song: &Song, now_ms: i64) -> Vec<Region> {
        song.released_regions(now_ms)
            .into_iter()
            .filter(|region| song.append_regions.contains(region))
            .collect()
    }
}
