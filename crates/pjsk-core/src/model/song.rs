use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::master::{Level, MusicDifficultyRecord, MusicRecord};
use crate::model::Difficulty;
use crate::region::Region;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chart {
    pub level: Level,
    pub note_count: u32,
}

/// Cross-referenced song entity: one `musics` record per region joined with
/// its `musicDifficulties` rows.
///
/// A song's id is stable across regions; titles and availability are not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    pub id: u32,
    /// Canonical title: the one from the region that released the song
    /// earliest.
    pub title: String,
    pub titles: BTreeMap<Region, String>,
    /// Kana reading from the JP table, when present.
    pub pronunciation: Option<String>,
    pub charts: BTreeMap<Difficulty, Chart>,
    /// Release timestamp (epoch millis) per region carrying the song.
    pub published_at: BTreeMap<Region, i64>,
    /// Regions where the append chart exists; always a subset of
    /// `published_at`'s keys.
    pub append_regions: BTreeSet<Region>,
    pub asset_bundle_name: Option<String>,
}

impl Song {
    pub fn earliest_release(&self) -> Option<i64> {
        self.published_at.values().copied().min()
    }

    pub fn is_jp_only(&self) -> bool {
        self.published_at.len() == 1 && self.published_at.contains_key(&Region::Jp)
    }

    /// Regions whose release timestamp has passed.
    pub fn released_regions(&self, now_ms: i64) -> Vec<Region> {
        self.published_at
            .iter()
            .filter(|&(_, &ts)| ts <= now_ms)
            .map(|(&region, _)| region)
            .collect()
    }

    pub fn chart(&self, difficulty: Difficulty) -> Option<&Chart> {
        self.charts.get(&difficulty)
    }
}

/// Join every region's music tables into one id-keyed song map.
///
/// Canonical title and chart merge order follow release time: the region that
/// published the song first wins, later regions only fill gaps.
pub fn assemble_songs(
    per_region: &BTreeMap<Region, (Vec<MusicRecord>, Vec<MusicDifficultyRecord>)>,
) -> HashMap<u32, Song> {
    let mut songs: HashMap<u32, Song> = HashMap::new();

    // (published_at, region) pairs per song id, to order the merge.
    let mut seen: Vec<(i64, Region, &MusicRecord)> = Vec::new();
    for (&region, (musics, _)) in per_region {
        for record in musics {
            seen.push((record.published_at, region, record));
        }
    }
    seen.sort_by_key(|(ts, region, record)| (*ts, *region, record.id));

    for (ts, region, record) in seen {
        let song = songs.entry(record.id).or_insert_with(|| Song {
            id: record.id,
            title: record.title.clone(),
            titles: BTreeMap::new(),
            pronunciation: None,
            charts: BTreeMap::new(),
            published_at: BTreeMap::new(),
            append_regions: BTreeSet::new(),
            asset_bundle_name: record.asset_bundle_name.clone(),
        });
        song.titles.insert(region, record.title.clone());
        song.published_at.insert(region, ts);
        if region == Region::Jp {
            song.pronunciation = record.pronunciation.clone();
        }
    }

    // Difficulty rows merge in the same release order as titles, so a region
    // that rerates a chart later never displaces the first publication's
    // level. Regions not carrying the song sort last and only fill gaps.
    let mut chart_rows: Vec<(i64, Region, &MusicDifficultyRecord)> = Vec::new();
    for (&region, (_, difficulties)) in per_region {
        for row in difficulties {
            let ts = songs
                .get(&row.music_id)
                .and_then(|song| song.published_at.get(&region).copied())
                .unwrap_or(i64::MAX);
            chart_rows.push((ts, region, row));
        }
    }
    chart_rows.sort_by_key(|(ts, region, row)| (*ts, *region, row.music_id, row.id));

    for (_, region, row) in chart_rows {
        let Some(song) = songs.get_mut(&row.music_id) else {
            continue;
        };
        let Ok(difficulty) = row.music_difficulty.parse::<Difficulty>() else {
            continue;
        };
        song.charts.entry(difficulty).or_insert(Chart {
            level: row.play_level,
            note_count: row.total_note_count,
        });
        // Append availability is tracked per region and only counts in
        // regions that actually carry the song.
        if difficulty.is_append() && song.published_at.contains_key(&region) {
            song.append_regions.insert(region);
        }
    }

    songs
}
