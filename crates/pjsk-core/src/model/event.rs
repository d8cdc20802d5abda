use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::master::EventRecord;
use crate::region::Region;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Marathon,
    CheerfulCarnival,
    WorldBloom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTiming {
    pub start_at: i64,
    pub aggregate_at: i64,
    pub closed_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u32,
    pub name: String,
    pub event_type: EventType,
    /// Asset-bundle name; its trailing segment doubles as the short code
    /// players use ("wl_vbs" and friends).
    pub asset_bundle_name: String,
    pub unit: Option<String>,
    pub timings: BTreeMap<Region, EventTiming>,
}

impl Event {
    pub fn from_record(record: &EventRecord, region: Region) -> Option<Self> {
        let mut timings = BTreeMap::new();
        timings.insert(
            region,
            EventTiming {
                start_at: record.start_at,
                aggregate_at: record.aggregate_at,
                closed_at: record.closed_at,
            },
        );
        Some(Self {
            id: record.id,
            name: record.name.clone(),
            event_type: record.event_type.parse().ok()?,
            asset_bundle_name: record.asset_bundle_name.clone(),
            unit: record.unit.clone(),
            timings,
        })
    }

    /// Short code derived from the asset bundle name ("event_wl_2023" → "wl_2023").
    pub fn short_code(&self) -> &str {
        self.asset_bundle_name
            .strip_prefix("event_")
            .unwrap_or(&self.asset_bundle_name)
    }

    /// True when `now` falls inside the region's `[startAt, closedAt)` window.
    pub fn is_current(&self, region: Region, now_ms: i64) -> bool {
        self.timings
            .get(&region)
            .map(|t| t.start_at <= now_ms && now_ms < t.closed_at)
            .unwrap_or(false)
    }

    pub fn jp_start(&self) -> Option<i64> {
        self.timings.get(&Region::Jp).map(|t| t.start_at)
    }

    pub fn is_jp_only(&self) -> bool {
        self.timings.len() == 1 && self.timings.contains_key(&Region::Jp)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedSeason {
    pub id: u32,
    pub start_at: i64,
    pub aggregated_at: i64,
}

/// Resolve the ranked season containing `now`.
///
/// With a single known season the before/after-first-season case is genuinely
/// ambiguous upstream; the carried-over fallback is: the last season if past
/// its start, otherwise none.
pub fn current_ranked_season(seasons: &[RankedSeason], now_ms: i64) -> Option<&RankedSeason> {
    if let Some(season) = seasons
        .iter()
        .find(|s| s.start_at <= now_ms && now_ms < s.aggregated_at)
    {
        return Some(season);
    }
    seasons.last().filter(|s| s.start_at <= now_ms)
}
