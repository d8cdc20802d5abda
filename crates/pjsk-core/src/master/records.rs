//! Typed views over the raw master-data tables.
//!
//! The upstream publishes plain JSON arrays; everything downstream of the
//! store works with these validated records instead of raw mappings. A row
//! that fails validation is skipped with a warning rather than failing the
//! whole table.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::warn;

use crate::region::Region;

/// A chart's listed play level.
///
/// The upstream encodes this as either a plain number or, when a region has
/// re-rated the chart, a two-element `[original, rerated]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Flat(u8),
    Rerated { original: u8, rerated: u8 },
}

impl Level {
    /// The level currently in effect (the re-rate when present).
    pub fn effective(&self) -> u8 {
        match *self {
            Level::Flat(n) => n,
            Level::Rerated { rerated, .. } => rerated,
        }
    }

    pub fn original(&self) -> u8 {
        match *self {
            Level::Flat(n) => n,
            Level::Rerated { original, .. } => original,
        }
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match &value {
            Value::Number(n) => n
                .as_u64()
                .filter(|&n| n <= u8::MAX as u64)
                .map(|n| Level::Flat(n as u8))
                .ok_or_else(|| serde::de::Error::custom("playLevel out of range")),
            Value::Array(pair) if pair.len() == 2 => {
                let original = pair[0]
                    .as_u64()
                    .filter(|&n| n <= u8::MAX as u64)
                    .ok_or_else(|| serde::de::Error::custom("bad re-rated playLevel pair"))?;
                let rerated = pair[1]
                    .as_u64()
                    .filter(|&n| n <= u8::MAX as u64)
                    .ok_or_else(|| serde::de::Error::custom("bad re-rated playLevel pair"))?;
                Ok(Level::Rerated {
                    original: original as u8,
                    rerated: rerated as u8,
                })
            }
            _ => Err(serde::de::Error::custom(
                "playLevel must be a number or [original, rerated]",
            )),
        }
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Level::Flat(n) => serializer.serialize_u8(n),
            Level::Rerated { original, rerated } => [original, rerated].serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicRecord {
    pub id: u32,
    pub title: String,
    /// Kana reading of the title, used for transliteration on JP.
    #[serde(default)]
    pub pronunciation: Option<String>,
    /// Public release timestamp (epoch millis). Future values are leaks.
    pub published_at: i64,
    #[serde(default)]
    pub asset_bundle_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicDifficultyRecord {
    pub id: u32,
    pub music_id: u32,
    pub music_difficulty: String,
    pub play_level: Level,
    pub total_note_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRecord {
    pub id: u32,
    pub character_id: u32,
    pub card_rarity_type: String,
    pub attr: String,
    /// Card title ("prefix" upstream).
    pub prefix: String,
    pub asset_bundle_name: String,
    pub release_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterRecord {
    pub id: u32,
    #[serde(default)]
    pub first_name: Option<String>,
    pub given_name: String,
    #[serde(default)]
    pub unit: Option<String>,
}

impl CharacterRecord {
    pub fn full_name(&self) -> String {
        match &self.first_name {
            Some(first) => format!("{} {}", first, self.given_name),
            None => self.given_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: u32,
    pub name: String,
    /// marathon / cheerful_carnival / world_bloom
    pub event_type: String,
    pub asset_bundle_name: String,
    pub start_at: i64,
    pub aggregate_at: i64,
    pub closed_at: i64,
    #[serde(default)]
    pub unit: Option<String>,
}

impl EventRecord {
    /// "Current" means now falls inside `[startAt, closedAt)`.
    pub fn is_current(&self, now_ms: i64) -> bool {
        self.start_at <= now_ms && now_ms < self.closed_at
    }
}

/// Parse raw rows into typed records, skipping malformed rows individually.
pub fn parse_rows<T: DeserializeOwned>(region: Region, table: &str, rows: &[Value]) -> Vec<T> {
    let mut parsed = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        match serde_json::from_value(row.clone()) {
            Ok(record) => parsed.push(record),
            Err(e) => warn!("Skipping malformed {} row {} on {}: {}", table, index, region, e),
        }
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_level_flat() {
        let level: Level = serde_json::from_value(json!(31)).unwrap();
        assert_eq!(level, Level::Flat(31));
        assert_eq!(level.effective(), 31);
        assert_eq!(level.original(), 31);
    }

    #[test]
    fn test_level_rerated_pair() {
        let level: Level = serde_json::from_value(json!([28, 29])).unwrap();
        assert_eq!(
            level,
            Level::Rerated {
                original: 28,
                rerated: 29
            }
        );
        assert_eq!(level.effective(), 29);
        assert_eq!(level.original(), 28);
    }

    #[test]
    fn test_level_rejects_other_shapes() {
        assert!(serde_json::from_value::<Level>(json!("hard")).is_err());
        assert!(serde_json::from_value::<Level>(json!([1, 2, 3])).is_err());
        assert!(serde_json::from_value::<Level>(json!(300)).is_err());
    }

    #[test]
    fn test_level_serializes_back_to_upstream_shape() {
        assert_eq!(serde_json::to_value(Level::Flat(30)).unwrap(), json!(30));
        assert_eq!(
            serde_json::to_value(Level::Rerated {
                original: 28,
                rerated: 29
            })
            .unwrap(),
            json!([28, 29])
        );
    }

    #[test]
    fn test_parse_rows_skips_malformed() {
        let rows = vec![
            json!({"id": 1, "title": "A", "publishedAt": 10}),
            json!({"id": "not a number"}),
            json!({"id": 2, "title": "B", "publishedAt": 20}),
        ];
        let records: Vec<MusicRecord> = parse_rows(Region::Jp, "musics", &rows);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].id, 2);
    }

    #[test]
    fn test_event_current_window_is_half_open() {
        let event: EventRecord = serde_json::from_value(json!({
            "id": 7,
            "name": "Test Run",
            "eventType": "marathon",
            "assetBundleName": "event_7",
            "startAt": 100,
            "aggregateAt": 190,
            "closedAt": 200
        }))
        .unwrap();
        assert!(!event.is_current(99));
        assert!(event.is_current(100));
        assert!(event.is_current(199));
        assert!(!event.is_current(200));
    }
}
