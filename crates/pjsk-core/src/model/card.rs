use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::master::{CardRecord, CharacterRecord};
use crate::region::Region;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub id: u32,
    pub name: String,
    pub unit: Option<String>,
}

impl From<&CharacterRecord> for Character {
    fn from(record: &CharacterRecord) -> Self {
        Self {
            id: record.id,
            name: record.full_name(),
            unit: record.unit.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: u32,
    pub character_id: u32,
    pub rarity: String,
    pub attr: String,
    /// Card title ("prefix" in the upstream table).
    pub title: String,
    pub asset_bundle_name: String,
    /// Release timestamp per region carrying the card.
    pub release_at: BTreeMap<Region, i64>,
}

impl Card {
    pub fn from_record(record: &CardRecord, region: Region) -> Self {
        let mut release_at = BTreeMap::new();
        release_at.insert(region, record.release_at);
        Self {
            id: record.id,
            character_id: record.character_id,
            rarity: record.card_rarity_type.clone(),
            attr: record.attr.clone(),
            title: record.prefix.clone(),
            asset_bundle_name: record.asset_bundle_name.clone(),
            release_at,
        }
    }

    fn rarity_stars(&self) -> String {
        match self.rarity.as_str() {
            "rarity_1" => "★".to_string(),
            "rarity_2" => "★★".to_string(),
            "rarity_3" => "★★★".to_string(),
            "rarity_4" => "★★★★".to_string(),
            "rarity_birthday" => "🎀".to_string(),
            other => other.to_string(),
        }
    }

    /// Deterministic display name: rarity stars + attribute + character name
    /// + card title. This exact composition is what the name→id index is
    /// keyed on, so it must stay stable.
    pub fn display_name(&self, character_name: &str) -> String {
        format!(
            "{} [{}] {} - {}",
            self.rarity_stars(),
            self.attr,
            character_name,
            self.title
        )
    }
}
