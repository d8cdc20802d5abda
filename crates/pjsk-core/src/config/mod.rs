//! Configuration for the core service.
//!
//! A [`CoreConfig`] is loaded from a TOML file by whoever constructs the
//! service (the CLI here; a bot front end in production). Missing file or
//! missing sections degrade to defaults so the core can start against fixture
//! data in tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::region::Region;

/// Cache staleness and cooldown policy.
///
/// These windows mirror what the upstream game tolerates: the bundle version
/// descriptor is re-checked at most every five minutes, derived indexes are
/// rebuilt at most hourly, and a full account pull is locked out for 300
/// seconds by the server itself.
pub mod staleness {
    use std::time::Duration;

    /// Minimum interval between bundle version-descriptor checks.
    pub const VERSION_CHECK_WINDOW: Duration = Duration::from_secs(300);

    /// Minimum interval between name-index rebuilds (unless forced).
    pub const INDEX_REBUILD_INTERVAL: Duration = Duration::from_secs(3600);

    /// Minimum interval between constant-sheet refreshes.
    pub const CONSTANT_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

    /// Default TTL for cached profile snapshots.
    pub const PROFILE_TTL: Duration = Duration::from_secs(60);

    /// Server-enforced cooldown after a successful full account pull.
    pub const PULL_COOLDOWN: Duration = Duration::from_secs(300);
}

/// Outbound HTTP policy. Every network call this crate makes carries an
/// explicit timeout; on timeout the previous cached value is kept.
pub mod http {
    use std::time::Duration;

    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Symmetric key material for one region's upstream protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySet {
    /// AES-128 key, hex encoded (32 hex chars).
    pub key: String,
    /// CBC initialization vector, hex encoded (32 hex chars).
    pub iv: String,
}

impl KeySet {
    pub fn key_bytes(&self) -> Result<[u8; 16]> {
        decode_16(&self.key, "key")
    }

    pub fn iv_bytes(&self) -> Result<[u8; 16]> {
        decode_16(&self.iv, "iv")
    }
}

fn decode_16(hex_str: &str, what: &str) -> Result<[u8; 16]> {
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| Error::ConfigParse(format!("bad hex in {}: {}", what, e)))?;
    bytes
        .try_into()
        .map_err(|_| Error::ConfigParse(format!("{} must be 16 bytes", what)))
}

/// Per-region upstream endpoints and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Game API server (account data, leaderboards).
    pub api_base: String,
    /// Master-data bundle host.
    pub data_base: String,
    /// Static asset host (chart images, card art).
    pub asset_base: String,
    /// App version advertised to the upstream protocol.
    pub app_version: String,
    pub keys: KeySet,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            data_base: String::new(),
            asset_base: String::new(),
            app_version: "4.0.0".to_string(),
            keys: KeySet {
                // Zeroed placeholder material; real keys come from the config file.
                key: "00000000000000000000000000000000".to_string(),
                iv: "00000000000000000000000000000000".to_string(),
            },
        }
    }
}

/// Remote community constant sheets layered over computed defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SheetConfig {
    /// Primary community sheet ("39s").
    pub primary_url: String,
    /// Override sheet; wins over primary when both define a cell.
    pub override_url: String,
}

/// Fuzzy-resolution policy. The floors are heuristics carried over from
/// observed behavior, deliberately configurable rather than baked in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzyPolicy {
    /// Normalized similarity floor for song title resolution.
    pub song_floor: f64,
    /// Normalized similarity floor for character names. Higher than songs
    /// because a wrong character match is costlier than a wrong song match.
    pub character_floor: f64,
    /// Raw Skim score floor for event matching (substring-tuned, unnormalized).
    pub event_floor: i64,
    /// Literal queries that look numeric but must not hit the id fast path.
    pub numeric_alias_exceptions: Vec<String>,
}

impl Default for FuzzyPolicy {
    fn default() -> Self {
        Self {
            song_floor: 0.5,
            character_floor: 0.65,
            event_floor: 40,
            numeric_alias_exceptions: vec!["39".to_string()],
        }
    }
}

/// Song/event/card ids exempted from the leak policy even while their
/// release timestamp is still in the future.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeakAllowList {
    #[serde(default)]
    pub songs: Vec<u32>,
    #[serde(default)]
    pub events: Vec<u32>,
    #[serde(default)]
    pub cards: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Root directory for every on-disk cache this crate writes. Safe to
    /// delete wholesale; the next access rebuilds it.
    pub cache_dir: PathBuf,
    pub regions: BTreeMap<Region, RegionConfig>,
    pub sheets: SheetConfig,
    pub fuzzy: FuzzyPolicy,
    pub leak_allow: LeakAllowList,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            regions: BTreeMap::new(),
            sheets: SheetConfig::default(),
            fuzzy: FuzzyPolicy::default(),
            leak_allow: LeakAllowList::default(),
        }
    }
}

impl CoreConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Regions in declaration order; the registry preserves this ordering.
    pub fn region_order(&self) -> Vec<Region> {
        self.regions.keys().copied().collect()
    }
}
