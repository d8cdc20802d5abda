//! Community difficulty-constant overlay.
//!
//! Two remote sheets layered over a computed default: the override sheet wins
//! over the primary ("39s") sheet, and both fall back to the game-listed
//! level. Refreshes block the first lookup past the hour boundary so callers
//! never read constants more than an hour stale.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::http::REQUEST_TIMEOUT;
use crate::config::staleness::CONSTANT_REFRESH_INTERVAL;
use crate::config::SheetConfig;
use crate::error::{Error, Result};
use crate::model::Difficulty;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantSource {
    Override,
    Primary,
    Default,
}

impl ConstantSource {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Override => "override",
            Self::Primary => "39s",
            Self::Default => "computed",
        }
    }
}

/// Outbound seam for sheet downloads, mockable in tests.
#[async_trait]
pub trait SheetFetcher: Send + Sync {
    async fn fetch_rows(&self, url: &str) -> Result<Vec<Value>>;
}

pub struct HttpSheetFetcher {
    client: Client,
}

impl HttpSheetFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SheetFetcher for HttpSheetFetcher {
    async fn fetch_rows(&self, url: &str) -> Result<Vec<Value>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

type SheetMap = HashMap<(u32, Difficulty), f64>;

#[derive(Default)]
struct OverlayState {
    updated_at: Option<DateTime<Utc>>,
    primary: SheetMap,
    overrides: SheetMap,
}

pub struct ConstantOverlayCache {
    config: SheetConfig,
    fetcher: Arc<dyn SheetFetcher>,
    state: Mutex<OverlayState>,
}

impl ConstantOverlayCache {
    pub fn new(config: SheetConfig, fetcher: Arc<dyn SheetFetcher>) -> Self {
        Self {
            config,
            fetcher,
            state: Mutex::new(OverlayState::default()),
        }
    }

    /// Resolve one constant cell. Order: override sheet (unless `force_39s`),
    /// primary sheet, then the computed default of `listed_level - 1` for
    /// non-AP and `listed_level` for AP.
    pub async fn get_constant(
        &self,
        music_id: u32,
        difficulty: Difficulty,
        listed_level: u8,
        all_perfect: bool,
        force_39s: bool,
    ) -> (f64, ConstantSource) {
        let mut state = self.state.lock().await;
        self.refresh_if_stale(&mut state, false).await;

        let key = (music_id, difficulty);
        if !force_39s {
            if let Some(&value) = state.overrides.get(&key) {
                return (value, ConstantSource::Override);
            }
        }
        if let Some(&value) = state.primary.get(&key) {
            return (value, ConstantSource::Primary);
        }
        let default = if all_perfect {
            listed_level as f64
        } else {
            listed_level.saturating_sub(1) as f64
        };
        (default, ConstantSource::Default)
    }

    pub async fn force_refresh(&self) {
        let mut state = self.state.lock().await;
        self.refresh_if_stale(&mut state, true).await;
    }

    /// Synchronous-from-the-caller's-view refresh once the hour boundary has
    /// passed. Sheet failures keep the previous maps; malformed rows are
    /// skipped individually.
    async fn refresh_if_stale(&self, state: &mut OverlayState, force: bool) {
        let now = Utc::now();
        let stale = match state.updated_at {
            Some(at) => (now - at)
                .to_std()
                .map(|age| age >= CONSTANT_REFRESH_INTERVAL)
                .unwrap_or(true),
            None => true,
        };
        if !stale && !force {
            return;
        }

        match self.fetch_sheet(&self.config.primary_url).await {
            Ok(map) => state.primary = map,
            Err(e) => warn!("Primary constant sheet refresh failed, keeping previous: {}", e),
        }
        match self.fetch_sheet(&self.config.override_url).await {
            Ok(map) => state.overrides = map,
            Err(e) => warn!("Override constant sheet refresh failed, keeping previous: {}", e),
        }
        // Stamped even on failure so a dead sheet is retried hourly, not on
        // every lookup.
        state.updated_at = Some(now);
        info!(
            "Constant overlay refreshed: {} primary cells, {} overrides",
            state.primary.len(),
            state.overrides.len()
        );
    }

    async fn fetch_sheet(&self, url: &str) -> Result<SheetMap> {
        if url.is_empty() {
            return Ok(SheetMap::new());
        }
        let rows = self.fetcher.fetch_rows(url).await?;
        Ok(parse_sheet(&rows))
    }
}

/// Parse sheet rows of the shape `{musicId, difficulty, constant}`.
fn parse_sheet(rows: &[Value]) -> SheetMap {
    let mut map = SheetMap::new();
    for (index, row) in rows.iter().enumerate() {
        let music_id = row.get("musicId").and_then(Value::as_u64);
        let difficulty = row
            .get("difficulty")
            .and_then(Value::as_str)
            .and_then(Difficulty::parse_loose);
        let constant = match row.get("constant") {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        match (music_id, difficulty, constant) {
            (Some(id), Some(difficulty), Some(constant)) => {
                map.insert((id as u32, difficulty), constant);
            }
            _ => warn!("Skipping malformed constant row {}: {}", index, row),
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockSheets {
        primary: Vec<Value>,
        overrides: Vec<Value>,
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl SheetFetcher for MockSheets {
        async fn fetch_rows(&self, url: &str) -> Result<Vec<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Network("sheet down".into()));
            }
            Ok(match url {
                "primary" => self.primary.clone(),
                _ => self.overrides.clone(),
            })
        }
    }

    fn cache(primary: Vec<Value>, overrides: Vec<Value>) -> ConstantOverlayCache {
        ConstantOverlayCache::new(
            SheetConfig {
                primary_url: "primary".to_string(),
                override_url: "override".to_string(),
            },
            Arc::new(MockSheets {
                primary,
                overrides,
                calls: AtomicUsize::new(0),
                fail: false,
            }),
        )
    }

    fn worked_example() -> ConstantOverlayCache {
        cache(
            vec![json!({"musicId": 10, "difficulty": "master", "constant": 29.5})],
            vec![json!({"musicId": 10, "difficulty": "master", "constant": 30.1})],
        )
    }

    #[tokio::test]
    async fn test_override_wins() {
        let cache = worked_example();
        let (value, source) = cache
            .get_constant(10, Difficulty::Master, 30, true, false)
            .await;
        assert_eq!(value, 30.1);
        assert_eq!(source.label(), "override");
    }

    #[tokio::test]
    async fn test_force_39s_skips_override() {
        let cache = worked_example();
        let (value, source) = cache
            .get_constant(10, Difficulty::Master, 30, true, true)
            .await;
        assert_eq!(value, 29.5);
        assert_eq!(source.label(), "39s");
    }

    #[tokio::test]
    async fn test_computed_default() {
        let cache = worked_example();
        let (value, source) = cache
            .get_constant(11, Difficulty::Master, 28, false, false)
            .await;
        assert_eq!(value, 27.0);
        assert_eq!(source.label(), "computed");

        let (value, _) = cache
            .get_constant(11, Difficulty::Master, 28, true, false)
            .await;
        assert_eq!(value, 28.0);
    }

    #[tokio::test]
    async fn test_malformed_rows_skipped_individually() {
        let cache = cache(
            vec![
                json!({"musicId": 1, "difficulty": "master", "constant": "not a number"}),
                json!({"musicId": 1, "difficulty": "ultra", "constant": 30.0}),
                json!({"musicId": 2, "difficulty": "expert", "constant": "31.5"}),
            ],
            vec![],
        );
        let (value, source) = cache
            .get_constant(2, Difficulty::Expert, 30, true, false)
            .await;
        assert_eq!(value, 31.5);
        assert_eq!(source, ConstantSource::Primary);

        let (_, source) = cache
            .get_constant(1, Difficulty::Master, 30, true, false)
            .await;
        assert_eq!(source, ConstantSource::Default);
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_default() {
        let cache = ConstantOverlayCache::new(
            SheetConfig {
                primary_url: "primary".to_string(),
                override_url: "override".to_string(),
            },
            Arc::new(MockSheets {
                primary: vec![],
                overrides: vec![],
                calls: AtomicUsize::new(0),
                fail: true,
            }),
        );
        let (value, source) = cache
            .get_constant(10, Difficulty::Master, 30, false, false)
            .await;
        assert_eq!(value, 29.0);
        assert_eq!(source, ConstantSource::Default);
    }
}
