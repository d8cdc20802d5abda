//! Cross-module behavior: region isolation, the service facade, and the
//! constant resolution order end to end. Network seams are mocked through the
//! public fetcher and transport traits.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use pjsk_core::config::{CoreConfig, KeySet, RegionConfig, SheetConfig};
use pjsk_core::constants::{ConstantSource, SheetFetcher};
use pjsk_core::error::{Error, Result};
use pjsk_core::master::{BundleFetcher, BundleVersion, MasterDataStore};
use pjsk_core::model::Difficulty;
use pjsk_core::region::Region;
use pjsk_core::registry::Registry;
use pjsk_core::session::{ProtocolHeaders, Transport, TransportResponse};
use pjsk_core::{GameApi, PjskService};
use serde_json::{json, Value};
use tempfile::tempdir;

struct FixtureFetcher {
    version: String,
    tables: HashMap<String, Vec<Value>>,
}

#[async_trait]
impl BundleFetcher for FixtureFetcher {
    async fn fetch_version(&self, _region: Region) -> Result<BundleVersion> {
        Ok(BundleVersion {
            data_version: self.version.clone(),
            asset_version: None,
        })
    }

    async fn fetch_bundle(
        &self,
        _region: Region,
        _version: &BundleVersion,
    ) -> Result<HashMap<String, Vec<Value>>> {
        Ok(self.tables.clone())
    }
}

struct DeadTransport;

#[async_trait]
impl Transport for DeadTransport {
    async fn exchange(
        &self,
        _path: &str,
        _body: &[u8],
        _headers: &ProtocolHeaders,
    ) -> Result<TransportResponse> {
        Err(Error::Network("no transport in this test".into()))
    }
}

struct FixtureSheets {
    primary: Vec<Value>,
    overrides: Vec<Value>,
}

#[async_trait]
impl SheetFetcher for FixtureSheets {
    async fn fetch_rows(&self, url: &str) -> Result<Vec<Value>> {
        Ok(match url {
            "primary" => self.primary.clone(),
            _ => self.overrides.clone(),
        })
    }
}

fn region_config() -> RegionConfig {
    RegionConfig {
        keys: KeySet {
            key: "30313233343536373839616263646566".to_string(),
            iv: "66656463626139383736353433323130".to_string(),
        },
        ..RegionConfig::default()
    }
}

fn base_tables(title: &str, published_at: i64) -> HashMap<String, Vec<Value>> {
    let mut tables = HashMap::new();
    tables.insert(
        "musics".to_string(),
        vec![json!({"id": 10, "title": title, "publishedAt": published_at})],
    );
    tables.insert(
        "musicDifficulties".to_string(),
        vec![
            json!({
                "id": 101, "musicId": 10, "musicDifficulty": "master",
                "playLevel": 30, "totalNoteCount": 1200
            }),
            json!({
                "id": 102, "musicId": 10, "musicDifficulty": "append",
                "playLevel": 31, "totalNoteCount": 1400
            }),
        ],
    );
    tables.insert("cards".to_string(), vec![]);
    tables.insert("gameCharacters".to_string(), vec![]);
    tables.insert("events".to_string(), vec![]);
    tables
}

mod region_independence_tests {
    use super::*;

    #[tokio::test]
    async fn test_refreshing_one_region_leaves_the_other_untouched() {
        let dir = tempdir().unwrap();
        let jp = MasterDataStore::open(
            Region::Jp,
            dir.path(),
            Arc::new(FixtureFetcher {
                version: "jp-1".to_string(),
                tables: base_tables("ジャパン", 100),
            }),
        );
        let en = MasterDataStore::open(
            Region::En,
            dir.path(),
            Arc::new(FixtureFetcher {
                version: "en-1".to_string(),
                tables: base_tables("English", 200),
            }),
        );

        jp.update_master_data(true).await.unwrap();
        let jp_before = serde_json::to_vec(&*jp.get_master_data("musics", false).await.unwrap())
            .unwrap();
        let jp_generation = jp.generation().await;

        // Hammer the EN store; JP must not move.
        for _ in 0..3 {
            en.update_master_data(true).await.unwrap();
        }

        let jp_after = serde_json::to_vec(&*jp.get_master_data("musics", false).await.unwrap())
            .unwrap();
        assert_eq!(jp_before, jp_after);
        assert_eq!(jp.generation().await, jp_generation);
        assert_eq!(
            en.get_master_data("musics", false).await.unwrap()[0]["title"],
            json!("English")
        );
    }

    #[tokio::test]
    async fn test_disk_caches_are_region_scoped() {
        let dir = tempdir().unwrap();
        let jp = MasterDataStore::open(
            Region::Jp,
            dir.path(),
            Arc::new(FixtureFetcher {
                version: "jp-1".to_string(),
                tables: base_tables("ジャパン", 100),
            }),
        );
        jp.update_master_data(true).await.unwrap();

        assert!(dir.path().join("jp/master/musics.json").exists());
        assert!(!dir.path().join("en").exists());
    }
}

mod service_tests {
    use super::*;

    fn service(dir: &std::path::Path) -> PjskService {
        let config = CoreConfig {
            cache_dir: dir.to_path_buf(),
            sheets: SheetConfig {
                primary_url: "primary".to_string(),
                override_url: "override".to_string(),
            },
            ..CoreConfig::default()
        };
        let now = Utc::now().timestamp_millis();

        // JP released both charts; EN carries the song without append and
        // only releases in the future.
        let mut en_tables = base_tables("Needle and Thread", now + 60_000);
        en_tables.insert(
            "musicDifficulties".to_string(),
            vec![json!({
                "id": 101, "musicId": 10, "musicDifficulty": "master",
                "playLevel": 30, "totalNoteCount": 1200
            })],
        );

        let jp = GameApi::with_parts(
            Region::Jp,
            &region_config(),
            dir,
            Arc::new(FixtureFetcher {
                version: "jp-1".to_string(),
                tables: base_tables("Needle and Thread", now - 60_000),
            }),
            Arc::new(DeadTransport),
        )
        .unwrap();
        let en = GameApi::with_parts(
            Region::En,
            &region_config(),
            dir,
            Arc::new(FixtureFetcher {
                version: "en-1".to_string(),
                tables: en_tables,
            }),
            Arc::new(DeadTransport),
        )
        .unwrap();

        PjskService::with_parts(
            &config,
            Registry::from_apis(vec![Arc::new(en), Arc::new(jp)]),
            Arc::new(FixtureSheets {
                primary: vec![json!({"musicId": 10, "difficulty": "master", "constant": 29.5})],
                overrides: vec![json!({"musicId": 10, "difficulty": "master", "constant": 30.1})],
            }),
        )
    }

    #[tokio::test]
    async fn test_append_regions_are_a_subset_of_released_regions() {
        let dir = tempdir().unwrap();
        let service = service(dir.path());
        service.refresh(true).await.unwrap();

        let (fully_leaked, regions) = service.music_regions(10).unwrap();
        assert!(!fully_leaked);
        // EN's release is still in the future.
        assert_eq!(regions, vec![Region::Jp]);

        let append = service.music_append_regions(10).unwrap();
        for region in &append {
            assert!(regions.contains(region));
        }
        assert_eq!(append, vec![Region::Jp]);
    }

    #[tokio::test]
    async fn test_constant_resolution_order() {
        let dir = tempdir().unwrap();
        let service = service(dir.path());
        service.refresh(true).await.unwrap();

        // Override wins over primary and the computed default.
        let (value, source) = service
            .get_constant(10, Difficulty::Master, true, false)
            .await
            .unwrap();
        assert_eq!((value, source), (30.1, ConstantSource::Override));

        // Skipping the override falls to the primary sheet.
        let (value, source) = service
            .get_constant(10, Difficulty::Master, true, true)
            .await
            .unwrap();
        assert_eq!((value, source), (29.5, ConstantSource::Primary));

        // No sheet cell for append: listed level 31, non-AP default is 30.
        let (value, source) = service
            .get_constant(10, Difficulty::Append, false, false)
            .await
            .unwrap();
        assert_eq!((value, source), (30.0, ConstantSource::Default));
    }

    #[tokio::test]
    async fn test_resolution_through_the_facade() {
        let dir = tempdir().unwrap();
        let service = service(dir.path());
        service.refresh(true).await.unwrap();

        assert_eq!(service.resolve_song("needle and thread").unwrap().id, 10);
        assert_eq!(service.resolve_song("needle and threads").unwrap().id, 10);
        assert_eq!(service.parse_difficulty("mas"), Some(Difficulty::Master));
        assert!(!service.is_leaked_song(10));
    }

    #[tokio::test]
    async fn test_unknown_region_is_typed_at_the_facade() {
        let dir = tempdir().unwrap();
        let service = service(dir.path());
        assert!(matches!(
            service.api("global"),
            Err(Error::UnknownRegion(_))
        ));
    }
}
