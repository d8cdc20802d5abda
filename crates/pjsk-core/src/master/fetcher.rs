use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::http::REQUEST_TIMEOUT;
use crate::error::{Error, Result};
use crate::region::Region;

/// Version descriptor for a region's master-data bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleVersion {
    pub data_version: String,
    #[serde(default)]
    pub asset_version: Option<String>,
}

/// Outbound seam for bundle downloads, mockable in tests.
#[async_trait]
pub trait BundleFetcher: Send + Sync {
    /// Fetch the current version descriptor for a region.
    async fn fetch_version(&self, region: Region) -> Result<BundleVersion>;

    /// Download the full table set for a region at the given version.
    async fn fetch_bundle(
        &self,
        region: Region,
        version: &BundleVersion,
    ) -> Result<HashMap<String, Vec<Value>>>;
}

/// HTTP implementation against the per-region master-data host.
///
/// Layout: `{data_base}/version.json` holds the descriptor,
/// `{data_base}/{data_version}/index.json` lists the table names, and each
/// table lives at `{data_base}/{data_version}/{table}.json`.
pub struct HttpBundleFetcher {
    client: Client,
    data_base: String,
}

impl HttpBundleFetcher {
    pub fn new(data_base: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, data_base })
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl BundleFetcher for HttpBundleFetcher {
    async fn fetch_version(&self, _region: Region) -> Result<BundleVersion> {
        let url = format!("{}/version.json", self.data_base);
        let value = self.get_json(&url).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn fetch_bundle(
        &self,
        _region: Region,
        version: &BundleVersion,
    ) -> Result<HashMap<String, Vec<Value>>> {
        let index_url = format!("{}/{}/index.json", self.data_base, version.data_version);
        let index: Vec<String> = serde_json::from_value(self.get_json(&index_url).await?)?;

        let mut tables = HashMap::with_capacity(index.len());
        for table in index {
            let url = format!(
                "{}/{}/{}.json",
                self.data_base,
                version.data_version,
                urlencoding::encode(&table)
            );
            let rows: Vec<Value> = serde_json::from_value(self.get_json(&url).await?)?;
            tables.insert(table, rows);
        }
        Ok(tables)
    }
}
