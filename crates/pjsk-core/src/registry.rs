//! Startup-ordered collection of per-region apis.
//!
//! Built once from config and immutable afterwards; lookups borrow, nothing
//! is created lazily.

use std::collections::HashMap;
use std::sync::Arc;

use crate::api::GameApi;
use crate::config::CoreConfig;
use crate::error::{Error, Result};
use crate::region::Region;

pub struct Registry {
    // Declaration order from the config; `all()` iterates in this order.
    apis: Vec<Arc<GameApi>>,
    by_region: HashMap<Region, usize>,
}

impl Registry {
    pub fn from_config(config: &CoreConfig) -> Result<Self> {
        let mut apis = Vec::with_capacity(config.regions.len());
        for (&region, region_config) in &config.regions {
            apis.push(Arc::new(GameApi::from_config(
                region,
                region_config,
                &config.cache_dir,
            )?));
        }
        Ok(Self::from_apis(apis))
    }

    /// Assemble from pre-built apis; the seam tests use to inject mocked
    /// fetchers and transports.
    pub fn from_apis(apis: Vec<Arc<GameApi>>) -> Self {
        let by_region = apis
            .iter()
            .enumerate()
            .map(|(index, api)| (api.region(), index))
            .collect();
        Self { apis, by_region }
    }

    /// Api for a caller-supplied region string. Unknown regions are a typed
    /// error, never a retry.
    pub fn get_api(&self, region: &str) -> Result<&Arc<GameApi>> {
        let region = Region::parse(region)?;
        self.get(region)
    }

    pub fn get(&self, region: Region) -> Result<&Arc<GameApi>> {
        self.by_region
            .get(&region)
            .map(|&index| &self.apis[index])
            .ok_or_else(|| Error::UnknownRegion(format!("{} is not configured", region)))
    }

    pub fn all(&self) -> &[Arc<GameApi>] {
        &self.apis
    }
}
