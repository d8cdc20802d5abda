use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString, IntoStaticStr};

use crate::error::{Error, Result};

/// One of the game's independently operated server deployments.
///
/// Every region carries its own master data, accounts and release schedule;
/// region-keyed caches are fully independent of each other.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    En,
    Jp,
    Tw,
    Kr,
    Cn,
}

impl Region {
    /// Parse a caller-supplied region string, tolerating case and whitespace.
    pub fn parse(input: &str) -> Result<Self> {
        input
            .trim()
            .parse()
            .map_err(|_| Error::UnknownRegion(input.to_string()))
    }

    pub fn code(&self) -> &'static str {
        self.into()
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}
