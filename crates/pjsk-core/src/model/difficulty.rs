use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString, FromRepr, IntoStaticStr};

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
    FromRepr,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[repr(u8)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy = 0,
    Normal = 1,
    Hard = 2,
    Expert = 3,
    Master = 4,
    /// Bonus tier; exists for a subset of songs in a subset of regions.
    Append = 5,
}

impl Difficulty {
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::from_repr(value)
    }

    pub fn name(&self) -> &'static str {
        self.into()
    }

    pub fn is_append(&self) -> bool {
        matches!(self, Self::Append)
    }

    /// Parse the loose spellings players actually type.
    pub fn parse_loose(text: &str) -> Option<Self> {
        let text = text.trim().to_lowercase();
        match text.as_str() {
            "easy" | "ez" => Some(Self::Easy),
            "normal" | "nm" | "norm" => Some(Self::Normal),
            "hard" | "hd" => Some(Self::Hard),
            "expert" | "exp" | "ex" => Some(Self::Expert),
            "master" | "mas" | "ma" | "mst" => Some(Self::Master),
            "append" | "apd" | "ap" => Some(Self::Append),
            _ => None,
        }
    }

    /// Difficulty color used by render layers (hex RGB).
    pub fn color_code(&self) -> &'static str {
        match self {
            Self::Easy => "#66DD11",
            Self::Normal => "#33BBEE",
            Self::Hard => "#FFAA00",
            Self::Expert => "#EE4466",
            Self::Master => "#BB33EE",
            Self::Append => "#FFCDFF",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
