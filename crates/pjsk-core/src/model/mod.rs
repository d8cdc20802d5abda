//! Cross-referenced entities derived from the raw master-data tables.

mod card;
mod difficulty;
mod event;
mod song;

pub use card::{Card, Character};
pub use difficulty::Difficulty;
pub use event::{current_ranked_season, Event, EventTiming, EventType, RankedSeason};
pub use song::{assemble_songs, Chart, Song};
