//! On-disk snapshot caches for leaderboard data.

mod snapshot;

pub use snapshot::{SnapshotData, SnapshotFile};

/// File names used by the service for its two standing snapshots.
pub const EVENT_TOP100_FILE: &str = "event_top100.json";
pub const RANKED_TOP100_FILE: &str = "ranked_top100.json";
