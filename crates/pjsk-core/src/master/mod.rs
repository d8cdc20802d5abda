//! Versioned master-data bundles: typed records, the download seam, and the
//! per-region cache store.

mod fetcher;
mod records;
mod store;

pub use fetcher::{BundleFetcher, BundleVersion, HttpBundleFetcher};
pub use records::{
    parse_rows, CardRecord, CharacterRecord, EventRecord, Level, MusicDifficultyRecord,
    MusicRecord,
};
pub use store::MasterDataStore;
pub(crate) use store::write_atomic;
