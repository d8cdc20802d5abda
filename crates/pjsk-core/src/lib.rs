pub mod api;
pub mod config;
pub mod constants;
pub mod error;
pub mod index;
pub mod leak;
pub mod master;
pub mod model;
pub mod profile;
pub mod region;
pub mod registry;
pub mod service;
pub mod session;
pub mod storage;
pub mod tasks;

pub use api::GameApi;
pub use config::{CoreConfig, FuzzyPolicy, KeySet, LeakAllowList, RegionConfig, SheetConfig};
pub use constants::{ConstantOverlayCache, ConstantSource, HttpSheetFetcher, SheetFetcher};
pub use error::{Error, Result};
pub use index::{CardNameCache, IndexSnapshot, NameIndex};
pub use leak::LeakGuard;
pub use master::{BundleFetcher, BundleVersion, HttpBundleFetcher, Level, MasterDataStore};
pub use model::{
    current_ranked_season, Card, Character, Chart, Difficulty, Event, EventTiming, EventType,
    RankedSeason, Song,
};
pub use profile::{Profile, ProfileCache, ProfileFetcher};
pub use region::Region;
pub use registry::Registry;
pub use service::PjskService;
pub use session::{HttpTransport, PayloadCipher, SecureSession, TransferCredential, Transport};
pub use storage::SnapshotFile;
pub use tasks::{BackgroundRefresher, RefreshStatus};
