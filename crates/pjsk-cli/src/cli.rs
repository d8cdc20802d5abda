//! CLI argument definitions for pjsk.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pjsk")]
#[command(about = "Project Sekai data service", version)]
pub struct Args {
    /// Path to config file
    #[arg(short, long, default_value = "pjsk.toml")]
    pub config: PathBuf,

    /// Override the cache directory
    #[arg(long, env = "PJSK_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Resolve free text to a song, character, event or card
    Resolve {
        /// Query text (title, name, id or short code)
        query: String,
        /// What to resolve against: song, character, event or card
        #[arg(long, default_value = "song")]
        kind: String,
    },
    /// Dump a master-data table for a region
    Tables {
        /// Region code (en, jp, tw, kr, cn)
        region: String,
        /// Table name (e.g. musics, events); omit to list cached tables
        table: Option<String>,
        /// Force a refresh before dumping
        #[arg(long)]
        force: bool,
    },
    /// Look up a chart's difficulty constant
    Constant {
        /// Song query (title or id)
        query: String,
        /// Difficulty (easy..master, append; loose spellings accepted)
        difficulty: String,
        /// Use the all-perfect baseline
        #[arg(long)]
        ap: bool,
        /// Skip the override sheet and read the primary sheet only
        #[arg(long = "force-39s")]
        force_39s: bool,
    },
    /// Fetch a user profile
    Profile {
        /// Region code
        region: String,
        /// Numeric user id
        user_id: u64,
        /// Bypass the TTL cache
        #[arg(long)]
        force: bool,
    },
    /// Show the event currently running on a region
    Event {
        /// Region code
        region: String,
    },
    /// Refresh master data and derived indexes
    Refresh {
        /// Refresh even when caches are fresh
        #[arg(long)]
        force: bool,
    },
}
