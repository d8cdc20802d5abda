mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use pjsk_core::{CoreConfig, PjskService};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("pjsk=info".parse()?)
                .add_directive("pjsk_core=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = match CoreConfig::load(&args.config) {
        Ok(c) => {
            info!("Loaded config from {:?}", args.config);
            c
        }
        Err(e) => {
            warn!("Failed to load config: {}, using defaults", e);
            let mut config = CoreConfig::default();
            if let Some(base) = dirs::cache_dir() {
                config.cache_dir = base.join("pjsk");
            }
            config
        }
    };
    if let Some(cache_dir) = args.cache_dir {
        config.cache_dir = cache_dir;
    }

    let service = PjskService::from_config(&config)?;

    match args.command {
        Command::Resolve { query, kind } => {
            commands::resolve::run(&service, &query, &kind).await?;
        }
        Command::Tables {
            region,
            table,
            force,
        } => {
            commands::tables::run(&service, &region, table.as_deref(), force).await?;
        }
        Command::Constant {
            query,
            difficulty,
            ap,
            force_39s,
        } => {
            commands::constant::run(&service, &query, &difficulty, ap, force_39s).await?;
        }
        Command::Profile {
            region,
            user_id,
            force,
        } => {
            commands::profile::run(&service, &region, user_id, force).await?;
        }
        Command::Event { region } => {
            commands::event::run(&service, &region).await?;
        }
        Command::Refresh { force } => {
            service.refresh(force).await?;
            info!("Refresh complete");
        }
    }

    Ok(())
}
