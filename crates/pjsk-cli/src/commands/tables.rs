//! Dump master-data tables.

use anyhow::Result;
use pjsk_core::PjskService;

pub async fn run(
    service: &PjskService,
    region: &str,
    table: Option<&str>,
    force: bool,
) -> Result<()> {
    let api = service.api(region)?;

    match table {
        Some(table) => {
            let rows = api.get_master_data(table, force).await?;
            println!("{}", serde_json::to_string_pretty(&*rows)?);
        }
        None => {
            if force {
                api.store().update_master_data(true).await?;
            }
            for name in api.store().table_names().await {
                println!("{}", name);
            }
        }
    }
    Ok(())
}
