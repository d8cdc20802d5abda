//! User profile fetch.

use anyhow::Result;
use pjsk_core::PjskService;

pub async fn run(service: &PjskService, region: &str, user_id: u64, force: bool) -> Result<()> {
    let api = service.api(region)?;
    let profile = api.get_profile(user_id, force).await?;
    println!("user {} (updated {})", profile.user_id, profile.last_updated);
    println!("{}", serde_json::to_string_pretty(&profile.payload)?);
    Ok(())
}
