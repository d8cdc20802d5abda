//! Current-event lookup.

use anyhow::Result;
use chrono::DateTime;
use pjsk_core::PjskService;

pub async fn run(service: &PjskService, region: &str) -> Result<()> {
    let api = service.api(region)?;
    match api.get_current_event().await? {
        Some(event) => {
            println!("#{}  {} ({:?})", event.id, event.name, event.event_type);
            if let Some(timing) = event.timings.get(&api.region()) {
                let closes = DateTime::from_timestamp_millis(timing.closed_at)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| timing.closed_at.to_string());
                println!("  closes: {}", closes);
            }
        }
        None => println!("no event running on {}", region),
    }
    Ok(())
}
