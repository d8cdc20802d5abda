//! Resolve free text against the name index.

use anyhow::{bail, Result};
use pjsk_core::PjskService;

pub async fn run(service: &PjskService, query: &str, kind: &str) -> Result<()> {
    service.refresh(false).await?;

    match kind {
        "song" => match service.resolve_song(query) {
            Some(song) => {
                println!("#{}  {}", song.id, song.title);
                for (region, title) in &song.titles {
                    println!("  {}: {}", region, title);
                }
                for (difficulty, chart) in &song.charts {
                    println!(
                        "  {}: level {} ({} notes)",
                        difficulty,
                        chart.level.effective(),
                        chart.note_count
                    );
                }
                if let Some((fully_leaked, regions)) = service.music_regions(song.id) {
                    if fully_leaked {
                        println!("  not released anywhere yet");
                    } else {
                        let codes: Vec<&str> = regions.iter().map(|r| r.code()).collect();
                        println!("  available: {}", codes.join(", "));
                    }
                }
            }
            None => bail!("no song matched {:?}", query),
        },
        "character" => match service.resolve_character(query) {
            Some(character) => {
                println!("#{}  {}", character.id, character.name);
                if let Some(unit) = &character.unit {
                    println!("  unit: {}", unit);
                }
            }
            None => bail!("no character matched {:?}", query),
        },
        "event" => match service.resolve_event(query) {
            Some(event) => {
                println!("#{}  {} ({})", event.id, event.name, event.short_code());
                for (region, timing) in &event.timings {
                    println!("  {}: {} .. {}", region, timing.start_at, timing.closed_at);
                }
            }
            None => bail!("no event matched {:?}", query),
        },
        "card" => match service.lookup_card(query) {
            Some(card) => {
                let name = service
                    .card_display_name(card.id)
                    .unwrap_or_else(|| card.title.clone());
                println!("#{}  {}", card.id, name);
            }
            None => bail!("no card matched {:?}", query),
        },
        other => bail!("unknown kind {:?} (song, character, event, card)", other),
    }
    Ok(())
}
