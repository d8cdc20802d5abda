//! Difficulty-constant lookup.

use anyhow::{bail, Result};
use pjsk_core::PjskService;

pub async fn run(
    service: &PjskService,
    query: &str,
    difficulty: &str,
    ap: bool,
    force_39s: bool,
) -> Result<()> {
    service.refresh(false).await?;

    let Some(difficulty) = service.parse_difficulty(difficulty) else {
        bail!("unknown difficulty {:?}", difficulty);
    };
    let Some(song) = service.resolve_song(query) else {
        bail!("no song matched {:?}", query);
    };

    let (value, source) = service
        .get_constant(song.id, difficulty, ap, force_39s)
        .await?;
    println!(
        "{} [{}]: {:.1} ({})",
        song.title,
        difficulty,
        value,
        source.label()
    );
    Ok(())
}
