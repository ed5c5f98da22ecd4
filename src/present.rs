//! Display formatting for records. Nothing here touches the store or the
//! network; the CLI and the snapshot reader map records through it.

use crate::types::PokemonRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatLine {
    pub label: &'static str,
    pub value: u32,
}

const STAT_LABELS: [&str; 6] = [
    "HP",
    "Attack",
    "Defense",
    "Special Attack",
    "Special Defense",
    "Speed",
];

/// Widest stat bar in [`detail`], reached only by the highest stat.
const BAR_WIDTH: u64 = 30;

/// Backdrop artwork family, chosen from the primary type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Background {
    RockGroundSteelFightingGhostDarkPsychic,
    FireDragon,
    FlyingBug,
    Ice,
    Water,
    NormalGrassElectricPoisonFairy,
}

impl Background {
    pub fn asset_name(&self) -> &'static str {
        match self {
            Background::RockGroundSteelFightingGhostDarkPsychic => {
                "rockgroundsteelfightingghostdarkpsychic"
            }
            Background::FireDragon => "firedragon",
            Background::FlyingBug => "flyingbug",
            Background::Ice => "ice",
            Background::Water => "water",
            Background::NormalGrassElectricPoisonFairy => "normalgrasselectricpoisonfairy",
        }
    }
}

pub fn background(rec: &PokemonRecord) -> Background {
    match rec.primary_type().unwrap_or_default() {
        "rock" | "ground" | "steel" | "fighting" | "ghost" | "dark" | "psychic" => {
            Background::RockGroundSteelFightingGhostDarkPsychic
        }
        "fire" | "dragon" => Background::FireDragon,
        "flying" | "bug" => Background::FlyingBug,
        "ice" => Background::Ice,
        "water" => Background::Water,
        _ => Background::NormalGrassElectricPoisonFairy,
    }
}

/// "mr-mime" -> "Mr-Mime", "bulbasaur" -> "Bulbasaur".
pub fn capitalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        at_word_start = !c.is_alphanumeric();
    }
    out
}

pub fn display_name(rec: &PokemonRecord) -> String {
    capitalize(&rec.name)
}

/// Colour asset name for the primary type ("Fire", "Water", ..., "Gray").
pub fn type_color(rec: &PokemonRecord) -> String {
    rec.primary_type()
        .map(capitalize)
        .unwrap_or_else(|| "Gray".to_string())
}

pub fn stat_lines(rec: &PokemonRecord) -> Vec<StatLine> {
    STAT_LABELS
        .into_iter()
        .zip(rec.stats.as_array())
        .map(|(label, value)| StatLine { label, value })
        .collect()
}

/// Highest stat; the first one listed wins a tie.
pub fn highest_stat(rec: &PokemonRecord) -> StatLine {
    stat_lines(rec)
        .into_iter()
        .reduce(|best, s| if s.value > best.value { s } else { best })
        .unwrap_or(StatLine {
            label: STAT_LABELS[0],
            value: 0,
        })
}

/// One-line list row: `#025 Pikachu [electric] *`.
pub fn list_row(rec: &PokemonRecord) -> String {
    let star = if rec.favorite { " *" } else { "" };
    format!(
        "#{:03} {:<12} [{}]{}",
        rec.id,
        display_name(rec),
        rec.types.join("/"),
        star
    )
}

/// Multi-line detail view with a text bar per stat.
pub fn detail(rec: &PokemonRecord) -> String {
    let mut out = format!("#{:03} {}", rec.id, display_name(rec));
    if rec.favorite {
        out.push_str(" (favorite)");
    }
    out.push('\n');
    let types: Vec<String> = rec.types.iter().map(|t| capitalize(t)).collect();
    out.push_str(&format!("Types: {}\n", types.join(", ")));

    let scale = u64::from(highest_stat(rec).value.max(1)) + 20;
    for line in stat_lines(rec) {
        let width = (u64::from(line.value) * BAR_WIDTH / scale) as usize;
        out.push_str(&format!(
            "{:>15} {:>3} {}\n",
            line.label,
            line.value,
            "#".repeat(width)
        ));
    }
    if !rec.moves.is_empty() {
        let moves: Vec<String> = rec.moves.iter().map(|m| capitalize(m)).collect();
        out.push_str(&format!("Moves: {}\n", moves.join(", ")));
    }
    out.push_str(&format!(
        "Sprite: {} ({})\n",
        rec.sprite_url,
        image_status(rec.sprite.as_deref())
    ));
    out.push_str(&format!(
        "Shiny:  {} ({})\n",
        rec.shiny_url,
        image_status(rec.shiny.as_deref())
    ));
    out
}

fn image_status(bytes: Option<&[u8]>) -> String {
    match bytes {
        Some(b) => format!("{} bytes cached", b.len()),
        None => "not downloaded".to_string(),
    }
}
