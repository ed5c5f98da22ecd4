//! Records, type names and sync state shared across the crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of Pokémon in the original Pokédex.
pub const POKEDEX_SIZE: u32 = 151;

/// Exclusive upper bound for the record phase of a sync run.
pub const DEFAULT_CEILING: u32 = POKEDEX_SIZE + 1;

/// The six base stats, in the order the API lists them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub hp: u32,
    pub attack: u32,
    pub defense: u32,
    pub special_attack: u32,
    pub special_defense: u32,
    pub speed: u32,
}

impl Stats {
    pub fn from_array(v: [u32; 6]) -> Self {
        Self {
            hp: v[0],
            attack: v[1],
            defense: v[2],
            special_attack: v[3],
            special_defense: v[4],
            speed: v[5],
        }
    }

    pub fn as_array(&self) -> [u32; 6] {
        [
            self.hp,
            self.attack,
            self.defense,
            self.special_attack,
            self.special_defense,
            self.speed,
        ]
    }
}

/// One persisted Pokémon.
///
/// `sprite` and `shiny` are filled in after the record is first stored and
/// may be present independently of each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokemonRecord {
    pub id: u32,
    pub name: String,
    pub types: Vec<String>,
    pub stats: Stats,
    pub sprite_url: String,
    pub shiny_url: String,
    #[serde(skip)]
    pub sprite: Option<Vec<u8>>,
    #[serde(skip)]
    pub shiny: Option<Vec<u8>>,
    #[serde(default)]
    pub moves: Vec<String>,
    #[serde(default)]
    pub favorite: bool,
}

impl PokemonRecord {
    pub fn has_all_images(&self) -> bool {
        self.sprite.is_some() && self.shiny.is_some()
    }

    pub fn primary_type(&self) -> Option<&str> {
        self.types.first().map(String::as_str)
    }
}

/// Elemental types a record can be filtered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PokemonType {
    Bug,
    Dragon,
    Electric,
    Fairy,
    Fighting,
    Fire,
    Flying,
    Ghost,
    Grass,
    Ground,
    Ice,
    Normal,
    Poison,
    Psychic,
    Rock,
    Steel,
    Water,
}

impl PokemonType {
    pub const ALL: [PokemonType; 17] = [
        PokemonType::Bug,
        PokemonType::Dragon,
        PokemonType::Electric,
        PokemonType::Fairy,
        PokemonType::Fighting,
        PokemonType::Fire,
        PokemonType::Flying,
        PokemonType::Ghost,
        PokemonType::Grass,
        PokemonType::Ground,
        PokemonType::Ice,
        PokemonType::Normal,
        PokemonType::Poison,
        PokemonType::Psychic,
        PokemonType::Rock,
        PokemonType::Steel,
        PokemonType::Water,
    ];

    /// Lowercase label as the API spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            PokemonType::Bug => "bug",
            PokemonType::Dragon => "dragon",
            PokemonType::Electric => "electric",
            PokemonType::Fairy => "fairy",
            PokemonType::Fighting => "fighting",
            PokemonType::Fire => "fire",
            PokemonType::Flying => "flying",
            PokemonType::Ghost => "ghost",
            PokemonType::Grass => "grass",
            PokemonType::Ground => "ground",
            PokemonType::Ice => "ice",
            PokemonType::Normal => "normal",
            PokemonType::Poison => "poison",
            PokemonType::Psychic => "psychic",
            PokemonType::Rock => "rock",
            PokemonType::Steel => "steel",
            PokemonType::Water => "water",
        }
    }
}

impl std::str::FromStr for PokemonType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        PokemonType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| format!("unknown type '{s}'"))
    }
}

impl fmt::Display for PokemonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type selector: a concrete type or the `all` wildcard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TypeFilter {
    #[default]
    All,
    Only(PokemonType),
}

impl std::str::FromStr for TypeFilter {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(TypeFilter::All)
        } else {
            s.parse().map(TypeFilter::Only)
        }
    }
}

impl fmt::Display for TypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeFilter::All => f.write_str("all"),
            TypeFilter::Only(t) => write!(f, "{t}"),
        }
    }
}

/// Phase of a sync run. Ordering follows execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Records,
    Images,
}

/// Progress of a sync run, compared by `(phase, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Progress {
    pub phase: Phase,
    pub id: u32,
}

impl Progress {
    pub const START: Progress = Progress {
        phase: Phase::Records,
        id: 0,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    FetchingRecords(u32),
    FetchingImages(u32),
    Failed(String),
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Idle | SyncState::Failed(_))
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Idle => f.write_str("idle"),
            SyncState::FetchingRecords(id) => write!(f, "fetching record #{id}"),
            SyncState::FetchingImages(id) => write!(f, "fetching images for #{id}"),
            SyncState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Notifications emitted by a sync run for display collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    StateChanged(SyncState),
    RecordStored { id: u32, name: String },
    RecordFailed { id: u32, error: String },
    ImagesStored { id: u32, sprite: bool, shiny: bool },
    ImageFailed { id: u32, which: ImageKind, error: String },
    Finished(SyncSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Sprite,
    Shiny,
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageKind::Sprite => f.write_str("sprite"),
            ImageKind::Shiny => f.write_str("shiny"),
        }
    }
}

/// Counters accumulated over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub records_stored: u32,
    pub records_failed: u32,
    pub images_stored: u32,
    pub images_failed: u32,
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_array_order_is_stable() {
        let s = Stats::from_array([45, 49, 49, 65, 65, 45]);
        assert_eq!(s.hp, 45);
        assert_eq!(s.special_attack, 65);
        assert_eq!(s.as_array(), [45, 49, 49, 65, 65, 45]);
    }

    #[test]
    fn type_filter_parsing() {
        assert_eq!("all".parse::<TypeFilter>().unwrap(), TypeFilter::All);
        assert_eq!(
            "Fire".parse::<TypeFilter>().unwrap(),
            TypeFilter::Only(PokemonType::Fire)
        );
        assert!("dark".parse::<TypeFilter>().is_err());
    }

    #[test]
    fn progress_orders_by_phase_then_id() {
        let late_record = Progress { phase: Phase::Records, id: 151 };
        let first_image = Progress { phase: Phase::Images, id: 1 };
        assert!(Progress::START < late_record);
        assert!(late_record < first_image);
    }
}
