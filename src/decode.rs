//! Turns a PokeAPI `/pokemon/{id}` document into a flat [`PokemonRecord`].
//!
//! The payload nests every interesting value one or two levels deep:
//! `types[].type.name`, `stats[].base_stat`, `sprites.front_default`.
//! The wire structs below mirror that shape and are flattened by
//! [`decode_value`].

use crate::error::DecodeError;
use crate::types::{PokemonRecord, Stats};
use serde::Deserialize;

/// Number of moves kept from the payload's move list.
pub const MAX_MOVES: usize = 4;

#[derive(Debug, Deserialize)]
struct WirePokemon {
    id: u32,
    name: String,
    types: Vec<WireTypeSlot>,
    stats: Vec<WireStat>,
    sprites: WireSprites,
    #[serde(default)]
    moves: Vec<WireMoveSlot>,
}

#[derive(Debug, Deserialize)]
struct WireTypeSlot {
    #[serde(rename = "type")]
    kind: WireNamed,
}

#[derive(Debug, Deserialize)]
struct WireNamed {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireStat {
    base_stat: u32,
}

#[derive(Debug, Deserialize)]
struct WireSprites {
    front_default: Option<String>,
    front_shiny: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMoveSlot {
    #[serde(rename = "move")]
    mv: WireNamed,
}

pub fn decode_record(bytes: &[u8]) -> Result<PokemonRecord, DecodeError> {
    let wire: WirePokemon = serde_json::from_slice(bytes)?;
    flatten(wire)
}

pub fn decode_value(value: serde_json::Value) -> Result<PokemonRecord, DecodeError> {
    let wire: WirePokemon = serde_json::from_value(value)?;
    flatten(wire)
}

fn flatten(wire: WirePokemon) -> Result<PokemonRecord, DecodeError> {
    let types = order_types(wire.types.into_iter().map(|slot| slot.kind.name).collect());
    if types.is_empty() || types.len() > 2 {
        return Err(DecodeError::TypeCount { found: types.len() });
    }

    if wire.stats.len() < 6 {
        return Err(DecodeError::MissingStats {
            found: wire.stats.len(),
        });
    }
    let mut six = [0u32; 6];
    for (slot, stat) in six.iter_mut().zip(&wire.stats) {
        *slot = stat.base_stat;
    }

    let sprite_url = wire
        .sprites
        .front_default
        .ok_or(DecodeError::MissingSprite("default"))?;
    let shiny_url = wire
        .sprites
        .front_shiny
        .ok_or(DecodeError::MissingSprite("shiny"))?;

    Ok(PokemonRecord {
        id: wire.id,
        name: wire.name,
        types,
        stats: Stats::from_array(six),
        sprite_url,
        shiny_url,
        sprite: None,
        shiny: None,
        moves: wire
            .moves
            .into_iter()
            .take(MAX_MOVES)
            .map(|slot| slot.mv.name)
            .collect(),
        favorite: false,
    })
}

/// The API lists dual normal/flying birds as `[normal, flying]`; keep the
/// more descriptive type first.
pub fn order_types(mut types: Vec<String>) -> Vec<String> {
    if types.len() == 2 && types[0] == "normal" {
        types.swap(0, 1);
    }
    types
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(id: u32, name: &str, types: &[&str], stats: &[u32]) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "types": types.iter().enumerate().map(|(i, t)| json!({
                "slot": i + 1,
                "type": { "name": t, "url": format!("https://pokeapi.co/api/v2/type/{t}/") }
            })).collect::<Vec<_>>(),
            "stats": stats.iter().map(|s| json!({
                "base_stat": s,
                "effort": 0,
                "stat": { "name": "x", "url": "" }
            })).collect::<Vec<_>>(),
            "sprites": {
                "front_default": format!("https://img.example/{id}.png"),
                "front_shiny": format!("https://img.example/shiny/{id}.png"),
                "back_default": null
            },
            "moves": [
                { "move": { "name": "razor-wind" } },
                { "move": { "name": "swords-dance" } },
                { "move": { "name": "cut" } },
                { "move": { "name": "bind" } },
                { "move": { "name": "vine-whip" } }
            ]
        })
    }

    #[test]
    fn decodes_nested_payload() {
        let v = payload(1, "bulbasaur", &["grass", "poison"], &[45, 49, 49, 65, 65, 45]);
        let rec = decode_value(v).unwrap();
        assert_eq!(rec.id, 1);
        assert_eq!(rec.name, "bulbasaur");
        assert_eq!(rec.types, vec!["grass", "poison"]);
        assert_eq!(rec.stats.as_array(), [45, 49, 49, 65, 65, 45]);
        assert_eq!(rec.sprite_url, "https://img.example/1.png");
        assert_eq!(rec.shiny_url, "https://img.example/shiny/1.png");
        assert_eq!(rec.moves.len(), MAX_MOVES);
        assert_eq!(rec.moves[0], "razor-wind");
        assert!(rec.sprite.is_none() && rec.shiny.is_none());
        assert!(!rec.favorite);
    }

    #[test]
    fn stat_order_survives_reencoding() {
        let stats = [35, 55, 40, 50, 50, 90];
        let v = payload(25, "pikachu", &["electric"], &stats);
        let rec = decode_value(v).unwrap();
        let reencoded = serde_json::to_value(rec.stats).unwrap();
        assert_eq!(
            reencoded,
            json!({
                "hp": 35, "attack": 55, "defense": 40,
                "special_attack": 50, "special_defense": 50, "speed": 90
            })
        );
    }

    #[test]
    fn normal_is_moved_to_secondary() {
        let v = payload(16, "pidgey", &["normal", "flying"], &[40, 45, 40, 35, 35, 56]);
        assert_eq!(decode_value(v).unwrap().types, vec!["flying", "normal"]);

        let v = payload(17, "pidgeotto", &["flying", "normal"], &[63, 60, 55, 50, 50, 71]);
        assert_eq!(decode_value(v).unwrap().types, vec!["flying", "normal"]);

        let v = payload(19, "rattata", &["normal"], &[30, 56, 35, 25, 35, 72]);
        assert_eq!(decode_value(v).unwrap().types, vec!["normal"]);
    }

    #[test]
    fn short_stat_list_is_rejected() {
        let v = payload(1, "bulbasaur", &["grass"], &[45, 49, 49, 65, 65]);
        match decode_value(v) {
            Err(DecodeError::MissingStats { found }) => assert_eq!(found, 5),
            other => panic!("expected MissingStats, got {other:?}"),
        }
    }

    #[test]
    fn negative_stat_is_rejected() {
        let mut v = payload(1, "bulbasaur", &["grass"], &[45, 49, 49, 65, 65, 45]);
        v["stats"][2]["base_stat"] = json!(-3);
        assert!(matches!(decode_value(v), Err(DecodeError::Json(_))));
    }

    #[test]
    fn type_count_is_checked() {
        let v = payload(1, "nothing", &[], &[1, 1, 1, 1, 1, 1]);
        assert!(matches!(
            decode_value(v),
            Err(DecodeError::TypeCount { found: 0 })
        ));
    }

    #[test]
    fn missing_shiny_url_is_an_error() {
        let mut v = payload(1, "bulbasaur", &["grass"], &[45, 49, 49, 65, 65, 45]);
        v["sprites"]["front_shiny"] = serde_json::Value::Null;
        assert!(matches!(
            decode_value(v),
            Err(DecodeError::MissingSprite("shiny"))
        ));
    }

    #[test]
    fn moves_are_optional() {
        let mut v = payload(1, "bulbasaur", &["grass"], &[45, 49, 49, 65, 65, 45]);
        v.as_object_mut().unwrap().remove("moves");
        assert!(decode_value(v).unwrap().moves.is_empty());
    }

    #[test]
    fn decode_record_reads_bytes() {
        let v = payload(4, "charmander", &["fire"], &[39, 52, 43, 60, 50, 65]);
        let bytes = serde_json::to_vec(&v).unwrap();
        assert_eq!(decode_record(&bytes).unwrap().name, "charmander");
        assert!(matches!(decode_record(b"{not json"), Err(DecodeError::Json(_))));
    }
}
