//! Dex - a local Pokédex
//!
//! This library fetches the first 151 Pokémon from a PokeAPI-compatible
//! endpoint, keeps them in a SQLite store, and filters them for display.
//!
//! ## Architecture
//!
//! - [`decode`]: nested API JSON to a flat [`PokemonRecord`]
//! - [`api`]: single-attempt HTTP fetches behind the [`PokedexSource`] trait
//! - [`store`]: durable store with one worker owning the connection
//! - [`sync`]: record-then-image sequence as an explicit state machine
//! - [`filter`]: search text + favorites + type selection
//! - [`present`] / [`snapshot`]: formatting and the read-only random pick
//!
//! ## Usage
//!
//! ```bash
//! dex sync            # fetch everything missing
//! dex list --fav      # favorites only
//! dex favorite 25     # toggle Pikachu
//! ```

pub mod api;
pub mod config;
pub mod decode;
pub mod error;
pub mod filter;
pub mod present;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod types;

// Re-export commonly used types
pub use api::{HttpSource, PokedexSource};
pub use config::Config;
pub use error::{DecodeError, FetchError, StoreError};
pub use filter::{compile_filter, Filter};
pub use store::{InsertOutcome, Pokedex};
pub use sync::{CancelToken, SyncOptions, SyncSequence};
pub use types::{PokemonRecord, PokemonType, Progress, Stats, SyncEvent, SyncState, TypeFilter};
