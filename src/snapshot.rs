//! Read-only snapshot reader: opens the shared store without write access and
//! picks one random Pokémon for a glanceable display.

use crate::error::StoreError;
use crate::store::Pokedex;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub taken_at: DateTime<Utc>,
    /// `None` for placeholder entries.
    pub id: Option<u32>,
    pub name: String,
    pub types: Vec<String>,
    pub sprite: Option<Vec<u8>>,
}

impl SnapshotEntry {
    pub fn placeholder() -> Self {
        Self {
            taken_at: Utc::now(),
            id: None,
            name: "bulbasaur".into(),
            types: vec!["grass".into(), "poison".into()],
            sprite: None,
        }
    }

    pub fn placeholder_alt() -> Self {
        Self {
            taken_at: Utc::now(),
            id: None,
            name: "mew".into(),
            types: vec!["psychic".into()],
            sprite: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.id.is_none()
    }
}

/// Pick one stored record at random; `Ok(None)` when the store is empty.
pub async fn pick<R: Rng>(store: &Pokedex, rng: &mut R) -> Result<Option<SnapshotEntry>, StoreError> {
    let ids = store.ids().await?;
    let Some(&id) = ids.choose(rng) else {
        return Ok(None);
    };
    Ok(store.get(id).await?.map(|rec| SnapshotEntry {
        taken_at: Utc::now(),
        id: Some(rec.id),
        name: rec.name,
        types: rec.types,
        sprite: rec.sprite,
    }))
}

/// Open `path` read-only and pick an entry, falling back to a placeholder
/// when the store is missing, unreadable or empty.
pub async fn read_snapshot<R: Rng>(path: impl AsRef<Path>, rng: &mut R) -> SnapshotEntry {
    let path = path.as_ref();
    let store = match Pokedex::open_read_only(path) {
        Ok(store) => store,
        Err(e) => {
            log::warn!("[snapshot] cannot open {}: {e}", path.display());
            return SnapshotEntry::placeholder();
        }
    };
    match pick(&store, rng).await {
        Ok(Some(entry)) => entry,
        Ok(None) => {
            log::info!("[snapshot] store is empty, showing placeholder");
            if rng.gen_bool(0.5) {
                SnapshotEntry::placeholder()
            } else {
                SnapshotEntry::placeholder_alt()
            }
        }
        Err(e) => {
            log::warn!("[snapshot] read failed: {e}");
            SnapshotEntry::placeholder()
        }
    }
}
