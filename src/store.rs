//! Durable Pokédex store backed by SQLite.
//!
//! A single worker thread owns the connection; every [`Pokedex`] handle sends
//! requests over a channel and awaits the reply, so all access is serialized.
//! Mutations commit before the reply is sent.

use crate::error::StoreError;
use crate::filter::Filter;
use crate::types::{PokemonRecord, Stats};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::spawn_blocking;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS pokemon(
        id              INTEGER PRIMARY KEY,
        name            TEXT NOT NULL,
        types_json      TEXT NOT NULL,
        hp              INTEGER NOT NULL,
        attack          INTEGER NOT NULL,
        defense         INTEGER NOT NULL,
        special_attack  INTEGER NOT NULL,
        special_defense INTEGER NOT NULL,
        speed           INTEGER NOT NULL,
        sprite_url      TEXT NOT NULL,
        shiny_url       TEXT NOT NULL,
        sprite          BLOB,
        shiny           BLOB,
        moves_json      TEXT NOT NULL DEFAULT '[]',
        favorite        INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_pokemon_favorite ON pokemon(favorite) WHERE favorite = 1;
"#;

const COLUMNS: &str = "id, name, types_json, hp, attack, defense, special_attack, \
     special_defense, speed, sprite_url, shiny_url, sprite, shiny, moves_json, favorite";

/// Result of [`Pokedex::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The id already existed; catalog fields were refreshed while favorite
    /// and downloaded images were kept.
    Updated,
}

type Reply<T> = oneshot::Sender<Result<T, StoreError>>;

enum StoreMsg {
    Insert {
        record: PokemonRecord,
        resp: Reply<InsertOutcome>,
    },
    Update {
        record: PokemonRecord,
        resp: Reply<()>,
    },
    AttachImages {
        id: u32,
        sprite: Option<Vec<u8>>,
        shiny: Option<Vec<u8>>,
        resp: Reply<()>,
    },
    SetFavorite {
        id: u32,
        favorite: bool,
        resp: Reply<()>,
    },
    ToggleFavorite {
        id: u32,
        resp: Reply<bool>,
    },
    Get {
        id: u32,
        resp: Reply<Option<PokemonRecord>>,
    },
    Scan {
        resp: Reply<Vec<PokemonRecord>>,
    },
    Ids {
        resp: Reply<Vec<u32>>,
    },
    Count {
        resp: Reply<u32>,
    },
    NextIdAfter {
        id: u32,
        resp: Reply<Option<u32>>,
    },
}

#[derive(Clone)]
pub struct Pokedex {
    tx: UnboundedSender<StoreMsg>,
    read_only: bool,
}

impl Pokedex {
    /// Open (creating if needed) the store file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        // WAL lets a read-only snapshot reader in another process see committed rows
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::debug!("[store] journal_mode={mode}");
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.busy_timeout(Duration::from_millis(250))?;
        conn.execute_batch(SCHEMA)?;
        log::info!("[store] opened {}", path.display());
        Ok(Self::spawn(conn, false))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::spawn(conn, false))
    }

    /// Open an existing store for reading only. Mutations fail with
    /// [`StoreError::ReadOnly`].
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_millis(250))?;
        Ok(Self::spawn(conn, true))
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn spawn(conn: Connection, read_only: bool) -> Self {
        let (tx, mut rx) = unbounded_channel::<StoreMsg>();

        tokio::spawn(async move {
            // single worker connection off the async threads
            let res = spawn_blocking(move || {
                while let Some(msg) = rx.blocking_recv() {
                    handle(&conn, read_only, msg);
                }
            })
            .await;
            if let Err(e) = res {
                log::error!("[store] worker stopped: {e}");
            }
        });

        Self { tx, read_only }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> StoreMsg,
    ) -> Result<T, StoreError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(make(resp_tx))
            .map_err(|_| StoreError::Closed)?;
        resp_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Insert a record, or refresh the catalog fields of an existing one.
    pub async fn insert(&self, record: PokemonRecord) -> Result<InsertOutcome, StoreError> {
        self.request(|resp| StoreMsg::Insert { record, resp }).await
    }

    /// Persist every field of an already stored record.
    pub async fn update(&self, record: PokemonRecord) -> Result<(), StoreError> {
        self.request(|resp| StoreMsg::Update { record, resp }).await
    }

    /// Store whichever images are given; `None` leaves the stored value alone.
    pub async fn attach_images(
        &self,
        id: u32,
        sprite: Option<Vec<u8>>,
        shiny: Option<Vec<u8>>,
    ) -> Result<(), StoreError> {
        self.request(|resp| StoreMsg::AttachImages {
            id,
            sprite,
            shiny,
            resp,
        })
        .await
    }

    pub async fn set_favorite(&self, id: u32, favorite: bool) -> Result<(), StoreError> {
        self.request(|resp| StoreMsg::SetFavorite { id, favorite, resp })
            .await
    }

    /// Flip the favorite flag and return the new value.
    pub async fn toggle_favorite(&self, id: u32) -> Result<bool, StoreError> {
        self.request(|resp| StoreMsg::ToggleFavorite { id, resp }).await
    }

    pub async fn get(&self, id: u32) -> Result<Option<PokemonRecord>, StoreError> {
        self.request(|resp| StoreMsg::Get { id, resp }).await
    }

    /// All records, ascending by id.
    pub async fn scan(&self) -> Result<Vec<PokemonRecord>, StoreError> {
        self.request(|resp| StoreMsg::Scan { resp }).await
    }

    /// Records matching `filter`, ascending by id.
    pub async fn query(&self, filter: &Filter) -> Result<Vec<PokemonRecord>, StoreError> {
        let all = self.scan().await?;
        Ok(all.into_iter().filter(|r| filter.matches(r)).collect())
    }

    pub async fn ids(&self) -> Result<Vec<u32>, StoreError> {
        self.request(|resp| StoreMsg::Ids { resp }).await
    }

    pub async fn count(&self) -> Result<u32, StoreError> {
        self.request(|resp| StoreMsg::Count { resp }).await
    }

    /// Smallest stored id strictly greater than `id`.
    pub async fn next_id_after(&self, id: u32) -> Result<Option<u32>, StoreError> {
        self.request(|resp| StoreMsg::NextIdAfter { id, resp }).await
    }

    /// Smallest id in `1..ceiling` that is not stored yet.
    pub async fn next_missing_id(&self, ceiling: u32) -> Result<Option<u32>, StoreError> {
        let ids = self.ids().await?;
        Ok(first_gap(&ids, ceiling))
    }
}

fn first_gap(sorted_ids: &[u32], ceiling: u32) -> Option<u32> {
    let mut expected = 1u32;
    for &id in sorted_ids {
        if id > expected {
            break;
        }
        if id == expected {
            expected += 1;
        }
    }
    (expected < ceiling).then_some(expected)
}

fn handle(conn: &Connection, read_only: bool, msg: StoreMsg) {
    // a dropped receiver only means the caller stopped waiting
    match msg {
        StoreMsg::Insert { record, resp } => {
            let _ = resp.send(guard(read_only).and_then(|_| insert_db(conn, &record)));
        }
        StoreMsg::Update { record, resp } => {
            let _ = resp.send(guard(read_only).and_then(|_| update_db(conn, &record)));
        }
        StoreMsg::AttachImages {
            id,
            sprite,
            shiny,
            resp,
        } => {
            let _ = resp.send(
                guard(read_only).and_then(|_| attach_images_db(conn, id, sprite, shiny)),
            );
        }
        StoreMsg::SetFavorite { id, favorite, resp } => {
            let _ = resp.send(guard(read_only).and_then(|_| set_favorite_db(conn, id, favorite)));
        }
        StoreMsg::ToggleFavorite { id, resp } => {
            let _ = resp.send(guard(read_only).and_then(|_| toggle_favorite_db(conn, id)));
        }
        StoreMsg::Get { id, resp } => {
            let _ = resp.send(get_db(conn, id));
        }
        StoreMsg::Scan { resp } => {
            let _ = resp.send(scan_db(conn));
        }
        StoreMsg::Ids { resp } => {
            let _ = resp.send(ids_db(conn));
        }
        StoreMsg::Count { resp } => {
            let _ = resp.send(count_db(conn));
        }
        StoreMsg::NextIdAfter { id, resp } => {
            let _ = resp.send(next_id_after_db(conn, id));
        }
    }
}

fn guard(read_only: bool) -> Result<(), StoreError> {
    if read_only {
        Err(StoreError::ReadOnly)
    } else {
        Ok(())
    }
}

fn insert_db(conn: &Connection, r: &PokemonRecord) -> Result<InsertOutcome, StoreError> {
    let types_json = to_json(r.id, &r.types)?;
    let moves_json = to_json(r.id, &r.moves)?;
    let s = r.stats;

    let tx = conn.unchecked_transaction()?;
    let exists = tx
        .query_row("SELECT 1 FROM pokemon WHERE id = ?", params![r.id], |_| Ok(()))
        .optional()?
        .is_some();
    tx.execute(
        "INSERT INTO pokemon(id, name, types_json, hp, attack, defense, special_attack,
                             special_defense, speed, sprite_url, shiny_url, sprite, shiny,
                             moves_json, favorite)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             types_json = excluded.types_json,
             hp = excluded.hp,
             attack = excluded.attack,
             defense = excluded.defense,
             special_attack = excluded.special_attack,
             special_defense = excluded.special_defense,
             speed = excluded.speed,
             sprite_url = excluded.sprite_url,
             shiny_url = excluded.shiny_url,
             sprite = COALESCE(pokemon.sprite, excluded.sprite),
             shiny = COALESCE(pokemon.shiny, excluded.shiny),
             moves_json = excluded.moves_json",
        params![
            r.id,
            r.name,
            types_json,
            s.hp,
            s.attack,
            s.defense,
            s.special_attack,
            s.special_defense,
            s.speed,
            r.sprite_url,
            r.shiny_url,
            r.sprite,
            r.shiny,
            moves_json,
            r.favorite,
        ],
    )?;
    tx.commit()?;

    Ok(if exists {
        InsertOutcome::Updated
    } else {
        InsertOutcome::Inserted
    })
}

fn update_db(conn: &Connection, r: &PokemonRecord) -> Result<(), StoreError> {
    let types_json = to_json(r.id, &r.types)?;
    let moves_json = to_json(r.id, &r.moves)?;
    let s = r.stats;
    let changed = conn.execute(
        "UPDATE pokemon SET name = ?2, types_json = ?3, hp = ?4, attack = ?5, defense = ?6,
             special_attack = ?7, special_defense = ?8, speed = ?9, sprite_url = ?10,
             shiny_url = ?11, sprite = ?12, shiny = ?13, moves_json = ?14, favorite = ?15
         WHERE id = ?1",
        params![
            r.id,
            r.name,
            types_json,
            s.hp,
            s.attack,
            s.defense,
            s.special_attack,
            s.special_defense,
            s.speed,
            r.sprite_url,
            r.shiny_url,
            r.sprite,
            r.shiny,
            moves_json,
            r.favorite,
        ],
    )?;
    found(changed, r.id)
}

fn attach_images_db(
    conn: &Connection,
    id: u32,
    sprite: Option<Vec<u8>>,
    shiny: Option<Vec<u8>>,
) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE pokemon SET sprite = COALESCE(?2, sprite), shiny = COALESCE(?3, shiny)
         WHERE id = ?1",
        params![id, sprite, shiny],
    )?;
    found(changed, id)
}

fn set_favorite_db(conn: &Connection, id: u32, favorite: bool) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE pokemon SET favorite = ?2 WHERE id = ?1",
        params![id, favorite],
    )?;
    found(changed, id)
}

fn toggle_favorite_db(conn: &Connection, id: u32) -> Result<bool, StoreError> {
    let tx = conn.unchecked_transaction()?;
    let current: Option<bool> = tx
        .query_row(
            "SELECT favorite FROM pokemon WHERE id = ?",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(current) = current else {
        return Err(StoreError::NotFound(id));
    };
    tx.execute(
        "UPDATE pokemon SET favorite = ?2 WHERE id = ?1",
        params![id, !current],
    )?;
    tx.commit()?;
    Ok(!current)
}

fn get_db(conn: &Connection, id: u32) -> Result<Option<PokemonRecord>, StoreError> {
    let mut stmt = conn.prepare_cached(&format!("SELECT {COLUMNS} FROM pokemon WHERE id = ?"))?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_record(row)?)),
        None => Ok(None),
    }
}

fn scan_db(conn: &Connection) -> Result<Vec<PokemonRecord>, StoreError> {
    let mut stmt = conn.prepare_cached(&format!("SELECT {COLUMNS} FROM pokemon ORDER BY id"))?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(row_to_record(row)?);
    }
    Ok(out)
}

fn ids_db(conn: &Connection) -> Result<Vec<u32>, StoreError> {
    let mut stmt = conn.prepare_cached("SELECT id FROM pokemon ORDER BY id")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<u32>, _>>()?;
    Ok(ids)
}

fn count_db(conn: &Connection) -> Result<u32, StoreError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM pokemon", [], |row| row.get(0))?)
}

fn next_id_after_db(conn: &Connection, id: u32) -> Result<Option<u32>, StoreError> {
    Ok(conn.query_row(
        "SELECT MIN(id) FROM pokemon WHERE id > ?",
        params![id],
        |row| row.get(0),
    )?)
}

fn row_to_record(row: &Row<'_>) -> Result<PokemonRecord, StoreError> {
    let id: u32 = row.get(0)?;
    let types_json: String = row.get(2)?;
    let moves_json: String = row.get(13)?;
    Ok(PokemonRecord {
        id,
        name: row.get(1)?,
        types: from_json(id, &types_json)?,
        stats: Stats {
            hp: row.get(3)?,
            attack: row.get(4)?,
            defense: row.get(5)?,
            special_attack: row.get(6)?,
            special_defense: row.get(7)?,
            speed: row.get(8)?,
        },
        sprite_url: row.get(9)?,
        shiny_url: row.get(10)?,
        sprite: row.get(11)?,
        shiny: row.get(12)?,
        moves: from_json(id, &moves_json)?,
        favorite: row.get(14)?,
    })
}

fn found(changed: usize, id: u32) -> Result<(), StoreError> {
    if changed == 0 {
        Err(StoreError::NotFound(id))
    } else {
        Ok(())
    }
}

fn to_json(id: u32, list: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(list).map_err(|e| StoreError::Corrupt {
        id,
        reason: e.to_string(),
    })
}

fn from_json(id: u32, s: &str) -> Result<Vec<String>, StoreError> {
    serde_json::from_str(s).map_err(|e| StoreError::Corrupt {
        id,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PokemonType;
    use crate::types::TypeFilter;

    fn record(id: u32, name: &str, types: &[&str]) -> PokemonRecord {
        PokemonRecord {
            id,
            name: name.to_string(),
            types: types.iter().map(|t| t.to_string()).collect(),
            stats: Stats::from_array([10, 20, 30, 40, 50, 60]),
            sprite_url: format!("https://img.example/{id}.png"),
            shiny_url: format!("https://img.example/shiny/{id}.png"),
            sprite: None,
            shiny: None,
            moves: vec!["tackle".into()],
            favorite: false,
        }
    }

    #[tokio::test]
    async fn insert_then_scan_yields_record_once() {
        let store = Pokedex::open_in_memory().unwrap();
        let rec = record(1, "bulbasaur", &["grass", "poison"]);
        assert_eq!(store.insert(rec.clone()).await.unwrap(), InsertOutcome::Inserted);

        let all = store.scan().await.unwrap();
        assert_eq!(all, vec![rec]);
    }

    #[tokio::test]
    async fn reinsert_upserts_without_duplicating() {
        let store = Pokedex::open_in_memory().unwrap();
        store.insert(record(1, "bulbasaur", &["grass"])).await.unwrap();
        store.set_favorite(1, true).await.unwrap();
        store
            .attach_images(1, Some(vec![1, 2, 3]), Some(vec![4, 5]))
            .await
            .unwrap();

        let outcome = store
            .insert(record(1, "bulbasaur-refreshed", &["grass", "poison"]))
            .await
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Updated);
        assert_eq!(store.count().await.unwrap(), 1);

        let got = store.get(1).await.unwrap().unwrap();
        assert_eq!(got.name, "bulbasaur-refreshed");
        assert_eq!(got.types, vec!["grass", "poison"]);
        assert!(got.favorite);
        assert_eq!(got.sprite.as_deref(), Some(&[1u8, 2, 3][..]));
        assert_eq!(got.shiny.as_deref(), Some(&[4u8, 5][..]));
    }

    #[tokio::test]
    async fn scan_is_ordered_by_id() {
        let store = Pokedex::open_in_memory().unwrap();
        for id in [7, 3, 151, 1] {
            store.insert(record(id, "x", &["water"])).await.unwrap();
        }
        let ids: Vec<u32> = store.scan().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3, 7, 151]);
        assert_eq!(store.ids().await.unwrap(), ids);
    }

    #[tokio::test]
    async fn update_requires_existing_record() {
        let store = Pokedex::open_in_memory().unwrap();
        let mut rec = record(4, "charmander", &["fire"]);
        assert!(matches!(
            store.update(rec.clone()).await,
            Err(StoreError::NotFound(4))
        ));

        store.insert(rec.clone()).await.unwrap();
        rec.favorite = true;
        rec.sprite = Some(vec![9]);
        store.update(rec.clone()).await.unwrap();
        assert_eq!(store.get(4).await.unwrap(), Some(rec));
    }

    #[tokio::test]
    async fn attach_images_keeps_missing_side() {
        let store = Pokedex::open_in_memory().unwrap();
        store.insert(record(25, "pikachu", &["electric"])).await.unwrap();
        store.attach_images(25, Some(vec![1]), None).await.unwrap();
        store.attach_images(25, None, Some(vec![2])).await.unwrap();
        let got = store.get(25).await.unwrap().unwrap();
        assert_eq!(got.sprite, Some(vec![1]));
        assert_eq!(got.shiny, Some(vec![2]));

        assert!(matches!(
            store.attach_images(26, Some(vec![1]), None).await,
            Err(StoreError::NotFound(26))
        ));
    }

    #[tokio::test]
    async fn toggle_favorite_flips() {
        let store = Pokedex::open_in_memory().unwrap();
        store.insert(record(1, "bulbasaur", &["grass"])).await.unwrap();
        assert!(store.toggle_favorite(1).await.unwrap());
        assert!(!store.toggle_favorite(1).await.unwrap());
        assert!(matches!(
            store.toggle_favorite(2).await,
            Err(StoreError::NotFound(2))
        ));
    }

    #[tokio::test]
    async fn cursor_helpers() {
        let store = Pokedex::open_in_memory().unwrap();
        for id in [1, 2, 3, 5, 8] {
            store.insert(record(id, "x", &["rock"])).await.unwrap();
        }
        assert_eq!(store.next_id_after(0).await.unwrap(), Some(1));
        assert_eq!(store.next_id_after(3).await.unwrap(), Some(5));
        assert_eq!(store.next_id_after(8).await.unwrap(), None);
        assert_eq!(store.next_missing_id(152).await.unwrap(), Some(4));
    }

    #[test]
    fn first_gap_bounds() {
        assert_eq!(first_gap(&[], 152), Some(1));
        assert_eq!(first_gap(&[1, 2, 3], 4), None);
        assert_eq!(first_gap(&[2, 3], 152), Some(1));
        let full: Vec<u32> = (1..=151).collect();
        assert_eq!(first_gap(&full, 152), None);
    }

    #[tokio::test]
    async fn query_applies_filter_in_id_order() {
        let store = Pokedex::open_in_memory().unwrap();
        store.insert(record(6, "charizard", &["fire", "flying"])).await.unwrap();
        store.insert(record(4, "charmander", &["fire"])).await.unwrap();
        store.insert(record(7, "squirtle", &["water"])).await.unwrap();

        let filter = Filter {
            search: "char".into(),
            favorites_only: false,
            kind: TypeFilter::Only(PokemonType::Fire),
        };
        let ids: Vec<u32> = store.query(&filter).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 6]);
    }

    #[tokio::test]
    async fn file_store_survives_reopen_and_read_only_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dex.db");
        {
            let store = Pokedex::open(&path).unwrap();
            store.insert(record(1, "bulbasaur", &["grass"])).await.unwrap();
            store.set_favorite(1, true).await.unwrap();
        }

        let reader = Pokedex::open_read_only(&path).unwrap();
        assert!(reader.is_read_only());
        let got = reader.get(1).await.unwrap().unwrap();
        assert!(got.favorite);
        assert!(matches!(
            reader.set_favorite(1, false).await,
            Err(StoreError::ReadOnly)
        ));

        let writer = Pokedex::open(&path).unwrap();
        assert_eq!(writer.count().await.unwrap(), 1);
    }
}
