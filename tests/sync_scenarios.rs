// End-to-end sync runs against an in-process source serving API-shaped JSON

use async_trait::async_trait;
use dex::decode::decode_record;
use dex::error::FetchError;
use dex::types::{Phase, POKEDEX_SIZE};
use dex::{
    compile_filter, Pokedex, PokedexSource, PokemonRecord, Progress, SyncOptions, SyncSequence,
    SyncState,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct JsonSource {
    failing_ids: HashSet<u32>,
    image_calls: AtomicU32,
}

fn payload(id: u32) -> serde_json::Value {
    json!({
        "id": id,
        "name": format!("mon-{id}"),
        "types": [
            { "slot": 1, "type": { "name": if id % 2 == 0 { "water" } else { "fire" } } }
        ],
        "stats": [
            { "base_stat": 45, "stat": { "name": "hp" } },
            { "base_stat": 49, "stat": { "name": "attack" } },
            { "base_stat": 49, "stat": { "name": "defense" } },
            { "base_stat": 65, "stat": { "name": "special-attack" } },
            { "base_stat": 65, "stat": { "name": "special-defense" } },
            { "base_stat": 45, "stat": { "name": "speed" } }
        ],
        "sprites": {
            "front_default": format!("mem://art/{id}.png"),
            "front_shiny": format!("mem://art/shiny/{id}.png")
        },
        "moves": [ { "move": { "name": "tackle" } } ]
    })
}

#[async_trait]
impl PokedexSource for JsonSource {
    async fn fetch_record(&self, id: u32) -> Result<PokemonRecord, FetchError> {
        if self.failing_ids.contains(&id) {
            return Err(FetchError::Status {
                url: format!("mem://pokemon/{id}"),
                status: 503,
            });
        }
        let body = serde_json::to_vec(&payload(id)).unwrap();
        decode_record(&body).map_err(|source| FetchError::Decode { id, source })
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        Ok(url.as_bytes().to_vec())
    }
}

fn full_run(source: Arc<JsonSource>, store: &Pokedex) -> SyncSequence {
    SyncSequence::new(source, store.clone(), SyncOptions::default())
}

#[tokio::test]
async fn full_sync_stores_every_record_with_artwork() {
    let store = Pokedex::open_in_memory().unwrap();
    let source = Arc::new(JsonSource::default());
    let mut seq = full_run(source.clone(), &store);
    let progress = seq.subscribe();

    let summary = seq.run(1).await;

    assert_eq!(seq.state(), &SyncState::Idle);
    assert_eq!(store.count().await.unwrap(), POKEDEX_SIZE);
    assert_eq!(summary.records_stored, POKEDEX_SIZE);
    assert_eq!(summary.images_stored, POKEDEX_SIZE * 2);
    assert_eq!(source.image_calls.load(Ordering::SeqCst), POKEDEX_SIZE * 2);
    assert_eq!(
        *progress.borrow(),
        Progress {
            phase: Phase::Images,
            id: POKEDEX_SIZE
        }
    );

    let all = store.scan().await.unwrap();
    assert!(all.iter().all(|r| r.has_all_images()));
    let ids: Vec<u32> = all.iter().map(|r| r.id).collect();
    assert_eq!(ids, (1..=POKEDEX_SIZE).collect::<Vec<_>>());
    assert_eq!(store.next_missing_id(152).await.unwrap(), None);
}

#[tokio::test]
async fn one_failed_record_leaves_a_resumable_gap() {
    let store = Pokedex::open_in_memory().unwrap();
    let source = Arc::new(JsonSource {
        failing_ids: [7].into_iter().collect(),
        ..Default::default()
    });
    let summary = full_run(source, &store).run(1).await;

    assert_eq!(summary.records_failed, 1);
    assert_eq!(store.count().await.unwrap(), POKEDEX_SIZE - 1);
    assert!(store.get(7).await.unwrap().is_none());
    assert_eq!(store.next_missing_id(152).await.unwrap(), Some(7));

    // a later run from the gap fills it without re-downloading other artwork
    let retry = Arc::new(JsonSource::default());
    let mut seq = full_run(retry.clone(), &store);
    seq.run(7).await;
    assert_eq!(store.count().await.unwrap(), POKEDEX_SIZE);
    assert_eq!(retry.image_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn resync_keeps_favorites_and_cached_images() {
    let store = Pokedex::open_in_memory().unwrap();
    for id in 1..=100 {
        let mut rec = decode_record(&serde_json::to_vec(&payload(id)).unwrap()).unwrap();
        rec.name = format!("stale-{id}");
        rec.favorite = id % 10 == 0;
        rec.sprite = Some(vec![1, 2, 3]);
        rec.shiny = Some(vec![4, 5, 6]);
        store.insert(rec).await.unwrap();
    }

    let source = Arc::new(JsonSource::default());
    let mut seq = full_run(source.clone(), &store);
    seq.run(1).await;

    assert_eq!(store.count().await.unwrap(), POKEDEX_SIZE);
    // only ids 101..=151 lacked artwork
    assert_eq!(source.image_calls.load(Ordering::SeqCst), 51 * 2);

    let fifty = store.get(50).await.unwrap().unwrap();
    assert_eq!(fifty.name, "mon-50");
    assert!(fifty.favorite);
    assert_eq!(fifty.sprite, Some(vec![1, 2, 3]));
    assert_eq!(fifty.shiny, Some(vec![4, 5, 6]));

    let favorites = store.query(&compile_filter("fav")).await.unwrap();
    assert_eq!(favorites.len(), 10);
    assert!(favorites.iter().all(|r| r.id % 10 == 0));
}

#[tokio::test]
async fn toggled_favorites_feed_the_filter() {
    let store = Pokedex::open_in_memory().unwrap();
    let source = Arc::new(JsonSource::default());
    let mut seq = SyncSequence::new(
        source,
        store.clone(),
        SyncOptions {
            ceiling: 11,
            fetch_images: false,
        },
    );
    seq.run(1).await;
    assert_eq!(store.count().await.unwrap(), 10);

    assert!(store.toggle_favorite(4).await.unwrap());
    assert!(store.toggle_favorite(5).await.unwrap());
    assert!(store.toggle_favorite(6).await.unwrap());
    assert!(!store.toggle_favorite(6).await.unwrap());

    let hits = store.query(&compile_filter("type:water fav")).await.unwrap();
    let ids: Vec<u32> = hits.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![4]);

    let hits = store.query(&compile_filter("fav mon-5")).await.unwrap();
    let ids: Vec<u32> = hits.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![5]);
}
