// Command-line front end for the Pokédex store

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use dex::{
    config::{Config, SettingsArgs},
    filter::compile_filter,
    present,
    snapshot,
    types::{SyncEvent, TypeFilter},
    CancelToken, Filter, HttpSource, Pokedex, SyncSequence,
};

/// Dex - local Pokédex
///
/// Fetches Pokémon from PokeAPI into a SQLite store and lists them.
/// Configuration priority: CLI args > Environment variables > Config file > Defaults
#[derive(Parser, Debug)]
#[command(name = "dex")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Local Pokédex", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: SettingsArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch records and artwork into the store
    Sync {
        /// First id to fetch; defaults to the first id not yet stored
        #[arg(long)]
        from: Option<u32>,
    },
    /// List stored Pokémon, optionally filtered
    List {
        /// Query such as "type:fire fav char"
        query: Vec<String>,
        /// Only favorites
        #[arg(long)]
        fav: bool,
        /// Type selector (e.g. fire, water, all)
        #[arg(long = "type", value_parser = clap::value_parser!(TypeFilter))]
        kind: Option<TypeFilter>,
    },
    /// Show one Pokémon in detail
    Show { id: u32 },
    /// Toggle (or set) the favorite flag
    Favorite {
        id: u32,
        /// Set explicitly instead of toggling
        #[arg(long)]
        set: Option<bool>,
    },
    /// Report how complete the store is
    Status,
    /// Print one random stored Pokémon, reading the store read-only
    Snapshot,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (safe to ignore if not found)
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.settings).context("Failed to load configuration")?;

    match cli.command {
        Command::Sync { from } => run_sync(&cfg, from).await,
        Command::List { query, fav, kind } => {
            let mut filter = compile_filter(&query.join(" "));
            filter.favorites_only |= fav;
            if let Some(kind) = kind {
                filter.kind = kind;
            }
            list(&cfg, &filter).await
        }
        Command::Show { id } => {
            let store = open_store(&cfg)?;
            match store.get(id).await? {
                Some(rec) => print!("{}", present::detail(&rec)),
                None => bail!("#{id} is not in the store yet, run `dex sync`"),
            }
            Ok(())
        }
        Command::Favorite { id, set } => {
            let store = open_store(&cfg)?;
            let now = match set {
                Some(value) => {
                    store.set_favorite(id, value).await?;
                    value
                }
                None => store.toggle_favorite(id).await?,
            };
            if let Some(rec) = store.get(id).await? {
                let verb = if now { "added to" } else { "removed from" };
                println!("{} {verb} favorites", present::display_name(&rec));
            }
            Ok(())
        }
        Command::Status => status(&cfg).await,
        Command::Snapshot => {
            let entry = snapshot::read_snapshot(&cfg.db_path, &mut rand::thread_rng()).await;
            let tag = if entry.is_placeholder() { " (placeholder)" } else { "" };
            println!(
                "{}{tag} [{}] at {}",
                present::capitalize(&entry.name),
                entry.types.join("/"),
                entry.taken_at.format("%Y-%m-%d %H:%M")
            );
            Ok(())
        }
    }
}

fn open_store(cfg: &Config) -> Result<Pokedex> {
    Pokedex::open(&cfg.db_path)
        .with_context(|| format!("Failed to open store {}", cfg.db_path.display()))
}

async fn run_sync(cfg: &Config, from: Option<u32>) -> Result<()> {
    cfg.print_summary();
    let store = open_store(cfg)?;
    let from = match from {
        Some(id) => id,
        None => store
            .next_missing_id(cfg.ceiling)
            .await?
            .unwrap_or(cfg.ceiling),
    };

    let source = Arc::new(HttpSource::new(cfg.api_url.clone(), cfg.timeout_ms));
    let (tx, rx) = unbounded_channel::<SyncEvent>();
    let cancel = CancelToken::new();
    let seq = SyncSequence::new(source, store.clone(), cfg.sync_options())
        .with_events(tx)
        .with_cancel(cancel.clone());

    // Ctrl+C stops the run after the item in flight
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, finishing the current item");
            cancel_on_signal.cancel();
        }
    });

    let reporter = tokio::spawn(report_events(rx, cfg.target_count()));
    let (seq, summary) = seq.spawn(from).await.context("sync task panicked")?;
    drop(seq);
    let _ = reporter.await;

    let count = store.count().await?;
    println!(
        "{count}/{} Pokémon stored ({} new or refreshed, {} failed, {} images, {} image failures)",
        cfg.target_count(),
        summary.records_stored,
        summary.records_failed,
        summary.images_stored,
        summary.images_failed
    );
    if count < cfg.target_count() {
        println!("Some Pokémon are missing. Run `dex sync` again to continue.");
    }
    Ok(())
}

async fn report_events(mut rx: UnboundedReceiver<SyncEvent>, target: u32) {
    while let Some(ev) = rx.recv().await {
        match ev {
            SyncEvent::RecordStored { id, name } => {
                println!("[{id:>3}/{target}] {}", present::capitalize(&name));
            }
            SyncEvent::RecordFailed { id, error } => {
                eprintln!("[{id:>3}/{target}] failed: {error}");
            }
            SyncEvent::ImageFailed { id, which, error } => {
                eprintln!("#{id} {which} image failed: {error}");
            }
            SyncEvent::StateChanged(state) => log::debug!("sync state: {state}"),
            SyncEvent::ImagesStored { .. } | SyncEvent::Finished(_) => {}
        }
    }
}

async fn list(cfg: &Config, filter: &Filter) -> Result<()> {
    let store = open_store(cfg)?;
    if store.count().await? == 0 {
        println!("There aren't any Pokémon yet. Run `dex sync` to fetch some!");
        return Ok(());
    }
    let hits = store.query(filter).await?;
    for rec in &hits {
        println!("{}", present::list_row(rec));
    }
    if hits.is_empty() {
        println!("No Pokémon match.");
    }
    Ok(())
}

async fn status(cfg: &Config) -> Result<()> {
    let store = open_store(cfg)?;
    let count = store.count().await?;
    let target = cfg.target_count();
    if count == 0 {
        println!("There aren't any Pokémon yet. Run `dex sync` to fetch some!");
        return Ok(());
    }

    let records = store.scan().await?;
    let favorites = records.iter().filter(|r| r.favorite).count();
    let missing_images = records.iter().filter(|r| !r.has_all_images()).count();
    println!("{count}/{target} Pokémon stored, {favorites} favorites");

    if let Some(next) = store.next_missing_id(cfg.ceiling).await? {
        println!(
            "The fetch was interrupted! {} missing, run `dex sync --from {next}` to continue.",
            target.saturating_sub(count)
        );
    }
    if missing_images > 0 {
        println!("{missing_images} Pokémon still lack artwork, `dex sync` will retry them.");
    }
    Ok(())
}
