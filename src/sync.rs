//! Fetch-and-persist sequence for the Pokédex.
//!
//! The run is an explicit state machine:
//!
//! ```text
//! Idle -> FetchingRecords(n) -> ... -> FetchingRecords(ceiling)
//!      -> FetchingImages(first stored id) -> ... -> Idle | Failed
//! ```
//!
//! [`SyncSequence::step`] performs exactly one transition so tests can walk a
//! run item by item; [`SyncSequence::run`] drives it to a terminal state.
//! A failure on one id or one image is logged and skipped. Only a store that
//! stopped answering ends the run in `Failed`.

use crate::api::PokedexSource;
use crate::error::StoreError;
use crate::store::{InsertOutcome, Pokedex};
use crate::types::{
    ImageKind, Phase, PokemonRecord, Progress, SyncEvent, SyncState, SyncSummary, DEFAULT_CEILING,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncOptions {
    /// Exclusive upper bound of the record phase.
    pub ceiling: u32,
    /// Run the image phase after the record phase.
    pub fetch_images: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            ceiling: DEFAULT_CEILING,
            fetch_images: true,
        }
    }
}

/// Cooperative cancellation, checked between items.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct SyncSequence {
    source: Arc<dyn PokedexSource>,
    store: Pokedex,
    opts: SyncOptions,
    state: SyncState,
    progress: watch::Sender<Progress>,
    events: Option<UnboundedSender<SyncEvent>>,
    cancel: CancelToken,
    summary: SyncSummary,
}

impl SyncSequence {
    pub fn new(source: Arc<dyn PokedexSource>, store: Pokedex, opts: SyncOptions) -> Self {
        let (progress, _) = watch::channel(Progress::START);
        Self {
            source,
            store,
            opts,
            state: SyncState::Idle,
            progress,
            events: None,
            cancel: CancelToken::new(),
            summary: SyncSummary::default(),
        }
    }

    pub fn with_events(mut self, events: UnboundedSender<SyncEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Progress observer; the value never decreases within a run.
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    pub fn progress(&self) -> Progress {
        *self.progress.borrow()
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn summary(&self) -> SyncSummary {
        self.summary
    }

    /// Begin a run at `from`. Ignored unless the sequence is idle or failed.
    pub fn start(&mut self, from: u32) {
        if !self.state.is_terminal() {
            log::warn!("[sync] start({from}) ignored, already {}", self.state);
            return;
        }
        let from = from.max(1);
        log::info!(
            "[sync] starting at #{from} (ceiling {}, images {})",
            self.opts.ceiling,
            self.opts.fetch_images
        );
        self.summary = SyncSummary::default();
        self.progress.send_replace(Progress::START);
        self.transition(SyncState::FetchingRecords(from));
    }

    /// Perform one transition and return the new state.
    pub async fn step(&mut self) -> &SyncState {
        if self.state.is_terminal() {
            return &self.state;
        }
        if self.cancel.is_cancelled() {
            log::info!("[sync] cancelled while {}", self.state);
            self.summary.cancelled = true;
            self.finish(SyncState::Idle);
            return &self.state;
        }

        let next = match self.state.clone() {
            SyncState::FetchingRecords(id) if id >= self.opts.ceiling => self.enter_images().await,
            SyncState::FetchingRecords(id) => self.fetch_record(id).await,
            SyncState::FetchingImages(id) => self.fetch_images(id).await,
            SyncState::Idle | SyncState::Failed(_) => return &self.state,
        };

        if next.is_terminal() {
            self.finish(next);
        } else {
            self.transition(next);
        }
        &self.state
    }

    /// Run from `from` until `Idle` or `Failed`.
    pub async fn run(&mut self, from: u32) -> SyncSummary {
        self.start(from);
        while !self.state.is_terminal() {
            self.step().await;
        }
        self.summary
    }

    /// Run on a background task, handing the sequence back when done.
    pub fn spawn(mut self, from: u32) -> JoinHandle<(Self, SyncSummary)> {
        tokio::spawn(async move {
            let summary = self.run(from).await;
            (self, summary)
        })
    }

    async fn enter_images(&mut self) -> SyncState {
        if !self.opts.fetch_images {
            return SyncState::Idle;
        }
        match self.store.next_id_after(0).await {
            Ok(Some(first)) => SyncState::FetchingImages(first),
            Ok(None) => {
                log::info!("[sync] store is empty, no images to fetch");
                SyncState::Idle
            }
            Err(e) => SyncState::Failed(format!("cannot read image cursor: {e}")),
        }
    }

    async fn fetch_record(&mut self, id: u32) -> SyncState {
        match self.source.fetch_record(id).await {
            Ok(record) => {
                let name = record.name.clone();
                match self.store.insert(record).await {
                    Ok(outcome) => {
                        log::info!(
                            "[sync] #{id} {name} {}",
                            match outcome {
                                InsertOutcome::Inserted => "stored",
                                InsertOutcome::Updated => "refreshed",
                            }
                        );
                        self.summary.records_stored += 1;
                        self.emit(SyncEvent::RecordStored { id, name });
                        self.report(Phase::Records, id);
                    }
                    Err(e) if e.is_fatal() => return SyncState::Failed(e.to_string()),
                    Err(e) => self.record_failed(id, e.to_string()),
                }
            }
            Err(e) => self.record_failed(id, e.to_string()),
        }
        SyncState::FetchingRecords(id + 1)
    }

    async fn fetch_images(&mut self, id: u32) -> SyncState {
        match self.store.get(id).await {
            Ok(Some(record)) => {
                if let Err(e) = self.fill_images(&record).await {
                    if e.is_fatal() {
                        return SyncState::Failed(e.to_string());
                    }
                    log::warn!("[sync] could not save images for #{id}: {e}");
                }
                self.report(Phase::Images, id);
            }
            Ok(None) => log::debug!("[sync] #{id} vanished before its images were fetched"),
            Err(e) if e.is_fatal() => return SyncState::Failed(e.to_string()),
            Err(e) => log::warn!("[sync] could not load #{id}: {e}"),
        }

        match self.store.next_id_after(id).await {
            Ok(Some(next)) => SyncState::FetchingImages(next),
            Ok(None) => SyncState::Idle,
            Err(e) => SyncState::Failed(format!("cannot read image cursor: {e}")),
        }
    }

    /// Download whichever images the record lacks and persist the successes.
    async fn fill_images(&mut self, record: &PokemonRecord) -> Result<(), StoreError> {
        let id = record.id;
        let sprite = match record.sprite {
            Some(_) => None,
            None => self.download(id, ImageKind::Sprite, &record.sprite_url).await,
        };
        let shiny = match record.shiny {
            Some(_) => None,
            None => self.download(id, ImageKind::Shiny, &record.shiny_url).await,
        };
        if sprite.is_none() && shiny.is_none() {
            return Ok(());
        }

        let (got_sprite, got_shiny) = (sprite.is_some(), shiny.is_some());
        self.store.attach_images(id, sprite, shiny).await?;
        self.summary.images_stored += got_sprite as u32 + got_shiny as u32;
        log::debug!("[sync] #{id} images saved (sprite={got_sprite}, shiny={got_shiny})");
        self.emit(SyncEvent::ImagesStored {
            id,
            sprite: got_sprite,
            shiny: got_shiny,
        });
        Ok(())
    }

    async fn download(&mut self, id: u32, which: ImageKind, url: &str) -> Option<Vec<u8>> {
        match self.source.fetch_image(url).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                log::warn!("[sync] #{id} {which} failed: {e}");
                self.summary.images_failed += 1;
                self.emit(SyncEvent::ImageFailed {
                    id,
                    which,
                    error: e.to_string(),
                });
                None
            }
        }
    }

    fn record_failed(&mut self, id: u32, error: String) {
        log::warn!("[sync] #{id} skipped: {error}");
        self.summary.records_failed += 1;
        self.emit(SyncEvent::RecordFailed { id, error });
    }

    fn report(&mut self, phase: Phase, id: u32) {
        let next = Progress { phase, id };
        self.progress.send_if_modified(|cur| {
            if next > *cur {
                *cur = next;
                true
            } else {
                false
            }
        });
    }

    fn transition(&mut self, next: SyncState) {
        log::debug!("[sync] {} -> {}", self.state, next);
        self.state = next;
        self.emit(SyncEvent::StateChanged(self.state.clone()));
    }

    fn finish(&mut self, terminal: SyncState) {
        match &terminal {
            SyncState::Failed(reason) => log::error!("[sync] failed: {reason}"),
            _ => log::info!(
                "[sync] done: {} stored, {} failed, {} images, {} image failures",
                self.summary.records_stored,
                self.summary.records_failed,
                self.summary.images_stored,
                self.summary.images_failed
            ),
        }
        self.transition(terminal);
        self.emit(SyncEvent::Finished(self.summary));
    }

    fn emit(&self, ev: SyncEvent) {
        if let Some(tx) = &self.events {
            // receiver gone means nobody is watching; the run goes on
            let _ = tx.send(ev);
        }
    }
}
