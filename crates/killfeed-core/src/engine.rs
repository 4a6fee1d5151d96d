//! Scheduler: independent periodic jobs (feed poll, aggregation, presence poll,
//! admin inbox, flush) sharing the aggregators, plus the administrative operations.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Local;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::admin::AdminInbox;
use crate::config::EngineConfig;
use crate::dedup::Deduplicator;
use crate::error::{KillfeedError, Result};
use crate::kill_stats::{BatchSummary, KillLedger, KillStats};
use crate::models::{KillStatsRecord, PlayerId, PlaytimeRecord, TailCursor};
use crate::parser::events::KillEvent;
use crate::parser::parse_lines;
use crate::playtime::{LinkOutcome, PlaytimeStats, PresenceReport};
use crate::presence::{PlayerListSource, PresencePoller};
use crate::store::{Persistence, Snapshot, StateStore};
use crate::tailer::{FeedSource, LogTailer};

/// Parsed events handed from the feed job to the aggregation job, with the
/// cursor reached once they are applied.
#[derive(Debug, Clone)]
pub struct FeedBatch {
    pub events: Vec<KillEvent>,
    pub cursor: TailCursor,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Aggregator state shared between jobs. Lock order is always ledger, then playtime.
#[derive(Debug, Default)]
pub struct SharedState {
    ledger: Mutex<KillLedger>,
    playtime: Mutex<PlaytimeStats>,
}

impl SharedState {
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let ledger = KillLedger::from_parts(
            KillStats::from_entries(snapshot.kill_stats),
            Deduplicator::from_keys(snapshot.processed_events),
            snapshot.cursor,
        );
        let mut playtime = PlaytimeStats::from_entries(snapshot.playtime);
        playtime.mark_all_offline();
        Self {
            ledger: Mutex::new(ledger),
            playtime: Mutex::new(playtime),
        }
    }

    /// Copy of the current state. Each aggregator is copied under its own lock.
    pub fn snapshot(&self) -> Snapshot {
        let (kill_stats, processed_events, cursor) = {
            let ledger = lock(&self.ledger);
            (
                ledger.stats().entries(),
                ledger.dedup().keys(),
                ledger.cursor(),
            )
        };
        let playtime = lock(&self.playtime).entries();
        Snapshot {
            kill_stats,
            processed_events,
            playtime,
            cursor,
        }
    }

    pub fn apply_batch(&self, batch: &FeedBatch) -> BatchSummary {
        lock(&self.ledger).apply_batch(&batch.events, batch.cursor)
    }

    pub fn committed_cursor(&self) -> TailCursor {
        lock(&self.ledger).cursor()
    }

    pub fn top_killers(&self, n: usize) -> Vec<(PlayerId, KillStatsRecord)> {
        lock(&self.ledger).stats().top_n(n)
    }

    pub fn lookup_killer(&self, id_or_name: &str) -> Option<(PlayerId, KillStatsRecord)> {
        lock(&self.ledger).stats().lookup(id_or_name)
    }

    pub fn killer_rank(&self, id: &PlayerId) -> Option<(usize, usize)> {
        lock(&self.ledger).stats().rank_of(id)
    }

    pub fn top_playtime(&self, n: usize) -> Vec<(PlayerId, PlaytimeRecord)> {
        lock(&self.playtime).top_n(n)
    }

    pub fn lookup_playtime(&self, id_or_name: &str) -> Option<(PlayerId, PlaytimeRecord)> {
        lock(&self.playtime).lookup(id_or_name)
    }

    pub fn playtime_rank(&self, id: &PlayerId) -> Option<(usize, usize)> {
        lock(&self.playtime).rank_of(id)
    }

    pub fn online_count(&self) -> usize {
        lock(&self.playtime).online_count()
    }

    pub fn observe_presence(&self, names: &[String]) -> PresenceReport {
        lock(&self.playtime).observe(names, Local::now().naive_local())
    }

    /// Clear kill stats, processed events and playtime in one step.
    pub fn reset_all(&self) {
        let mut ledger = lock(&self.ledger);
        let mut playtime = lock(&self.playtime);
        ledger.reset();
        playtime.reset();
    }

    pub fn reset_playtime(&self) {
        lock(&self.playtime).reset();
    }

    pub fn link_identity(&self, stable_id: &str, display_name: &str) -> Result<LinkOutcome> {
        lock(&self.playtime).link_identity(stable_id, display_name)
    }
}

/// Remote ports. A missing port disables its job.
#[derive(Clone, Default)]
pub struct EngineSources {
    pub feed: Option<Arc<dyn FeedSource>>,
    pub players: Option<Arc<dyn PlayerListSource>>,
    /// Commands queued by other processes for this engine's state file.
    pub admin_inbox: Option<AdminInbox>,
}

/// Running engine. Dropping it without [`Engine::shutdown`] skips the final flush.
pub struct Engine {
    state: Arc<SharedState>,
    persistence: Persistence,
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Engine {
    /// Load saved state and start every job whose port and settings are usable.
    /// A job with bad settings is logged and left out; the others still run.
    /// Must be called from inside a tokio runtime.
    pub fn start(config: EngineConfig, sources: EngineSources, store: Arc<dyn StateStore>) -> Self {
        let persistence = Persistence::new(store);
        let state = Arc::new(SharedState::from_snapshot(persistence.load_or_empty()));
        let (shutdown, _) = watch::channel(false);
        let mut tasks = Vec::new();

        if config.enable_kill_feed {
            match (sources.feed, config.validate_kill_feed()) {
                (Some(feed), Ok(())) => {
                    let (tx, rx) = mpsc::channel(config.event_channel_capacity);
                    let tailer = LogTailer::new(feed, config.feed_path.clone(), state.committed_cursor());
                    tasks.push((
                        "kill-feed",
                        tokio::spawn(feed_job(
                            tailer,
                            tx,
                            config.log_poll_interval(),
                            config.io_timeout(),
                            shutdown.subscribe(),
                        )),
                    ));
                    tasks.push(("aggregator", tokio::spawn(aggregate_job(state.clone(), rx))));
                }
                (None, _) => log::warn!("Kill feed enabled but no feed source configured; job disabled"),
                (_, Err(e)) => log::error!("Kill feed job disabled: {}", e),
            }
        }

        if config.enable_presence {
            match (sources.players, config.validate_presence()) {
                (Some(players), Ok(())) => {
                    tasks.push((
                        "presence",
                        tokio::spawn(presence_job(
                            state.clone(),
                            PresencePoller::new(players),
                            config.presence_poll_interval(),
                            config.io_timeout(),
                            shutdown.subscribe(),
                        )),
                    ));
                }
                (None, _) => log::warn!("Presence enabled but no player list source configured; job disabled"),
                (_, Err(e)) => log::error!("Presence job disabled: {}", e),
            }
        }

        if let Some(inbox) = sources.admin_inbox {
            match config.validate_admin() {
                Ok(()) => tasks.push((
                    "admin",
                    tokio::spawn(admin_job(
                        state.clone(),
                        persistence.clone(),
                        inbox,
                        config.admin_poll_interval(),
                        shutdown.subscribe(),
                    )),
                )),
                Err(e) => log::error!("Admin inbox disabled: {}", e),
            }
        }

        match config.validate_flush() {
            Ok(()) => tasks.push((
                "flush",
                tokio::spawn(flush_job(
                    state.clone(),
                    persistence.clone(),
                    config.flush_interval(),
                    shutdown.subscribe(),
                )),
            )),
            Err(e) => log::error!("Periodic flush disabled, saving only on shutdown: {}", e),
        }

        log::info!(
            "Engine started with jobs: {}",
            tasks.iter().map(|(name, _)| *name).collect::<Vec<_>>().join(", ")
        );
        Self {
            state,
            persistence,
            shutdown,
            tasks,
        }
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// Write the current state now.
    pub async fn flush(&self) -> Result<()> {
        save_snapshot(self.state.clone(), self.persistence.clone()).await
    }

    /// Clear kill stats, processed events and playtime, then save.
    pub async fn reset_all(&self) -> Result<()> {
        self.state.reset_all();
        log::info!("All statistics reset");
        self.flush_after_admin().await;
        Ok(())
    }

    pub async fn reset_playtime(&self) -> Result<()> {
        self.state.reset_playtime();
        log::info!("Playtime statistics reset");
        self.flush_after_admin().await;
        Ok(())
    }

    pub async fn link_identity(&self, stable_id: &str, display_name: &str) -> Result<LinkOutcome> {
        let outcome = self.state.link_identity(stable_id, display_name)?;
        self.flush_after_admin().await;
        Ok(outcome)
    }

    /// The in-memory change stands even if this save fails; the next flush retries.
    async fn flush_after_admin(&self) {
        if let Err(e) = self.flush().await {
            log::error!("Save after admin operation failed: {}", e);
        }
    }

    /// Let every job finish its current cycle, then write a final snapshot.
    pub async fn shutdown(self) -> Result<()> {
        log::info!("Shutting down engine");
        let _ = self.shutdown.send(true);
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                log::error!("Job {} ended abnormally: {}", name, e);
            }
        }
        save_snapshot(self.state, self.persistence).await
    }
}

/// Blocking remote calls for one job, run on the blocking pool and bounded by a
/// timeout. A blocking call cannot be cancelled, so a call that timed out is kept
/// and no new call starts until it has finished.
struct RemoteCall<T> {
    timeout: Duration,
    pending: Option<JoinHandle<Result<T>>>,
}

impl<T: Send + 'static> RemoteCall<T> {
    fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: None,
        }
    }

    async fn run<F>(&mut self, op: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        if let Some(handle) = self.pending.take() {
            if !handle.is_finished() {
                self.pending = Some(handle);
                return Err(KillfeedError::TransientIo(
                    "previous remote call is still running".to_string(),
                ));
            }
            // result of the timed-out call is stale by now
        }

        let mut handle = tokio::task::spawn_blocking(op);
        match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(KillfeedError::TransientIo(format!(
                "remote call aborted: {}",
                join_err
            ))),
            Err(_) => {
                self.pending = Some(handle);
                Err(KillfeedError::TransientIo(format!(
                    "remote call timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }
}

/// Wait for the next tick, or return false once shutdown is requested.
async fn next_tick(ticker: &mut tokio::time::Interval, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = ticker.tick() => true,
        changed = shutdown.changed() => {
            // A dropped sender also means stop.
            changed.is_ok() && !*shutdown.borrow()
        }
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn feed_job(
    mut tailer: LogTailer,
    tx: mpsc::Sender<FeedBatch>,
    period: Duration,
    timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = ticker(period);
    let mut remote = RemoteCall::new(timeout);
    while next_tick(&mut ticker, &mut shutdown).await {
        let reader = tailer.clone();
        let chunk = match remote.run(move || reader.fetch_new_content()).await {
            Ok(chunk) => chunk,
            Err(e) if e.is_transient() => {
                log::warn!("Kill feed poll skipped: {}", e);
                continue;
            }
            Err(e) => {
                log::error!("Kill feed poll failed: {}", e);
                continue;
            }
        };

        if chunk.is_empty() && chunk.cursor == tailer.cursor() {
            continue;
        }

        let events: Vec<KillEvent> = parse_lines(&chunk.text).collect();
        log::debug!("Kill feed: {} events in {} bytes", events.len(), chunk.text.len());
        let batch = FeedBatch {
            events,
            cursor: chunk.cursor,
        };
        if tx.send(batch).await.is_err() {
            log::error!("Aggregator stopped; kill feed job exiting");
            break;
        }
        tailer.commit(chunk.cursor);
    }
    log::debug!("Kill feed job for {} stopped at {:?}", tailer.path(), tailer.cursor());
}

async fn aggregate_job(state: Arc<SharedState>, mut rx: mpsc::Receiver<FeedBatch>) {
    // Runs until the feed job drops its sender, so queued batches are drained on shutdown.
    while let Some(batch) = rx.recv().await {
        let summary = state.apply_batch(&batch);
        if summary.applied() > 0 || summary.duplicates > 0 {
            log::info!(
                "Applied kill feed batch: {} kills, {} natural deaths, {} malformed, {} duplicates",
                summary.kills,
                summary.natural_deaths,
                summary.malformed,
                summary.duplicates
            );
        }
    }
    log::debug!("Aggregator stopped");
}

async fn presence_job(
    state: Arc<SharedState>,
    poller: PresencePoller<dyn PlayerListSource>,
    period: Duration,
    timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = ticker(period);
    let mut remote = RemoteCall::new(timeout);
    while next_tick(&mut ticker, &mut shutdown).await {
        let fetcher = poller.clone();
        match remote.run(move || fetcher.poll()).await {
            Ok(names) => {
                let report = state.observe_presence(&names);
                log::info!("Presence poll: {} players online", report.online_count());
            }
            Err(e) => log::warn!("Presence poll skipped: {}", e),
        }
    }
    log::debug!("Presence job stopped");
}

async fn flush_job(
    state: Arc<SharedState>,
    persistence: Persistence,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = ticker(period);
    // The first tick fires immediately; nothing has changed since load yet.
    ticker.tick().await;
    while next_tick(&mut ticker, &mut shutdown).await {
        if let Err(e) = save_snapshot(state.clone(), persistence.clone()).await {
            log::error!("Periodic save failed, will retry next cycle: {}", e);
        }
    }
}

async fn admin_job(
    state: Arc<SharedState>,
    persistence: Persistence,
    inbox: AdminInbox,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = ticker(period);
    while next_tick(&mut ticker, &mut shutdown).await {
        apply_inbox(&state, &persistence, &inbox).await;
    }
    // commands queued during the last cycle go into the final save
    apply_inbox(&state, &persistence, &inbox).await;
    log::debug!("Admin job for {} stopped", inbox.dir().display());
}

async fn apply_inbox(state: &Arc<SharedState>, persistence: &Persistence, inbox: &AdminInbox) {
    let reader = inbox.clone();
    let commands = match tokio::task::spawn_blocking(move || reader.drain()).await {
        Ok(Ok(commands)) => commands,
        Ok(Err(e)) => {
            log::warn!("Admin inbox {} unreadable: {}", inbox.dir().display(), e);
            return;
        }
        Err(e) => {
            log::error!("Admin inbox task aborted: {}", e);
            return;
        }
    };
    if commands.is_empty() {
        return;
    }
    for command in &commands {
        match command.apply(state) {
            Ok(Some(outcome)) => log::info!("Applied queued {:?}: {:?}", command, outcome),
            Ok(None) => log::info!("Applied queued {:?}", command),
            Err(e) => log::warn!("Queued {:?} rejected: {}", command, e),
        }
    }
    if let Err(e) = save_snapshot(state.clone(), persistence.clone()).await {
        log::error!("Save after queued admin commands failed: {}", e);
    }
}

async fn save_snapshot(state: Arc<SharedState>, persistence: Persistence) -> Result<()> {
    tokio::task::spawn_blocking(move || persistence.save(&state.snapshot()))
        .await
        .map_err(|e| KillfeedError::Persistence(format!("save task aborted: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_lines;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const FEED: &str = "\
[2024.01.01-00.05.00][LogTheIsleKillData]: Bob [123] Dino: Rex, Male, 1.0 - Killed the following player: Ann, [456], Dino: Trike, Gender: Female, Growth: 0.8
";

    #[test]
    fn test_snapshot_roundtrip_through_shared_state() {
        let state = SharedState::default();
        state.apply_batch(&FeedBatch {
            events: parse_lines(FEED).collect(),
            cursor: TailCursor::new(10, 10),
        });
        state.observe_presence(&["Rex".to_string()]);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.kill_stats.len(), 2);
        assert_eq!(snapshot.processed_events.len(), 1);
        assert_eq!(snapshot.cursor, TailCursor::new(10, 10));

        let restored = SharedState::from_snapshot(snapshot.clone());
        assert_eq!(restored.top_killers(10), state.top_killers(10));
        // presence does not survive a restart
        assert_eq!(restored.online_count(), 0);
        assert!(snapshot.playtime[0].1.online);
    }

    #[test]
    fn test_reset_all_clears_everything_together() {
        let state = SharedState::default();
        let events: Vec<_> = parse_lines(FEED).collect();
        state.apply_batch(&FeedBatch {
            events: events.clone(),
            cursor: TailCursor::default(),
        });
        state.observe_presence(&["Rex".to_string()]);
        state.reset_all();
        let snapshot = state.snapshot();
        assert!(snapshot.kill_stats.is_empty());
        assert!(snapshot.processed_events.is_empty());
        assert!(snapshot.playtime.is_empty());

        // the same event counts again after a reset
        let summary = state.apply_batch(&FeedBatch {
            events,
            cursor: TailCursor::default(),
        });
        assert_eq!(summary.kills, 1);
    }

    #[tokio::test]
    async fn test_engine_without_sources_only_flushes() {
        let store = Arc::new(MemoryStore::new());
        let engine = Engine::start(
            EngineConfig::default(),
            EngineSources::default(),
            store.clone(),
        );
        assert_eq!(engine.tasks.len(), 1);
        engine.shutdown().await.unwrap();
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_bad_settings_disable_only_their_job() {
        let config = EngineConfig {
            feed_path: String::new(),
            flush_secs: 0,
            ..Default::default()
        };
        let store = Arc::new(MemoryStore::new());
        let engine = Engine::start(
            config,
            EngineSources {
                feed: None,
                players: Some(Arc::new(crate::sources::FilePlayerList::new("/nonexistent/players.txt"))),
                admin_inbox: None,
            },
            store.clone(),
        );
        let names: Vec<_> = engine.tasks.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["presence"]);
        // shutdown still writes the final snapshot
        engine.shutdown().await.unwrap();
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_start_restores_snapshot_offline() {
        let state = SharedState::default();
        state.observe_presence(&["Rex".to_string()]);
        state.apply_batch(&FeedBatch {
            events: parse_lines(FEED).collect(),
            cursor: TailCursor::new(7, 7),
        });
        let snapshot = state.snapshot();

        let store = Arc::new(MemoryStore::with_snapshot(snapshot));
        let engine = Engine::start(EngineConfig::default(), EngineSources::default(), store);
        assert_eq!(engine.state().top_killers(1)[0].1.display_name, "Bob");
        assert_eq!(engine.state().committed_cursor(), TailCursor::new(7, 7));
        assert_eq!(engine.state().online_count(), 0);
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_call_timeout_is_transient() {
        let mut remote = RemoteCall::new(Duration::from_millis(20));
        let result: Result<()> = remote
            .run(|| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(KillfeedError::TransientIo(_))));
    }

    #[tokio::test]
    async fn test_remote_call_waits_for_timed_out_call_before_starting_another() {
        let started = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut remote = RemoteCall::new(Duration::from_millis(20));

        for _ in 0..4 {
            let (started, active, peak) = (started.clone(), active.clone(), peak.clone());
            let result = remote
                .run(move || {
                    started.fetch_add(1, Ordering::SeqCst);
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(150));
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(0u32)
                })
                .await;
            assert!(matches!(result, Err(KillfeedError::TransientIo(_))));
        }
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(peak.load(Ordering::SeqCst), 1);

        // once the slow call has finished, calls run again
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(remote.run(|| Ok(7)).await.unwrap(), 7);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
