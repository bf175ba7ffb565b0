mod availability;
mod capacity;
mod error;
mod ledger;
mod mutations;
mod queries;
mod schedule;
pub mod slots;
mod sync;
mod validate;

pub use availability::{classify_day, days_of_month, free_slots};
pub use capacity::{CapacityIndex, ResourceDirectory};
pub use error::EngineError;
pub use ledger::BookingLedger;
pub use schedule::ScheduleStore;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::info;

use crate::clock::Clock;
use crate::config::Config;
use crate::model::*;
use crate::remote::RemoteSource;
use crate::wal::Wal;

/// Engine-level knobs, usually derived from [`Config::settings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub cache_ttl_ms: Ms,
    pub block_cutoff: TimeOfDay,
    pub day_start: TimeOfDay,
    pub day_end: TimeOfDay,
    pub slot_interval_minutes: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Config::default().settings()
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit:
/// take the first Append, drain whatever else is already queued, then flush
/// and fsync once for the whole batch.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let append = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so half-written bytes don't leak into
    // the next batch.
    let flush = wal.flush_sync();
    append.and(flush)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

/// The scheduling engine for one client session: local schedule and
/// bookings (persisted in the WAL) plus TTL-cached views of the remote
/// resource directory and remote bookings.
///
/// Lock order: schedule → directory → ledger.
pub struct Engine {
    pub(super) schedule: RwLock<ScheduleStore>,
    pub(super) directory: RwLock<ResourceDirectory>,
    pub(super) ledger: RwLock<BookingLedger>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) remote: Arc<dyn RemoteSource>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) settings: Settings,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start the writer task. Must be
    /// called inside a tokio runtime.
    pub fn new(
        wal_path: PathBuf,
        remote: Arc<dyn RemoteSource>,
        clock: Arc<dyn Clock>,
        settings: Settings,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut schedule = ScheduleStore::new();
        let mut ledger = BookingLedger::new(settings.cache_ttl_ms);
        for event in &events {
            schedule.apply(event);
            ledger.apply(event);
        }
        info!(
            "replayed {} events: {} days, {} local bookings",
            events.len(),
            schedule.len(),
            ledger.local_len()
        );

        Ok(Self {
            schedule: RwLock::new(schedule),
            directory: RwLock::new(ResourceDirectory::new(settings.cache_ttl_ms)),
            ledger: RwLock::new(ledger),
            wal_tx,
            remote,
            clock,
            settings,
        })
    }

    /// Open the engine described by `config`, creating its data directory.
    pub fn open(
        config: &Config,
        remote: Arc<dyn RemoteSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir).map_err(|e| EngineError::WalError(e.to_string()))?;
        Self::new(config.wal_path(), remote, clock, config.settings())
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(super) fn now_ms(&self) -> Ms {
        self.clock.now_ms()
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }
}
