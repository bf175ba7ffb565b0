use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::cache::Refresh;
use crate::model::*;
use crate::observability::{BOOKINGS_PUBLISHED_TOTAL, STATUS_CHANGES_TOTAL};

use super::{Engine, EngineError, WalCommand};

impl Engine {
    /// Bring both remote snapshots up to date. Each cache is refreshed under
    /// its own lock and the two fetches run concurrently. A cache that needs
    /// no fetch is checked under a read lock only. Fails only when a cache has
    /// never been filled and its fetch fails.
    pub async fn refresh(&self) -> Result<(Refresh, Refresh), EngineError> {
        let now = self.now_ms();
        let remote = self.remote.as_ref();
        futures::future::try_join(
            async {
                if !self.directory.read().await.cache().needs_fetch(now) {
                    return Ok(Refresh::Fresh);
                }
                // Rechecked under the write lock; a concurrent caller may
                // have fetched in between.
                let mut directory = self.directory.write().await;
                directory.refresh(now, remote).await
            },
            async {
                if !self.ledger.read().await.remote_cache().needs_fetch(now) {
                    return Ok(Refresh::Fresh);
                }
                let mut ledger = self.ledger.write().await;
                ledger.refresh(now, remote).await
            },
        )
        .await
    }

    /// Drop the remote bookings snapshot so the next read refetches it.
    pub async fn invalidate_remote(&self) {
        self.ledger.write().await.invalidate_remote();
    }

    /// Write every Confirmed, unpublished local booking to the remote.
    /// Failures are logged and retried on the next call. Returns how many
    /// were published.
    pub async fn publish_confirmed(&self) -> Result<usize, EngineError> {
        let mut ledger = self.ledger.write().await;
        let pending: Vec<Booking> = ledger
            .local_bookings()
            .filter(|b| b.status == BookingStatus::Confirmed && !b.published)
            .cloned()
            .collect();

        let mut published = 0;
        for booking in &pending {
            if let Err(e) = self.remote.create_remote_booking(booking).await {
                warn!("publishing booking {} failed: {e}", booking.id);
                continue;
            }
            let event = Event::BookingPublished { id: booking.id };
            self.wal_append(&event).await?;
            ledger.apply(&event);
            published += 1;
        }
        if published > 0 {
            ledger.invalidate_remote();
            metrics::counter!(BOOKINGS_PUBLISHED_TOTAL).increment(published as u64);
            info!("published {published} bookings");
        }
        Ok(published)
    }

    /// Mark Confirmed local bookings dated before today as Completed.
    /// Published ones are updated on the remote first and skipped if that
    /// fails. Returns how many were completed.
    pub async fn complete_past(&self) -> Result<usize, EngineError> {
        let today = self.clock.today();
        let mut ledger = self.ledger.write().await;
        let past: Vec<Booking> = ledger
            .local_bookings()
            .filter(|b| b.status == BookingStatus::Confirmed && b.date < today)
            .cloned()
            .collect();

        let mut completed = 0;
        for booking in &past {
            if booking.published
                && let Err(e) = self
                    .remote
                    .update_remote_status(booking, BookingStatus::Completed)
                    .await
            {
                warn!("completing booking {} on the remote failed: {e}", booking.id);
                continue;
            }
            let event = Event::BookingStatusChanged {
                id: booking.id,
                status: BookingStatus::Completed,
                at: self.now_ms(),
            };
            self.wal_append(&event).await?;
            ledger.apply(&event);
            completed += 1;
        }
        if completed > 0 {
            if past.iter().any(|b| b.published) {
                ledger.invalidate_remote();
            }
            metrics::counter!(STATUS_CHANGES_TOTAL, "status" => BookingStatus::Completed.as_str())
                .increment(completed as u64);
            info!("completed {completed} past bookings");
        }
        Ok(completed)
    }

    /// Rewrite the WAL as the minimal event set for the current state.
    /// Holds both stores for the duration so no append can slip between the
    /// snapshot and the swap.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let schedule = self.schedule.read().await;
        let ledger = self.ledger.read().await;
        let mut events = schedule.snapshot_events();
        events.extend(ledger.snapshot_events());
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        info!("WAL compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
