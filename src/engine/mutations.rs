use std::collections::BTreeMap;

use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{BOOKINGS_CREATED_TOTAL, SLOT_FULL_TOTAL, STATUS_CHANGES_TOTAL};
use crate::remote::ReserveOutcome;

use super::slots::generate;
use super::validate::{check_capacity, check_offered, check_slot_count, validate_request};
use super::{Engine, EngineError};

impl Engine {
    // ── Schedule ─────────────────────────────────────────

    /// Replace a day's configuration wholesale. Duplicate times collapse to
    /// their first occurrence.
    pub async fn set_day(
        &self,
        date: DateKey,
        enabled: bool,
        slots: Vec<Slot>,
    ) -> Result<(), EngineError> {
        let day = DaySchedule::new(date, enabled, slots);
        check_slot_count(&day.slots)?;
        let mut schedule = self.schedule.write().await;
        let event = Event::DayConfigured {
            date,
            enabled,
            slots: day.slots,
        };
        self.wal_append(&event).await?;
        schedule.apply(&event);
        info!("day {date} configured (enabled={enabled})");
        Ok(())
    }

    pub async fn set_enabled(&self, date: DateKey, enabled: bool) -> Result<(), EngineError> {
        let mut schedule = self.schedule.write().await;
        if schedule.get_day(date).is_some_and(|d| d.enabled == enabled) {
            return Ok(());
        }
        let event = Event::DayEnabled { date, enabled };
        self.wal_append(&event).await?;
        schedule.apply(&event);
        Ok(())
    }

    /// Idempotent. Returns false when the slot already existed. Adding to an
    /// unconfigured day creates it disabled.
    pub async fn add_slot(&self, date: DateKey, time: TimeOfDay) -> Result<bool, EngineError> {
        let mut schedule = self.schedule.write().await;
        let existing = schedule.get_day(date).map_or(0, |d| d.slots.len());
        if schedule.get_day(date).is_some_and(|d| d.slot(time).is_some()) {
            return Ok(false);
        }
        if existing >= MAX_SLOTS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many slots in one day"));
        }
        let event = Event::SlotAdded { date, time };
        self.wal_append(&event).await?;
        schedule.apply(&event);
        Ok(true)
    }

    /// Returns false when there was nothing to remove.
    pub async fn remove_slot(&self, date: DateKey, time: TimeOfDay) -> Result<bool, EngineError> {
        let mut schedule = self.schedule.write().await;
        if !schedule.get_day(date).is_some_and(|d| d.slot(time).is_some()) {
            return Ok(false);
        }
        let event = Event::SlotRemoved { date, time };
        self.wal_append(&event).await?;
        schedule.apply(&event);
        Ok(true)
    }

    /// Switch a single slot on or off without removing it.
    pub async fn set_slot_available(
        &self,
        date: DateKey,
        time: TimeOfDay,
        available: bool,
    ) -> Result<(), EngineError> {
        let mut schedule = self.schedule.write().await;
        let Some(slot) = schedule.get_day(date).and_then(|d| d.slot(time)) else {
            return Err(EngineError::SlotNotOffered { date, time });
        };
        if slot.available == available {
            return Ok(());
        }
        let event = Event::SlotToggled {
            date,
            time,
            available,
        };
        self.wal_append(&event).await?;
        schedule.apply(&event);
        Ok(())
    }

    /// Remove every slot of `date` for which `keep` is false, leaving the
    /// enabled flag alone. Returns the number of slots removed.
    pub async fn block_range(
        &self,
        date: DateKey,
        keep: impl Fn(TimeOfDay) -> bool,
    ) -> Result<usize, EngineError> {
        let mut schedule = self.schedule.write().await;
        let Some(day) = schedule.get_day(date) else {
            return Ok(0);
        };
        let (enabled, before) = (day.enabled, day.slots.len());
        let Some(slots) = schedule.retained(date, keep) else {
            return Ok(0);
        };
        let removed = before - slots.len();
        if removed == 0 {
            return Ok(0);
        }
        let event = Event::DayConfigured {
            date,
            enabled,
            slots,
        };
        self.wal_append(&event).await?;
        schedule.apply(&event);
        info!("blocked {removed} slots on {date}");
        Ok(removed)
    }

    /// Drop the slots before the cutoff.
    pub async fn block_morning(&self, date: DateKey) -> Result<usize, EngineError> {
        let cutoff = self.settings.block_cutoff;
        self.block_range(date, move |time| time >= cutoff).await
    }

    /// Drop the slots at or after the cutoff.
    pub async fn block_afternoon(&self, date: DateKey) -> Result<usize, EngineError> {
        let cutoff = self.settings.block_cutoff;
        self.block_range(date, move |time| time < cutoff).await
    }

    /// Configure `date` from the daily template and enable it.
    pub async fn apply_template(&self, date: DateKey) -> Result<(), EngineError> {
        let s = &self.settings;
        let slots = generate(s.day_start, s.day_end, s.slot_interval_minutes);
        if slots.is_empty() {
            return Err(EngineError::InvalidInput("daily template produces no slots".into()));
        }
        self.set_day(date, true, slots).await
    }

    // ── Bookings ─────────────────────────────────────────

    /// Validate-then-write booking. Atomic within this engine: the capacity
    /// check and the insert happen under the ledger write lock. Another
    /// client sharing the same remote can still overbook; use
    /// [`Engine::reserve`] when that matters.
    pub async fn create(
        &self,
        date: DateKey,
        time: TimeOfDay,
        subject_id: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<Booking, EngineError> {
        validate_request(subject_id, &metadata)?;
        self.refresh().await?;

        let schedule = self.schedule.read().await;
        check_offered(schedule.get_day(date), date, time)?;
        let directory = self.directory.read().await;
        let capacity = directory.index().capacity_at(time);
        let mut ledger = self.ledger.write().await;
        if ledger.open_local_len() >= MAX_LOCAL_BOOKINGS {
            return Err(EngineError::LimitExceeded("too many open local bookings"));
        }
        check_capacity("create", date, time, ledger.occupancy(date, time), capacity)?;

        let booking = self.new_booking(date, time, subject_id, metadata, false);
        let event = Event::BookingCreated {
            booking: booking.clone(),
        };
        self.wal_append(&event).await?;
        ledger.apply(&event);
        metrics::counter!(BOOKINGS_CREATED_TOTAL, "path" => "create").increment(1);
        info!("booking {} created for {date} {time}", booking.id);
        Ok(booking)
    }

    /// Booking backed by the remote's conditional insert, so concurrent
    /// clients cannot exceed capacity. The booking is recorded locally as
    /// Pending and already published.
    pub async fn reserve(
        &self,
        date: DateKey,
        time: TimeOfDay,
        subject_id: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<Booking, EngineError> {
        validate_request(subject_id, &metadata)?;
        self.refresh().await?;

        let schedule = self.schedule.read().await;
        check_offered(schedule.get_day(date), date, time)?;
        let directory = self.directory.read().await;
        let capacity = directory.index().capacity_at(time);
        let mut ledger = self.ledger.write().await;
        if ledger.open_local_len() >= MAX_LOCAL_BOOKINGS {
            return Err(EngineError::LimitExceeded("too many open local bookings"));
        }
        check_capacity("reserve", date, time, ledger.occupancy(date, time), capacity)?;

        let booking = self.new_booking(date, time, subject_id, metadata, true);
        let outcome = self
            .remote
            .reserve(&booking, capacity)
            .await
            .map_err(|e| EngineError::RemoteFetchFailed(e.to_string()))?;
        if outcome == ReserveOutcome::Full {
            metrics::counter!(SLOT_FULL_TOTAL, "path" => "reserve").increment(1);
            return Err(EngineError::SlotFull {
                date,
                time,
                capacity,
            });
        }

        let event = Event::BookingCreated {
            booking: booking.clone(),
        };
        self.wal_append(&event).await?;
        ledger.apply(&event);
        ledger.invalidate_remote();
        metrics::counter!(BOOKINGS_CREATED_TOTAL, "path" => "reserve").increment(1);
        info!("booking {} reserved for {date} {time}", booking.id);
        Ok(booking)
    }

    fn new_booking(
        &self,
        date: DateKey,
        time: TimeOfDay,
        subject_id: &str,
        metadata: BTreeMap<String, String>,
        published: bool,
    ) -> Booking {
        let now = self.now_ms();
        Booking {
            id: Ulid::new(),
            date,
            time,
            subject_id: subject_id.to_string(),
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
            origin: Origin::Local,
            metadata,
            published,
        }
    }

    /// Move a local booking through its lifecycle. Re-applying the current
    /// status is a no-op. Published bookings are updated on the remote first;
    /// if that fails nothing changes locally.
    pub async fn update_status(&self, id: Ulid, status: BookingStatus) -> Result<Booking, EngineError> {
        let mut ledger = self.ledger.write().await;
        let booking = ledger.check_transition(id, status)?.clone();
        if booking.status == status {
            return Ok(booking);
        }
        // Only appointments whose date has passed can be completed.
        if status == BookingStatus::Completed && booking.date >= self.clock.today() {
            return Err(EngineError::InvalidTransition {
                id,
                from: booking.status,
                to: status,
            });
        }
        if booking.published {
            self.remote
                .update_remote_status(&booking, status)
                .await
                .map_err(|e| EngineError::RemoteFetchFailed(e.to_string()))?;
            ledger.invalidate_remote();
        }

        let at = self.now_ms();
        let event = Event::BookingStatusChanged { id, status, at };
        self.wal_append(&event).await?;
        ledger.apply(&event);
        metrics::counter!(STATUS_CHANGES_TOTAL, "status" => status.as_str()).increment(1);
        debug!("booking {id}: {} -> {status}", booking.status);
        ledger.get_local(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    pub async fn cancel(&self, id: Ulid) -> Result<Booking, EngineError> {
        self.update_status(id, BookingStatus::Cancelled).await
    }

    pub async fn confirm(&self, id: Ulid) -> Result<Booking, EngineError> {
        self.update_status(id, BookingStatus::Confirmed).await
    }

    pub async fn complete(&self, id: Ulid) -> Result<Booking, EngineError> {
        self.update_status(id, BookingStatus::Completed).await
    }
}
