use ulid::Ulid;

use crate::model::*;

use super::availability::{classify_day, days_of_month, free_slots};
use super::{Engine, EngineError};

impl Engine {
    /// Current configuration of `date`, if it has ever been configured.
    pub async fn get_day(&self, date: DateKey) -> Option<DaySchedule> {
        self.schedule.read().await.get_day(date).cloned()
    }

    /// Fails with `DayNotBookable` unless the day is enabled with at least
    /// one slot.
    pub async fn ensure_bookable(&self, date: DateKey) -> Result<(), EngineError> {
        let schedule = self.schedule.read().await;
        match schedule.get_day(date) {
            Some(day) if day.is_bookable() => Ok(()),
            _ => Err(EngineError::DayNotBookable(date)),
        }
    }

    pub async fn resources(&self) -> Result<Vec<Resource>, EngineError> {
        self.refresh().await?;
        Ok(self.directory.read().await.resources().to_vec())
    }

    pub async fn capacity_at(&self, time: TimeOfDay) -> Result<u32, EngineError> {
        self.refresh().await?;
        Ok(self.directory.read().await.index().capacity_at(time))
    }

    pub async fn occupancy(&self, date: DateKey, time: TimeOfDay) -> Result<u32, EngineError> {
        self.refresh().await?;
        Ok(self.ledger.read().await.occupancy(date, time))
    }

    /// Times on `date` that would accept a booking right now.
    pub async fn free_slots_on(&self, date: DateKey) -> Result<Vec<TimeOfDay>, EngineError> {
        self.refresh().await?;
        let schedule = self.schedule.read().await;
        let directory = self.directory.read().await;
        let ledger = self.ledger.read().await;
        Ok(free_slots(
            schedule.get_day(date),
            directory.index(),
            &ledger.occupancy_on(date),
        ))
    }

    pub async fn day_status(&self, date: DateKey) -> Result<DayStatus, EngineError> {
        self.refresh().await?;
        let schedule = self.schedule.read().await;
        let directory = self.directory.read().await;
        let ledger = self.ledger.read().await;
        Ok(classify_day(
            schedule.get_day(date),
            directory.index(),
            &ledger.occupancy_on(date),
        ))
    }

    /// Classify every day of the month. The three lists partition the month
    /// and are each ascending.
    pub async fn month_view(&self, year: i32, month: u32) -> Result<MonthView, EngineError> {
        let days = days_of_month(year, month)?;
        self.refresh().await?;
        let schedule = self.schedule.read().await;
        let directory = self.directory.read().await;
        let ledger = self.ledger.read().await;

        let mut view = MonthView::default();
        for date in days {
            let status = classify_day(
                schedule.get_day(date),
                directory.index(),
                &ledger.occupancy_on(date),
            );
            view.push(date, status);
        }
        Ok(view)
    }

    /// Local or remote booking by id, from the current snapshot.
    pub async fn get_booking(&self, id: Ulid) -> Option<Booking> {
        self.ledger.read().await.get(&id).cloned()
    }

    pub async fn list_by_date(&self, date: DateKey) -> Result<Vec<Booking>, EngineError> {
        self.refresh().await?;
        Ok(self.ledger.read().await.list_by_date(date))
    }

    pub async fn list_by_subject(&self, subject_id: &str) -> Result<Vec<Booking>, EngineError> {
        self.refresh().await?;
        Ok(self.ledger.read().await.list_by_subject(subject_id))
    }

    pub async fn stats(&self) -> Result<LedgerStats, EngineError> {
        self.refresh().await?;
        Ok(self.ledger.read().await.stats())
    }
}
