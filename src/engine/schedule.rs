use std::collections::BTreeMap;

use crate::model::*;

/// Per-day slot configuration. Days with no entry are not bookable.
#[derive(Debug, Default)]
pub struct ScheduleStore {
    days: BTreeMap<DateKey, DaySchedule>,
}

impl ScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_day(&self, date: DateKey) -> Option<&DaySchedule> {
        self.days.get(&date)
    }

    pub fn days(&self) -> impl Iterator<Item = &DaySchedule> {
        self.days.values()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    fn day_mut(&mut self, date: DateKey) -> &mut DaySchedule {
        // Fail-closed: a day touched for the first time starts disabled.
        self.days
            .entry(date)
            .or_insert_with(|| DaySchedule::new(date, false, Vec::new()))
    }

    pub fn set_day(&mut self, date: DateKey, enabled: bool, slots: Vec<Slot>) {
        self.days.insert(date, DaySchedule::new(date, enabled, slots));
    }

    pub fn set_enabled(&mut self, date: DateKey, enabled: bool) {
        self.day_mut(date).enabled = enabled;
    }

    /// Idempotent. Returns false if the time was already present.
    pub fn add_slot(&mut self, date: DateKey, time: TimeOfDay) -> bool {
        self.day_mut(date).insert_slot(Slot::open(time))
    }

    pub fn remove_slot(&mut self, date: DateKey, time: TimeOfDay) -> bool {
        self.days
            .get_mut(&date)
            .is_some_and(|day| day.remove_slot(time).is_some())
    }

    pub fn set_slot_available(&mut self, date: DateKey, time: TimeOfDay, available: bool) -> bool {
        self.days
            .get_mut(&date)
            .is_some_and(|day| day.set_slot_available(time, available))
    }

    /// The slots of `date` that satisfy `keep`, without mutating anything.
    pub fn retained(&self, date: DateKey, keep: impl Fn(TimeOfDay) -> bool) -> Option<Vec<Slot>> {
        self.days
            .get(&date)
            .map(|day| day.slots.iter().copied().filter(|s| keep(s.time)).collect())
    }

    /// Remove every slot of `date` failing `keep`. Returns the number removed.
    pub fn block_range(&mut self, date: DateKey, keep: impl Fn(TimeOfDay) -> bool) -> usize {
        match self.days.get_mut(&date) {
            Some(day) => {
                let before = day.slots.len();
                day.slots.retain(|s| keep(s.time));
                before - day.slots.len()
            }
            None => 0,
        }
    }

    /// Apply a persisted schedule event. Booking events are ignored.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::DayConfigured {
                date,
                enabled,
                slots,
            } => self.set_day(*date, *enabled, slots.clone()),
            Event::DayEnabled { date, enabled } => self.set_enabled(*date, *enabled),
            Event::SlotAdded { date, time } => {
                self.add_slot(*date, *time);
            }
            Event::SlotRemoved { date, time } => {
                self.remove_slot(*date, *time);
            }
            Event::SlotToggled {
                date,
                time,
                available,
            } => {
                self.set_slot_available(*date, *time, *available);
            }
            Event::BookingCreated { .. }
            | Event::BookingStatusChanged { .. }
            | Event::BookingPublished { .. } => {}
        }
    }

    /// Minimal events that recreate the current schedule.
    pub fn snapshot_events(&self) -> Vec<Event> {
        self.days
            .values()
            .map(|day| Event::DayConfigured {
                date: day.date,
                enabled: day.enabled,
                slots: day.slots.clone(),
            })
            .collect()
    }
}
