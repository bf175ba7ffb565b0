use std::collections::HashMap;

use chrono::NaiveDate;

use crate::limits::{MAX_YEAR, MIN_YEAR};
use crate::model::*;

use super::EngineError;
use super::capacity::CapacityIndex;

// ── Availability classification ───────────────────────────────────

/// Free times of one day. A slot is free when the day is enabled, the slot
/// is switched on, at least one resource covers it, and occupancy is below
/// that capacity.
pub fn free_slots(
    day: Option<&DaySchedule>,
    capacity: &CapacityIndex,
    occupancy: &HashMap<TimeOfDay, u32>,
) -> Vec<TimeOfDay> {
    let Some(day) = day.filter(|d| d.enabled) else {
        return Vec::new();
    };
    day.slots
        .iter()
        .filter(|s| s.available)
        .filter(|s| {
            let cap = capacity.capacity_at(s.time);
            cap > 0 && occupancy.get(&s.time).copied().unwrap_or(0) < cap
        })
        .map(|s| s.time)
        .collect()
}

/// Three-way calendar classification of one day.
///
/// - Unavailable: not enabled, no slots, or no eligible slot has room.
/// - Partial: some eligible slot has room, and either another eligible slot
///   is exhausted or the day carries any occupancy at all.
/// - Available: every eligible slot has room and nothing is booked.
///
/// Eligible means switched on with capacity > 0. A day with no eligible
/// slot is never Available.
pub fn classify_day(
    day: Option<&DaySchedule>,
    capacity: &CapacityIndex,
    occupancy: &HashMap<TimeOfDay, u32>,
) -> DayStatus {
    let Some(day) = day.filter(|d| d.is_bookable()) else {
        return DayStatus::Unavailable;
    };

    let mut free = 0usize;
    let mut exhausted = 0usize;
    for slot in day.slots.iter().filter(|s| s.available) {
        let cap = capacity.capacity_at(slot.time);
        if cap == 0 {
            continue;
        }
        if occupancy.get(&slot.time).copied().unwrap_or(0) < cap {
            free += 1;
        } else {
            exhausted += 1;
        }
    }

    let occupied = occupancy.values().any(|&n| n > 0);
    if free == 0 {
        DayStatus::Unavailable
    } else if exhausted > 0 || occupied {
        DayStatus::Partial
    } else {
        DayStatus::Available
    }
}

/// Every date of a calendar month, ascending.
pub fn days_of_month(year: i32, month: u32) -> Result<Vec<DateKey>, EngineError> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(EngineError::InvalidInput(format!("year {year} out of range")));
    }
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| EngineError::InvalidInput(format!("month {month} out of range")))?;
    Ok(first
        .iter_days()
        .take_while(|d| chrono::Datelike::month(d) == month)
        .map(DateKey::new)
        .collect())
}
