use crate::model::{Slot, TimeOfDay};

/// Fixed-width slots from `start` (inclusive) to `end` (exclusive).
/// Empty when `start >= end` or the interval is zero.
pub fn generate(start: TimeOfDay, end: TimeOfDay, interval_minutes: u32) -> Vec<Slot> {
    if start >= end || interval_minutes == 0 {
        return Vec::new();
    }
    let mut slots = Vec::new();
    let mut current = Some(start);
    while let Some(time) = current
        && time < end
    {
        slots.push(Slot::open(time));
        current = time.add_minutes(interval_minutes);
    }
    slots
}
