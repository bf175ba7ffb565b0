use std::collections::BTreeMap;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn validate_request(
    subject_id: &str,
    metadata: &BTreeMap<String, String>,
) -> Result<(), EngineError> {
    if subject_id.trim().is_empty() {
        return Err(EngineError::InvalidInput("subject id is empty".into()));
    }
    if subject_id.len() > MAX_SUBJECT_ID_LEN {
        return Err(EngineError::LimitExceeded("subject id too long"));
    }
    if metadata.len() > MAX_METADATA_ENTRIES {
        return Err(EngineError::LimitExceeded("too many metadata entries"));
    }
    for (k, v) in metadata {
        if k.len() > MAX_METADATA_KEY_LEN {
            return Err(EngineError::LimitExceeded("metadata key too long"));
        }
        if v.len() > MAX_METADATA_VALUE_LEN {
            return Err(EngineError::LimitExceeded("metadata value too long"));
        }
    }
    Ok(())
}

/// The day must be enabled with slots, and `time` one of its switched-on slots.
pub(crate) fn check_offered(
    day: Option<&DaySchedule>,
    date: DateKey,
    time: TimeOfDay,
) -> Result<(), EngineError> {
    let Some(day) = day.filter(|d| d.is_bookable()) else {
        return Err(EngineError::DayNotBookable(date));
    };
    if !day.offers(time) {
        return Err(EngineError::SlotNotOffered { date, time });
    }
    Ok(())
}

pub(crate) fn check_capacity(
    path: &'static str,
    date: DateKey,
    time: TimeOfDay,
    occupancy: u32,
    capacity: u32,
) -> Result<(), EngineError> {
    if occupancy >= capacity {
        metrics::counter!(crate::observability::SLOT_FULL_TOTAL, "path" => path).increment(1);
        return Err(EngineError::SlotFull {
            date,
            time,
            capacity,
        });
    }
    Ok(())
}

pub(crate) fn check_slot_count(slots: &[Slot]) -> Result<(), EngineError> {
    if slots.len() > MAX_SLOTS_PER_DAY {
        return Err(EngineError::LimitExceeded("too many slots in one day"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn d(s: &str) -> DateKey {
        s.parse().unwrap()
    }

    #[test]
    fn subject_and_metadata_limits() {
        let empty = BTreeMap::new();
        assert!(validate_request("org-1", &empty).is_ok());
        assert!(matches!(validate_request("  ", &empty), Err(EngineError::InvalidInput(_))));
        let long = "x".repeat(MAX_SUBJECT_ID_LEN + 1);
        assert!(matches!(validate_request(&long, &empty), Err(EngineError::LimitExceeded(_))));

        let mut meta = BTreeMap::new();
        meta.insert("k".repeat(MAX_METADATA_KEY_LEN + 1), "v".into());
        assert!(matches!(validate_request("org-1", &meta), Err(EngineError::LimitExceeded(_))));
    }

    #[test]
    fn offered_checks_day_then_slot() {
        let date = d("2025-06-10");
        assert!(matches!(
            check_offered(None, date, t("09:00")),
            Err(EngineError::DayNotBookable(_))
        ));

        let mut day = DaySchedule::new(date, true, vec![Slot::open(t("09:00"))]);
        assert!(check_offered(Some(&day), date, t("09:00")).is_ok());
        assert!(matches!(
            check_offered(Some(&day), date, t("10:00")),
            Err(EngineError::SlotNotOffered { .. })
        ));

        day.set_slot_available(t("09:00"), false);
        assert!(matches!(
            check_offered(Some(&day), date, t("09:00")),
            Err(EngineError::SlotNotOffered { .. })
        ));

        day.enabled = false;
        assert!(matches!(
            check_offered(Some(&day), date, t("09:00")),
            Err(EngineError::DayNotBookable(_))
        ));
    }

    #[test]
    fn capacity_check() {
        let date = d("2025-06-10");
        assert!(check_capacity("create", date, t("09:00"), 0, 1).is_ok());
        assert!(matches!(
            check_capacity("create", date, t("09:00"), 1, 1),
            Err(EngineError::SlotFull { capacity: 1, .. })
        ));
        assert!(matches!(
            check_capacity("create", date, t("09:00"), 0, 0),
            Err(EngineError::SlotFull { capacity: 0, .. })
        ));
    }
}
