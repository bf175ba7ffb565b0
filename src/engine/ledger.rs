use std::collections::{HashMap, HashSet};

use ulid::Ulid;

use crate::cache::{Refresh, RemoteSyncCache};
use crate::model::*;
use crate::remote::{synthesize, RemoteBooking, RemoteSource};

use super::EngineError;

type SlotKey = (DateKey, TimeOfDay);

/// Reservations: a remote, authoritative partition (read-only, refreshed on
/// a TTL) and a local partition (persisted, any status).
///
/// Merged view: for a `(date, time)` that has any remote entry, the remote
/// entries win and every local entry for that key is suppressed.
#[derive(Debug)]
pub struct BookingLedger {
    local: HashMap<Ulid, Booking>,
    remote: RemoteSyncCache<Vec<Booking>>,
}

fn sort_bookings(bookings: &mut [Booking]) {
    bookings.sort_by(|a, b| {
        (a.date, a.time, a.created_at, a.id).cmp(&(b.date, b.time, b.created_at, b.id))
    });
}

impl BookingLedger {
    pub fn new(ttl_ms: Ms) -> Self {
        Self {
            local: HashMap::new(),
            remote: RemoteSyncCache::new("bookings", ttl_ms),
        }
    }

    pub fn remote_bookings(&self) -> &[Booking] {
        self.remote.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn remote_cache(&self) -> &RemoteSyncCache<Vec<Booking>> {
        &self.remote
    }

    pub fn local_bookings(&self) -> impl Iterator<Item = &Booking> {
        self.local.values()
    }

    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    /// Local bookings still in play. Cancelled and Completed ones are history
    /// and do not count against the local booking limit.
    pub fn open_local_len(&self) -> usize {
        self.local.values().filter(|b| !b.status.is_terminal()).count()
    }

    pub fn get_local(&self, id: &Ulid) -> Option<&Booking> {
        self.local.get(id)
    }

    /// Any booking by id, local or remote.
    pub fn get(&self, id: &Ulid) -> Option<&Booking> {
        self.local
            .get(id)
            .or_else(|| self.remote_bookings().iter().find(|b| b.id == *id))
    }

    fn remote_keys(&self) -> HashSet<SlotKey> {
        self.remote_bookings().iter().map(Booking::key).collect()
    }

    /// Remote entries plus the local entries not shadowed by them.
    pub fn merged(&self) -> impl Iterator<Item = &Booking> {
        let shadowed = self.remote_keys();
        self.remote_bookings().iter().chain(
            self.local
                .values()
                .filter(move |b| !shadowed.contains(&b.key())),
        )
    }

    /// Non-cancelled bookings in the merged view for one slot.
    pub fn occupancy(&self, date: DateKey, time: TimeOfDay) -> u32 {
        let key = (date, time);
        let remote: Vec<&Booking> = self
            .remote_bookings()
            .iter()
            .filter(|b| b.key() == key)
            .collect();
        if !remote.is_empty() {
            return remote.iter().filter(|b| b.is_active()).count() as u32;
        }
        self.local
            .values()
            .filter(|b| b.key() == key && b.is_active())
            .count() as u32
    }

    /// Occupancy of every slot on `date` that has any.
    pub fn occupancy_on(&self, date: DateKey) -> HashMap<TimeOfDay, u32> {
        let mut out = HashMap::new();
        for b in self.merged().filter(|b| b.date == date && b.is_active()) {
            *out.entry(b.time).or_insert(0) += 1;
        }
        out
    }

    pub fn list_by_date(&self, date: DateKey) -> Vec<Booking> {
        let mut out: Vec<Booking> = self.merged().filter(|b| b.date == date).cloned().collect();
        sort_bookings(&mut out);
        out
    }

    pub fn list_by_subject(&self, subject_id: &str) -> Vec<Booking> {
        let mut out: Vec<Booking> = self
            .merged()
            .filter(|b| b.subject_id == subject_id)
            .cloned()
            .collect();
        sort_bookings(&mut out);
        out
    }

    pub fn stats(&self) -> LedgerStats {
        let mut stats = LedgerStats::default();
        for b in self.merged() {
            stats.total += 1;
            match b.status {
                BookingStatus::Pending => stats.pending += 1,
                BookingStatus::Confirmed => stats.confirmed += 1,
                BookingStatus::Cancelled => stats.cancelled += 1,
                BookingStatus::Completed => stats.completed += 1,
            }
        }
        stats
    }

    /// Resolve a local booking that may move to `to`.
    pub fn check_transition(&self, id: Ulid, to: BookingStatus) -> Result<&Booking, EngineError> {
        let Some(booking) = self.local.get(&id) else {
            if self.remote_bookings().iter().any(|b| b.id == id) {
                return Err(EngineError::ReadOnly(id));
            }
            return Err(EngineError::NotFound(id));
        };
        if !booking.status.can_become(to) {
            return Err(EngineError::InvalidTransition {
                id,
                from: booking.status,
                to,
            });
        }
        Ok(booking)
    }

    pub async fn refresh(&mut self, now: Ms, remote: &dyn RemoteSource) -> Result<Refresh, EngineError> {
        self.remote
            .refresh(now, || async move {
                remote
                    .list_remote_bookings()
                    .await
                    .map(|rows| synthesize(rows, now))
            })
            .await
    }

    /// Replace the remote partition directly, as if it had just been fetched.
    pub fn load_remote(&mut self, rows: Vec<RemoteBooking>, now: Ms) {
        self.remote.store(synthesize(rows, now), now);
    }

    pub fn invalidate_remote(&mut self) {
        self.remote.invalidate();
    }

    /// Apply a persisted booking event. Schedule events are ignored.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::BookingCreated { booking } => {
                self.local.insert(booking.id, booking.clone());
            }
            Event::BookingStatusChanged { id, status, at } => {
                if let Some(b) = self.local.get_mut(id) {
                    b.status = *status;
                    b.updated_at = *at;
                }
            }
            Event::BookingPublished { id } => {
                if let Some(b) = self.local.get_mut(id) {
                    b.published = true;
                }
            }
            Event::DayConfigured { .. }
            | Event::DayEnabled { .. }
            | Event::SlotAdded { .. }
            | Event::SlotRemoved { .. }
            | Event::SlotToggled { .. } => {}
        }
    }

    /// Minimal events that recreate the local partition.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut bookings: Vec<Booking> = self.local.values().cloned().collect();
        sort_bookings(&mut bookings);
        bookings
            .into_iter()
            .map(|booking| Event::BookingCreated { booking })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn d(s: &str) -> DateKey {
        s.parse().unwrap()
    }

    fn local(date: &str, time: &str, subject: &str, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            date: d(date),
            time: t(time),
            subject_id: subject.into(),
            status,
            created_at: 0,
            updated_at: 0,
            origin: Origin::Local,
            metadata: BTreeMap::new(),
            published: false,
        }
    }

    fn remote_row(date: &str, time: &str, subject: &str) -> RemoteBooking {
        RemoteBooking {
            date: d(date),
            time: t(time),
            subject_id: subject.into(),
            status: BookingStatus::Confirmed,
        }
    }

    fn ledger_with(locals: Vec<Booking>, remotes: Vec<RemoteBooking>) -> BookingLedger {
        let mut ledger = BookingLedger::new(30_000);
        for b in locals {
            ledger.apply(&Event::BookingCreated { booking: b });
        }
        ledger.load_remote(remotes, 0);
        ledger
    }

    #[test]
    fn cancelled_bookings_do_not_occupy() {
        let ledger = ledger_with(
            vec![
                local("2025-06-10", "09:00", "a", BookingStatus::Pending),
                local("2025-06-10", "09:00", "b", BookingStatus::Cancelled),
            ],
            vec![],
        );
        assert_eq!(ledger.occupancy(d("2025-06-10"), t("09:00")), 1);
    }

    #[test]
    fn remote_shadows_local_for_same_slot() {
        let ledger = ledger_with(
            vec![local("2025-06-10", "09:00", "org-1", BookingStatus::Pending)],
            vec![remote_row("2025-06-10", "09:00", "org-1")],
        );
        assert_eq!(ledger.occupancy(d("2025-06-10"), t("09:00")), 1);
        let merged: Vec<_> = ledger.merged().collect();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].origin, Origin::Remote);
    }

    #[test]
    fn local_counts_where_remote_is_silent() {
        let ledger = ledger_with(
            vec![local("2025-06-10", "10:00", "org-2", BookingStatus::Pending)],
            vec![remote_row("2025-06-10", "09:00", "org-1")],
        );
        assert_eq!(ledger.occupancy(d("2025-06-10"), t("09:00")), 1);
        assert_eq!(ledger.occupancy(d("2025-06-10"), t("10:00")), 1);
        assert_eq!(ledger.merged().count(), 2);
    }

    #[test]
    fn occupancy_on_matches_per_slot_occupancy() {
        let ledger = ledger_with(
            vec![
                local("2025-06-10", "09:00", "a", BookingStatus::Pending),
                local("2025-06-10", "10:00", "b", BookingStatus::Confirmed),
                local("2025-06-10", "10:00", "c", BookingStatus::Cancelled),
                local("2025-06-11", "10:00", "d", BookingStatus::Pending),
            ],
            vec![remote_row("2025-06-10", "09:00", "x"), remote_row("2025-06-10", "09:00", "y")],
        );
        let date = d("2025-06-10");
        let map = ledger.occupancy_on(date);
        for time in ["09:00", "10:00", "11:00"] {
            assert_eq!(
                map.get(&t(time)).copied().unwrap_or(0),
                ledger.occupancy(date, t(time)),
                "{time}"
            );
        }
        assert_eq!(map.get(&t("09:00")), Some(&2));
    }

    #[test]
    fn lists_are_sorted_and_filtered() {
        let mut early = local("2025-06-10", "09:00", "org-1", BookingStatus::Pending);
        early.created_at = 1;
        let late = local("2025-06-10", "15:00", "org-1", BookingStatus::Pending);
        let other_day = local("2025-06-12", "09:00", "org-1", BookingStatus::Pending);
        let other_subject = local("2025-06-10", "11:00", "org-2", BookingStatus::Pending);
        let ledger = ledger_with(vec![late, other_day, early, other_subject], vec![]);

        let by_date: Vec<String> = ledger
            .list_by_date(d("2025-06-10"))
            .iter()
            .map(|b| b.time.to_string())
            .collect();
        assert_eq!(by_date, ["09:00", "11:00", "15:00"]);

        let by_subject = ledger.list_by_subject("org-1");
        assert_eq!(by_subject.len(), 3);
        assert_eq!(by_subject[2].date, d("2025-06-12"));
    }

    #[test]
    fn stats_count_merged_view() {
        let ledger = ledger_with(
            vec![
                local("2025-06-10", "09:00", "a", BookingStatus::Pending),
                local("2025-06-10", "10:00", "b", BookingStatus::Cancelled),
                local("2025-06-10", "11:00", "c", BookingStatus::Pending),
            ],
            vec![remote_row("2025-06-10", "11:00", "c")],
        );
        let stats = ledger.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.confirmed, 1);
    }

    #[test]
    fn transition_checks() {
        let pending = local("2025-06-10", "09:00", "a", BookingStatus::Pending);
        let id = pending.id;
        let ledger = ledger_with(vec![pending], vec![remote_row("2025-06-11", "09:00", "r")]);
        assert!(ledger.check_transition(id, BookingStatus::Confirmed).is_ok());
        assert!(matches!(
            ledger.check_transition(id, BookingStatus::Completed),
            Err(EngineError::InvalidTransition { .. })
        ));
        let remote_id = ledger.remote_bookings()[0].id;
        assert!(matches!(
            ledger.check_transition(remote_id, BookingStatus::Cancelled),
            Err(EngineError::ReadOnly(_))
        ));
        assert!(matches!(
            ledger.check_transition(Ulid::new(), BookingStatus::Cancelled),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn apply_status_and_publish() {
        let b = local("2025-06-10", "09:00", "a", BookingStatus::Pending);
        let id = b.id;
        let mut ledger = ledger_with(vec![b], vec![]);
        ledger.apply(&Event::BookingStatusChanged { id, status: BookingStatus::Confirmed, at: 9 });
        ledger.apply(&Event::BookingPublished { id });
        let b = ledger.get_local(&id).unwrap();
        assert_eq!(b.status, BookingStatus::Confirmed);
        assert_eq!(b.updated_at, 9);
        assert!(b.published);
        assert_eq!(ledger.snapshot_events().len(), 1);
    }

    #[test]
    fn terminal_bookings_are_not_open() {
        let ledger = ledger_with(
            vec![
                local("2025-06-09", "09:00", "a", BookingStatus::Completed),
                local("2025-06-10", "09:00", "b", BookingStatus::Cancelled),
                local("2025-06-10", "10:00", "c", BookingStatus::Pending),
                local("2025-06-10", "11:00", "d", BookingStatus::Confirmed),
            ],
            vec![],
        );
        assert_eq!(ledger.local_len(), 4);
        assert_eq!(ledger.open_local_len(), 2);
    }
}
