use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use ulid::Ulid;

use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    Unavailable(String),
    Rejected(String),
    Malformed(String),
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Unavailable(e) => write!(f, "remote unavailable: {e}"),
            RemoteError::Rejected(e) => write!(f, "remote rejected request: {e}"),
            RemoteError::Malformed(e) => write!(f, "malformed remote payload: {e}"),
        }
    }
}

impl std::error::Error for RemoteError {}

/// One row of the remote bookings listing, derived upstream from organization
/// records that carry an assembly date and time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBooking {
    pub date: DateKey,
    pub time: TimeOfDay,
    pub subject_id: String,
    pub status: BookingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved,
    Full,
}

/// The authoritative system of record.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn list_active_resources(&self) -> Result<Vec<Resource>, RemoteError>;

    async fn list_remote_bookings(&self) -> Result<Vec<RemoteBooking>, RemoteError>;

    /// Record a booking staff has accepted.
    async fn create_remote_booking(&self, booking: &Booking) -> Result<(), RemoteError>;

    async fn update_remote_status(
        &self,
        booking: &Booking,
        status: BookingStatus,
    ) -> Result<(), RemoteError>;

    /// Atomic conditional insert: succeeds only while fewer than `capacity`
    /// non-cancelled records exist for the booking's `(date, time)`.
    async fn reserve(&self, booking: &Booking, capacity: u32) -> Result<ReserveOutcome, RemoteError>;
}

pub fn parse_bookings(json: &str) -> Result<Vec<RemoteBooking>, RemoteError> {
    serde_json::from_str(json).map_err(|e| RemoteError::Malformed(e.to_string()))
}

pub fn parse_resources(json: &str) -> Result<Vec<Resource>, RemoteError> {
    serde_json::from_str(json).map_err(|e| RemoteError::Malformed(e.to_string()))
}

/// Turn remote rows into read-only ledger entries. Only Confirmed and
/// Completed rows are kept. Ids are derived from the row contents so they
/// stay stable across refreshes.
pub fn synthesize(records: Vec<RemoteBooking>, fetched_at: Ms) -> Vec<Booking> {
    let mut ordinals: HashMap<(DateKey, TimeOfDay, String), u32> = HashMap::new();
    let mut out = Vec::with_capacity(records.len());
    for r in records {
        if !matches!(r.status, BookingStatus::Confirmed | BookingStatus::Completed) {
            debug!("dropping remote booking {} {} with status {}", r.date, r.time, r.status);
            continue;
        }
        let ordinal = ordinals
            .entry((r.date, r.time, r.subject_id.clone()))
            .or_insert(0);
        let id = remote_booking_id(&r, *ordinal);
        *ordinal += 1;
        out.push(Booking {
            id,
            date: r.date,
            time: r.time,
            subject_id: r.subject_id,
            status: r.status,
            created_at: fetched_at,
            updated_at: fetched_at,
            origin: Origin::Remote,
            metadata: BTreeMap::new(),
            published: true,
        });
    }
    out
}

/// Zero timestamp part keeps these apart from locally minted ids.
fn remote_booking_id(r: &RemoteBooking, ordinal: u32) -> Ulid {
    let key = format!("{}|{}|{}|{}", r.date, r.time, r.subject_id, ordinal);
    let hi = crc32fast::hash(key.as_bytes()) as u128;
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(b"remote:");
    hasher.update(key.as_bytes());
    let lo = hasher.finalize() as u128;
    Ulid::from_parts(0, (hi << 32) | lo)
}

// ── In-process reference implementation ──────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    pub id: Ulid,
    pub date: DateKey,
    pub time: TimeOfDay,
    pub subject_id: String,
    pub status: BookingStatus,
}

/// Mutex-guarded authoritative table. `reserve` is atomic because the
/// count and the insert happen under one lock.
#[derive(Default)]
pub struct MemoryRemote {
    resources: Mutex<Vec<Resource>>,
    records: Mutex<Vec<RemoteRecord>>,
    failing: AtomicBool,
    fetches: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resources(resources: Vec<Resource>) -> Self {
        Self {
            resources: Mutex::new(resources),
            ..Self::default()
        }
    }

    pub async fn set_resources(&self, resources: Vec<Resource>) {
        *self.resources.lock().await = resources;
    }

    /// Seed a row as if another client (or staff) wrote it.
    pub async fn insert(&self, date: DateKey, time: TimeOfDay, subject_id: &str, status: BookingStatus) {
        self.records.lock().await.push(RemoteRecord {
            id: Ulid::new(),
            date,
            time,
            subject_id: subject_id.to_string(),
            status,
        });
    }

    pub async fn records(&self) -> Vec<RemoteRecord> {
        self.records.lock().await.clone()
    }

    /// While set, every call fails with `Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of list calls served (successful or not).
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn check_up(&self) -> Result<(), RemoteError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(RemoteError::Unavailable("injected failure".into()))
        } else {
            Ok(())
        }
    }

    fn record_for(booking: &Booking, status: BookingStatus) -> RemoteRecord {
        RemoteRecord {
            id: booking.id,
            date: booking.date,
            time: booking.time,
            subject_id: booking.subject_id.clone(),
            status,
        }
    }
}

#[async_trait]
impl RemoteSource for MemoryRemote {
    async fn list_active_resources(&self) -> Result<Vec<Resource>, RemoteError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_up()?;
        Ok(self
            .resources
            .lock()
            .await
            .iter()
            .filter(|r| r.active)
            .cloned()
            .collect())
    }

    async fn list_remote_bookings(&self) -> Result<Vec<RemoteBooking>, RemoteError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_up()?;
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| matches!(r.status, BookingStatus::Confirmed | BookingStatus::Completed))
            .map(|r| RemoteBooking {
                date: r.date,
                time: r.time,
                subject_id: r.subject_id.clone(),
                status: r.status,
            })
            .collect())
    }

    async fn create_remote_booking(&self, booking: &Booking) -> Result<(), RemoteError> {
        self.check_up()?;
        let mut records = self.records.lock().await;
        match records.iter_mut().find(|r| r.id == booking.id) {
            Some(existing) => existing.status = booking.status,
            None => records.push(Self::record_for(booking, booking.status)),
        }
        Ok(())
    }

    async fn update_remote_status(
        &self,
        booking: &Booking,
        status: BookingStatus,
    ) -> Result<(), RemoteError> {
        self.check_up()?;
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == booking.id)
            .ok_or_else(|| RemoteError::Rejected(format!("unknown booking {}", booking.id)))?;
        record.status = status;
        Ok(())
    }

    async fn reserve(&self, booking: &Booking, capacity: u32) -> Result<ReserveOutcome, RemoteError> {
        self.check_up()?;
        let mut records = self.records.lock().await;
        let taken = records
            .iter()
            .filter(|r| r.date == booking.date && r.time == booking.time)
            .filter(|r| r.status != BookingStatus::Cancelled)
            .count();
        if taken as u64 >= capacity as u64 {
            return Ok(ReserveOutcome::Full);
        }
        records.push(Self::record_for(booking, booking.status));
        Ok(ReserveOutcome::Reserved)
    }
}
