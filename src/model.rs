use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

/// Unix milliseconds. The only timestamp type.
pub type Ms = i64;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Rejected boundary input (a date or time string that does not parse).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub what: &'static str,
    pub input: String,
}

impl ParseError {
    fn new(what: &'static str, input: &str) -> Self {
        Self {
            what,
            input: input.to_string(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}", self.what, self.input)
    }
}

impl std::error::Error for ParseError {}

// ── DateKey ──────────────────────────────────────────────────────

/// A calendar day with no time or zone component. Canonical form `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    /// The following calendar day.
    pub fn succ(&self) -> Option<Self> {
        self.0.succ_opt().map(Self)
    }
}

impl FromStr for DateKey {
    type Err = ParseError;

    /// Accepts `YYYY-MM-DD`, or the date prefix of an ISO-8601 timestamp
    /// (`YYYY-MM-DDTHH:MM...` / `YYYY-MM-DD HH:MM...`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bytes = s.as_bytes();
        if bytes.len() < 10 || (bytes.len() > 10 && !matches!(bytes[10], b'T' | b' ')) {
            return Err(ParseError::new("date", s));
        }
        if bytes[4] != b'-' || bytes[7] != b'-' {
            return Err(ParseError::new("date", s));
        }
        let head = &s[..10];
        if !head
            .bytes()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit())
        {
            return Err(ParseError::new("date", s));
        }
        NaiveDate::parse_from_str(head, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| ParseError::new("date", s))
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl Serialize for DateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── TimeOfDay ────────────────────────────────────────────────────

/// Wall-clock `HH:MM`, 24-hour, no zone. Stored as minutes since midnight,
/// so ordering matches the lexical ordering of the zero-padded form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);

    pub const fn from_minutes(minutes: u16) -> Option<Self> {
        if minutes < MINUTES_PER_DAY {
            Some(Self(minutes))
        } else {
            None
        }
    }

    pub const fn hm(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self(hour as u16 * 60 + minute as u16))
        } else {
            None
        }
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u8 {
        (self.0 / 60) as u8
    }

    pub fn minute(self) -> u8 {
        (self.0 % 60) as u8
    }

    /// `None` when the result would cross midnight.
    pub fn add_minutes(self, minutes: u32) -> Option<Self> {
        let total = self.0 as u32 + minutes;
        u16::try_from(total).ok().and_then(Self::from_minutes)
    }
}

fn two_digits(part: &str) -> Option<u8> {
    if part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit()) {
        part.parse().ok()
    } else {
        None
    }
}

impl FromStr for TimeOfDay {
    type Err = ParseError;

    /// Accepts `HH:MM`, and `HH:MM:SS` when the seconds are `00`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseError::new("time of day", s);
        let mut parts = s.trim().split(':');
        let hour = parts.next().and_then(two_digits).ok_or_else(err)?;
        let minute = parts.next().and_then(two_digits).ok_or_else(err)?;
        if let Some(seconds) = parts.next()
            && two_digits(seconds) != Some(0)
        {
            return Err(err());
        }
        if parts.next().is_some() {
            return Err(err());
        }
        Self::hm(hour, minute).ok_or_else(err)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── Schedule ─────────────────────────────────────────────────────

/// A bookable point in a day. `available` switches the slot off
/// independently of bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub time: TimeOfDay,
    pub available: bool,
}

impl Slot {
    pub fn open(time: TimeOfDay) -> Self {
        Self {
            time,
            available: true,
        }
    }
}

/// Per-day configuration. `slots` is kept sorted and unique by time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub date: DateKey,
    pub enabled: bool,
    pub slots: Vec<Slot>,
}

impl DaySchedule {
    pub fn new(date: DateKey, enabled: bool, slots: Vec<Slot>) -> Self {
        let mut day = Self {
            date,
            enabled,
            slots,
        };
        day.normalize();
        day
    }

    /// Sort by time; the first occurrence of a duplicated time wins.
    pub fn normalize(&mut self) {
        self.slots.sort_by_key(|s| s.time);
        self.slots.dedup_by_key(|s| s.time);
    }

    pub fn slot(&self, time: TimeOfDay) -> Option<&Slot> {
        self.slots
            .binary_search_by_key(&time, |s| s.time)
            .ok()
            .map(|i| &self.slots[i])
    }

    /// Insert keeping sort order. Returns false if the time already exists.
    pub fn insert_slot(&mut self, slot: Slot) -> bool {
        match self.slots.binary_search_by_key(&slot.time, |s| s.time) {
            Ok(_) => false,
            Err(pos) => {
                self.slots.insert(pos, slot);
                true
            }
        }
    }

    pub fn remove_slot(&mut self, time: TimeOfDay) -> Option<Slot> {
        self.slots
            .binary_search_by_key(&time, |s| s.time)
            .ok()
            .map(|i| self.slots.remove(i))
    }

    pub fn set_slot_available(&mut self, time: TimeOfDay, available: bool) -> bool {
        match self.slots.binary_search_by_key(&time, |s| s.time) {
            Ok(i) => {
                self.slots[i].available = available;
                true
            }
            Err(_) => false,
        }
    }

    /// Enabled and has at least one slot.
    pub fn is_bookable(&self) -> bool {
        self.enabled && !self.slots.is_empty()
    }

    /// Whether `time` is an offered slot of a bookable day.
    pub fn offers(&self, time: TimeOfDay) -> bool {
        self.enabled && self.slot(time).is_some_and(|s| s.available)
    }
}

// ── Resources ────────────────────────────────────────────────────

/// An interchangeable official ("Ministro de Fe").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub active: bool,
    #[serde(default, deserialize_with = "nullable_hours")]
    pub available_hours: Vec<TimeOfDay>,
}

fn nullable_hours<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<TimeOfDay>, D::Error> {
    Option::<Vec<TimeOfDay>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl Resource {
    /// Whether this resource can honor a slot at `time`.
    ///
    /// Fail-closed: a resource with no configured hours covers nothing, so an
    /// unconfigured official never inflates capacity.
    pub fn covers(&self, time: TimeOfDay) -> bool {
        self.active && !self.available_hours.is_empty() && self.available_hours.contains(&time)
    }
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    /// Allowed lifecycle moves. Re-applying the current status is allowed (no-op).
    pub fn can_become(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        *self == next
            || matches!(
                (self, next),
                (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled) | (Confirmed, Completed)
            )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub date: DateKey,
    pub time: TimeOfDay,
    pub subject_id: String,
    pub status: BookingStatus,
    pub created_at: Ms,
    pub updated_at: Ms,
    pub origin: Origin,
    pub metadata: BTreeMap<String, String>,
    /// Written to the remote system of record.
    pub published: bool,
}

impl Booking {
    /// Counts against capacity.
    pub fn is_active(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }

    pub fn key(&self) -> (DateKey, TimeOfDay) {
        (self.date, self.time)
    }
}

/// The local persistence record. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    DayConfigured {
        date: DateKey,
        enabled: bool,
        slots: Vec<Slot>,
    },
    DayEnabled {
        date: DateKey,
        enabled: bool,
    },
    SlotAdded {
        date: DateKey,
        time: TimeOfDay,
    },
    SlotRemoved {
        date: DateKey,
        time: TimeOfDay,
    },
    SlotToggled {
        date: DateKey,
        time: TimeOfDay,
        available: bool,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingStatusChanged {
        id: Ulid,
        status: BookingStatus,
        at: Ms,
    },
    BookingPublished {
        id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayStatus {
    Available,
    Partial,
    Unavailable,
}

/// Calendar rendering contract: every day of the month lands in exactly one list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonthView {
    pub available: Vec<DateKey>,
    pub partial: Vec<DateKey>,
    pub unavailable: Vec<DateKey>,
}

impl MonthView {
    pub fn push(&mut self, date: DateKey, status: DayStatus) {
        match status {
            DayStatus::Available => self.available.push(date),
            DayStatus::Partial => self.partial.push(date),
            DayStatus::Unavailable => self.unavailable.push(date),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub total: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub cancelled: usize,
    pub completed: usize,
}
