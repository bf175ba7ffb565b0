/// Five-minute granularity over a whole day.
pub const MAX_SLOTS_PER_DAY: usize = 288;

pub const MAX_RESOURCES: usize = 1_000;

pub const MAX_SUBJECT_ID_LEN: usize = 256;

pub const MAX_METADATA_ENTRIES: usize = 32;

pub const MAX_METADATA_KEY_LEN: usize = 64;

pub const MAX_METADATA_VALUE_LEN: usize = 4_096;

pub const MAX_LOCAL_BOOKINGS: usize = 100_000;

/// Years accepted by `month_view`.
pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 9999;
